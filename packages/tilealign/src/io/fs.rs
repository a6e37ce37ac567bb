use eyre::{Report, WrapErr, eyre};
use std::fs::{self, File};
use std::io::{BufWriter, Write, stdout};
use std::path::Path;

pub fn ensure_dir(filepath: impl AsRef<Path>) -> Result<(), Report> {
  let filepath = filepath.as_ref();
  let parent_dir = filepath
    .parent()
    .ok_or_else(|| eyre!("Unable to get parent path for {filepath:#?}"))?;
  if parent_dir.as_os_str().is_empty() {
    return Ok(());
  }
  fs::create_dir_all(parent_dir).wrap_err_with(|| format!("When creating directory '{parent_dir:#?}'"))
}

/// Opens a buffered writer over a file path, with `stdout` and `-` mapping to
/// standard output.
pub fn create_file_or_stdout(filepath: impl AsRef<Path>) -> Result<Box<dyn Write + Send>, Report> {
  let filepath = filepath.as_ref();
  if is_stdout(filepath) {
    return Ok(Box::new(BufWriter::new(stdout())));
  }
  ensure_dir(filepath)?;
  let file = File::create(filepath).wrap_err_with(|| format!("When creating file: {filepath:#?}"))?;
  Ok(Box::new(BufWriter::new(file)))
}

pub fn is_stdout(filepath: impl AsRef<Path>) -> bool {
  matches!(filepath.as_ref().to_str(), Some("stdout" | "-"))
}
