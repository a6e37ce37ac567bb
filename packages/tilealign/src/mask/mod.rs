//! Repeat masking. Masked target regions never start a seed, but nucleotide
//! extension may run through them; repeat regions reported via `--repeats`
//! are not suppressed at all, only accounted separately in the output.

use crate::make_error;
use crate::seq::{MaskBits, Seq};
use eyre::{Report, WrapErr};
use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Where target mask bits come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaskSource {
  /// Lower-cased sequence is masked (soft-masked FASTA convention).
  CaseLower,
  /// Upper-cased sequence is masked.
  CaseUpper,
  /// RepeatMasker `.out` annotations.
  OutFile(PathBuf),
}

impl MaskSource {
  /// Parses a `--mask`/`--repeats` value. `out` resolves to `<database>.out`;
  /// any other value ending in `.out` names the annotation file directly.
  pub fn parse(value: &str, database: &Path) -> Result<Self, Report> {
    match value {
      "lower" => Ok(Self::CaseLower),
      "upper" => Ok(Self::CaseUpper),
      "out" => Ok(Self::OutFile(PathBuf::from(format!("{}.out", database.display())))),
      other if other.ends_with(".out") => Ok(Self::OutFile(PathBuf::from(other))),
      other => make_error!("Unrecognized mask source '{other}': expected lower, upper, out or a RepeatMasker .out file"),
    }
  }
}

/// Query masking only understands the two case conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMask {
  Lower,
  Upper,
}

impl QueryMask {
  pub fn parse(value: &str) -> Result<Self, Report> {
    match value {
      "lower" => Ok(Self::Lower),
      "upper" => Ok(Self::Upper),
      other => make_error!("Unrecognized qMask '{other}': expected lower or upper"),
    }
  }

  pub fn bits(self, seq: &[u8]) -> MaskBits {
    match self {
      Self::Lower => MaskBits::from_lower_case(seq),
      Self::Upper => MaskBits::from_upper_case(seq),
    }
  }
}

/// Computes per-target mask bitmaps. Repeats with divergence of at least
/// `min_rep_divergence` percent stay unmasked when the source is a
/// RepeatMasker file.
pub fn target_mask_bits(
  source: &MaskSource,
  targets: &[Seq],
  min_rep_divergence: f64,
) -> Result<Vec<Option<MaskBits>>, Report> {
  match source {
    MaskSource::CaseLower => Ok(targets.iter().map(|t| Some(MaskBits::from_lower_case(&t.seq))).collect()),
    MaskSource::CaseUpper => Ok(targets.iter().map(|t| Some(MaskBits::from_upper_case(&t.seq))).collect()),
    MaskSource::OutFile(path) => mask_bits_from_out_file(path, targets, min_rep_divergence),
  }
}

/// The subset of RepeatMasker `.out` that matters here: per row, the percent
/// divergence, the target sequence name and the 1-based inclusive repeat
/// coordinates.
fn mask_bits_from_out_file(
  path: &Path,
  targets: &[Seq],
  min_rep_divergence: f64,
) -> Result<Vec<Option<MaskBits>>, Report> {
  let file = File::open(path).wrap_err_with(|| format!("When opening RepeatMasker file: {path:#?}"))?;
  let reader = BufReader::new(file);

  let by_name: HashMap<&str, usize> = targets
    .iter()
    .enumerate()
    .map(|(i, t)| (t.name.as_str(), i))
    .collect();
  let mut bits: Vec<Option<MaskBits>> = targets.iter().map(|t| Some(MaskBits::new(t.len()))).collect();

  for (line_num, line) in reader.lines().enumerate() {
    let line = line.wrap_err_with(|| format!("When reading RepeatMasker file: {path:#?}"))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    // Header rows and blank lines; data rows start with the SW score.
    if fields.len() < 7 || fields[0].parse::<u64>().is_err() {
      continue;
    }

    let parse_err = || format!("When parsing line {} of RepeatMasker file {path:#?}", line_num + 1);
    let divergence: f64 = fields[1].parse().wrap_err_with(parse_err)?;
    let name = fields[4];
    let begin: usize = fields[5].parse().wrap_err_with(parse_err)?;
    let end: usize = fields[6].parse().wrap_err_with(parse_err)?;

    if divergence >= min_rep_divergence {
      continue;
    }
    let Some(&seq_id) = by_name.get(name) else {
      warn!("RepeatMasker file {path:#?} names unknown sequence '{name}', line skipped");
      continue;
    };
    if let Some(mask) = bits[seq_id].as_mut() {
      for i in begin.saturating_sub(1)..end.min(targets[seq_id].len()) {
        mask.set(i);
      }
    }
  }

  Ok(bits)
}
