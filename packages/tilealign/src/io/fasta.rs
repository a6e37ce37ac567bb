//! Seekable FASTA reading. Workers each own a reader positioned at a byte
//! offset that the coordinator guarantees to be a record boundary, so the
//! reader also reports where each record starts.

use eyre::{Report, WrapErr};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const BUF_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastaRecord {
  pub seq_name: String,
  pub seq: Vec<u8>,
  pub index: usize,
}

impl FastaRecord {
  pub fn is_empty(&self) -> bool {
    self.seq_name.is_empty() && self.seq.is_empty()
  }

  pub fn clear(&mut self) {
    self.seq_name.clear();
    self.seq.clear();
  }
}

pub struct FastaReader {
  reader: BufReader<File>,
  path: PathBuf,
  /// Byte offset of the next unread byte.
  pos: u64,
  /// Header line carried over from the previous `read` call, with the offset
  /// where it starts.
  pending: Option<(Vec<u8>, u64)>,
  index: usize,
}

impl FastaReader {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Report> {
    let path = path.as_ref().to_owned();
    let file = File::open(&path).wrap_err_with(|| format!("When opening FASTA file: {path:#?}"))?;
    Ok(Self {
      reader: BufReader::with_capacity(BUF_SIZE, file),
      path,
      pos: 0,
      pending: None,
      index: 0,
    })
  }

  /// Repositions the reader on a record boundary previously reported by
  /// `scan_record_offsets`.
  pub fn seek(&mut self, offset: u64) -> Result<(), Report> {
    self
      .reader
      .seek(SeekFrom::Start(offset))
      .wrap_err_with(|| format!("When seeking to offset {offset} in {:#?}", self.path))?;
    self.pos = offset;
    self.pending = None;
    Ok(())
  }

  /// Reads the next record into `record`. On end of input the record is left
  /// empty, mirroring the way sequence loops detect termination.
  pub fn read(&mut self, record: &mut FastaRecord) -> Result<(), Report> {
    record.clear();

    let header = match self.pending.take() {
      Some((line, _offset)) => Some(line),
      None => self.next_header_line()?,
    };
    let Some(header) = header else {
      return Ok(());
    };

    record.seq_name = String::from_utf8_lossy(&header[1..])
      .split_whitespace()
      .next()
      .unwrap_or_default()
      .to_owned();

    let mut line = Vec::new();
    loop {
      line.clear();
      let line_start = self.pos;
      let n = self
        .reader
        .read_until(b'\n', &mut line)
        .wrap_err_with(|| format!("When reading FASTA file: {:#?}", self.path))?;
      if n == 0 {
        break;
      }
      self.pos += n as u64;
      if line.starts_with(b">") {
        trim_line_end(&mut line);
        self.pending = Some((line.clone(), line_start));
        break;
      }
      record.seq.extend(line.iter().copied().filter(|c| !c.is_ascii_whitespace()));
    }

    record.index = self.index;
    self.index += 1;
    Ok(())
  }

  /// Skips ahead to the next header line, returning it without the line
  /// terminator.
  fn next_header_line(&mut self) -> Result<Option<Vec<u8>>, Report> {
    let mut line = Vec::new();
    loop {
      line.clear();
      let n = self
        .reader
        .read_until(b'\n', &mut line)
        .wrap_err_with(|| format!("When reading FASTA file: {:#?}", self.path))?;
      if n == 0 {
        return Ok(None);
      }
      self.pos += n as u64;
      if line.starts_with(b">") {
        trim_line_end(&mut line);
        return Ok(Some(line));
      }
    }
  }
}

fn trim_line_end(line: &mut Vec<u8>) {
  while matches!(line.last(), Some(b'\n' | b'\r')) {
    line.pop();
  }
}

/// One pass over a query file: the byte offset where every record starts,
/// plus the total file length. Shard boundaries are drawn from this list so
/// they always coincide with record boundaries.
pub fn scan_record_offsets(path: impl AsRef<Path>) -> Result<(Vec<u64>, u64), Report> {
  let path = path.as_ref();
  let file = File::open(path).wrap_err_with(|| format!("When opening FASTA file: {path:#?}"))?;
  let mut reader = BufReader::with_capacity(BUF_SIZE, file);
  let mut offsets = Vec::new();
  let mut pos = 0_u64;
  let mut line = Vec::new();
  loop {
    line.clear();
    let n = reader
      .read_until(b'\n', &mut line)
      .wrap_err_with(|| format!("When scanning FASTA file: {path:#?}"))?;
    if n == 0 {
      break;
    }
    if line.starts_with(b">") {
      offsets.push(pos);
    }
    pos += n as u64;
  }
  Ok((offsets, pos))
}

/// Loads every record of a FASTA file, e.g. the whole target database.
pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<FastaRecord>, Report> {
  let mut reader = FastaReader::from_path(path)?;
  let mut records = Vec::new();
  loop {
    let mut record = FastaRecord::default();
    reader.read(&mut record)?;
    if record.is_empty() {
      break;
    }
    records.push(record);
  }
  Ok(records)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::io::Write;

  fn temp_fasta(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("tilealign-fasta-{}-{name}.fa", std::process::id()));
    let mut file = File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
  }

  const FASTA: &str = ">one first sequence\nACGT\nACGT\n>two\nGGGG\n>three\nTTTT\n";

  #[rstest]
  fn reads_records_in_order() {
    let path = temp_fasta("read", FASTA);
    let records = read_all(&path).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].seq_name, "one");
    assert_eq!(records[0].seq, b"ACGTACGT".to_vec());
    assert_eq!(records[1].seq_name, "two");
    assert_eq!(records[1].seq, b"GGGG".to_vec());
    assert_eq!(records[2].index, 2);
    std::fs::remove_file(path).unwrap();
  }

  #[rstest]
  fn offsets_land_on_record_boundaries() {
    let path = temp_fasta("scan", FASTA);
    let (offsets, len) = scan_record_offsets(&path).unwrap();
    assert_eq!(offsets, vec![0, 30, 40]);
    assert_eq!(len as usize, FASTA.len());
    std::fs::remove_file(path).unwrap();
  }

  #[rstest]
  fn seek_resumes_mid_file() {
    let path = temp_fasta("seek", FASTA);
    let (offsets, _) = scan_record_offsets(&path).unwrap();

    let mut reader = FastaReader::from_path(&path).unwrap();
    reader.seek(offsets[1]).unwrap();
    let mut record = FastaRecord::default();
    reader.read(&mut record).unwrap();
    assert_eq!(record.seq_name, "two");
    reader.read(&mut record).unwrap();
    assert_eq!(record.seq_name, "three");
    reader.read(&mut record).unwrap();
    assert!(record.is_empty());
    std::fs::remove_file(path).unwrap();
  }
}
