//! The default tabular format: 21 tab-separated columns, one alignment per
//! line, with an optional 5-line header. `pslx` appends the per-block
//! sequences as two extra comma-separated columns.

use crate::align::alignment::Alignment;
use crate::output::{OutputContext, OutputWriter};
use eyre::Report;
use itertools::Itertools;
use std::io::Write;

pub struct PslWriter {
  sink: Box<dyn Write + Send>,
  ctx: OutputContext,
  with_seq: bool,
}

impl PslWriter {
  pub fn new(sink: Box<dyn Write + Send>, ctx: OutputContext, with_seq: bool) -> Self {
    Self { sink, ctx, with_seq }
  }
}

impl OutputWriter for PslWriter {
  fn write_header(&mut self) -> Result<(), Report> {
    writeln!(self.sink, "psLayout version 3")?;
    writeln!(self.sink)?;
    writeln!(
      self.sink,
      "match\tmis- \trep. \tN's\tQ gap\tQ gap\tT gap\tT gap\tstrand\tQ        \tQ   \tQ    \tQ  \tT        \tT   \tT    \tT  \tblock\tblockSizes \tqStarts\t tStarts"
    )?;
    writeln!(
      self.sink,
      "     \tmatch\tmatch\t   \tcount\tbases\tcount\tbases\t      \tname     \tsize\tstart\tend\tname     \tsize\tstart\tend\tcount"
    )?;
    writeln!(self.sink, "{}", "-".repeat(159))?;
    Ok(())
  }

  fn write_alignment(&mut self, aln: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> Result<(), Report> {
    let block_sizes = aln.blocks.iter().map(|b| b.size.to_string()).join(",");
    let q_starts = aln.blocks.iter().map(|b| aln.block_q_coord(b).to_string()).join(",");
    let t_starts = aln.blocks.iter().map(|b| aln.block_t_coord(b).to_string()).join(",");

    write!(
      self.sink,
      "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{},\t{},\t{},",
      aln.matches,
      aln.mismatches,
      aln.rep_matches,
      aln.n_count,
      aln.q_num_insert,
      aln.q_base_insert * aln.q_stride,
      aln.t_num_insert,
      aln.t_base_insert * aln.t_stride,
      aln.strand_label(),
      aln.q_name,
      aln.q_size,
      aln.q_start,
      aln.q_end,
      aln.t_name,
      aln.t_size,
      aln.t_start,
      aln.t_end,
      aln.blocks.len(),
      block_sizes,
      q_starts,
      t_starts,
    )?;

    if self.with_seq {
      let q_texts = aln
        .blocks
        .iter()
        .map(|b| String::from_utf8_lossy(&q_seq[b.q_start..b.q_start + b.size]).to_lowercase())
        .join(",");
      let t_texts = aln
        .blocks
        .iter()
        .map(|b| String::from_utf8_lossy(&t_seq[b.t_start..b.t_start + b.size]).to_lowercase())
        .join(",");
      write!(self.sink, "\t{q_texts},\t{t_texts},")?;
    }
    writeln!(self.sink)?;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Report> {
    self.sink.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::alignment::tests::test_alignment;
  use crate::output::OutputFormat;
  use crate::output::collect::SharedBuf;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn ctx() -> OutputContext {
    OutputContext {
      database: "db.fa".to_owned(),
      db_seq_count: 1,
      db_letters: 16,
      q_is_prot: false,
      t_is_prot: false,
      min_identity: 90.0,
    }
  }

  #[rstest]
  fn writes_header_and_row() {
    let buf = SharedBuf::default();
    let mut writer = PslWriter::new(Box::new(buf.clone()), ctx(), false);
    writer.write_header().unwrap();
    let aln = test_alignment();
    writer.write_alignment(&aln, b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "psLayout version 3");
    assert!(lines[4].starts_with("----"));
    let row: Vec<&str> = lines[5].split('\t').collect();
    assert_eq!(row.len(), 21);
    assert_eq!(row[0], "8");
    assert_eq!(row[8], "+");
    assert_eq!(row[9], "q");
    assert_eq!(row[18], "8,");
    assert_eq!(row[19], "0,");
    assert_eq!(row[20], "0,");
  }

  #[rstest]
  fn pslx_appends_block_sequences() {
    let buf = SharedBuf::default();
    let mut writer = PslWriter::new(Box::new(buf.clone()), ctx(), true);
    let aln = test_alignment();
    writer.write_alignment(&aln, b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let row: Vec<&str> = out.lines().next().unwrap().split('\t').collect();
    assert_eq!(row.len(), 23);
    assert_eq!(row[21], "acgtacgt,");
    assert_eq!(row[22], "acgtacgt,");
  }

  #[rstest]
  fn format_registry_builds_psl_writers() {
    let buf = SharedBuf::default();
    let mut writer = crate::output::make_writer(OutputFormat::Psl, Box::new(buf.clone()), ctx());
    writer.write_alignment(&test_alignment(), b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.finish().unwrap();
    assert!(buf.contents().contains("\t+\tq\t"));
  }
}
