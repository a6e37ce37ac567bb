//! NCBI blast tabular output (`blast8`), optionally with the per-query
//! comment block (`blast9`).

use crate::align::alignment::{Alignment, Strand};
use crate::output::{OutputContext, OutputWriter, blast_bits_and_evalue, format_evalue};
use eyre::Report;
use std::io::Write;

pub struct BlastTabWriter {
  sink: Box<dyn Write + Send>,
  ctx: OutputContext,
  with_comments: bool,
  /// Rows buffered for the current query so the comment block can precede
  /// them even though it names the query.
  pending: Vec<String>,
}

impl BlastTabWriter {
  pub fn new(sink: Box<dyn Write + Send>, ctx: OutputContext, with_comments: bool) -> Self {
    Self {
      sink,
      ctx,
      with_comments,
      pending: Vec::new(),
    }
  }
}

impl OutputWriter for BlastTabWriter {
  fn write_alignment(&mut self, aln: &Alignment, _q_seq: &[u8], _t_seq: &[u8]) -> Result<(), Report> {
    let aligned = aln.aligned_span();
    let aln_len = aligned + aln.q_base_insert + aln.t_base_insert;
    let gap_opens = aln.q_num_insert + aln.t_num_insert;
    let (bits, evalue) = blast_bits_and_evalue(aln.score, aln.q_size, self.ctx.db_letters);

    // Query coordinates ascend; a minus-strand match descends on the target.
    let (q_start, q_end) = (aln.q_start + 1, aln.q_end);
    let (t_start, t_end) = if aln.q_strand == Strand::Reverse {
      (aln.t_end, aln.t_start + 1)
    } else {
      (aln.t_start + 1, aln.t_end)
    };

    let row = format!(
      "{}\t{}\t{:.2}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.1}",
      aln.q_name,
      aln.t_name,
      aln.identity,
      aln_len,
      aln.mismatches,
      gap_opens,
      q_start,
      q_end,
      t_start,
      t_end,
      format_evalue(evalue),
      bits,
    );
    if self.with_comments {
      self.pending.push(row);
    } else {
      writeln!(self.sink, "{row}")?;
    }
    Ok(())
  }

  fn flush_query(&mut self, q_name: &str) -> Result<(), Report> {
    if self.with_comments {
      let program = if self.ctx.q_is_prot { "TBLASTN" } else { "BLASTN" };
      writeln!(self.sink, "# {program} [tilealign]")?;
      writeln!(self.sink, "# Query: {q_name}")?;
      writeln!(self.sink, "# Database: {}", self.ctx.database)?;
      writeln!(
        self.sink,
        "# Fields: Query id, Subject id, % identity, alignment length, mismatches, gap openings, q. start, q. end, s. start, s. end, e-value, bit score"
      )?;
      for row in self.pending.drain(..) {
        writeln!(self.sink, "{row}")?;
      }
    }
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
  fn blast8_rows_have_twelve_fields() {
    let buf = SharedBuf::default();
    let mut writer = BlastTabWriter::new(Box::new(buf.clone()), ctx(), false);
    writer.write_alignment(&test_alignment(), b"", b"").unwrap();
    writer.flush_query("q").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let fields: Vec<&str> = out.lines().next().unwrap().split('\t').collect();
    assert_eq!(fields.len(), 12);
    assert_eq!(fields[0], "q");
    assert_eq!(fields[1], "t");
    assert_eq!(fields[2], "100.00");
    assert_eq!(fields[6], "1");
    assert_eq!(fields[7], "8");
  }

  #[rstest]
  fn blast9_prefixes_comments_per_query() {
    let buf = SharedBuf::default();
    let mut writer = BlastTabWriter::new(Box::new(buf.clone()), ctx(), true);
    writer.write_alignment(&test_alignment(), b"", b"").unwrap();
    writer.flush_query("q").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert!(lines[0].starts_with("# BLASTN"));
    assert_eq!(lines[1], "# Query: q");
    assert!(lines[3].starts_with("# Fields:"));
    assert!(lines[4].starts_with("q\tt\t"));
  }

  #[rstest]
  fn minus_strand_reverses_subject_coordinates() {
    let buf = SharedBuf::default();
    let mut writer = BlastTabWriter::new(Box::new(buf.clone()), ctx(), false);
    let mut aln = test_alignment();
    aln.q_strand = Strand::Reverse;
    writer.write_alignment(&aln, b"", b"").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let fields: Vec<&str> = out.lines().next().unwrap().split('\t').collect();
    assert_eq!(fields[8], "8");
    assert_eq!(fields[9], "1");
  }
}
