//! Pairwise blast-style reports, in both the NCBI and the WashU flavor. Hits
//! are buffered per query so the `Query=` stanza can precede them.

use crate::align::alignment::{Alignment, Strand};
use crate::output::{OutputContext, OutputWriter, blast_bits_and_evalue, format_evalue, gapped_texts};
use eyre::Report;
use std::io::Write;

const LINE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlastFlavor {
  Ncbi,
  WashU,
}

struct PendingHit {
  t_name: String,
  t_size: usize,
  score: i64,
  identity: f64,
  aligned: usize,
  q_strand: Strand,
  q_size: usize,
  q_coords: (usize, usize),
  t_coords: (usize, usize),
  q_text: Vec<u8>,
  t_text: Vec<u8>,
}

pub struct BlastWriter {
  sink: Box<dyn Write + Send>,
  ctx: OutputContext,
  flavor: BlastFlavor,
  pending: Vec<PendingHit>,
}

impl BlastWriter {
  pub fn new(sink: Box<dyn Write + Send>, ctx: OutputContext, flavor: BlastFlavor) -> Self {
    Self {
      sink,
      ctx,
      flavor,
      pending: Vec::new(),
    }
  }

  fn program(&self) -> &'static str {
    if self.ctx.q_is_prot && !self.ctx.t_is_prot {
      "TBLASTN"
    } else if self.ctx.q_is_prot {
      "BLASTP"
    } else {
      "BLASTN"
    }
  }

  fn write_hit(&mut self, hit: &PendingHit) -> Result<(), Report> {
    let (bits, evalue) = blast_bits_and_evalue(hit.score, hit.q_size, self.ctx.db_letters);
    writeln!(self.sink, ">{}", hit.t_name)?;
    writeln!(self.sink, "          Length = {}", hit.t_size)?;
    writeln!(self.sink)?;
    writeln!(
      self.sink,
      " Score = {bits:.1} bits ({}), Expect = {}",
      hit.score,
      format_evalue(evalue)
    )?;
    let identities = (hit.identity / 100.0 * hit.aligned as f64).round() as usize;
    writeln!(
      self.sink,
      " Identities = {identities}/{} ({:.0}%)",
      hit.aligned, hit.identity
    )?;
    if !self.ctx.q_is_prot {
      let strand = match hit.q_strand {
        Strand::Forward => "Plus / Plus",
        Strand::Reverse => "Minus / Plus",
      };
      writeln!(self.sink, " Strand = {strand}")?;
    }
    writeln!(self.sink)?;

    let (mut q_pos, mut t_pos) = (hit.q_coords.0 + 1, hit.t_coords.0 + 1);
    for chunk_start in (0..hit.q_text.len()).step_by(LINE_WIDTH) {
      let chunk_end = (chunk_start + LINE_WIDTH).min(hit.q_text.len());
      let q_chunk = &hit.q_text[chunk_start..chunk_end];
      let t_chunk = &hit.t_text[chunk_start..chunk_end];

      let q_bases = q_chunk.iter().filter(|&&c| c != b'-').count();
      let t_bases = t_chunk.iter().filter(|&&c| c != b'-').count();
      let bars: String = q_chunk
        .iter()
        .zip(t_chunk)
        .map(|(q, t)| if q == t && *q != b'-' { '|' } else { ' ' })
        .collect();

      writeln!(
        self.sink,
        "Query: {:<9} {} {}",
        q_pos,
        String::from_utf8_lossy(q_chunk),
        q_pos + q_bases.saturating_sub(1)
      )?;
      writeln!(self.sink, "{:16}{bars}", "")?;
      writeln!(
        self.sink,
        "Sbjct: {:<9} {} {}",
        t_pos,
        String::from_utf8_lossy(t_chunk),
        t_pos + t_bases.saturating_sub(1)
      )?;
      writeln!(self.sink)?;
      q_pos += q_bases;
      t_pos += t_bases;
    }
    Ok(())
  }
}

impl OutputWriter for BlastWriter {
  fn write_header(&mut self) -> Result<(), Report> {
    let program = self.program();
    match self.flavor {
      BlastFlavor::Ncbi => writeln!(self.sink, "{program} 2.2.11 [tilealign]")?,
      BlastFlavor::WashU => writeln!(self.sink, "{program} 2.0MP-WashU [tilealign]")?,
    }
    writeln!(self.sink)?;
    writeln!(self.sink, "Database: {}", self.ctx.database)?;
    writeln!(
      self.sink,
      "           {} sequences; {} total letters",
      self.ctx.db_seq_count, self.ctx.db_letters
    )?;
    writeln!(self.sink)?;
    Ok(())
  }

  fn write_alignment(&mut self, aln: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> Result<(), Report> {
    let (q_text, t_text) = gapped_texts(aln, q_seq, t_seq);
    self.pending.push(PendingHit {
      t_name: aln.t_name.clone(),
      t_size: aln.t_size,
      score: aln.score,
      identity: aln.identity,
      aligned: aln.aligned_span(),
      q_strand: aln.q_strand,
      q_size: aln.q_size,
      q_coords: (aln.q_start, aln.q_end),
      t_coords: (aln.t_start, aln.t_end),
      q_text,
      t_text,
    });
    Ok(())
  }

  fn flush_query(&mut self, q_name: &str) -> Result<(), Report> {
    let hits = std::mem::take(&mut self.pending);
    if hits.is_empty() {
      return Ok(());
    }
    writeln!(self.sink, "Query= {q_name}")?;
    writeln!(self.sink, "         ({} letters)", hits[0].q_size)?;
    writeln!(self.sink)?;
    for hit in &hits {
      self.write_hit(hit)?;
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
  fn writes_query_stanza_and_alignment_rows() {
    let buf = SharedBuf::default();
    let mut writer = BlastWriter::new(Box::new(buf.clone()), ctx(), BlastFlavor::Ncbi);
    writer.write_header().unwrap();
    writer.write_alignment(&test_alignment(), b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.flush_query("q").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    assert!(out.starts_with("BLASTN 2.2.11 [tilealign]"));
    assert!(out.contains("Query= q"));
    assert!(out.contains(">t"));
    assert!(out.contains("Identities = 8/8 (100%)"));
    assert!(out.contains("Query: 1"));
    assert!(out.contains("||||||||"));
  }

  #[rstest]
  fn washu_flavor_changes_banner() {
    let buf = SharedBuf::default();
    let mut writer = BlastWriter::new(Box::new(buf.clone()), ctx(), BlastFlavor::WashU);
    writer.write_header().unwrap();
    writer.finish().unwrap();
    assert!(buf.contents().starts_with("BLASTN 2.0MP-WashU [tilealign]"));
  }

  #[rstest]
  fn queries_without_hits_are_silent() {
    let buf = SharedBuf::default();
    let mut writer = BlastWriter::new(Box::new(buf.clone()), ctx(), BlastFlavor::Ncbi);
    writer.flush_query("empty").unwrap();
    writer.finish().unwrap();
    assert_eq!(buf.contents(), "");
  }
}
