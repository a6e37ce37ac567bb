//! Output formatting. Every format implements `OutputWriter`; workers own
//! exactly one writer over their private shard, so no writer needs to be
//! thread-safe beyond `Send`.

pub mod axt;
pub mod blast;
pub mod blast_tab;
pub mod collect;
pub mod maf;
pub mod psl;
pub mod sim4;

use crate::align::alignment::Alignment;
use clap::ValueEnum;
use eyre::Report;
use serde::{Deserialize, Serialize};
use std::io::Write;

#[derive(ValueEnum, Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
  /// Tab-separated format, no sequence
  #[default]
  Psl,
  /// Tab-separated format with sequence
  Pslx,
  /// blastz-associated axt format
  Axt,
  /// multiz-associated maf format
  Maf,
  /// similar to sim4 format
  Sim4,
  /// similar to wublast format
  Wublast,
  /// similar to NCBI blast format
  Blast,
  /// NCBI blast tabular format
  Blast8,
  /// NCBI blast tabular format with comments
  Blast9,
}

/// Run-wide facts the formatters need: where the alignments came from and
/// how large the database is.
#[derive(Debug, Clone)]
pub struct OutputContext {
  pub database: String,
  pub db_seq_count: usize,
  pub db_letters: u64,
  pub q_is_prot: bool,
  pub t_is_prot: bool,
  pub min_identity: f64,
}

pub trait OutputWriter: Send {
  fn write_header(&mut self) -> Result<(), Report> {
    Ok(())
  }

  /// One passing alignment. `q_seq` and `t_seq` are the search-orientation
  /// buffers the alignment's blocks index into (peptides on translated
  /// paths).
  fn write_alignment(&mut self, alignment: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> Result<(), Report>;

  /// Called once per query after its last alignment.
  fn flush_query(&mut self, q_name: &str) -> Result<(), Report> {
    let _ = q_name;
    Ok(())
  }

  fn write_footer(&mut self) -> Result<(), Report> {
    Ok(())
  }

  /// Flushes the underlying sink; called after `write_footer`.
  fn finish(&mut self) -> Result<(), Report>;
}

pub fn make_writer(
  format: OutputFormat,
  sink: Box<dyn Write + Send>,
  ctx: OutputContext,
) -> Box<dyn OutputWriter + Send> {
  match format {
    OutputFormat::Psl => Box::new(psl::PslWriter::new(sink, ctx, false)),
    OutputFormat::Pslx => Box::new(psl::PslWriter::new(sink, ctx, true)),
    OutputFormat::Axt => Box::new(axt::AxtWriter::new(sink)),
    OutputFormat::Maf => Box::new(maf::MafWriter::new(sink)),
    OutputFormat::Sim4 => Box::new(sim4::Sim4Writer::new(sink)),
    OutputFormat::Blast8 => Box::new(blast_tab::BlastTabWriter::new(sink, ctx, false)),
    OutputFormat::Blast9 => Box::new(blast_tab::BlastTabWriter::new(sink, ctx, true)),
    OutputFormat::Blast => Box::new(blast::BlastWriter::new(sink, ctx, blast::BlastFlavor::Ncbi)),
    OutputFormat::Wublast => Box::new(blast::BlastWriter::new(sink, ctx, blast::BlastFlavor::WashU)),
  }
}

/// Reconstructs the gapped alignment texts from the block list, in sequence
/// units (residues on translated paths). Gap columns carry `-`.
pub fn gapped_texts(alignment: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> (Vec<u8>, Vec<u8>) {
  let mut q_text = Vec::new();
  let mut t_text = Vec::new();
  let mut prev_q_end = None;
  let mut prev_t_end = None;

  for block in &alignment.blocks {
    if let (Some(pq), Some(pt)) = (prev_q_end, prev_t_end) {
      for i in pq..block.q_start {
        q_text.push(q_seq[i]);
        t_text.push(b'-');
      }
      for i in pt..block.t_start {
        q_text.push(b'-');
        t_text.push(t_seq[i]);
      }
    }
    q_text.extend_from_slice(&q_seq[block.q_start..block.q_start + block.size]);
    t_text.extend_from_slice(&t_seq[block.t_start..block.t_start + block.size]);
    prev_q_end = Some(block.q_start + block.size);
    prev_t_end = Some(block.t_start + block.size);
  }
  (q_text, t_text)
}

/// Simplified Karlin-Altschul statistics shared by the blast-family
/// formatters.
pub fn blast_bits_and_evalue(score: i64, q_size: usize, db_letters: u64) -> (f64, f64) {
  const LAMBDA: f64 = 1.33;
  const K: f64 = 0.621;
  let bits = (LAMBDA * score as f64 - K.ln()) / std::f64::consts::LN_2;
  let search_space = q_size as f64 * db_letters.max(1) as f64;
  let evalue = search_space * (-bits * std::f64::consts::LN_2).exp();
  (bits, evalue)
}

pub fn format_evalue(evalue: f64) -> String {
  if evalue < 1e-180 {
    "0.0".to_owned()
  } else if evalue < 1e-2 {
    format!("{evalue:.0e}")
  } else {
    format!("{evalue:.2}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::alignment::Block;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn reconstructs_gapped_texts() {
    let mut aln = crate::align::alignment::tests::test_alignment();
    aln.blocks = vec![
      Block { q_start: 0, t_start: 0, size: 4 },
      Block { q_start: 6, t_start: 8, size: 4 },
    ];
    //             0123456789
    let q_seq = b"ACGTTTACGT";
    let t_seq = b"ACGTACGTACGT";
    let (q_text, t_text) = gapped_texts(&aln, q_seq, t_seq);
    assert_eq!(q_text, b"ACGTTT----ACGT".to_vec());
    assert_eq!(t_text, b"ACGT--ACGTACGT".to_vec());
  }

  #[rstest]
  fn evalue_shrinks_with_score() {
    let (bits_lo, e_lo) = blast_bits_and_evalue(20, 100, 1_000_000);
    let (bits_hi, e_hi) = blast_bits_and_evalue(60, 100, 1_000_000);
    assert!(bits_hi > bits_lo);
    assert!(e_hi < e_lo);
  }
}
