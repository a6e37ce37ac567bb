//! maf output: one `a` paragraph per alignment with two `s` lines.

use crate::align::alignment::{Alignment, Strand};
use crate::output::{OutputWriter, gapped_texts};
use eyre::Report;
use std::io::Write;

pub struct MafWriter {
  sink: Box<dyn Write + Send>,
}

impl MafWriter {
  pub fn new(sink: Box<dyn Write + Send>) -> Self {
    Self { sink }
  }
}

impl OutputWriter for MafWriter {
  fn write_header(&mut self) -> Result<(), Report> {
    writeln!(self.sink, "##maf version=1 scoring=tilealign")?;
    writeln!(self.sink)?;
    Ok(())
  }

  fn write_alignment(&mut self, aln: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> Result<(), Report> {
    let (q_text, t_text) = gapped_texts(aln, q_seq, t_seq);

    writeln!(self.sink, "a score={}", aln.score)?;
    writeln!(
      self.sink,
      "s {} {} {} {} {} {}",
      aln.t_name,
      aln.t_start,
      aln.t_end - aln.t_start,
      aln.t_strand.as_char(),
      aln.t_size,
      String::from_utf8_lossy(&t_text),
    )?;
    // maf start coordinates are strand-relative, matching the block search
    // orientation on the minus strand.
    let q_start = if aln.q_strand == Strand::Reverse {
      aln.blocks.first().map_or(0, |b| aln.block_q_coord(b))
    } else {
      aln.q_start
    };
    writeln!(
      self.sink,
      "s {} {} {} {} {} {}",
      aln.q_name,
      q_start,
      aln.q_end - aln.q_start,
      aln.q_strand.as_char(),
      aln.q_size,
      String::from_utf8_lossy(&q_text),
    )?;
    writeln!(self.sink)?;
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Report> {
    self.sink.flush()?;
    Ok(())
  }
}
