//! sim4-style output: a block coordinate summary per alignment.

use crate::align::alignment::{Alignment, Strand};
use crate::output::OutputWriter;
use eyre::Report;
use std::io::Write;

pub struct Sim4Writer {
  sink: Box<dyn Write + Send>,
}

impl Sim4Writer {
  pub fn new(sink: Box<dyn Write + Send>) -> Self {
    Self { sink }
  }
}

impl OutputWriter for Sim4Writer {
  fn write_alignment(&mut self, aln: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> Result<(), Report> {
    writeln!(self.sink, "seq1 = {}, {} bp", aln.q_name, aln.q_size)?;
    writeln!(self.sink, "seq2 = {}, {} bp", aln.t_name, aln.t_size)?;
    writeln!(self.sink)?;
    if aln.q_strand == Strand::Reverse {
      writeln!(self.sink, "(complement)")?;
    }
    for block in &aln.blocks {
      let matches = (0..block.size)
        .filter(|&i| q_seq[block.q_start + i] == t_seq[block.t_start + i])
        .count();
      let identity = if block.size == 0 {
        0.0
      } else {
        100.0 * matches as f64 / block.size as f64
      };
      let q_start = aln.block_q_coord(block);
      let t_start = aln.block_t_coord(block);
      writeln!(
        self.sink,
        "{}-{} ({}-{}) {:.0}% {}",
        q_start + 1,
        q_start + aln.block_q_span(block),
        t_start + 1,
        t_start + aln.block_t_span(block),
        identity,
        if aln.q_strand == Strand::Reverse { "<-" } else { "->" },
      )?;
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
  use crate::output::collect::SharedBuf;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn writes_block_summary() {
    let buf = SharedBuf::default();
    let mut writer = Sim4Writer::new(Box::new(buf.clone()));
    writer.write_alignment(&test_alignment(), b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "seq1 = q, 8 bp");
    assert_eq!(lines[1], "seq2 = t, 16 bp");
    assert_eq!(lines[3], "1-8 (1-8) 100% ->");
  }
}
