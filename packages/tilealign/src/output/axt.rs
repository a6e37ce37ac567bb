//! axt output: numbered three-line blocks with the full gapped texts.

use crate::align::alignment::{Alignment, Strand};
use crate::output::{OutputWriter, gapped_texts};
use eyre::Report;
use std::io::Write;

pub struct AxtWriter {
  sink: Box<dyn Write + Send>,
  counter: usize,
}

impl AxtWriter {
  pub fn new(sink: Box<dyn Write + Send>) -> Self {
    Self { sink, counter: 0 }
  }
}

impl OutputWriter for AxtWriter {
  fn write_alignment(&mut self, aln: &Alignment, q_seq: &[u8], t_seq: &[u8]) -> Result<(), Report> {
    let (q_text, t_text) = gapped_texts(aln, q_seq, t_seq);

    // Minus-strand query coordinates count from the reverse-complemented
    // query start, which is exactly the search orientation of the blocks.
    let (q_start, q_end) = if aln.q_strand == Strand::Reverse {
      let start = aln.blocks.first().map_or(0, |b| aln.block_q_coord(b));
      (start + 1, start + (aln.q_end - aln.q_start))
    } else {
      (aln.q_start + 1, aln.q_end)
    };

    writeln!(
      self.sink,
      "{} {} {} {} {} {} {} {} {}",
      self.counter,
      aln.t_name,
      aln.t_start + 1,
      aln.t_end,
      aln.q_name,
      q_start,
      q_end,
      aln.q_strand.as_char(),
      aln.score,
    )?;
    self.sink.write_all(&t_text)?;
    writeln!(self.sink)?;
    self.sink.write_all(&q_text)?;
    writeln!(self.sink)?;
    writeln!(self.sink)?;
    self.counter += 1;
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
  fn writes_numbered_blocks() {
    let buf = SharedBuf::default();
    let mut writer = AxtWriter::new(Box::new(buf.clone()));
    let aln = test_alignment();
    writer.write_alignment(&aln, b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.write_alignment(&aln, b"ACGTACGT", b"ACGTACGTACGTACGT").unwrap();
    writer.finish().unwrap();

    let out = buf.contents();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "0 t 1 8 q 1 8 + 8");
    assert_eq!(lines[1], "ACGTACGT");
    assert_eq!(lines[2], "ACGTACGT");
    assert_eq!(lines[3], "");
    assert_eq!(lines[4], "1 t 1 8 q 1 8 + 8");
  }
}
