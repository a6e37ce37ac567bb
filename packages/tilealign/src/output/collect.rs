//! An in-memory writer used by tests and diagnostics: alignments are kept as
//! values instead of being formatted.

use crate::align::alignment::Alignment;
use crate::output::OutputWriter;
use eyre::Report;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// A cloneable in-memory sink, so a test can keep reading what a boxed
/// writer wrote.
#[derive(Clone, Default)]
pub struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
  fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
    self.0.lock().map_err(|_| std::io::ErrorKind::Other)?.extend_from_slice(buf);
    Ok(buf.len())
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

impl SharedBuf {
  pub fn contents(&self) -> String {
    String::from_utf8_lossy(&self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)).into_owned()
  }
}

#[derive(Default)]
pub struct CollectWriter {
  pub alignments: Vec<Alignment>,
  pub flushed: Vec<String>,
}

impl OutputWriter for CollectWriter {
  fn write_alignment(&mut self, alignment: &Alignment, _q_seq: &[u8], _t_seq: &[u8]) -> Result<(), Report> {
    self.alignments.push(alignment.clone());
    Ok(())
  }

  fn flush_query(&mut self, q_name: &str) -> Result<(), Report> {
    self.flushed.push(q_name.to_owned());
    Ok(())
  }

  fn finish(&mut self) -> Result<(), Report> {
    Ok(())
  }
}
