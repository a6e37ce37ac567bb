//! One worker: an exclusively-owned byte range of the query file, a query
//! budget, and a private output shard. Workers share the searcher read-only
//! and never synchronize with each other while aligning.

use crate::align::aligner::Searcher;
use crate::align::params::AlignParams;
use crate::io::fasta::{FastaReader, FastaRecord};
use crate::io::fs::create_file_or_stdout;
use crate::mask::QueryMask;
use crate::output::{OutputContext, OutputFormat, make_writer};
use eyre::{Report, WrapErr};
use log::debug;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Everything a worker shares read-only with its siblings.
pub struct RunContext<'a> {
  pub searcher: &'a Searcher,
  pub params: &'a AlignParams,
  pub q_mask: Option<QueryMask>,
  pub format: OutputFormat,
  pub out_ctx: &'a OutputContext,
  pub no_head: bool,
  /// Progress dot every N queries; 0 disables.
  pub dots: usize,
}

/// Everything a worker owns exclusively, moved into its thread.
#[derive(Debug, Clone)]
pub struct WorkerTask {
  pub worker_index: usize,
  /// Shard number across the whole run: `base + worker_index`.
  pub global_index: usize,
  pub query_path: PathBuf,
  pub start_offset: u64,
  pub query_budget: usize,
  pub out_path: PathBuf,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
  pub sequences: usize,
  pub letters: u64,
}

/// Shard file for one global worker index: the final output name for shard
/// zero, `OUT.tmp.N` otherwise.
pub fn shard_path(output: &Path, global_index: usize) -> PathBuf {
  if global_index == 0 {
    output.to_owned()
  } else {
    PathBuf::from(format!("{}.tmp.{global_index}", output.display()))
  }
}

pub fn run_worker(task: &WorkerTask, ctx: &RunContext<'_>) -> Result<WorkerStats, Report> {
  debug!(
    "worker {} (shard {}): offset {}, budget {}",
    task.worker_index, task.global_index, task.start_offset, task.query_budget
  );

  let sink = create_file_or_stdout(&task.out_path)?;
  let mut writer = make_writer(ctx.format, sink, ctx.out_ctx.clone());
  if task.global_index == 0 && !ctx.no_head {
    writer.write_header()?;
  }

  let mut reader = FastaReader::from_path(&task.query_path)?;
  reader.seek(task.start_offset)?;

  let mut stats = WorkerStats::default();
  let mut record = FastaRecord::default();
  let mut dots_countdown = ctx.dots;
  for _ in 0..task.query_budget {
    reader.read(&mut record)?;
    if record.is_empty() {
      break;
    }

    if ctx.dots > 0 {
      dots_countdown -= 1;
      if dots_countdown == 0 {
        print!(".");
        std::io::stdout().flush().ok();
        dots_countdown = ctx.dots;
      }
    }

    let letters = ctx
      .searcher
      .align_query(&record, ctx.params, ctx.q_mask, writer.as_mut())
      .wrap_err_with(|| format!("When aligning query #{} '{}'", record.index, record.seq_name))?;
    stats.sequences += 1;
    stats.letters += letters as u64;
  }

  writer.write_footer()?;
  writer.finish()?;
  Ok(stats)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn shard_zero_is_the_output_itself() {
    let out = Path::new("/tmp/out.psl");
    assert_eq!(shard_path(out, 0), PathBuf::from("/tmp/out.psl"));
    assert_eq!(shard_path(out, 3), PathBuf::from("/tmp/out.psl.tmp.3"));
  }
}
