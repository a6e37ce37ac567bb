//! The per-process pool: one scoped thread per worker task, joined before
//! returning. A failing worker fails the whole process.

use crate::make_internal_error;
use crate::run::worker::{RunContext, WorkerStats, WorkerTask, run_worker};
use eyre::Report;
use log::info;

pub fn run_pool(tasks: &[WorkerTask], ctx: &RunContext<'_>) -> Result<Vec<WorkerStats>, Report> {
  let stats: Vec<WorkerStats> = std::thread::scope(|s| {
    let handles: Vec<_> = tasks.iter().map(|task| s.spawn(move || run_worker(task, ctx))).collect();
    handles
      .into_iter()
      .map(|handle| match handle.join() {
        Ok(result) => result,
        Err(_) => make_internal_error!("worker thread panicked"),
      })
      .collect::<Result<Vec<_>, Report>>()
  })?;

  let total: u64 = stats.iter().map(|s| s.letters).sum();
  let sequences: usize = stats.iter().map(|s| s.sequences).sum();
  info!("Searched {total} letters in {sequences} sequences across {} workers", tasks.len());
  Ok(stats)
}
