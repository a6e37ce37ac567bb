//! Query partitioning: the query file is split into contiguous equal-count
//! shards, one per worker across the whole run, each identified by the byte
//! offset of its first record.

use crate::io::fasta::scan_record_offsets;
use eyre::Report;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPartition {
  pub total_queries: usize,
  pub per_worker: usize,
  /// One starting byte offset per worker. Workers past the end of the file
  /// receive the file length and read nothing.
  pub offsets: Vec<u64>,
}

pub fn partition_queries(query_path: impl AsRef<Path>, num_workers: usize) -> Result<QueryPartition, Report> {
  let (record_offsets, file_len) = scan_record_offsets(query_path)?;
  let total_queries = record_offsets.len();
  let num_workers = num_workers.max(1);
  let per_worker = total_queries.div_ceil(num_workers).max(1);

  let offsets = (0..num_workers)
    .map(|w| record_offsets.get(w * per_worker).copied().unwrap_or(file_len))
    .collect();

  Ok(QueryPartition {
    total_queries,
    per_worker,
    offsets,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use itertools::Itertools;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::io::Write;
  use std::path::PathBuf;

  fn temp_fasta(name: &str, records: usize) -> PathBuf {
    let path = std::env::temp_dir().join(format!("tilealign-partition-{}-{name}.fa", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    for i in 0..records {
      writeln!(file, ">q{i}").unwrap();
      writeln!(file, "ACGTACGT").unwrap();
    }
    path
  }

  #[rstest]
  fn splits_counts_evenly() {
    let path = temp_fasta("even", 6);
    let partition = partition_queries(&path, 3).unwrap();
    assert_eq!(partition.total_queries, 6);
    assert_eq!(partition.per_worker, 2);
    assert_eq!(partition.offsets.len(), 3);
    assert!(partition.offsets.iter().tuple_windows().all(|(a, b)| a < b));
    std::fs::remove_file(path).unwrap();
  }

  #[rstest]
  fn offsets_coincide_with_record_boundaries() {
    let path = temp_fasta("bounds", 5);
    let partition = partition_queries(&path, 2).unwrap();
    let (record_offsets, _len) = scan_record_offsets(&path).unwrap();
    assert_eq!(partition.per_worker, 3);
    assert_eq!(partition.offsets, vec![record_offsets[0], record_offsets[3]]);
    std::fs::remove_file(path).unwrap();
  }

  #[rstest]
  fn worker_counts_sum_to_total() {
    let path = temp_fasta("sum", 7);
    let partition = partition_queries(&path, 3).unwrap();
    // per = 3: workers read 3, 3, 1.
    let counts: Vec<usize> = (0..3)
      .map(|w| {
        partition
          .total_queries
          .saturating_sub(w * partition.per_worker)
          .min(partition.per_worker)
      })
      .collect();
    assert_eq!(counts.iter().sum::<usize>(), partition.total_queries);
    std::fs::remove_file(path).unwrap();
  }

  #[rstest]
  fn more_workers_than_queries_read_nothing_past_eof() {
    let path = temp_fasta("eof", 2);
    let partition = partition_queries(&path, 4).unwrap();
    assert_eq!(partition.per_worker, 1);
    let (record_offsets, len) = scan_record_offsets(&path).unwrap();
    assert_eq!(partition.offsets[0], record_offsets[0]);
    assert_eq!(partition.offsets[1], record_offsets[1]);
    assert_eq!(partition.offsets[2], len);
    assert_eq!(partition.offsets[3], len);
    std::fs::remove_file(path).unwrap();
  }
}
