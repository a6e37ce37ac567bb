//! Cluster coordination. Rank 0 groups processes by host, elects one leader
//! per host (the lowest rank there), dismisses everyone else, distributes
//! the query partition to the leaders, and finally concatenates the shard
//! files the leaders' workers produced.

use crate::cluster::transport::{Assignment, Message, ShardPlan, Transport};
use crate::make_error;
use crate::run::partition::QueryPartition;
use eyre::{Report, WrapErr};
use log::{debug, warn};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
  /// Run `threads` workers writing shards `base..base + threads`.
  Leader { threads: usize, base: usize },
  /// Another process on this host runs the work; exit 0.
  Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderInfo {
  pub rank: usize,
  pub threads: usize,
  pub base: usize,
}

/// Rank 0's view of the whole run; the source of truth for partitioning and
/// the final merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLayout {
  pub leaders: Vec<LeaderInfo>,
  pub total_workers: usize,
}

/// Runs the election protocol. Rank 0 additionally returns the layout it
/// computed; every other rank returns only its own role. In a
/// single-process world the one process leads `standalone_threads` workers.
pub fn negotiate_roles(
  transport: &mut dyn Transport,
  host: &str,
  standalone_threads: usize,
) -> Result<(Role, Option<ClusterLayout>), Report> {
  let world = transport.world_size();
  if world == 1 {
    let threads = standalone_threads.max(1);
    let layout = ClusterLayout {
      leaders: vec![LeaderInfo {
        rank: 0,
        threads,
        base: 0,
      }],
      total_workers: threads,
    };
    return Ok((Role::Leader { threads, base: 0 }, Some(layout)));
  }

  if transport.rank() != 0 {
    transport.send(0, &Message::Announce { host: host.to_owned() })?;
    let role = match transport.recv(0)? {
      Message::Assignment(Assignment::Lead { threads, base }) => Role::Leader { threads, base },
      Message::Assignment(Assignment::Dismiss) => Role::Dismissed,
      other => return make_error!("Protocol error: expected an assignment, got {other:?}"),
    };
    return Ok((role, None));
  }

  // Rank 0: one announcement per peer, grouped by host in first-seen order
  // with our own host first. The lowest rank in each group leads it.
  let mut groups: Vec<(String, Vec<usize>)> = vec![(host.to_owned(), vec![0])];
  for rank in 1..world {
    let Message::Announce { host: peer_host } = transport.recv(rank)? else {
      return make_error!("Protocol error: expected an announcement from rank {rank}");
    };
    match groups.iter_mut().find(|(name, _)| *name == peer_host) {
      Some((_, ranks)) => ranks.push(rank),
      None => groups.push((peer_host, vec![rank])),
    }
  }

  let mut leaders = Vec::with_capacity(groups.len());
  let mut base = 0;
  for (name, ranks) in &groups {
    let leader = ranks[0];
    debug!("host {name}: ranks {ranks:?}, leader {leader}, base {base}");
    leaders.push(LeaderInfo {
      rank: leader,
      threads: ranks.len(),
      base,
    });
    for &rank in ranks {
      if rank == 0 {
        continue;
      }
      let assignment = if rank == leader {
        Assignment::Lead {
          threads: ranks.len(),
          base,
        }
      } else {
        Assignment::Dismiss
      };
      transport.send(rank, &Message::Assignment(assignment))?;
    }
    base += ranks.len();
  }

  let own = &leaders[0];
  let role = Role::Leader {
    threads: own.threads,
    base: own.base,
  };
  Ok((
    role,
    Some(ClusterLayout {
      leaders,
      total_workers: base,
    }),
  ))
}

/// Rank 0 sends every remote leader its slice of the partition and returns
/// its own.
pub fn distribute_shard_plans(
  transport: &mut dyn Transport,
  layout: &ClusterLayout,
  partition: &QueryPartition,
) -> Result<ShardPlan, Report> {
  if partition.offsets.len() != layout.total_workers {
    return make_error!(
      "internal: partition has {} offsets for {} workers",
      partition.offsets.len(),
      layout.total_workers
    );
  }

  let mut own_plan = None;
  for leader in &layout.leaders {
    let plan = ShardPlan {
      per_worker: partition.per_worker,
      offsets: partition.offsets[leader.base..leader.base + leader.threads].to_vec(),
    };
    if leader.rank == 0 {
      own_plan = Some(plan);
    } else {
      transport.send(leader.rank, &Message::ShardPlan(plan))?;
    }
  }
  own_plan.ok_or_else(|| eyre::eyre!("internal: rank 0 is not among the leaders"))
}

/// A non-root leader's side of the partition exchange.
pub fn receive_shard_plan(transport: &mut dyn Transport) -> Result<ShardPlan, Report> {
  match transport.recv(0)? {
    Message::ShardPlan(plan) => Ok(plan),
    other => make_error!("Protocol error: expected a shard plan, got {other:?}"),
  }
}

fn numbered_shard(output: &Path, index: usize) -> PathBuf {
  PathBuf::from(format!("{}.{index}", output.display()))
}

/// After its pool joins, a leader renames its temporary shards to their
/// merge names. Shard 0 already carries the final output name.
pub fn rename_shards(output: &Path, base: usize, threads: usize) -> Result<(), Report> {
  for i in 0..threads {
    let global = base + i;
    if global == 0 {
      continue;
    }
    let from = crate::run::worker::shard_path(output, global);
    let to = numbered_shard(output, global);
    std::fs::rename(&from, &to).wrap_err_with(|| format!("When renaming shard {from:#?} to {to:#?}"))?;
  }
  Ok(())
}

/// Rank 0 appends shards `1..total_workers` to the output in order and
/// deletes each one. A shard that has not appeared yet (cross-host
/// filesystem propagation, or a slow host) is polled; after a minute of
/// waiting per shard the wait is escalated to a warning, but never abandoned
/// because a missing shard means a worker is still running or its process
/// died.
pub fn merge_shards(output: &Path, total_workers: usize, poll: Duration) -> Result<(), Report> {
  let out = OpenOptions::new()
    .append(true)
    .open(output)
    .wrap_err_with(|| format!("When opening output {output:#?} for the merge"))?;
  let mut out = BufWriter::new(out);

  for index in 1..total_workers {
    let shard = numbered_shard(output, index);
    let mut waited = Duration::ZERO;
    let file = loop {
      match File::open(&shard) {
        Ok(file) => break file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
          std::thread::sleep(poll);
          waited += poll;
          if !poll.is_zero() && waited.as_secs() > 0 && waited.as_secs() % 60 == 0 {
            warn!("Still waiting for shard {shard:#?} after {}s", waited.as_secs());
          }
        }
        Err(err) => return Err(err).wrap_err_with(|| format!("When opening shard {shard:#?}")),
      }
    };
    std::io::copy(&mut BufReader::new(file), &mut out).wrap_err_with(|| format!("When appending shard {shard:#?}"))?;
    std::fs::remove_file(&shard).wrap_err_with(|| format!("When removing merged shard {shard:#?}"))?;
  }

  use std::io::Write;
  out.flush()?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cluster::transport::channel_world;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use std::io::Write;

  fn run_world(hosts: &[&str]) -> Vec<(Role, Option<ClusterLayout>)> {
    let transports = channel_world(hosts.len());
    std::thread::scope(|s| {
      let handles: Vec<_> = transports
        .into_iter()
        .zip(hosts)
        .map(|(mut transport, host)| {
          s.spawn(move || negotiate_roles(&mut transport, host, 1).unwrap())
        })
        .collect();
      handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
  }

  #[rstest]
  fn elects_one_leader_per_host() {
    let results = run_world(&["alpha", "beta", "alpha", "beta"]);

    assert_eq!(results[0].0, Role::Leader { threads: 2, base: 0 });
    assert_eq!(results[1].0, Role::Leader { threads: 2, base: 2 });
    assert_eq!(results[2].0, Role::Dismissed);
    assert_eq!(results[3].0, Role::Dismissed);

    let layout = results[0].1.as_ref().unwrap();
    assert_eq!(layout.total_workers, 4);
    assert_eq!(
      layout.leaders,
      vec![
        LeaderInfo { rank: 0, threads: 2, base: 0 },
        LeaderInfo { rank: 1, threads: 2, base: 2 },
      ]
    );
    assert!(results[1].1.is_none());
  }

  #[rstest]
  fn single_process_world_leads_itself() {
    let mut transport = crate::cluster::transport::LocalTransport;
    let (role, layout) = negotiate_roles(&mut transport, "solo", 4).unwrap();
    assert_eq!(role, Role::Leader { threads: 4, base: 0 });
    assert_eq!(layout.unwrap().total_workers, 4);
  }

  #[rstest]
  fn distributes_offset_slices_to_leaders() {
    let mut transports = channel_world(3);
    let mut t2 = transports.pop().unwrap();
    let mut t1 = transports.pop().unwrap();
    let mut t0 = transports.pop().unwrap();

    // Hosts: rank 0 alone; ranks 1 and 2 share a host, rank 1 leads.
    let handle = std::thread::spawn(move || {
      let (role1, _) = negotiate_roles(&mut t1, "beta", 1).unwrap();
      let plan = receive_shard_plan(&mut t1).unwrap();
      (role1, plan)
    });
    let dismissed = std::thread::spawn(move || negotiate_roles(&mut t2, "beta", 1).unwrap().0);

    let (role0, layout) = negotiate_roles(&mut t0, "alpha", 1).unwrap();
    let layout = layout.unwrap();
    let partition = QueryPartition {
      total_queries: 9,
      per_worker: 3,
      offsets: vec![0, 100, 200],
    };
    let own = distribute_shard_plans(&mut t0, &layout, &partition).unwrap();

    assert_eq!(role0, Role::Leader { threads: 1, base: 0 });
    assert_eq!(own.offsets, vec![0]);

    let (role1, plan1) = handle.join().unwrap();
    assert_eq!(role1, Role::Leader { threads: 2, base: 1 });
    assert_eq!(plan1.per_worker, 3);
    assert_eq!(plan1.offsets, vec![100, 200]);
    assert_eq!(dismissed.join().unwrap(), Role::Dismissed);
  }

  #[rstest]
  fn merge_concatenates_byte_exact_and_cleans_up() {
    let dir = std::env::temp_dir();
    let output = dir.join(format!("tilealign-merge-{}.psl", std::process::id()));
    std::fs::File::create(&output).unwrap().write_all(b"shard0\n").unwrap();
    for i in 1..3 {
      std::fs::File::create(numbered_shard(&output, i))
        .unwrap()
        .write_all(format!("shard{i}\n").as_bytes())
        .unwrap();
    }

    merge_shards(&output, 3, Duration::ZERO).unwrap();

    let merged = std::fs::read_to_string(&output).unwrap();
    assert_eq!(merged, "shard0\nshard1\nshard2\n");
    assert!(!numbered_shard(&output, 1).exists());
    assert!(!numbered_shard(&output, 2).exists());
    std::fs::remove_file(&output).unwrap();
  }

  #[rstest]
  fn rename_prepares_merge_names() {
    let dir = std::env::temp_dir();
    let output = dir.join(format!("tilealign-rename-{}.psl", std::process::id()));
    std::fs::File::create(&output).unwrap().write_all(b"0").unwrap();
    let tmp = crate::run::worker::shard_path(&output, 1);
    std::fs::File::create(&tmp).unwrap().write_all(b"1").unwrap();

    rename_shards(&output, 0, 2).unwrap();

    assert!(output.exists());
    assert!(!tmp.exists());
    assert!(numbered_shard(&output, 1).exists());
    std::fs::remove_file(&output).unwrap();
    std::fs::remove_file(numbered_shard(&output, 1)).unwrap();
  }
}
