//! Clumping: seeds against one target sequence are grouped by diagonal;
//! runs of seeds whose diagonals drift by at most `max_gap` between
//! neighbors form a clump. Clumps with fewer than `min_match` seeds are
//! noise and dropped.

use crate::align::seed::Seed;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clump {
  pub t_id: u32,
  /// Sorted by query position.
  pub seeds: Vec<Seed>,
  pub q_min: u32,
  pub q_max: u32,
  pub t_min: u32,
  pub t_max: u32,
}

impl Clump {
  fn from_seeds(t_id: u32, mut seeds: Vec<Seed>, tile_size: usize) -> Self {
    seeds.sort_unstable_by_key(|s| (s.q_pos, s.t_pos));
    seeds.dedup();
    let q_min = seeds.iter().map(|s| s.q_pos).min().unwrap_or(0);
    let q_max = seeds.iter().map(|s| s.q_pos).max().unwrap_or(0) + tile_size as u32;
    let t_min = seeds.iter().map(|s| s.t_pos).min().unwrap_or(0);
    let t_max = seeds.iter().map(|s| s.t_pos).max().unwrap_or(0) + tile_size as u32;
    Self {
      t_id,
      seeds,
      q_min,
      q_max,
      t_min,
      t_max,
    }
  }
}

pub fn clump_seeds(t_id: u32, seeds: &[Seed], max_gap: usize, min_match: usize, tile_size: usize) -> Vec<Clump> {
  let mut ordered: Vec<Seed> = seeds.to_vec();
  ordered.sort_unstable_by_key(|s| (diagonal(s), s.q_pos));

  let mut clumps = Vec::new();
  let mut current: Vec<Seed> = Vec::new();
  for &seed in &ordered {
    if let Some(&last) = current.last() {
      if diagonal(&seed) - diagonal(&last) > max_gap as i64 {
        flush(&mut clumps, &mut current, t_id, min_match, tile_size);
      }
    }
    current.push(seed);
  }
  flush(&mut clumps, &mut current, t_id, min_match, tile_size);
  clumps
}

fn flush(clumps: &mut Vec<Clump>, current: &mut Vec<Seed>, t_id: u32, min_match: usize, tile_size: usize) {
  if current.len() >= min_match {
    clumps.push(Clump::from_seeds(t_id, std::mem::take(current), tile_size));
  } else {
    current.clear();
  }
}

#[inline]
fn diagonal(seed: &Seed) -> i64 {
  i64::from(seed.t_pos) - i64::from(seed.q_pos)
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn separates_distant_diagonals() {
    // Same query window hitting two target copies 8 apart.
    let seeds = vec![Seed { q_pos: 0, t_pos: 0 }, Seed { q_pos: 0, t_pos: 8 }];
    let clumps = clump_seeds(0, &seeds, 2, 1, 8);
    assert_eq!(clumps.len(), 2);
    assert_eq!(clumps[0].t_min, 0);
    assert_eq!(clumps[1].t_min, 8);
  }

  #[rstest]
  fn merges_nearby_diagonals() {
    // Diagonals 0 and 2 with max_gap 2 belong together.
    let seeds = vec![
      Seed { q_pos: 0, t_pos: 0 },
      Seed { q_pos: 8, t_pos: 10 },
      Seed { q_pos: 16, t_pos: 18 },
    ];
    let clumps = clump_seeds(0, &seeds, 2, 2, 8);
    assert_eq!(clumps.len(), 1);
    assert_eq!(clumps[0].seeds.len(), 3);
    assert_eq!(clumps[0].q_min, 0);
    assert_eq!(clumps[0].q_max, 24);
    assert_eq!(clumps[0].t_max, 26);
  }

  #[rstest]
  fn drops_underpopulated_clumps() {
    let seeds = vec![Seed { q_pos: 0, t_pos: 0 }];
    assert!(clump_seeds(0, &seeds, 2, 2, 8).is_empty());
  }

  #[rstest]
  fn deduplicates_seeds() {
    let seeds = vec![Seed { q_pos: 0, t_pos: 0 }, Seed { q_pos: 0, t_pos: 0 }];
    let clumps = clump_seeds(0, &seeds, 2, 1, 8);
    assert_eq!(clumps[0].seeds.len(), 1);
  }
}
