//! Seeding: every query window of `tile_size` symbols (step 1) is looked up
//! in the tile index. Windows overlapping a masked query region are skipped.

use crate::index::tile_index::TileIndex;
use crate::seq::MaskBits;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
  pub q_pos: u32,
  pub t_pos: u32,
}

/// Seeds grouped by target sequence, in deterministic target order.
pub fn find_seeds(
  query: &[u8],
  q_mask: Option<&MaskBits>,
  index: &TileIndex,
  one_off: bool,
) -> BTreeMap<u32, Vec<Seed>> {
  let tile_size = index.spec().tile_size;
  let mut seeds: BTreeMap<u32, Vec<Seed>> = BTreeMap::new();
  if query.len() < tile_size {
    return seeds;
  }

  let mut hits = Vec::new();
  for q_pos in 0..=query.len() - tile_size {
    if q_mask.is_some_and(|m| m.any_in(q_pos, q_pos + tile_size)) {
      continue;
    }
    let Some(value) = index.spec().encode(&query[q_pos..q_pos + tile_size]) else {
      continue;
    };
    hits.clear();
    index.collect_hits(value, one_off, &mut hits);
    for hit in &hits {
      seeds.entry(hit.seq_id).or_default().push(Seed {
        q_pos: q_pos as u32,
        t_pos: hit.offset,
      });
    }
  }
  seeds
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::index::tile::TileSpec;
  use crate::seq::Seq;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn index_of(seq: &[u8], step: usize) -> TileIndex {
    let targets = vec![Seq::new("t0", seq.to_vec())];
    TileIndex::build(&targets, None, TileSpec::new(8, false).unwrap(), step, 0, None)
  }

  #[rstest]
  fn finds_every_occurrence() {
    let index = index_of(b"ACGTACGTACGTACGT", 8);
    let seeds = find_seeds(b"ACGTACGT", None, &index, false);
    assert_eq!(
      seeds[&0],
      vec![Seed { q_pos: 0, t_pos: 0 }, Seed { q_pos: 0, t_pos: 8 }]
    );
  }

  #[rstest]
  fn short_query_yields_nothing() {
    let index = index_of(b"ACGTACGTACGTACGT", 8);
    assert!(find_seeds(b"ACGT", None, &index, false).is_empty());
  }

  #[rstest]
  fn all_ambiguous_query_yields_nothing() {
    let index = index_of(b"ACGTACGTACGTACGT", 8);
    assert!(find_seeds(b"NNNNNNNNNN", None, &index, false).is_empty());
  }

  #[rstest]
  fn masked_windows_do_not_seed() {
    let index = index_of(b"ACGTACGTACGTACGT", 8);
    let mut mask = MaskBits::new(8);
    mask.set(3);
    let seeds = find_seeds(b"ACGTACGT", Some(&mask), &index, false);
    assert!(seeds.is_empty());
  }
}
