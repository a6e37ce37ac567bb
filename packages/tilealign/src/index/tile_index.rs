//! Immutable tile index over the target database. Built once, then shared
//! read-only by every worker thread; lookups need no synchronization.
//!
//! Layout is a flat occurrence array plus per-tile offsets (CSR) rather than
//! per-tile vectors, so the whole index is two allocations regardless of the
//! number of distinct tiles.

use crate::index::tile::TileSpec;
use crate::seq::{MaskBits, Seq};
use log::debug;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileOccurrence {
  pub seq_id: u32,
  pub offset: u32,
}

pub struct TileIndex {
  spec: TileSpec,
  step_size: usize,
  offsets: Vec<u32>,
  occurrences: Vec<TileOccurrence>,
  overused: MaskBits,
}

impl TileIndex {
  /// Builds the index from an ordered target list. Positions whose window
  /// overlaps a masked region or contains an ambiguous symbol are skipped.
  /// Tiles with more than `rep_match` occurrences (0 disables the check) and
  /// tiles listed in `ooc_set` are flagged over-represented and excluded.
  pub fn build(
    targets: &[Seq],
    masks: Option<&[Option<MaskBits>]>,
    spec: TileSpec,
    step_size: usize,
    rep_match: usize,
    ooc_set: Option<&HashSet<u32>>,
  ) -> Self {
    let table_size = spec.table_size();
    let counts = count_tiles(targets, masks, spec, step_size);

    let mut overused = MaskBits::new(table_size);
    for (value, &count) in counts.iter().enumerate() {
      let listed = ooc_set.is_some_and(|ooc| ooc.contains(&(value as u32)));
      if (rep_match > 0 && count as usize > rep_match) || listed {
        overused.set(value);
      }
    }

    let mut offsets = Vec::with_capacity(table_size + 1);
    let mut total = 0_u32;
    offsets.push(0);
    for (value, &count) in counts.iter().enumerate() {
      if !overused.get(value) {
        total += count;
      }
      offsets.push(total);
    }

    let mut cursor: Vec<u32> = offsets[..table_size].to_vec();
    let mut occurrences = vec![TileOccurrence { seq_id: 0, offset: 0 }; total as usize];
    for_each_tile(targets, masks, spec, step_size, |seq_id, pos, value| {
      if !overused.get(value as usize) {
        let slot = &mut cursor[value as usize];
        occurrences[*slot as usize] = TileOccurrence {
          seq_id,
          offset: pos as u32,
        };
        *slot += 1;
      }
    });

    debug!(
      "tile index: {} occurrences over {} tile values ({} over-represented)",
      occurrences.len(),
      table_size,
      overused.count_in(0, table_size)
    );

    Self {
      spec,
      step_size,
      offsets,
      occurrences,
      overused,
    }
  }

  #[inline]
  pub fn spec(&self) -> TileSpec {
    self.spec
  }

  #[inline]
  pub fn step_size(&self) -> usize {
    self.step_size
  }

  #[inline]
  pub fn is_overused(&self, value: u32) -> bool {
    self.overused.get(value as usize)
  }

  /// Occurrences of one tile value, sorted by `(seq_id, offset)`.
  /// Over-represented tiles return the empty slice.
  #[inline]
  pub fn lookup(&self, value: u32) -> &[TileOccurrence] {
    let value = value as usize;
    &self.occurrences[self.offsets[value] as usize..self.offsets[value + 1] as usize]
  }

  /// Appends occurrences of `value` to `out`; with `one_off` also probes
  /// every tile differing at exactly one position, in ascending value order.
  pub fn collect_hits(&self, value: u32, one_off: bool, out: &mut Vec<TileOccurrence>) {
    out.extend_from_slice(self.lookup(value));
    if one_off {
      for neighbor in self.spec.one_off_neighbors(value) {
        out.extend_from_slice(self.lookup(neighbor));
      }
    }
  }
}

/// Per-tile occurrence counts; also the substrate of ooc construction.
pub fn count_tiles(
  targets: &[Seq],
  masks: Option<&[Option<MaskBits>]>,
  spec: TileSpec,
  step_size: usize,
) -> Vec<u32> {
  let mut counts = vec![0_u32; spec.table_size()];
  for_each_tile(targets, masks, spec, step_size, |_seq_id, _pos, value| {
    counts[value as usize] += 1;
  });
  counts
}

fn for_each_tile(
  targets: &[Seq],
  masks: Option<&[Option<MaskBits>]>,
  spec: TileSpec,
  step_size: usize,
  mut f: impl FnMut(u32, usize, u32),
) {
  for (seq_id, target) in targets.iter().enumerate() {
    let mask = masks.and_then(|m| m[seq_id].as_ref());
    if target.len() < spec.tile_size {
      continue;
    }
    for pos in (0..=target.len() - spec.tile_size).step_by(step_size) {
      if mask.is_some_and(|m| m.any_in(pos, pos + spec.tile_size)) {
        continue;
      }
      if let Some(value) = spec.encode(&target.seq[pos..pos + spec.tile_size]) {
        f(seq_id as u32, pos, value);
      }
    }
  }
}
