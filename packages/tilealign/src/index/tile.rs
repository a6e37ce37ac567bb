//! Tile (k-mer) packing. A tile of `tile_size` symbols packs into a base-4
//! (DNA) or base-20 (protein) integer; the packed value indexes the tile
//! table directly.

use crate::alphabet::aa::{AA_ALPHA, aa_val};
use crate::alphabet::nuc::{NUC_ALPHA, nuc_val};
use crate::make_error;
use eyre::Report;

pub const DNA_TILE_SIZE_MIN: usize = 8;
pub const DNA_TILE_SIZE_MAX: usize = 12;
pub const PROT_TILE_SIZE_MIN: usize = 3;
pub const PROT_TILE_SIZE_MAX: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
  pub tile_size: usize,
  pub is_protein: bool,
}

impl TileSpec {
  pub fn new(tile_size: usize, is_protein: bool) -> Result<Self, Report> {
    let (min, max) = if is_protein {
      (PROT_TILE_SIZE_MIN, PROT_TILE_SIZE_MAX)
    } else {
      (DNA_TILE_SIZE_MIN, DNA_TILE_SIZE_MAX)
    };
    if !(min..=max).contains(&tile_size) {
      let kind = if is_protein { "protein" } else { "DNA" };
      return make_error!("tileSize for {kind} searches must be between {min} and {max}, got {tile_size}");
    }
    Ok(Self { tile_size, is_protein })
  }

  #[inline]
  pub fn alpha(&self) -> u32 {
    if self.is_protein { AA_ALPHA } else { NUC_ALPHA }
  }

  /// Number of distinct tile values, `alpha ^ tile_size`.
  pub fn table_size(&self) -> usize {
    (u64::from(self.alpha())).pow(self.tile_size as u32) as usize
  }

  #[inline]
  fn symbol_val(&self, c: u8) -> Option<u32> {
    if self.is_protein { aa_val(c) } else { nuc_val(c) }
  }

  /// Packs one window of `tile_size` symbols; `None` when any symbol is
  /// ambiguous.
  pub fn encode(&self, window: &[u8]) -> Option<u32> {
    debug_assert_eq!(window.len(), self.tile_size);
    let mut value = 0_u32;
    for &c in window {
      value = value * self.alpha() + self.symbol_val(c)?;
    }
    Some(value)
  }

  /// Every tile value differing from `value` at exactly one position, in
  /// ascending value order so one-off lookups stay deterministic.
  pub fn one_off_neighbors(&self, value: u32) -> Vec<u32> {
    let alpha = self.alpha();
    let mut neighbors = Vec::with_capacity(self.tile_size * (alpha as usize - 1));
    let mut pow = 1_u32;
    for _pos in 0..self.tile_size {
      let digit = value / pow % alpha;
      let base = value - digit * pow;
      for alt in 0..alpha {
        if alt != digit {
          neighbors.push(base + alt * pow);
        }
      }
      pow *= alpha;
    }
    neighbors.sort_unstable();
    neighbors
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use itertools::Itertools;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn rejects_out_of_range_tile_sizes() {
    assert!(TileSpec::new(7, false).is_err());
    assert!(TileSpec::new(13, false).is_err());
    assert!(TileSpec::new(2, true).is_err());
    assert!(TileSpec::new(11, false).is_ok());
    assert!(TileSpec::new(5, true).is_ok());
  }

  #[rstest]
  fn encodes_dna_tiles() {
    let spec = TileSpec::new(8, false).unwrap();
    assert_eq!(spec.encode(b"AAAAAAAA"), Some(0));
    assert_eq!(spec.encode(b"AAAAAAAC"), Some(1));
    assert_eq!(spec.encode(b"TTTTTTTT"), Some(4_u32.pow(8) - 1));
    assert_eq!(spec.encode(b"AAAANAAA"), None);
  }

  #[rstest]
  fn neighbors_are_sorted_and_complete() {
    let spec = TileSpec::new(8, false).unwrap();
    let value = spec.encode(b"ACGTACGT").unwrap();
    let neighbors = spec.one_off_neighbors(value);
    assert_eq!(neighbors.len(), 8 * 3);
    assert!(neighbors.iter().tuple_windows().all(|(a, b)| a < b));
    assert!(!neighbors.contains(&value));
    // One substitution at the last position.
    assert!(neighbors.contains(&spec.encode(b"ACGTACGA").unwrap()));
    // One substitution at the first position.
    assert!(neighbors.contains(&spec.encode(b"CCGTACGT").unwrap()));
  }
}
