//! Extension: turns one clump of seeds into zero or more gapped alignments.
//!
//! Same-diagonal seeds merge into exact blocks; blocks chain colinearly with
//! overlap trimming; chains split wherever a gap exceeds what one alignment
//! may bridge (the intron limit, or almost nothing in fastMap mode); small
//! double-sided gaps are smoothed by a bounded dynamic program; finally the
//! outer ends extend ungapped while the running score stays near its best.

use crate::align::alignment::Block;
use crate::align::clump::Clump;
use crate::align::params::{AlignParams, MIN_INTRON};
use crate::align::seed::Seed;
use crate::alphabet::aa::is_aa;
use crate::alphabet::nuc::is_nuc;
use crate::seq::MaskBits;
use std::collections::BTreeMap;

/// Largest gap-pair region the interior dynamic program will align.
const MAX_DP_SPAN: usize = 128;

/// Ungapped end extension stops once the running score drops this far below
/// its best.
const X_DROP: i64 = 10;

const MATCH_SCORE: i64 = 1;
const MISMATCH_SCORE: i64 = -3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignStats {
  pub matches: usize,
  pub mismatches: usize,
  pub rep_matches: usize,
  pub n_count: usize,
  pub q_num_insert: usize,
  pub q_base_insert: usize,
  pub t_num_insert: usize,
  pub t_base_insert: usize,
  pub score: i64,
  pub identity: f64,
}

pub struct ExtendContext<'a> {
  pub query: &'a [u8],
  pub target: &'a [u8],
  /// Repeat annotation of the target, used for separate repeat-match
  /// accounting; positions are in the same orientation as `target`.
  pub repeat_bits: Option<&'a MaskBits>,
  pub params: &'a AlignParams,
  pub is_protein: bool,
}

impl ExtendContext<'_> {
  #[inline]
  fn is_symbol(&self, c: u8) -> bool {
    if self.is_protein { is_aa(c) } else { is_nuc(c) }
  }
}

/// Extends one clump into finished block lists with their statistics.
pub fn extend_clump(clump: &Clump, ctx: &ExtendContext<'_>) -> Vec<(Vec<Block>, AlignStats)> {
  let tile_size = ctx.params.tile_size;
  let blocks = seeds_to_blocks(&clump.seeds, tile_size);
  let chain = chain_blocks(blocks);

  split_chain(&chain, ctx.params.max_bridged_gap())
    .into_iter()
    .filter_map(|piece| {
      let mut blocks = smooth_gaps(&piece, ctx);
      if blocks.is_empty() {
        return None;
      }
      extend_ends(&mut blocks, ctx);
      let blocks = merge_adjacent(blocks);
      let stats = compute_stats(&blocks, ctx);
      Some((blocks, stats))
    })
    .collect()
}

/// Merges seeds sharing a diagonal into maximal exact blocks.
fn seeds_to_blocks(seeds: &[Seed], tile_size: usize) -> Vec<Block> {
  let mut by_diagonal: BTreeMap<i64, Vec<&Seed>> = BTreeMap::new();
  for seed in seeds {
    by_diagonal
      .entry(i64::from(seed.t_pos) - i64::from(seed.q_pos))
      .or_default()
      .push(seed);
  }

  let mut blocks = Vec::new();
  for seeds in by_diagonal.values() {
    // Seeds are query-sorted already (clump construction sorts them).
    let mut current: Option<Block> = None;
    for seed in seeds {
      let (q, t) = (seed.q_pos as usize, seed.t_pos as usize);
      match &mut current {
        Some(block) if q <= block.q_start + block.size => {
          let end = q + tile_size;
          if end > block.q_start + block.size {
            block.size = end - block.q_start;
          }
        }
        _ => {
          if let Some(block) = current.take() {
            blocks.push(block);
          }
          current = Some(Block {
            q_start: q,
            t_start: t,
            size: tile_size,
          });
        }
      }
    }
    if let Some(block) = current {
      blocks.push(block);
    }
  }
  blocks.sort_unstable_by_key(|b| (b.q_start, b.t_start));
  blocks
}

/// Greedy colinear chain: blocks must advance on both sequences; overlaps on
/// the query are trimmed off the head of the later block.
fn chain_blocks(blocks: Vec<Block>) -> Vec<Block> {
  let mut chain: Vec<Block> = Vec::with_capacity(blocks.len());
  for mut block in blocks {
    let Some(prev) = chain.last() else {
      chain.push(block);
      continue;
    };
    let prev_q_end = prev.q_start + prev.size;
    let prev_t_end = prev.t_start + prev.size;
    if block.q_start < prev_q_end {
      let overlap = prev_q_end - block.q_start;
      if overlap >= block.size {
        continue;
      }
      block.q_start += overlap;
      block.t_start += overlap;
      block.size -= overlap;
    }
    if block.t_start < prev_t_end {
      continue;
    }
    chain.push(block);
  }
  chain
}

/// Splits a chain wherever a gap on either sequence exceeds `limit`.
fn split_chain(chain: &[Block], limit: usize) -> Vec<Vec<Block>> {
  let mut pieces = Vec::new();
  let mut current: Vec<Block> = Vec::new();
  for &block in chain {
    if let Some(prev) = current.last() {
      let q_gap = block.q_start - (prev.q_start + prev.size);
      let t_gap = block.t_start - (prev.t_start + prev.size);
      if q_gap > limit || t_gap > limit {
        pieces.push(std::mem::take(&mut current));
      }
    }
    current.push(block);
  }
  if !current.is_empty() {
    pieces.push(current);
  }
  pieces
}

/// Replaces small double-sided gaps between neighbor blocks with the block
/// decomposition of a bounded global alignment of the gap region.
fn smooth_gaps(piece: &[Block], ctx: &ExtendContext<'_>) -> Vec<Block> {
  let mut out: Vec<Block> = Vec::with_capacity(piece.len());
  for &block in piece {
    if let Some(prev) = out.last() {
      let q_gap_start = prev.q_start + prev.size;
      let t_gap_start = prev.t_start + prev.size;
      let q_gap = block.q_start - q_gap_start;
      let t_gap = block.t_start - t_gap_start;
      if q_gap > 0 && t_gap > 0 && q_gap <= MAX_DP_SPAN && t_gap <= MAX_DP_SPAN {
        let sub = banded_gap_blocks(
          &ctx.query[q_gap_start..block.q_start],
          &ctx.target[t_gap_start..block.t_start],
          ctx,
        );
        out.extend(sub.into_iter().map(|b| Block {
          q_start: b.q_start + q_gap_start,
          t_start: b.t_start + t_gap_start,
          size: b.size,
        }));
      }
    }
    out.push(block);
  }
  out
}

/// Global alignment of one small gap region, returned as diagonal runs.
/// Linear gap cost keeps the matrix simple; the region is bounded by
/// `MAX_DP_SPAN` so quadratic cost stays negligible.
fn banded_gap_blocks(q: &[u8], t: &[u8], ctx: &ExtendContext<'_>) -> Vec<Block> {
  const GAP: i64 = -2;
  let (n, m) = (q.len(), t.len());
  let mut score = vec![0_i64; (n + 1) * (m + 1)];
  let idx = |i: usize, j: usize| i * (m + 1) + j;

  for i in 1..=n {
    score[idx(i, 0)] = GAP * i as i64;
  }
  for j in 1..=m {
    score[idx(0, j)] = GAP * j as i64;
  }
  for i in 1..=n {
    for j in 1..=m {
      let sub = if !ctx.is_symbol(q[i - 1]) || !ctx.is_symbol(t[j - 1]) || q[i - 1] != t[j - 1] {
        MISMATCH_SCORE
      } else {
        MATCH_SCORE
      };
      score[idx(i, j)] = (score[idx(i - 1, j - 1)] + sub)
        .max(score[idx(i - 1, j)] + GAP)
        .max(score[idx(i, j - 1)] + GAP);
    }
  }

  // Traceback, preferring diagonal moves so runs stay maximal.
  let mut blocks_rev: Vec<Block> = Vec::new();
  let (mut i, mut j) = (n, m);
  while i > 0 && j > 0 {
    let here = score[idx(i, j)];
    let sub = if !ctx.is_symbol(q[i - 1]) || !ctx.is_symbol(t[j - 1]) || q[i - 1] != t[j - 1] {
      MISMATCH_SCORE
    } else {
      MATCH_SCORE
    };
    if here == score[idx(i - 1, j - 1)] + sub {
      i -= 1;
      j -= 1;
      match blocks_rev.last_mut() {
        Some(block) if block.q_start == i + 1 && block.t_start == j + 1 => {
          block.q_start = i;
          block.t_start = j;
          block.size += 1;
        }
        _ => blocks_rev.push(Block {
          q_start: i,
          t_start: j,
          size: 1,
        }),
      }
    } else if here == score[idx(i - 1, j)] + GAP {
      i -= 1;
    } else {
      j -= 1;
    }
  }
  blocks_rev.reverse();
  blocks_rev
}

/// Ungapped X-drop extension of the outer alignment ends.
fn extend_ends(blocks: &mut [Block], ctx: &ExtendContext<'_>) {
  let min_gain: i64 = if ctx.params.fine { 1 } else { 2 };

  if let Some(first) = blocks.first_mut() {
    let room = first.q_start.min(first.t_start);
    let step = |i: usize| (ctx.query[first.q_start - i], ctx.target[first.t_start - i]);
    let best = scan_extension(room, step, ctx, min_gain);
    first.q_start -= best;
    first.t_start -= best;
    first.size += best;
  }

  if let Some(last) = blocks.last_mut() {
    let q_end = last.q_start + last.size;
    let t_end = last.t_start + last.size;
    let room = (ctx.query.len() - q_end).min(ctx.target.len() - t_end);
    let step = |i: usize| (ctx.query[q_end + i - 1], ctx.target[t_end + i - 1]);
    let best = scan_extension(room, step, ctx, min_gain);
    last.size += best;
  }
}

fn scan_extension(room: usize, at: impl Fn(usize) -> (u8, u8), ctx: &ExtendContext<'_>, min_gain: i64) -> usize {
  let mut score = 0_i64;
  let mut best_score = min_gain - 1;
  let mut best = 0;
  for i in 1..=room {
    let (qc, tc) = at(i);
    if !ctx.is_symbol(qc) || !ctx.is_symbol(tc) {
      if !ctx.params.extend_through_n {
        break;
      }
      score += MISMATCH_SCORE;
    } else {
      score += if qc == tc { MATCH_SCORE } else { MISMATCH_SCORE };
    }
    if score > best_score {
      best_score = score;
      best = i;
    }
    if score <= best_score - X_DROP {
      break;
    }
  }
  best
}

fn merge_adjacent(blocks: Vec<Block>) -> Vec<Block> {
  let mut out: Vec<Block> = Vec::with_capacity(blocks.len());
  for block in blocks {
    match out.last_mut() {
      Some(prev) if prev.q_start + prev.size == block.q_start && prev.t_start + prev.size == block.t_start => {
        prev.size += block.size;
      }
      _ => out.push(block),
    }
  }
  out
}

/// Column-by-column statistics over the final block list, with gap and
/// intron accounting from the inter-block links.
fn compute_stats(blocks: &[Block], ctx: &ExtendContext<'_>) -> AlignStats {
  let mut stats = AlignStats::default();

  for block in blocks {
    for i in 0..block.size {
      let qc = ctx.query[block.q_start + i];
      let tc = ctx.target[block.t_start + i];
      if !ctx.is_symbol(qc) || !ctx.is_symbol(tc) {
        stats.n_count += 1;
      } else if qc == tc {
        if ctx.repeat_bits.is_some_and(|bits| bits.get(block.t_start + i)) {
          stats.rep_matches += 1;
        } else {
          stats.matches += 1;
        }
      } else {
        stats.mismatches += 1;
      }
    }
  }

  let mut gap_penalty = 0_i64;
  for pair in blocks.windows(2) {
    let q_gap = pair[1].q_start - (pair[0].q_start + pair[0].size);
    let t_gap = pair[1].t_start - (pair[0].t_start + pair[0].size);
    if q_gap > 0 {
      stats.q_num_insert += 1;
      stats.q_base_insert += q_gap;
      gap_penalty += ctx.params.gap_open + ctx.params.gap_extend * q_gap as i64;
    }
    if t_gap > 0 {
      stats.t_num_insert += 1;
      stats.t_base_insert += t_gap;
      let is_intron = q_gap == 0 && t_gap >= MIN_INTRON && t_gap <= ctx.params.max_intron.max(MIN_INTRON);
      gap_penalty += if is_intron {
        ctx.params.gap_open
      } else {
        ctx.params.gap_open + ctx.params.gap_extend * t_gap as i64
      };
    }
  }

  stats.score = (stats.matches + stats.rep_matches) as i64 - stats.mismatches as i64 - gap_penalty;
  let aligned = stats.matches + stats.rep_matches + stats.mismatches;
  stats.identity = if aligned == 0 {
    0.0
  } else {
    100.0 * (stats.matches + stats.rep_matches) as f64 / aligned as f64
  };
  stats
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::align::params::{AlignParamsOptional, SeqType};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn dna_params() -> AlignParams {
    let opts = AlignParamsOptional {
      tile_size: Some(8),
      min_match: Some(1),
      ..AlignParamsOptional::default()
    };
    AlignParams::resolve(&opts, SeqType::Dna, SeqType::Dna).unwrap()
  }

  fn ctx<'a>(query: &'a [u8], target: &'a [u8], params: &'a AlignParams) -> ExtendContext<'a> {
    ExtendContext {
      query,
      target,
      repeat_bits: None,
      params,
      is_protein: false,
    }
  }

  fn clump_of(seeds: Vec<Seed>) -> Clump {
    let mut seeds = seeds;
    seeds.sort_unstable_by_key(|s| (s.q_pos, s.t_pos));
    let q_min = seeds.iter().map(|s| s.q_pos).min().unwrap();
    let q_max = seeds.iter().map(|s| s.q_pos).max().unwrap() + 8;
    let t_min = seeds.iter().map(|s| s.t_pos).min().unwrap();
    let t_max = seeds.iter().map(|s| s.t_pos).max().unwrap() + 8;
    Clump {
      t_id: 0,
      seeds,
      q_min,
      q_max,
      t_min,
      t_max,
    }
  }

  #[rstest]
  fn perfect_match_scores_its_length() {
    let params = dna_params();
    let query = b"ACGTACGT";
    let target = b"ACGTACGTACGTACGT";
    let ctx = ctx(query, target, &params);
    let clump = clump_of(vec![Seed { q_pos: 0, t_pos: 0 }]);

    let results = extend_clump(&clump, &ctx);
    assert_eq!(results.len(), 1);
    let (blocks, stats) = &results[0];
    assert_eq!(blocks, &vec![Block { q_start: 0, t_start: 0, size: 8 }]);
    assert_eq!(stats.matches, 8);
    assert_eq!(stats.score, 8);
    assert!((stats.identity - 100.0).abs() < f64::EPSILON);
  }

  #[rstest]
  fn extends_past_seed_boundaries() {
    let params = dna_params();
    //         0123456789012345
    let query = b"GGATCCGGTTAACCGG";
    let target = b"GGATCCGGTTAACCGG";
    let ctx = ctx(query, target, &params);
    // Seed covers only the middle 8 columns; ends must be recovered.
    let clump = clump_of(vec![Seed { q_pos: 4, t_pos: 4 }]);

    let results = extend_clump(&clump, &ctx);
    let (blocks, stats) = &results[0];
    assert_eq!(blocks, &vec![Block { q_start: 0, t_start: 0, size: 16 }]);
    assert_eq!(stats.matches, 16);
  }

  #[rstest]
  fn extension_stops_at_ambiguity_by_default() {
    let params = dna_params();
    let query = b"NNGATCCGGTTAACC";
    let target = b"AAGATCCGGTTAACC";
    let ctx = ctx(query, target, &params);
    let clump = clump_of(vec![Seed { q_pos: 4, t_pos: 4 }]);

    let results = extend_clump(&clump, &ctx);
    let (blocks, _stats) = &results[0];
    // Left extension reaches the Ns and stops.
    assert_eq!(blocks[0].q_start, 2);
  }

  #[rstest]
  fn merges_mismatch_bridged_gap_into_one_block_pair() {
    let params = dna_params();
    // Two seed blocks on the same diagonal separated by 4 mismatching
    // columns; the gap smoother should bridge them without gaps.
    let query = b"GGATCCGGAAAATTAACCGG";
    let target = b"GGATCCGGCCCCTTAACCGG";
    let ctx = ctx(query, target, &params);
    let clump = clump_of(vec![Seed { q_pos: 0, t_pos: 0 }, Seed { q_pos: 12, t_pos: 12 }]);

    let results = extend_clump(&clump, &ctx);
    assert_eq!(results.len(), 1);
    let (blocks, stats) = &results[0];
    assert_eq!(blocks, &vec![Block { q_start: 0, t_start: 0, size: 20 }]);
    assert_eq!(stats.matches, 16);
    assert_eq!(stats.mismatches, 4);
    assert_eq!(stats.score, 12);
    assert!((stats.identity - 80.0).abs() < 1e-9);
  }

  #[rstest]
  fn accounts_for_target_insertions() {
    let params = dna_params();
    // 4-base insertion in the target between two exact runs.
    let query = b"GGATCCGGTTAACCGG";
    let target = b"GGATCCGGACGTTTAACCGG";
    let ctx = ctx(query, target, &params);
    let clump = clump_of(vec![Seed { q_pos: 0, t_pos: 0 }, Seed { q_pos: 8, t_pos: 12 }]);

    let results = extend_clump(&clump, &ctx);
    let (blocks, stats) = &results[0];
    assert_eq!(blocks.len(), 2);
    assert_eq!(stats.t_num_insert, 1);
    assert_eq!(stats.t_base_insert, 4);
    assert_eq!(stats.matches, 16);
    assert_eq!(stats.score, 15);
  }

  #[rstest]
  fn splits_chains_at_oversized_gaps() {
    let opts = AlignParamsOptional {
      tile_size: Some(8),
      min_match: Some(1),
      max_intron: Some(50),
      ..AlignParamsOptional::default()
    };
    let params = AlignParams::resolve(&opts, SeqType::Dna, SeqType::Dna).unwrap();

    let mut target = b"GGATCCGGTTAACCGG".to_vec();
    target.extend(std::iter::repeat_n(b'C', 100));
    target.extend_from_slice(b"GGATCCGGTTAACCGG");
    let query = b"GGATCCGGTTAACCGGGGATCCGGTTAACCGG";
    let ctx = ctx(query, &target, &params);
    let clump = clump_of(vec![Seed { q_pos: 0, t_pos: 0 }, Seed { q_pos: 16, t_pos: 116 }]);

    let results = extend_clump(&clump, &ctx);
    assert_eq!(results.len(), 2);
  }
}
