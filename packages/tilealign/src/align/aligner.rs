//! Per-query search driver. A `Searcher` owns the target data and index
//! structures for one run configuration; it is built once and shared
//! read-only by every worker. Everything allocated while aligning one query
//! is dropped before the next query is read.

use crate::align::alignment::{Alignment, Strand};
use crate::align::clump::clump_seeds;
use crate::align::extend::{AlignStats, ExtendContext, extend_clump};
use crate::align::params::{AlignParams, MAX_SINGLE_PIECE_SIZE, QUERY_WARN_SIZE};
use crate::align::seed::find_seeds;
use crate::align::translated::TranslatedSearcher;
use crate::alphabet::nuc::{mask_head_poly_t, mask_tail_poly_a, rna_to_dna};
use crate::index::tile::TileSpec;
use crate::index::tile_index::TileIndex;
use crate::io::fasta::FastaRecord;
use crate::make_error;
use crate::mask::QueryMask;
use crate::output::OutputWriter;
use crate::seq::{MaskBits, Seq};
use crate::translate::complement::reverse_complement;
use eyre::Report;
use log::warn;
use std::collections::HashSet;

/// A query after preparation: case-normalized, optionally poly-trimmed and
/// U-to-T substituted, with mask bits extracted from the original case.
pub struct PreparedQuery {
  pub name: String,
  pub seq: Vec<u8>,
  /// Reported size; hard poly-A trimming makes this smaller than the raw
  /// record.
  pub reported_size: usize,
  pub mask: Option<MaskBits>,
}

pub fn prepare_query(record: &FastaRecord, params: &AlignParams, q_mask: Option<QueryMask>) -> Result<PreparedQuery, Report> {
  if params.fast_map && record.seq.len() > MAX_SINGLE_PIECE_SIZE {
    return make_error!(
      "Maximum single piece size ({MAX_SINGLE_PIECE_SIZE}) exceeded by query {} of size ({}). \
       Larger pieces will have to be split up until no larger than this limit \
       when the fastMap option is used.",
      record.seq_name,
      record.seq.len()
    );
  }
  if record.seq.len() > QUERY_WARN_SIZE {
    warn!(
      "Query sequence {} has size {}, it might take a while.",
      record.seq_name,
      record.seq.len()
    );
  }

  let mut seq = record.seq.clone();
  let mask = q_mask.map(|m| m.bits(&seq));
  seq.make_ascii_uppercase();

  let mut reported_size = seq.len();
  if !params.q_type.is_prot_like() || params.q_type.is_translated() {
    rna_to_dna(&mut seq);
    if params.trim_t {
      mask_head_poly_t(&mut seq);
    }
    if params.trim_a || params.trim_hard_a {
      let trimmed = mask_tail_poly_a(&mut seq);
      if params.trim_hard_a {
        seq.truncate(seq.len() - trimmed);
        reported_size -= trimmed;
      }
    }
  }

  Ok(PreparedQuery {
    name: record.seq_name.clone(),
    seq,
    reported_size,
    mask,
  })
}

/// One alignment ready for the output writer, together with the search-
/// orientation buffers its blocks index into.
pub struct EmittedAlignment {
  pub alignment: Alignment,
  /// Index into the per-query buffer table for the query side.
  pub q_buf: usize,
}

/// Target data and indexes for a plain (untranslated) search: DNA query
/// against DNA target, or protein against protein.
pub struct PlainSearcher {
  pub targets: Vec<Seq>,
  pub repeat_bits: Vec<Option<MaskBits>>,
  pub index: TileIndex,
  pub is_protein: bool,
}

impl PlainSearcher {
  pub fn build(
    targets: Vec<Seq>,
    index_masks: Option<&[Option<MaskBits>]>,
    repeat_bits: Vec<Option<MaskBits>>,
    params: &AlignParams,
    ooc_set: Option<&std::collections::HashSet<u32>>,
  ) -> Result<Self, Report> {
    let is_protein = params.is_prot_like();
    let spec = TileSpec::new(params.tile_size, is_protein)?;
    let index = TileIndex::build(&targets, index_masks, spec, params.step_size, params.rep_match, ooc_set);
    Ok(Self {
      targets,
      repeat_bits,
      index,
      is_protein,
    })
  }

  fn search_strand(
    &self,
    prepared: &PreparedQuery,
    q_seq: &[u8],
    q_mask: Option<&MaskBits>,
    strand: Strand,
    params: &AlignParams,
    out: &mut Vec<Alignment>,
  ) {
    let seeds_by_target = find_seeds(q_seq, q_mask, &self.index, params.one_off);
    for (t_id, seeds) in &seeds_by_target {
      let clumps = clump_seeds(*t_id, seeds, params.max_gap, params.min_match, params.tile_size);
      for clump in &clumps {
        let target = &self.targets[*t_id as usize];
        let ctx = ExtendContext {
          query: q_seq,
          target: &target.seq,
          repeat_bits: self.repeat_bits[*t_id as usize].as_ref(),
          params,
          is_protein: self.is_protein,
        };
        for (blocks, stats) in extend_clump(clump, &ctx) {
          if !passes_thresholds(&stats, params) {
            continue;
          }
          out.push(plain_alignment(
            prepared,
            q_seq.len(),
            strand,
            *t_id as usize,
            target,
            blocks,
            &stats,
          ));
        }
      }
    }
  }
}

pub fn passes_thresholds(stats: &AlignStats, params: &AlignParams) -> bool {
  stats.score >= params.min_score && stats.identity >= params.min_identity
}

fn plain_alignment(
  prepared: &PreparedQuery,
  q_len: usize,
  strand: Strand,
  t_id: usize,
  target: &Seq,
  blocks: Vec<crate::align::alignment::Block>,
  stats: &AlignStats,
) -> Alignment {
  let q_start_search = blocks.first().map_or(0, |b| b.q_start);
  let q_end_search = blocks.last().map_or(0, |b| b.q_start + b.size);
  let (q_start, q_end) = match strand {
    Strand::Forward => (q_start_search, q_end_search),
    Strand::Reverse => (q_len - q_end_search, q_len - q_start_search),
  };
  let t_start = blocks.first().map_or(0, |b| b.t_start);
  let t_end = blocks.last().map_or(0, |b| b.t_start + b.size);

  Alignment {
    q_name: prepared.name.clone(),
    q_size: prepared.reported_size,
    t_id,
    t_name: target.name.clone(),
    t_size: target.len(),
    q_start,
    q_end,
    t_start,
    t_end,
    q_strand: strand,
    t_strand: Strand::Forward,
    q_frame: None,
    t_frame: None,
    q_stride: 1,
    t_stride: 1,
    report_t_strand: false,
    blocks,
    matches: stats.matches,
    mismatches: stats.mismatches,
    rep_matches: stats.rep_matches,
    n_count: stats.n_count,
    q_num_insert: stats.q_num_insert,
    q_base_insert: stats.q_base_insert,
    t_num_insert: stats.t_num_insert,
    t_base_insert: stats.t_base_insert,
    score: stats.score,
    identity: stats.identity,
  }
}

pub enum Searcher {
  Plain(PlainSearcher),
  Translated(TranslatedSearcher),
}

impl Searcher {
  /// Aligns one query and hands every passing alignment, then the per-query
  /// flush, to the output writer. Returns the number of symbols searched.
  pub fn align_query(
    &self,
    record: &FastaRecord,
    params: &AlignParams,
    q_mask: Option<QueryMask>,
    writer: &mut dyn OutputWriter,
  ) -> Result<usize, Report> {
    let prepared = prepare_query(record, params, q_mask)?;

    let mut buffers: Vec<Vec<u8>> = Vec::new();
    let mut emitted: Vec<EmittedAlignment> = Vec::new();

    match self {
      Self::Plain(searcher) => {
        let mut alignments = Vec::new();

        buffers.push(prepared.seq.clone());
        searcher.search_strand(&prepared, &buffers[0], prepared.mask.as_ref(), Strand::Forward, params, &mut alignments);
        let forward_count = alignments.len();

        if !searcher.is_protein {
          buffers.push(reverse_complement(&prepared.seq));
          let rev_mask = prepared.mask.as_ref().map(MaskBits::reversed);
          searcher.search_strand(&prepared, &buffers[1], rev_mask.as_ref(), Strand::Reverse, params, &mut alignments);
        }

        // Both strand passes can find the same alignment when the query is
        // its own reverse complement; keep the forward copy.
        let mut seen = HashSet::new();
        for (i, alignment) in alignments.into_iter().enumerate() {
          if !seen.insert(alignment.dedup_key()) {
            continue;
          }
          let q_buf = usize::from(i >= forward_count);
          emitted.push(EmittedAlignment { alignment, q_buf });
        }
      }
      Self::Translated(searcher) => {
        searcher.search_all(&prepared, params, &mut buffers, &mut emitted);
      }
    }

    for e in &emitted {
      let t_seq = self.target_view(&e.alignment);
      writer.write_alignment(&e.alignment, &buffers[e.q_buf], t_seq)?;
    }
    writer.flush_query(&prepared.name)?;

    Ok(record.seq.len())
  }

  /// The search-orientation target buffer an alignment's blocks index into.
  fn target_view(&self, alignment: &Alignment) -> &[u8] {
    match self {
      Self::Plain(searcher) => &searcher.targets[alignment.t_id].seq,
      Self::Translated(searcher) => searcher.peptide_view(alignment),
    }
  }
}
