//! Translated searches: the target DNA is translated into three peptide
//! frames per strand, each with its own tile index, and all six stay
//! resident so one pass over a query covers both target strands. Protein
//! queries probe the six indexes directly; translated queries are themselves
//! translated into three frames per query strand first.

use crate::align::alignment::{Alignment, Block, Strand};
use crate::align::aligner::{EmittedAlignment, PreparedQuery, passes_thresholds};
use crate::align::clump::clump_seeds;
use crate::align::extend::{AlignStats, ExtendContext, extend_clump};
use crate::align::params::AlignParams;
use crate::align::seed::find_seeds;
use crate::index::tile::TileSpec;
use crate::index::tile_index::TileIndex;
use crate::seq::{MaskBits, Seq};
use crate::translate::complement::reverse_complement;
use crate::translate::translate::translate_frame;
use eyre::Report;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct TargetMeta {
  pub name: String,
  pub dna_size: usize,
}

pub struct FrameIndex {
  pub peptides: Vec<Seq>,
  pub index: TileIndex,
}

pub struct TransStrand {
  pub frames: [FrameIndex; 3],
}

pub struct TranslatedSearcher {
  pub meta: Vec<TargetMeta>,
  /// Forward strand first, then reverse; built sequentially in that order.
  pub strands: [TransStrand; 2],
  /// Whether the query side is translated DNA rather than protein.
  pub q_translated: bool,
  /// dnax queries search both query strands; rnax only the given one.
  pub q_both_strands: bool,
}

impl TranslatedSearcher {
  pub fn build(
    targets: &[Seq],
    index_masks: Option<&[Option<MaskBits>]>,
    params: &AlignParams,
    ooc_set: Option<&HashSet<u32>>,
  ) -> Result<Self, Report> {
    let spec = TileSpec::new(params.tile_size, true)?;
    let meta = targets
      .iter()
      .map(|t| TargetMeta {
        name: t.name.clone(),
        dna_size: t.len(),
      })
      .collect();

    // Masked regions are ignored entirely in translated searches: blank them
    // to N before translation so they can neither seed nor match.
    let masked_dna: Vec<Vec<u8>> = targets
      .iter()
      .enumerate()
      .map(|(i, t)| {
        let mut dna = t.seq.clone();
        if let Some(Some(mask)) = index_masks.map(|m| &m[i]) {
          for (pos, c) in dna.iter_mut().enumerate() {
            if mask.get(pos) {
              *c = b'N';
            }
          }
        }
        dna
      })
      .collect();

    let build_strand = |reverse: bool| -> TransStrand {
      let dna: Vec<Vec<u8>> = masked_dna
        .iter()
        .map(|d| if reverse { reverse_complement(d) } else { d.clone() })
        .collect();
      let frames = std::array::from_fn(|frame| {
        let peptides: Vec<Seq> = dna
          .iter()
          .zip(targets)
          .map(|(d, t)| Seq::new(t.name.clone(), translate_frame(d, frame)))
          .collect();
        let index = TileIndex::build(&peptides, None, spec, params.step_size, params.rep_match, ooc_set);
        FrameIndex { peptides, index }
      });
      TransStrand { frames }
    };

    Ok(Self {
      meta,
      strands: [build_strand(false), build_strand(true)],
      q_translated: params.q_type.is_translated(),
      q_both_strands: params.q_type == crate::align::params::SeqType::Dnax,
    })
  }

  pub fn search_all(
    &self,
    prepared: &PreparedQuery,
    params: &AlignParams,
    buffers: &mut Vec<Vec<u8>>,
    emitted: &mut Vec<EmittedAlignment>,
  ) {
    if self.q_translated {
      let q_strands: &[Strand] = if self.q_both_strands {
        &[Strand::Forward, Strand::Reverse]
      } else {
        &[Strand::Forward]
      };
      for &q_strand in q_strands {
        let mut q_dna = match q_strand {
          Strand::Forward => prepared.seq.clone(),
          Strand::Reverse => reverse_complement(&prepared.seq),
        };
        let mask = match q_strand {
          Strand::Forward => prepared.mask.clone(),
          Strand::Reverse => prepared.mask.as_ref().map(MaskBits::reversed),
        };
        if let Some(mask) = &mask {
          for (pos, c) in q_dna.iter_mut().enumerate() {
            if mask.get(pos) {
              *c = b'N';
            }
          }
        }
        for q_frame in 0..3 {
          let buf_id = buffers.len();
          buffers.push(translate_frame(&q_dna, q_frame));
          self.search_frames(
            prepared,
            &buffers[buf_id],
            buf_id,
            q_strand,
            Some(q_frame),
            q_dna.len(),
            3,
            params,
            emitted,
          );
        }
      }
    } else {
      let buf_id = buffers.len();
      buffers.push(prepared.seq.clone());
      self.search_frames(
        prepared,
        &buffers[buf_id],
        buf_id,
        Strand::Forward,
        None,
        prepared.seq.len(),
        1,
        params,
        emitted,
      );
    }
  }

  fn search_frames(
    &self,
    prepared: &PreparedQuery,
    q_pep: &[u8],
    q_buf: usize,
    q_strand: Strand,
    q_frame: Option<usize>,
    q_total_units: usize,
    q_stride: usize,
    params: &AlignParams,
    emitted: &mut Vec<EmittedAlignment>,
  ) {
    for (s_idx, t_strand) in [Strand::Forward, Strand::Reverse].into_iter().enumerate() {
      for t_frame in 0..3 {
        let frame_index = &self.strands[s_idx].frames[t_frame];
        let seeds_by_target = find_seeds(q_pep, None, &frame_index.index, params.one_off);
        for (t_id, seeds) in &seeds_by_target {
          let clumps = clump_seeds(*t_id, seeds, params.max_gap, params.min_match, params.tile_size);
          for clump in &clumps {
            let ctx = ExtendContext {
              query: q_pep,
              target: &frame_index.peptides[*t_id as usize].seq,
              repeat_bits: None,
              params,
              is_protein: true,
            };
            for (blocks, stats) in extend_clump(clump, &ctx) {
              if !passes_thresholds(&stats, params) {
                continue;
              }
              let alignment = self.translated_alignment(
                prepared,
                *t_id as usize,
                blocks,
                &stats,
                q_strand,
                q_frame,
                q_total_units,
                q_stride,
                t_strand,
                t_frame,
              );
              emitted.push(EmittedAlignment { alignment, q_buf });
            }
          }
        }
      }
    }
  }

  fn translated_alignment(
    &self,
    prepared: &PreparedQuery,
    t_id: usize,
    blocks: Vec<Block>,
    stats: &AlignStats,
    q_strand: Strand,
    q_frame: Option<usize>,
    q_total_units: usize,
    q_stride: usize,
    t_strand: Strand,
    t_frame: usize,
  ) -> Alignment {
    let meta = &self.meta[t_id];

    let qf = q_frame.unwrap_or(0);
    let q_unit_start = blocks.first().map_or(0, |b| b.q_start);
    let q_unit_end = blocks.last().map_or(0, |b| b.q_start + b.size);
    let q_search_start = qf + q_stride * q_unit_start;
    let q_search_end = qf + q_stride * q_unit_end;
    let (q_start, q_end) = match q_strand {
      Strand::Forward => (q_search_start, q_search_end),
      Strand::Reverse => (q_total_units - q_search_end, q_total_units - q_search_start),
    };

    let t_unit_start = blocks.first().map_or(0, |b| b.t_start);
    let t_unit_end = blocks.last().map_or(0, |b| b.t_start + b.size);
    let t_search_start = t_frame + 3 * t_unit_start;
    let t_search_end = t_frame + 3 * t_unit_end;
    let (t_start, t_end) = match t_strand {
      Strand::Forward => (t_search_start, t_search_end),
      Strand::Reverse => (meta.dna_size - t_search_end, meta.dna_size - t_search_start),
    };

    Alignment {
      q_name: prepared.name.clone(),
      q_size: prepared.reported_size,
      t_id,
      t_name: meta.name.clone(),
      t_size: meta.dna_size,
      q_start,
      q_end,
      t_start,
      t_end,
      q_strand,
      t_strand,
      q_frame,
      t_frame: Some(t_frame),
      q_stride,
      t_stride: 3,
      report_t_strand: true,
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

  /// The peptide buffer an alignment's target-side blocks index into.
  pub fn peptide_view(&self, alignment: &Alignment) -> &[u8] {
    let s_idx = usize::from(alignment.t_strand == Strand::Reverse);
    let frame = alignment.t_frame.unwrap_or(0);
    &self.strands[s_idx].frames[frame].peptides[alignment.t_id].seq
  }
}
