use crate::make_error;
use clap::{Args, ValueEnum};
use eyre::Report;
use serde::{Deserialize, Serialize};

/// Warn (but proceed) when a single query is larger than this.
pub const QUERY_WARN_SIZE: usize = 5_000_000;

/// Hard query size cap in fastMap mode.
pub const MAX_SINGLE_PIECE_SIZE: usize = 5000;

/// Default maximum intron span for nucleotide searches.
pub const MAX_INTRON_DEFAULT: usize = 750_000;

/// A target gap at least this long, with no query gap, counts as an intron.
pub const MIN_INTRON: usize = 30;

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeqType {
  /// DNA sequence
  Dna,
  /// RNA sequence, searched as DNA after U to T substitution
  Rna,
  /// Protein sequence
  Prot,
  /// DNA translated in six frames to protein
  Dnax,
  /// RNA translated in three frames to protein
  Rnax,
}

impl SeqType {
  /// Whether searches over this type run in protein space.
  pub fn is_prot_like(self) -> bool {
    matches!(self, Self::Prot | Self::Dnax | Self::Rnax)
  }

  pub fn is_translated(self) -> bool {
    matches!(self, Self::Dnax | Self::Rnax)
  }
}

/// Raw alignment options as they arrive from the command line. Domain
/// defaults (DNA vs protein) cannot be applied until both sequence types are
/// known, so every tunable is optional here and `AlignParams::resolve`
/// produces the concrete value set.
#[derive(Args, Debug, Clone, Default)]
pub struct AlignParamsOptional {
  /// Size of match that triggers an alignment. Usually between 8 and 12 for
  /// DNA and 3 to 6 for protein.
  #[arg(long, alias = "tileSize")]
  pub tile_size: Option<usize>,

  /// Spacing between tiles in the target index.
  #[arg(long, alias = "stepSize")]
  pub step_size: Option<usize>,

  /// Allow one mismatch in a tile and still trigger an alignment.
  #[arg(long, alias = "oneOff", value_parser = clap::value_parser!(u8).range(0..=1))]
  pub one_off: Option<u8>,

  /// Number of tile matches required to trigger an extension.
  #[arg(long, alias = "minMatch")]
  pub min_match: Option<usize>,

  /// Minimum alignment score: matches minus mismatches minus gap penalties.
  #[arg(long, alias = "minScore")]
  pub min_score: Option<i64>,

  /// Minimum sequence identity in percent.
  #[arg(long, alias = "minIdentity")]
  pub min_identity: Option<f64>,

  /// Maximum gap between tiles joined into one clump.
  #[arg(long, alias = "maxGap")]
  pub max_gap: Option<usize>,

  /// Maximum intron size.
  #[arg(long, alias = "maxIntron")]
  pub max_intron: Option<usize>,

  /// Number of occurrences of a tile before it is marked over-used and
  /// suppressed from seeding. Defaults to a value scaled to tile and step
  /// size.
  #[arg(long, alias = "repMatch")]
  pub rep_match: Option<usize>,

  /// Penalty for opening a gap.
  #[arg(long, alias = "gapOpen")]
  pub gap_open: Option<i64>,

  /// Penalty per gap base beyond the first (introns excluded).
  #[arg(long, alias = "gapExtend")]
  pub gap_extend: Option<i64>,

  /// Trim leading poly-T of the query.
  #[arg(long, alias = "trimT")]
  pub trim_t: bool,

  /// Do not trim trailing poly-A of the query.
  #[arg(long, alias = "noTrimA")]
  pub no_trim_a: bool,

  /// Remove the poly-A tail from the reported query size as well as from the
  /// alignments.
  #[arg(long, alias = "trimHardA")]
  pub trim_hard_a: bool,

  /// Fast DNA/DNA remapping: no introns, high identity required, query sizes
  /// capped.
  #[arg(long, alias = "fastMap")]
  pub fast_map: bool,

  /// Look harder for small initial and terminal exons. Not recommended for
  /// ESTs.
  #[arg(long)]
  pub fine: bool,

  /// Allow extension through large runs of N.
  #[arg(long, alias = "extendThroughN")]
  pub extend_through_n: bool,
}

/// Immutable, fully-resolved alignment parameters. Built once by the CLI and
/// shared by reference with index construction and every worker.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AlignParams {
  pub t_type: SeqType,
  pub q_type: SeqType,
  pub tile_size: usize,
  pub step_size: usize,
  pub one_off: bool,
  pub min_match: usize,
  pub min_score: i64,
  pub min_identity: f64,
  pub max_gap: usize,
  pub max_intron: usize,
  pub rep_match: usize,
  pub gap_open: i64,
  pub gap_extend: i64,
  pub trim_t: bool,
  pub trim_a: bool,
  pub trim_hard_a: bool,
  pub fast_map: bool,
  pub fine: bool,
  pub extend_through_n: bool,
}

impl AlignParams {
  /// Applies domain defaults and validates ranges. RNA queries imply poly-A
  /// trimming unless explicitly disabled.
  pub fn resolve(opts: &AlignParamsOptional, t_type: SeqType, q_type: SeqType) -> Result<Self, Report> {
    if t_type.is_prot_like() != q_type.is_prot_like() {
      return make_error!("t and q must both be either protein or dna");
    }
    if matches!(t_type, SeqType::Rna | SeqType::Rnax) {
      return make_error!("Illegal value for 't' parameter");
    }

    let prot_like = t_type.is_prot_like();
    let tile_size = opts.tile_size.unwrap_or(if prot_like { 5 } else { 11 });
    let step_size = opts.step_size.unwrap_or(tile_size);
    let min_match = opts.min_match.unwrap_or(if prot_like { 1 } else { 2 });
    let max_gap = opts.max_gap.unwrap_or(if prot_like { 0 } else { 2 });
    let min_identity = opts.min_identity.unwrap_or(if q_type.is_prot_like() { 25.0 } else { 90.0 });
    let rep_match = opts
      .rep_match
      .unwrap_or_else(|| default_rep_match(tile_size, step_size, prot_like));

    if min_match < 1 {
      return make_error!("minMatch must be at least 1");
    }
    if max_gap > 100 {
      return make_error!("maxGap must be less than 100");
    }
    if step_size < 1 || step_size > tile_size {
      return make_error!("stepSize must be between 1 and tileSize");
    }

    let trim_a = if opts.no_trim_a {
      false
    } else {
      matches!(q_type, SeqType::Rna | SeqType::Rnax)
    };

    Ok(Self {
      t_type,
      q_type,
      tile_size,
      step_size,
      one_off: opts.one_off == Some(1),
      min_match,
      min_score: opts.min_score.unwrap_or(30),
      min_identity,
      max_gap,
      max_intron: if opts.fast_map {
        0
      } else {
        opts.max_intron.unwrap_or(MAX_INTRON_DEFAULT)
      },
      rep_match,
      gap_open: opts.gap_open.unwrap_or(1),
      gap_extend: opts.gap_extend.unwrap_or(0),
      trim_t: opts.trim_t,
      trim_a,
      trim_hard_a: opts.trim_hard_a,
      fast_map: opts.fast_map,
      fine: opts.fine,
      extend_through_n: opts.extend_through_n,
    })
  }

  pub fn is_prot_like(&self) -> bool {
    self.t_type.is_prot_like()
  }

  /// Largest gap (in either sequence) bridged inside one alignment; anything
  /// larger splits the chain.
  pub fn max_bridged_gap(&self) -> usize {
    if self.fast_map {
      self.max_gap.max(32)
    } else {
      self.max_intron.max(MIN_INTRON)
    }
  }
}

/// Over-representation threshold scaled the way the historical defaults were
/// documented: 256 at tile 12, 1024 at 11, 4096 at 10, and doubled whenever
/// the step is halved relative to the tile.
pub fn default_rep_match(tile_size: usize, step_size: usize, is_protein: bool) -> usize {
  if is_protein {
    return 4096;
  }
  let base = match tile_size {
    12 => 256,
    11 => 1024,
    10 => 4096,
    n if n < 10 => 4096 << (2 * (10 - n)),
    _ => 1024,
  };
  base * tile_size / step_size.max(1)
}
