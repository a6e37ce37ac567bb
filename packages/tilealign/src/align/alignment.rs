//! The gapped local alignment emitted by the extension stage and consumed by
//! the output formatters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Strand {
  Forward,
  Reverse,
}

impl Strand {
  pub fn as_char(self) -> char {
    match self {
      Self::Forward => '+',
      Self::Reverse => '-',
    }
  }
}

/// One ungapped run. Coordinates are in search orientation: when the query
/// strand is reverse, `q_start` counts from the start of the
/// reverse-complemented query, which is also what the tabular output formats
/// expect for minus-strand rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
  pub q_start: usize,
  pub t_start: usize,
  pub size: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
  pub q_name: String,
  /// Reported query size (hard poly-A trimming shrinks it).
  pub q_size: usize,
  pub t_id: usize,
  pub t_name: String,
  pub t_size: usize,

  /// Query span in forward-strand coordinates.
  pub q_start: usize,
  pub q_end: usize,
  /// Target span in forward-strand coordinates.
  pub t_start: usize,
  pub t_end: usize,

  pub q_strand: Strand,
  pub t_strand: Strand,
  /// Reading frames on translated paths.
  pub q_frame: Option<usize>,
  pub t_frame: Option<usize>,
  /// Bases of target (and query) per aligned unit: 3 when that side is
  /// translated DNA, otherwise 1.
  pub q_stride: usize,
  pub t_stride: usize,
  /// Whether the target strand is meaningful for the output (translated
  /// searches report it; plain nucleotide searches always align to the
  /// forward target).
  pub report_t_strand: bool,

  pub blocks: Vec<Block>,

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

impl Alignment {
  /// Aligned columns, counted in query units.
  pub fn aligned_span(&self) -> usize {
    self.blocks.iter().map(|b| b.size).sum()
  }

  /// Query coordinate of a block start in sequence units (bases for
  /// translated queries, residues or bases otherwise), in search orientation.
  pub fn block_q_coord(&self, block: &Block) -> usize {
    self.q_frame.unwrap_or(0) + self.q_stride * block.q_start
  }

  /// Target coordinate of a block start in target sequence units, in search
  /// orientation.
  pub fn block_t_coord(&self, block: &Block) -> usize {
    self.t_frame.unwrap_or(0) + self.t_stride * block.t_start
  }

  pub fn block_q_span(&self, block: &Block) -> usize {
    self.q_stride * block.size
  }

  pub fn block_t_span(&self, block: &Block) -> usize {
    self.t_stride * block.size
  }

  /// The strand column of the tabular formats: one character for plain
  /// searches, query plus target strand for translated ones.
  pub fn strand_label(&self) -> String {
    if self.report_t_strand {
      format!("{}{}", self.q_strand.as_char(), self.t_strand.as_char())
    } else {
      self.q_strand.as_char().to_string()
    }
  }

  /// Identity key for strand de-duplication: two alignments found on
  /// opposite query strands are the same result when their forward-strand
  /// spans and block structure coincide.
  pub fn dedup_key(&self) -> (usize, usize, usize, usize, usize, Vec<Block>) {
    (self.t_id, self.q_start, self.q_end, self.t_start, self.t_end, self.blocks.clone())
  }
}
