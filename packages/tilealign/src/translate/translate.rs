//! Standard-code translation of DNA into the three forward reading frames.
//! Translated searches run on these peptide buffers; alignment coordinates
//! map back to the DNA via `frame + 3 * aa_offset`.

use crate::alphabet::nuc::nuc_val;

/// Amino acids of the standard genetic code indexed by the 6-bit codon value
/// built from 2-bit bases (A=0 C=1 G=2 T=3), first base most significant.
/// `*` marks stops; stops and unknown codons are ambiguous to the tile index.
const CODON_TABLE: &[u8; 64] = b"KNKNTTTTRSRSIIMIQHQHPPPPRRRRLLLLEDEDAAAAGGGGVVVVZYZYSSSSZCWCLFLF";

const STOP: u8 = b'Z';

/// Translates one codon; `None` when any base is ambiguous.
#[inline]
pub fn translate_codon(c0: u8, c1: u8, c2: u8) -> Option<u8> {
  let v = nuc_val(c0)? * 16 + nuc_val(c1)? * 4 + nuc_val(c2)?;
  Some(CODON_TABLE[v as usize])
}

/// Translates `dna` starting at `frame` (0..3). Codons containing ambiguous
/// bases become `X`; stops are kept as `Z` so they break tiles but still
/// occupy a residue position.
pub fn translate_frame(dna: &[u8], frame: usize) -> Vec<u8> {
  assert!(frame < 3);
  let n = dna.len().saturating_sub(frame) / 3;
  let mut out = Vec::with_capacity(n);
  for i in 0..n {
    let p = frame + 3 * i;
    out.push(translate_codon(dna[p], dna[p + 1], dna[p + 2]).unwrap_or(b'X'));
  }
  out
}

#[inline]
pub fn is_stop(aa: u8) -> bool {
  aa == STOP
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  #[case(b"ATG", 0, b"M")]
  #[case(b"ATGGCC", 0, b"MA")]
  #[case(b"TATGGCC", 1, b"MA")]
  #[case(b"TTATGGCC", 2, b"MA")]
  #[case(b"TAA", 0, b"Z")]
  #[case(b"ATNGCC", 0, b"XA")]
  #[case(b"AT", 0, b"")]
  fn translates_frames(#[case] dna: &[u8], #[case] frame: usize, #[case] expected: &[u8]) {
    assert_eq!(translate_frame(dna, frame), expected.to_vec());
  }

  #[rstest]
  fn translates_known_peptide() {
    // p53 N-terminus: MEEPQSDPSV
    let dna = b"ATGGAGGAGCCGCAGTCAGATCCTAGCGTC";
    assert_eq!(translate_frame(dna, 0), b"MEEPQSDPSV".to_vec());
  }
}
