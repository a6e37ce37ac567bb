use crate::alphabet::nuc::complement;

/// Reverse-complements a DNA buffer in place.
pub fn reverse_complement_in_place(seq: &mut [u8]) {
  let n = seq.len();
  for i in 0..n / 2 {
    let (a, b) = (seq[i], seq[n - 1 - i]);
    seq[i] = complement(b);
    seq[n - 1 - i] = complement(a);
  }
  if n % 2 == 1 {
    let mid = n / 2;
    seq[mid] = complement(seq[mid]);
  }
}

/// Reverse-complemented copy.
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
  let mut out = seq.to_vec();
  reverse_complement_in_place(&mut out);
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  #[case(b"ACGT", b"ACGT")]
  #[case(b"AACGT", b"ACGTT")]
  #[case(b"GATTACA", b"TGTAATC")]
  #[case(b"ANC", b"GNT")]
  fn reverse_complements(#[case] seq: &[u8], #[case] expected: &[u8]) {
    assert_eq!(reverse_complement(seq), expected.to_vec());
  }

  #[rstest]
  fn round_trips() {
    let seq = b"ACGTTGCAGGN".to_vec();
    assert_eq!(reverse_complement(&reverse_complement(&seq)), seq);
  }
}
