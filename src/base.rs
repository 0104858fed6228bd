/*!
The nucleotide alphabet used by the consensus and realignment code.
Everything that is not an unambiguous A/C/G/T (or `*` for a gap) becomes `N`.
```
use indel_con::base::Base;
let bases = Base::from_ascii_slice(b"ACgt*R");
assert_eq!(bases, vec![Base::A, Base::C, Base::G, Base::T, Base::Gap, Base::N]);
assert_eq!(Base::to_ascii_string(&bases), "ACGT*N");
```
*/

/// Number of symbols in the alphabet, including the gap
pub const ALPHABET_SIZE: usize = 6;

/// Number of symbols that can appear in read sequence (no gap)
pub const READ_ALPHABET_SIZE: usize = 5;

/// Maximum number of bases retained for a single inserted sequence
pub const MAX_INSERTION_LEN: usize = 1024;

/// A single symbol in a read, reference, or consensus sequence
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Base {
    A = 0,
    C = 1,
    G = 2,
    T = 3,
    /// Unknown base
    #[default]
    N = 4,
    /// Deleted base, only produced by the frequency tables
    Gap = 5
}

impl Base {
    /// All symbols, in index order
    pub const ALL: [Base; ALPHABET_SIZE] = [Base::A, Base::C, Base::G, Base::T, Base::N, Base::Gap];

    /// Total mapping from an ASCII character to a base
    pub fn from_ascii(c: u8) -> Base {
        match c {
            b'A' | b'a' => Base::A,
            b'C' | b'c' => Base::C,
            b'G' | b'g' => Base::G,
            b'T' | b't' | b'U' | b'u' => Base::T,
            b'*' => Base::Gap,
            _ => Base::N
        }
    }

    /// Converts an ASCII slice into bases
    pub fn from_ascii_slice(seq: &[u8]) -> Vec<Base> {
        seq.iter().map(|&c| Base::from_ascii(c)).collect()
    }

    /// Inverse of the index used in the frequency tables
    /// # Panics
    /// * if `index` is not less than `ALPHABET_SIZE`
    pub fn from_index(index: usize) -> Base {
        Base::ALL[index]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn to_ascii(self) -> u8 {
        b"ACGTN*"[self.index()]
    }

    /// Renders bases as a String, mostly for logging
    pub fn to_ascii_string(bases: &[Base]) -> String {
        bases.iter().map(|b| b.to_ascii() as char).collect()
    }

    /// One-hot nibble for the four nucleotides, all bits set for anything else.
    /// Used to test whether two bases are compatible.
    pub fn nibble(self) -> u8 {
        match self {
            Base::A => 0x1,
            Base::C => 0x2,
            Base::G => 0x4,
            Base::T => 0x8,
            Base::N | Base::Gap => 0xf
        }
    }

    pub fn is_unknown(self) -> bool {
        self == Base::N
    }
}

/// An inserted sequence with a hard upper bound on its length.
/// Bases pushed after `MAX_INSERTION_LEN` are dropped and the truncation is recorded.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct BoundedSeq {
    /// The retained bases
    bases: Vec<Base>,
    /// True if at least one base was dropped
    truncated: bool
}

impl BoundedSeq {
    /// Builds a bounded sequence, silently keeping only the first `MAX_INSERTION_LEN` bases.
    /// Check `is_truncated()` to find out if anything was dropped.
    pub fn from_bases<I: IntoIterator<Item = Base>>(bases: I) -> BoundedSeq {
        let mut ret = BoundedSeq::default();
        for b in bases {
            ret.push(b);
        }
        ret
    }

    /// Appends a base, dropping it if we are at capacity
    pub fn push(&mut self, base: Base) {
        if self.bases.len() < MAX_INSERTION_LEN {
            self.bases.push(base);
        } else {
            self.truncated = true;
        }
    }

    pub fn bases(&self) -> &[Base] {
        &self.bases
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_mapping() {
        // every byte maps to something, and only the expected ones map to nucleotides
        let mut nucleotides = 0;
        for c in 0..=255u8 {
            let b = Base::from_ascii(c);
            if b != Base::N && b != Base::Gap {
                nucleotides += 1;
            }
        }
        // ACGTU in both cases
        assert_eq!(nucleotides, 10);
        assert_eq!(Base::from_ascii(b'*'), Base::Gap);
    }

    #[test]
    fn test_index_round_trip() {
        for b in Base::ALL {
            assert_eq!(Base::from_index(b.index()), b);
        }
    }

    #[test]
    fn test_nibble_compatibility() {
        assert_eq!(Base::A.nibble() & Base::C.nibble(), 0);
        assert_ne!(Base::A.nibble() & Base::N.nibble(), 0);
    }

    #[test]
    fn test_bounded_truncation() {
        let short = BoundedSeq::from_bases(vec![Base::A; 10]);
        assert_eq!(short.len(), 10);
        assert!(!short.is_truncated());

        let long = BoundedSeq::from_bases(vec![Base::C; MAX_INSERTION_LEN + 5]);
        assert_eq!(long.len(), MAX_INSERTION_LEN);
        assert!(long.is_truncated());
    }
}
