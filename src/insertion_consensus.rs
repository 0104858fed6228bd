/*!
Majority-vote inserted sequences for the candidate insertion sizes at a site.
*/

use crate::base::{Base, READ_ALPHABET_SIZE};
use crate::pileup::PileupRead;

/// Inserted sequences for every candidate type, stored with a fixed stride of `max_ins`.
/// Slots for non-insertion types, and the tail of short insertions, are filled with N.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertionConsensus {
    /// Concatenated slots
    bases: Vec<Base>,
    /// Length of each slot
    max_ins: usize,
    /// Length of the real sequence in each slot
    lengths: Vec<usize>
}

impl InsertionConsensus {
    /// Computes the majority inserted sequence for every insertion type, pooling all samples.
    /// Each offset takes the most common base among reads carrying exactly that insertion, N if none is observed.
    /// # Arguments
    /// * `pileup` - the reads at the site, grouped by sample
    /// * `types` - candidate sizes
    /// * `max_ins` - the slot stride, the largest candidate insertion
    pub fn new(pileup: &[Vec<PileupRead>], types: &[i32], max_ins: usize) -> InsertionConsensus {
        let mut bases = vec![Base::N; types.len() * max_ins];
        let mut lengths = vec![0; types.len()];

        for (t, &indel_type) in types.iter().enumerate() {
            if indel_type <= 0 {
                continue;
            }
            let len = (indel_type as usize).min(max_ins);
            let mut votes = vec![[0_u32; READ_ALPHABET_SIZE]; len];
            for read in pileup.iter().flatten().filter(|r| r.indel() == indel_type) {
                let seq = read.sequence();
                for (k, v) in votes.iter_mut().enumerate() {
                    // inserted bases start right after the site
                    if let Some(b) = seq.get(read.qpos() + 1 + k) {
                        v[b.index().min(READ_ALPHABET_SIZE - 1)] += 1;
                    }
                }
            }

            let slot = &mut bases[t * max_ins..t * max_ins + len];
            for (s, v) in slot.iter_mut().zip(votes.iter()) {
                let mut best = (Base::N, 0);
                for (i, &c) in v.iter().enumerate() {
                    if best.1 < c {
                        best = (Base::from_index(i), c);
                    }
                }
                *s = best.0;
            }
            lengths[t] = len;
        }

        InsertionConsensus { bases, max_ins, lengths }
    }

    /// The inserted sequence of type index `t`, empty for non-insertions
    pub fn sequence(&self, t: usize) -> &[Base] {
        let start = t * self.max_ins;
        &self.bases[start..start + self.lengths[t]]
    }

    /// The full padded slot of type index `t`
    pub fn slot(&self, t: usize) -> &[Base] {
        let start = t * self.max_ins;
        &self.bases[start..start + self.max_ins]
    }

    pub fn max_ins(&self) -> usize {
        self.max_ins
    }

    pub fn num_slots(&self) -> usize {
        self.lengths.len()
    }

    /// Keeps only the listed type indices, in order
    pub fn select(&self, indices: &[usize]) -> InsertionConsensus {
        InsertionConsensus {
            bases: indices.iter().flat_map(|&t| self.slot(t).iter().copied()).collect(),
            max_ins: self.max_ins,
            lengths: indices.iter().map(|&t| self.lengths[t]).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_htslib::bam::record::CigarString;

    fn ins_read(seq: &[u8], ins: usize) -> PileupRead {
        let cigar = CigarString::try_from(format!("5M{ins}I{}M", seq.len() - 5 - ins).as_str()).unwrap();
        PileupRead::new(0, cigar, seq, vec![30; seq.len()], 4, ins as i32).unwrap()
    }

    #[test]
    fn test_majority() {
        let pileup = vec![
            vec![ins_read(b"ACGTAGTTCCC", 3), ins_read(b"ACGTAGTACCC", 3)],
            vec![ins_read(b"ACGTAGTTCCC", 3), ins_read(b"ACGTAAACCC", 2)]
        ];
        let types = [-1, 0, 2, 3];
        let cons = InsertionConsensus::new(&pileup, &types, 3);
        assert_eq!(cons.num_slots(), 4);
        assert!(cons.sequence(0).is_empty());
        assert!(cons.sequence(1).is_empty());
        assert_eq!(Base::to_ascii_string(cons.sequence(2)), "AA");
        assert_eq!(Base::to_ascii_string(cons.slot(2)), "AAN");
        assert_eq!(Base::to_ascii_string(cons.sequence(3)), "GTT");
        assert_eq!(Base::to_ascii_string(cons.slot(1)), "NNN");

        let selected = cons.select(&[1, 3]);
        assert_eq!(selected.num_slots(), 2);
        assert_eq!(Base::to_ascii_string(selected.sequence(1)), "GTT");
    }

    #[test]
    fn test_no_supporting_reads() {
        let pileup = vec![vec![ins_read(b"ACGTAGTTCCC", 3)]];
        let cons = InsertionConsensus::new(&pileup, &[0, 1, 3], 3);
        // nothing carries a 1 bp insertion
        assert_eq!(Base::to_ascii_string(cons.sequence(1)), "N");
    }
}
