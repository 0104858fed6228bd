/*!
This module builds the per-sample consensus sequences that reads are realigned against.
For each candidate indel size, the reads carrying that size form the in-group and everything else the out-group.
The out-group is blended in at low weight to correct sequencing errors in shallow in-groups, and two consensuses are called:
the primary takes the more likely side of every heterozygous event, the secondary takes the less likely side.

# Example usage
```rust
use rust_htslib::bam::record::CigarString;
use indel_con::consensus::ConsensusBuilder;
use indel_con::pileup::PileupRead;

let reference = b"AGCTATGAGGCTGATA";
// 1 bp deletion after position 9
let reads: Vec<PileupRead> = (0..5)
    .map(|_| PileupRead::new(0, CigarString::try_from("10M1D5M").unwrap(), b"AGCTATGAGGTGATA", vec![30; 15], 9, -1).unwrap())
    .collect();

let builder = ConsensusBuilder::new(reference, 9, 0, reference.len(), -1, 2).unwrap();
let pair = builder.build(&reads, -1);
assert_eq!(pair.primary_string(), "AGCTATGAGGTGATA");
assert_eq!(pair.secondary(), pair.primary());
assert_eq!(pair.site_offset(), 10);
```
*/

use log::trace;
use rust_htslib::bam::record::Cigar;
use simple_error::bail;

use crate::base::{Base, BoundedSeq};
use crate::frequency::{blend_counts, blend_fraction, blend_insertions, BaseCounts, InsertionTally};
use crate::pileup::PileupRead;

/// Fraction of the depth the top base needs, otherwise N
const BASE_CUTOFF: f64 = 0.40;
/// Fraction of the depth a gap needs to be taken as homozygous
const HOM_DEL_CUTOFF: f64 = 0.80;
/// Fraction of the depth an insertion needs to enter the primary consensus
const HET_INS_CUTOFF: f64 = 0.40;
/// Fraction of the depth an insertion needs to be taken as homozygous
const HOM_INS_CUTOFF: f64 = 0.80;
/// Fraction of the insertion votes the best insertion needs to be written as bases rather than N
const INS_SEQ_CUTOFF: f64 = 0.60;
/// Lower fraction for an event to be deferred to the secondary consensus
const MINOR_HET_CUTOFF: f64 = 0.30;

/// A pair of consensus sequences for one sample and candidate type
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConsensusPair {
    /// Consensus with the more likely side of each heterozygous event
    primary: Vec<Base>,
    /// Consensus with the less likely side of each heterozygous event
    secondary: Vec<Base>,
    /// Offset in the primary consensus of the first window position after the site
    site_offset: usize,
    /// Net bases inserted (+) or deleted (-) in the primary consensus before the site
    left_shift: i32,
    /// Bases inserted or deleted in the primary consensus at or after the site
    right_shift: i32,
    /// Largest deviation from the diagonal seen in any read alignment inside the window
    band: usize
}

impl ConsensusPair {
    // Getters
    pub fn primary(&self) -> &[Base] {
        &self.primary
    }

    pub fn secondary(&self) -> &[Base] {
        &self.secondary
    }

    pub fn site_offset(&self) -> usize {
        self.site_offset
    }

    pub fn left_shift(&self) -> i32 {
        self.left_shift
    }

    pub fn right_shift(&self) -> i32 {
        self.right_shift
    }

    pub fn band(&self) -> usize {
        self.band
    }

    pub fn primary_string(&self) -> String {
        Base::to_ascii_string(&self.primary)
    }

    pub fn secondary_string(&self) -> String {
        Base::to_ascii_string(&self.secondary)
    }
}

/// Heterozygous decision from the primary pass, consumed by the secondary pass
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum HetMark {
    /// Not heterozygous, or already used by the primary
    #[default]
    Settled,
    /// Plausible minor allele left out of the primary, so the secondary takes it
    Deferred
}

/// Frequency tables for one candidate over the whole window
#[derive(Debug, Default)]
struct WindowTallies {
    /// Bases and gaps from reads carrying the candidate
    in_bases: Vec<BaseCounts>,
    /// Insertions from reads carrying the candidate, placed before the base at the same index
    in_ins: Vec<InsertionTally>,
    /// Bases and gaps from all other reads
    out_bases: Vec<BaseCounts>,
    /// Insertions from all other reads
    out_ins: Vec<InsertionTally>,
    /// Largest deviation from the diagonal
    band: usize
}

impl WindowTallies {
    fn new(len: usize) -> WindowTallies {
        WindowTallies {
            in_bases: vec![Default::default(); len],
            in_ins: vec![Default::default(); len],
            out_bases: vec![Default::default(); len],
            out_ins: vec![Default::default(); len],
            band: 0
        }
    }
}

/// Builds consensus pairs over a fixed reference window around a site
#[derive(Clone, Debug)]
pub struct ConsensusBuilder<'a> {
    /// ASCII reference
    reference: &'a [u8],
    /// The site, the base before the indel
    pos: usize,
    /// First reference coordinate of the window
    left: usize,
    /// One past the last reference coordinate of the window
    right: usize,
    /// Most negative candidate size at the site, or 0
    biggest_del: i32,
    /// Minimum count for a heterozygous event to be considered
    min_support: usize
}

impl<'a> ConsensusBuilder<'a> {
    /// Constructor
    /// # Arguments
    /// * `reference` - ASCII reference sequence
    /// * `pos` - the site, the base before the indel
    /// * `left` - first reference coordinate of the window
    /// * `right` - one past the last reference coordinate of the window
    /// * `biggest_del` - most negative candidate size, or 0
    /// * `min_support` - minimum count for a heterozygous event
    /// # Errors
    /// * if the window does not contain `pos` or runs past the reference
    pub fn new(reference: &'a [u8], pos: usize, left: usize, right: usize, biggest_del: i32, min_support: usize) -> Result<ConsensusBuilder<'a>, Box<dyn std::error::Error>> {
        if left > pos || pos >= right {
            bail!("Window [{left}, {right}) does not contain site {pos}");
        }
        if right > reference.len() {
            bail!("Window end {right} is past the reference length {}", reference.len());
        }
        Ok(ConsensusBuilder {
            reference,
            pos,
            left,
            right,
            biggest_del: biggest_del.min(0),
            min_support
        })
    }

    /// Builds the consensus pair for the reads of one sample and one candidate size
    /// # Arguments
    /// * `reads` - all reads of the sample
    /// * `indel_type` - the candidate size; reads with this indel form the in-group
    pub fn build(&self, reads: &[PileupRead], indel_type: i32) -> ConsensusPair {
        let mut tallies = self.tally_reads(reads, indel_type);
        self.blend(&mut tallies);
        for tally in tallies.in_ins.iter_mut() {
            tally.merge_equal_lengths();
        }
        let pair = self.call(&tallies, indel_type);
        trace!("type {indel_type} primary   {}", pair.primary_string());
        trace!("type {indel_type} secondary {}", pair.secondary_string());
        pair
    }

    /// Index in the window of the site
    fn site_index(&self) -> usize {
        self.pos - self.left
    }

    fn window_len(&self) -> usize {
        self.right - self.left
    }

    /// Walks every read alignment and fills the in-group and out-group tables
    fn tally_reads(&self, reads: &[PileupRead], indel_type: i32) -> WindowTallies {
        let mut tallies = WindowTallies::new(self.window_len());
        let window = self.left..self.right;
        let after_site = self.pos + 1;

        for read in reads.iter() {
            let in_group = read.indel() == indel_type;
            let sequence = read.sequence();
            let mut x = read.ref_start();
            let mut y = 0;
            let mut local_band: i64 = 0;
            let mut local_band_max: u64 = 0;

            for op in read.cigar().iter() {
                let l = op.len() as usize;
                match op {
                    Cigar::SoftClip(_) => y += l,
                    Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) => {
                        for _ in 0..l {
                            if window.contains(&x) {
                                let base = sequence.get(y).copied().unwrap_or(Base::N);
                                if in_group {
                                    tallies.in_bases[x - self.left].add(base, 1);
                                } else if x != after_site {
                                    tallies.out_bases[x - self.left].add(base, 1);
                                }
                            }
                            x += 1;
                            y += 1;
                        }
                    },
                    Cigar::Ins(_) => {
                        if window.contains(&x) {
                            local_band += l as i64;
                            local_band_max = local_band_max.max(local_band.unsigned_abs());

                            let end = (y + l).min(sequence.len());
                            let inserted = BoundedSeq::from_bases(sequence[y.min(end)..end].iter().copied());
                            if in_group {
                                tallies.in_ins[x - self.left].add(&inserted, 1);
                            } else if x != after_site {
                                tallies.out_ins[x - self.left].add(&inserted, 1);
                            }
                        }
                        y += l;
                    },
                    Cigar::Del(_) => {
                        if window.contains(&x) {
                            local_band -= l as i64;
                            local_band_max = local_band_max.max(local_band.unsigned_abs());
                        }

                        // deletions spanning the site with another size are held back from the out-group
                        let mut skip_to: Option<usize> = None;
                        let matches_type = (in_group && !read.is_del()) ||
                            (read.indel() == 0 && read.is_del() && l as i64 == -(indel_type as i64));
                        for xd in x..(x + l) {
                            if !window.contains(&xd) {
                                continue;
                            }
                            if matches_type {
                                tallies.in_bases[xd - self.left].add(Base::Gap, 1);
                            } else if xd + l <= after_site || skip_to.map_or(false, |s| xd > s) {
                                tallies.out_bases[xd - self.left].add(Base::Gap, 1);
                            } else if xd <= self.pos && xd + l > after_site && skip_to.map_or(true, |s| xd > s) {
                                skip_to = Some(xd + l);
                            }
                        }
                        x += l;
                    },
                    Cigar::RefSkip(_) => x += l,
                    Cigar::HardClip(_) | Cigar::Pad(_) => {}
                };
            }

            tallies.band = tallies.band.max(local_band_max as usize);
        }

        tallies
    }

    /// Adds a depth-dependent share of the out-group into the in-group, except over the candidate deletion itself
    fn blend(&self, tallies: &mut WindowTallies) {
        let protected = (self.pos + 1)..(self.pos + 1 + self.biggest_del.unsigned_abs() as usize);
        for i in 0..self.window_len() {
            if protected.contains(&(self.left + i)) {
                continue;
            }
            let in_depth = tallies.in_bases[i].total() + tallies.in_ins[i].total();
            let out_depth = tallies.out_bases[i].total() + tallies.out_ins[i].total();
            let fraction = blend_fraction(in_depth, out_depth);

            let out_bases = tallies.out_bases[i];
            blend_counts(&mut tallies.in_bases[i], &out_bases, fraction);
            let (in_ins, out_ins) = (&mut tallies.in_ins, &tallies.out_ins);
            blend_insertions(&mut in_ins[i], &out_ins[i], fraction);
        }
    }

    /// Calls the primary and then the secondary consensus from the blended tables
    fn call(&self, tallies: &WindowTallies, indel_type: i32) -> ConsensusPair {
        let len = self.window_len();
        let site = self.site_index() as i64;
        let tot_threshold = |v: u32, tot: u32, cutoff: f64| v as f64 > cutoff * tot as f64;

        let mut ins_marks = vec![HetMark::Settled; len];
        let mut del_marks = vec![HetMark::Settled; len];
        let mut left_shift: i32 = 0;
        let mut right_shift: i32 = 0;
        let mut site_offset: Option<usize> = None;
        let mut consensuses: [Vec<Base>; 2] = [vec![], vec![]];

        for (pass, cons) in consensuses.iter_mut().enumerate() {
            let primary = pass == 0;
            for i in 0..len {
                if site_offset.is_none() && i as i64 >= site + 1 {
                    site_offset = Some(cons.len());
                }

                let counts = &tallies.in_bases[i];
                let tot = counts.total();
                let ((mut max_b, mut max_v), (second_b, second_v)) = counts.top_two();

                // insertions sit before the base at this index
                if let Some((best_ins, max_ins)) = tallies.in_ins[i].best() {
                    let always_ins = (i as i64 == site + 1 && indel_type > 0) ||
                        tot_threshold(max_ins, tot, HOM_INS_CUTOFF);
                    let mut het_ins = false;
                    if !always_ins && max_ins as usize >= self.min_support {
                        if primary {
                            het_ins = tot_threshold(max_ins, tot, HET_INS_CUTOFF);
                            if !het_ins && tot_threshold(max_ins, tot, MINOR_HET_CUTOFF) {
                                ins_marks[i] = HetMark::Deferred;
                            }
                        } else {
                            het_ins = ins_marks[i] == HetMark::Deferred;
                        }
                    }

                    if always_ins || het_ins {
                        if tot_threshold(max_ins, tallies.in_ins[i].total(), INS_SEQ_CUTOFF) {
                            for &b in best_ins.bases().iter() {
                                if primary {
                                    if (cons.len() as i64) < site + left_shift as i64 {
                                        left_shift += 1;
                                    } else {
                                        right_shift += 1;
                                    }
                                }
                                cons.push(b);
                            }
                        } else {
                            cons.extend(std::iter::repeat(Base::N).take(best_ins.len()));
                        }
                    }
                }

                let gaps = counts.get(Base::Gap);
                let in_candidate_del = indel_type < 0 && i as i64 > site && i as i64 <= site - indel_type as i64;
                let always_del = in_candidate_del || tot_threshold(gaps, tot, HOM_DEL_CUTOFF);
                let mut het_del = false;
                if !always_del && gaps as usize >= self.min_support {
                    if primary {
                        het_del = gaps as f64 >= BASE_CUTOFF * tot as f64;
                        let in_any_del = i as i64 > site && i as i64 <= site - self.biggest_del as i64;
                        if !in_any_del && !het_del && gaps as f64 >= MINOR_HET_CUTOFF * tot as f64 {
                            del_marks[i] = HetMark::Deferred;
                        }
                    } else {
                        het_del = del_marks[i] == HetMark::Deferred;
                        if max_b == Base::Gap && !het_del {
                            // the primary took the gap, so the secondary takes the runner up
                            max_b = second_b;
                            max_v = second_v;
                        }
                    }
                }

                if always_del || het_del {
                    if primary {
                        if (cons.len() as i64) < site + left_shift as i64 {
                            left_shift -= 1;
                        } else {
                            right_shift += 1;
                        }
                    }
                } else if tot_threshold(max_v, tot, BASE_CUTOFF) {
                    cons.push(max_b);
                } else if max_v > 0 {
                    cons.push(Base::N);
                } else {
                    cons.push(Base::from_ascii(self.reference[self.left + i]));
                }
            }
        }

        let [primary, secondary] = consensuses;
        ConsensusPair {
            site_offset: site_offset.unwrap_or(primary.len()),
            primary,
            secondary,
            left_shift,
            right_shift,
            band: tallies.band
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_htslib::bam::record::CigarString;

    const REFERENCE: &[u8] = b"AGCTATGAGGCTGATA";

    fn read(cigar: &str, seq: &[u8], qpos: usize, indel: i32) -> PileupRead {
        PileupRead::new(0, CigarString::try_from(cigar).unwrap(), seq, vec![30; seq.len()], qpos, indel).unwrap()
    }

    /// 24 reads with a 1 bp deletion and a SNP at 5, plus one noisy reference read
    fn deletion_pileup() -> Vec<PileupRead> {
        let mut reads: Vec<PileupRead> = (0..24)
            .map(|_| read("10M1D5M", b"AGCTACGAGGTGATA", 9, -1))
            .collect();
        reads.push(read("16M", b"AGGTAGGAGGGTGATA", 9, 0));
        reads
    }

    fn builder() -> ConsensusBuilder<'static> {
        ConsensusBuilder::new(REFERENCE, 9, 0, REFERENCE.len(), -1, 2).unwrap()
    }

    #[test]
    fn test_bad_window() {
        assert!(ConsensusBuilder::new(REFERENCE, 9, 10, 16, 0, 2).is_err());
        assert!(ConsensusBuilder::new(REFERENCE, 9, 0, 9, 0, 2).is_err());
        assert!(ConsensusBuilder::new(REFERENCE, 9, 0, 17, 0, 2).is_err());
    }

    #[test]
    fn test_deletion_consensus() {
        let pair = builder().build(&deletion_pileup(), -1);
        assert_eq!(pair.primary_string(), "AGCTACGAGGTGATA");
        assert_eq!(pair.secondary_string(), "AGCTACGAGGTGATA");
        assert_eq!(pair.site_offset(), 10);
        assert_eq!(pair.left_shift(), 0);
        assert_eq!(pair.right_shift(), 1);
        assert_eq!(pair.band(), 1);
    }

    #[test]
    fn test_shallow_reference_consensus() {
        // one reference read is overruled by the blended deletion reads away from the site
        let pair = builder().build(&deletion_pileup(), 0);
        assert_eq!(pair.primary_string(), "AGCTACGAGGGTGATA");
        assert_eq!(pair.right_shift(), 0);
        // band covers every read, not just the in-group
        assert_eq!(pair.band(), 1);
    }

    #[test]
    fn test_insertion_consensus() {
        //                      site at 9, then AT inserted
        let reads: Vec<PileupRead> = (0..6)
            .map(|_| read("10M2I6M", b"AGCTATGAGGATCTGATA", 9, 2))
            .collect();
        let builder = ConsensusBuilder::new(REFERENCE, 9, 0, REFERENCE.len(), 0, 2).unwrap();
        let pair = builder.build(&reads, 2);
        assert_eq!(pair.primary_string(), "AGCTATGAGGATCTGATA");
        assert_eq!(pair.site_offset(), 10);
        assert_eq!(pair.right_shift(), 2);
        assert_eq!(pair.band(), 2);
    }

    #[test]
    fn test_het_secondary() {
        // half the reference reads carry a SNP at 3, the other half a 1 bp deletion at 3
        let mut reads = vec![];
        for _ in 0..5 {
            reads.push(read("16M", b"AGCAATGAGGCTGATA", 9, 0));
        }
        for _ in 0..4 {
            reads.push(read("3M1D12M", b"AGCATGAGGCTGATA", 9, 0));
        }
        let builder = ConsensusBuilder::new(REFERENCE, 9, 0, REFERENCE.len(), 0, 2).unwrap();
        let pair = builder.build(&reads, 0);
        // 4 of 9 is enough for the primary to take the deletion
        assert_eq!(pair.primary_string(), "AGCATGAGGCTGATA");
        assert_eq!(pair.left_shift(), -1);
        // the deletion was already used, so the secondary keeps the majority base
        assert_eq!(pair.secondary_string(), "AGCAATGAGGCTGATA");
    }

    #[test]
    fn test_deferred_deletion() {
        // 3 of 9 is too weak for the primary but is deferred to the secondary
        let mut reads = vec![];
        for _ in 0..6 {
            reads.push(read("16M", b"AGCTATGAGGCTGATA", 9, 0));
        }
        for _ in 0..3 {
            reads.push(read("3M1D12M", b"AGCATGAGGCTGATA", 9, 0));
        }
        let builder = ConsensusBuilder::new(REFERENCE, 9, 0, REFERENCE.len(), 0, 2).unwrap();
        let pair = builder.build(&reads, 0);
        assert_eq!(pair.primary_string(), "AGCTATGAGGCTGATA");
        assert_eq!(pair.secondary_string(), "AGCATGAGGCTGATA");
        // shifts only track the primary
        assert_eq!(pair.left_shift(), 0);
    }

    #[test]
    fn test_empty_window_uses_reference() {
        let pair = builder().build(&[], 0);
        assert_eq!(pair.primary(), Base::from_ascii_slice(REFERENCE).as_slice());
        assert_eq!(pair.secondary(), pair.primary());
    }

    #[test]
    fn test_length_bound() {
        let pileup = deletion_pileup();
        for t in [-1, 0] {
            let pair = builder().build(&pileup, t);
            // window plus longest insertion
            assert!(pair.primary().len() <= REFERENCE.len());
            assert!(pair.secondary().len() <= REFERENCE.len());
        }
    }

    #[test]
    fn test_length_bound_insertion() {
        // heterozygous 2 bp insertion, in a window narrower than the reads
        let mut reads = vec![];
        for _ in 0..4 {
            reads.push(read("10M2I6M", b"AGCTATGAGGATCTGATA", 9, 2));
            reads.push(read("16M", REFERENCE, 9, 0));
        }
        let (left, right, max_ins) = (2, 14, 2);
        let builder = ConsensusBuilder::new(REFERENCE, 9, left, right, 0, 2).unwrap();
        for t in [0, 2] {
            let pair = builder.build(&reads, t);
            assert!(pair.primary().len() <= (right - left) + max_ins);
            assert!(pair.secondary().len() <= (right - left) + max_ins);
        }
        // the insertion type fills the bound
        assert_eq!(builder.build(&reads, 2).primary().len(), (right - left) + max_ins);
    }
}
