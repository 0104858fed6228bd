/*!
Per-position frequency tables used to build a consensus, and the pure helpers that blend them.
Bases and gaps are counted in a `BaseCounts`, while inserted sequences are tracked as whole strings in an `InsertionTally`.
```
use indel_con::base::{Base, BoundedSeq};
use indel_con::frequency::{blend_fraction, BaseCounts, InsertionTally};

let mut counts = BaseCounts::default();
counts.add(Base::C, 24);
counts.add(Base::G, 1);
assert_eq!(counts.total(), 25);

let mut tally = InsertionTally::default();
tally.add(&BoundedSeq::from_bases(Base::from_ascii_slice(b"AT")), 3);
assert_eq!(tally.total(), 3);

// a lone in-group read borrows most of a deep out-group
assert!(blend_fraction(1, 24) > 0.6);
```
*/

use rustc_hash::FxHashMap as HashMap;

use crate::base::{Base, BoundedSeq, ALPHABET_SIZE, READ_ALPHABET_SIZE};

/// Maximum number of distinct inserted sequences tracked at one position; later distinct ones are dropped
pub const MAX_INSERTION_ALTERNATIVES: usize = 100;
/// Fraction of an offset's votes the top base needs in a merged insertion, otherwise it is N
pub const INSERTION_BASE_CUTOFF: f64 = 0.6;

/// Counts of A, C, G, T, N and gap at one position
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BaseCounts([u32; ALPHABET_SIZE]);

impl BaseCounts {
    pub fn add(&mut self, base: Base, count: u32) {
        self.0[base.index()] += count;
    }

    pub fn get(&self, base: Base) -> u32 {
        self.0[base.index()]
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Returns the best and second best (base, count), preferring the earlier base on ties.
    /// Either defaults to (N, 0) when nothing was observed.
    pub fn top_two(&self) -> ((Base, u32), (Base, u32)) {
        let mut first = (Base::N, 0);
        let mut second = (Base::N, 0);
        for (i, &c) in self.0.iter().enumerate() {
            if first.1 < c {
                second = first;
                first = (Base::from_index(i), c);
            } else if second.1 < c {
                second = (Base::from_index(i), c);
            }
        }
        (first, second)
    }
}

/// The distinct inserted sequences seen at one position with their frequencies, in first-seen order
#[derive(Clone, Debug, Default)]
pub struct InsertionTally {
    /// Sequences and frequencies
    alternatives: Vec<(BoundedSeq, u32)>,
    /// Lookup from sequence to index in `alternatives`
    index: HashMap<BoundedSeq, usize>
}

impl InsertionTally {
    /// Adds `freq` observations of `seq`.
    /// New sequences beyond `MAX_INSERTION_ALTERNATIVES` are discarded.
    pub fn add(&mut self, seq: &BoundedSeq, freq: u32) {
        if freq == 0 {
            return;
        }
        match self.index.get(seq) {
            Some(&i) => self.alternatives[i].1 += freq,
            None => {
                if self.alternatives.len() < MAX_INSERTION_ALTERNATIVES {
                    self.index.insert(seq.clone(), self.alternatives.len());
                    self.alternatives.push((seq.clone(), freq));
                }
            }
        };
    }

    /// Total number of observations
    pub fn total(&self) -> u32 {
        self.alternatives.iter().map(|(_s, f)| f).sum()
    }

    /// Returns the most frequent alternative, the earliest one on ties
    pub fn best(&self) -> Option<(&BoundedSeq, u32)> {
        let mut ret: Option<(&BoundedSeq, u32)> = None;
        for (seq, freq) in self.alternatives.iter() {
            if ret.map_or(true, |(_s, f)| f < *freq) {
                ret = Some((seq, *freq));
            }
        }
        ret
    }

    pub fn alternatives(&self) -> &[(BoundedSeq, u32)] {
        &self.alternatives
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Collapses all alternatives of the same length into one, keeping the position of the first.
    /// The merged sequence takes the majority base at each offset when it has more than 60% of the votes, N otherwise.
    /// Similar-length insertions placed at the same position are usually the same event with sequencing errors.
    pub fn merge_equal_lengths(&mut self) {
        let mut merged: Vec<(BoundedSeq, u32)> = vec![];
        let mut consumed = vec![false; self.alternatives.len()];
        for (j, (seq, freq)) in self.alternatives.iter().enumerate() {
            if consumed[j] {
                continue;
            }

            let mut votes: Vec<[u32; READ_ALPHABET_SIZE]> = vec![[0; READ_ALPHABET_SIZE]; seq.len()];
            let mut total_freq = 0;
            for (k, (other, other_freq)) in self.alternatives.iter().enumerate().skip(j) {
                if consumed[k] || other.len() != seq.len() {
                    continue;
                }
                for (v, b) in votes.iter_mut().zip(other.bases().iter()) {
                    v[b.index().min(READ_ALPHABET_SIZE - 1)] += other_freq;
                }
                total_freq += other_freq;
                consumed[k] = true;
            }
            debug_assert!(total_freq >= *freq);

            let consensus = BoundedSeq::from_bases(votes.iter().map(|v| {
                let tot: u32 = v.iter().sum();
                let mut best = (Base::A, 0);
                for (i, &c) in v.iter().enumerate() {
                    if best.1 < c {
                        best = (Base::from_index(i), c);
                    }
                }
                if best.1 as f64 > INSERTION_BASE_CUTOFF * tot as f64 { best.0 } else { Base::N }
            }));
            merged.push((consensus, total_freq));
        }

        self.index = merged.iter().enumerate()
            .map(|(i, (s, _f))| (s.clone(), i))
            .collect();
        self.alternatives = merged;
    }
}

/// Fraction of the out-group counts to add into the in-group at a position.
/// Shallow in-group data relative to the out-group borrows up to 75%, and at least ~1 read worth is always borrowed.
/// # Arguments
/// * `in_depth` - observations from reads matching the candidate
/// * `out_depth` - observations from all other reads
pub fn blend_fraction(in_depth: u32, out_depth: u32) -> f64 {
    let r = out_depth as f64;
    let t = in_depth as f64;
    let fraction = (r - 2.0 * t) * 0.75 / (r + 1.0);
    let floor = 1.01 / (r + 1e-10);
    fraction.max(floor)
}

/// Adds `fraction` of the out-group base counts into the in-group counts, rounding each contribution down
pub fn blend_counts(in_group: &mut BaseCounts, out_group: &BaseCounts, fraction: f64) {
    for b in Base::ALL {
        in_group.add(b, (fraction * out_group.get(b) as f64) as u32);
    }
}

/// Adds `fraction` of each out-group insertion into the in-group tally, rounding each contribution down
pub fn blend_insertions(in_group: &mut InsertionTally, out_group: &InsertionTally, fraction: f64) {
    for (seq, freq) in out_group.alternatives().iter() {
        in_group.add(seq, (fraction * *freq as f64) as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &[u8]) -> BoundedSeq {
        BoundedSeq::from_bases(Base::from_ascii_slice(s))
    }

    #[test]
    fn test_top_two() {
        let mut counts = BaseCounts::default();
        assert_eq!(counts.top_two(), ((Base::N, 0), (Base::N, 0)));

        counts.add(Base::G, 5);
        counts.add(Base::Gap, 7);
        counts.add(Base::A, 5);
        // A and G tie, A comes first
        assert_eq!(counts.top_two(), ((Base::Gap, 7), (Base::A, 5)));
        assert_eq!(counts.total(), 17);
    }

    #[test]
    fn test_tally_dedup() {
        let mut tally = InsertionTally::default();
        tally.add(&seq(b"AC"), 1);
        tally.add(&seq(b"AG"), 2);
        tally.add(&seq(b"AC"), 2);
        tally.add(&seq(b"T"), 0);
        assert_eq!(tally.alternatives().len(), 2);
        assert_eq!(tally.total(), 5);
        // tie goes to the first seen
        let (best, freq) = tally.best().unwrap();
        assert_eq!(best, &seq(b"AC"));
        assert_eq!(freq, 3);
    }

    #[test]
    fn test_tally_capacity() {
        let mut tally = InsertionTally::default();
        for i in 0..(MAX_INSERTION_ALTERNATIVES + 10) {
            // every length is a distinct sequence
            tally.add(&BoundedSeq::from_bases(vec![Base::A; i + 1]), 1);
        }
        assert_eq!(tally.alternatives().len(), MAX_INSERTION_ALTERNATIVES);
        // existing ones still accumulate
        tally.add(&seq(b"A"), 4);
        assert_eq!(tally.alternatives()[0].1, 5);
    }

    #[test]
    fn test_merge_equal_lengths() {
        let mut tally = InsertionTally::default();
        tally.add(&seq(b"ACT"), 4);
        tally.add(&seq(b"AT"), 1);
        tally.add(&seq(b"AGT"), 1);
        tally.add(&seq(b"CCT"), 2);
        tally.merge_equal_lengths();

        let alts = tally.alternatives();
        assert_eq!(alts.len(), 2);
        // first offset: A has 5 of 7 votes, second: C has 6 of 7
        assert_eq!(alts[0], (seq(b"ACT"), 7));
        assert_eq!(alts[1], (seq(b"AT"), 1));
    }

    #[test]
    fn test_merge_ambiguous() {
        let mut tally = InsertionTally::default();
        tally.add(&seq(b"AC"), 1);
        tally.add(&seq(b"GC"), 1);
        tally.merge_equal_lengths();
        assert_eq!(tally.alternatives(), &[(seq(b"NC"), 2)]);
        // lookups follow the merged sequence
        tally.add(&seq(b"NC"), 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn test_blend_fraction() {
        // deep in-group barely borrows
        assert!((blend_fraction(24, 1) - 1.01).abs() < 1e-9);
        // no out-group at all gives a huge fraction of nothing
        let mut counts = BaseCounts::default();
        blend_counts(&mut counts, &BaseCounts::default(), blend_fraction(3, 0));
        assert_eq!(counts.total(), 0);
        // shallow in-group borrows (24 - 2) * 0.75 / 25
        assert!((blend_fraction(1, 24) - 0.66).abs() < 1e-9);
    }

    #[test]
    fn test_blend_counts() {
        let mut in_group = BaseCounts::default();
        in_group.add(Base::G, 1);
        let mut out_group = BaseCounts::default();
        out_group.add(Base::C, 24);
        out_group.add(Base::Gap, 1);
        blend_counts(&mut in_group, &out_group, 0.66);
        assert_eq!(in_group.get(Base::C), 15);
        assert_eq!(in_group.get(Base::Gap), 0);
        assert_eq!(in_group.get(Base::G), 1);
    }
}
