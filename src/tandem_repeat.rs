/*!
Repeat context around a candidate indel: short tandem repeat intervals, the homopolymer run at the site, and how far an indel can slide along the reference.
```
use indel_con::base::Base;
use indel_con::tandem_repeat::{RepeatFinder, RepeatInterval, StrFinder};
let seq = Base::from_ascii_slice(b"GATTACACACACAGT");
let repeats = StrFinder::default().find_repeats(&seq);
assert!(repeats.contains(&RepeatInterval::new(4, 13, 2)));
```
*/

use rustc_hash::FxHashMap as HashMap;

use crate::base::Base;

/// Longest motif that is checked for repetition
pub const MAX_REPEAT_PERIOD: usize = 14;

/// A region `[start, end)` made of at least two consecutive copies of a motif of length `period`
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RepeatInterval {
    pub start: usize,
    pub end: usize,
    pub period: usize
}

impl RepeatInterval {
    pub fn new(start: usize, end: usize, period: usize) -> RepeatInterval {
        RepeatInterval { start, end, period }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Index of the last repeat base
    pub fn last(&self) -> usize {
        self.end.saturating_sub(1)
    }

    /// Distance from the first to the last repeat base, one less than the length.
    /// Repeat-based scores and window sizes are measured with this.
    pub fn span(&self) -> usize {
        self.last().saturating_sub(self.start)
    }

    /// True if `offset` is between the first and last repeat base, inclusive
    pub fn covers(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.last() && !self.is_empty()
    }

    fn contains(&self, other: &RepeatInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Anything that can locate tandem repeats in a sequence
pub trait RepeatFinder {
    /// Returns repeat intervals in `seq`, sorted by start.
    /// Intervals are half-open, `end` is one past the last repeat base.
    fn find_repeats(&self, seq: &[Base]) -> Vec<RepeatInterval>;
}

/// Exact-match tandem repeat finder.
/// A repeat of period `p` is any maximal run where every base equals the base `p` earlier, spanning at least two copies.
/// Unknown bases and gaps never extend a repeat.
/// Repeats whose motif is itself a repeat of a shorter motif already reported over the same span are dropped, so "AAAAAA" is one period-1 repeat and not also period 2 and 3.
#[derive(Clone, Copy, Debug)]
pub struct StrFinder {
    max_period: usize
}

impl Default for StrFinder {
    fn default() -> Self {
        Self { max_period: MAX_REPEAT_PERIOD }
    }
}

impl StrFinder {
    pub fn with_max_period(max_period: usize) -> StrFinder {
        StrFinder { max_period }
    }
}

impl RepeatFinder for StrFinder {
    fn find_repeats(&self, seq: &[Base]) -> Vec<RepeatInterval> {
        let mut ret: Vec<RepeatInterval> = vec![];
        // for each period, the repeats found so far; used to suppress multiples of a shorter period
        let mut by_period: HashMap<usize, Vec<RepeatInterval>> = Default::default();

        for period in 1..=self.max_period.min(seq.len() / 2) {
            let mut run_start: Option<usize> = None;
            for i in period..=seq.len() {
                let extends = i < seq.len() &&
                    seq[i] == seq[i - period] &&
                    seq[i] != Base::N && seq[i] != Base::Gap;

                match (extends, run_start) {
                    (true, None) => run_start = Some(i),
                    (false, Some(rs)) => {
                        run_start = None;
                        // matches run over [rs, i), which means the periodic region starts one motif earlier
                        if i - rs < period {
                            continue;
                        }
                        let candidate = RepeatInterval::new(rs - period, i, period);
                        let redundant = by_period.iter()
                            .filter(|(&p, _)| p < period && period % p == 0)
                            .any(|(_, reps)| reps.iter().any(|r| r.contains(&candidate)));
                        if !redundant {
                            by_period.entry(period).or_default().push(candidate);
                            ret.push(candidate);
                        }
                    },
                    _ => {}
                };
            }
        }

        ret.sort();
        ret
    }
}

/// Sum of the spans of all repeats
pub fn total_repeat_span(repeats: &[RepeatInterval]) -> usize {
    repeats.iter().map(|r| r.span()).sum()
}

/// Length of the reference homopolymer that contains the base right after `pos`, extending left across `pos`.
/// Returns 1 when that base is unknown or past the end of the reference.
/// # Arguments
/// * `reference` - the reference sequence, ASCII
/// * `pos` - the site, the base before the indel
pub fn homopolymer_run(reference: &[u8], pos: usize) -> usize {
    let c = match reference.get(pos + 1) {
        Some(&c) => Base::from_ascii(c),
        None => return 1
    };
    if c.is_unknown() {
        return 1;
    }

    let right = reference[pos + 1..].iter()
        .take_while(|&&r| Base::from_ascii(r) == c)
        .count();
    let left = reference[..=pos].iter().rev()
        .take_while(|&&r| Base::from_ascii(r) == c)
        .count();
    left + right
}

/// Estimates how many reference bases after `pos` are consistent with repeating the indel sequence, i.e. how far the indel could slide.
/// Each match scores +1, each mismatch -10, and the scan stops when the score goes negative; the best-scoring end is reported.
/// # Arguments
/// * `reference` - the reference sequence, ASCII
/// * `pos` - the site, the base before the indel
/// * `indel_len` - absolute size of the indel, must be non-zero
/// * `inserted` - the inserted sequence for insertions; deletions compare against the deleted reference bases
pub fn indel_region(reference: &[u8], pos: usize, indel_len: usize, inserted: Option<&[Base]>) -> usize {
    if indel_len == 0 {
        return 0;
    }

    let mut max_score = 0;
    let mut max_i = pos;
    let mut score: i64 = 0;
    for (j, i) in (pos + 1..reference.len()).enumerate() {
        let expected = match inserted {
            Some(ins) => ins.get(j % indel_len).copied().unwrap_or(Base::N),
            None => Base::from_ascii(reference[pos + 1 + j % indel_len])
        };
        score += if Base::from_ascii(reference[i]) == expected { 1 } else { -10 };
        if score < 0 {
            break;
        }
        if max_score < score {
            max_score = score;
            max_i = i;
        }
    }
    max_i - pos
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(seq: &[u8]) -> Vec<RepeatInterval> {
        StrFinder::default().find_repeats(&Base::from_ascii_slice(seq))
    }

    #[test]
    fn test_homopolymer_repeat() {
        let repeats = find(b"CGAAAAAATC");
        assert_eq!(repeats, vec![RepeatInterval::new(2, 8, 1)]);
        assert_eq!(repeats[0].last(), 7);
        assert_eq!(repeats[0].span(), 5);
        assert!(repeats[0].covers(2));
        assert!(repeats[0].covers(7));
        assert!(!repeats[0].covers(8));
    }

    #[test]
    fn test_dinucleotide_repeat() {
        let repeats = find(b"GATTACACACACAGT");
        // the TT homopolymer and the CA repeat
        assert_eq!(repeats, vec![
            RepeatInterval::new(2, 4, 1),
            RepeatInterval::new(4, 13, 2)
        ]);
        // spans of 1 and 8
        assert_eq!(total_repeat_span(&repeats), 9);
    }

    #[test]
    fn test_max_period() {
        let seq = Base::from_ascii_slice(b"GATTACACACACAGT");
        assert_eq!(StrFinder::with_max_period(1).find_repeats(&seq), vec![RepeatInterval::new(2, 4, 1)]);
        assert!(StrFinder::with_max_period(0).find_repeats(&seq).is_empty());
    }

    #[test]
    fn test_no_repeats() {
        assert!(find(b"ACGT").is_empty());
        assert!(find(b"").is_empty());
        // N never forms a repeat
        assert!(find(b"NNNNNN").is_empty());
    }

    #[test]
    fn test_homopolymer_run() {
        //             0123456789
        let reference = b"ACGTTTTTGA";
        // base after pos 2 is T, run covers 3..8
        assert_eq!(homopolymer_run(reference, 2), 5);
        // starting inside the run still counts the left part
        assert_eq!(homopolymer_run(reference, 4), 5);
        assert_eq!(homopolymer_run(reference, 0), 1);
        assert_eq!(homopolymer_run(b"ACNNA", 1), 1);
        assert_eq!(homopolymer_run(reference, 9), 1);
    }

    #[test]
    fn test_indel_region_deletion() {
        //                0123456789
        let reference = b"GGCACACATT";
        // deleting "CA" after pos 1 can slide across the CACACA
        assert_eq!(indel_region(reference, 1, 2, None), 6);
    }

    #[test]
    fn test_indel_region_insertion() {
        let reference = b"GGTTTTACG";
        let ins = Base::from_ascii_slice(b"T");
        assert_eq!(indel_region(reference, 1, 1, Some(&ins)), 4);
        let ins = Base::from_ascii_slice(b"C");
        assert_eq!(indel_region(reference, 1, 1, Some(&ins)), 0);
    }
}
