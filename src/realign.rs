/*!
Scores a read against the consensus pair of one candidate type.
Lower scores are better. A packed score keeps the raw alignment cost in the upper bits and a length-normalized, repeat-adjusted score in the low 8 bits.
```
use indel_con::realign::{normalized_score, pack_score, raw_score, UNINFORMATIVE_SCORE};
let packed = pack_score(30, 10);
assert_eq!(raw_score(packed), 30);
assert_eq!(normalized_score(packed), 10);
assert_eq!(raw_score(UNINFORMATIVE_SCORE), 0xffff);
```
*/

use log::trace;

use crate::base::Base;
use crate::indel_config::IndelConfig;
use crate::pileup::PileupRead;
use crate::sequence_alignment::GlocalAligner;
use crate::tandem_repeat::RepeatFinder;

/// Score given to reads that could not be aligned, worse than any real score
pub const UNINFORMATIVE_SCORE: u32 = 0xffffff;
/// Raw scores are capped so that a packed score never exceeds `UNINFORMATIVE_SCORE`
const MAX_RAW_SCORE: u32 = 0xffff;
/// Base qualities are clamped into this range before use
const MIN_BASE_QUAL: u8 = 7;
const MAX_BASE_QUAL: u8 = 30;

/// Combines a raw alignment cost and a normalized score
pub fn pack_score(raw: u32, normalized: u8) -> u32 {
    raw.min(MAX_RAW_SCORE) << 8 | normalized as u32
}

/// The raw alignment cost of a packed score
pub fn raw_score(packed: u32) -> u32 {
    packed >> 8
}

/// The normalized score of a packed score
pub fn normalized_score(packed: u32) -> u8 {
    (packed & 0xff) as u8
}

/// Longest repeat seen covering the site across all scored reads
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RepeatStats {
    /// Longest repeat span
    pub max_span: usize,
    /// Most motif copies
    pub max_copies: usize
}

/// Coordinates of one read alignment against the consensus window
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReadWindow {
    /// First read offset to align
    pub qbeg: usize,
    /// One past the last read offset to align
    pub qend: usize,
    /// Offset of the site relative to `qbeg`
    pub qpos: usize,
    /// Reference coordinate where the consensus targets start
    pub tbeg: usize,
    /// Reference coordinate where the (primary, secondary) consensus targets end
    pub tend: [usize; 2],
    /// First reference coordinate covered by the read
    pub r_start: usize,
    /// Last reference coordinate covered by the read
    pub r_end: usize
}

/// Scores reads against consensus sequences with a pluggable aligner and repeat finder
#[derive(Debug)]
pub struct Realigner<'a, A: GlocalAligner, F: RepeatFinder> {
    aligner: &'a A,
    finder: &'a F,
    /// Weight that favors alignments consuming more target than query
    del_bias: f64,
    /// Scale applied to the normalized score
    indel_bias: f64
}

impl<'a, A: GlocalAligner, F: RepeatFinder> Realigner<'a, A, F> {
    /// Constructor
    pub fn new(aligner: &'a A, finder: &'a F, config: &IndelConfig) -> Realigner<'a, A, F> {
        Realigner {
            aligner,
            finder,
            del_bias: config.del_bias,
            indel_bias: config.indel_bias
        }
    }

    /// Scores one read against a consensus pair and returns the packed score.
    /// Unknown bases padding the targets are trimmed down to `|indel_type|`, the best of the two targets is kept, and repeats covering the site raise the normalized score.
    /// Reads that cannot be aligned get `UNINFORMATIVE_SCORE`.
    /// # Arguments
    /// * `read` - the read to score
    /// * `consensus` - the (primary, secondary) consensus sequences
    /// * `cons_left` - reference coordinate of the first consensus base
    /// * `window` - the read and target coordinates to align
    /// * `indel_type` - the candidate size being scored
    /// * `qavg` - average base quality around the site over all reads
    /// * `repeat_stats` - updated with repeats covering the site
    pub fn score(
        &self, read: &PileupRead, consensus: [&[Base]; 2], cons_left: usize, window: ReadWindow,
        indel_type: i32, qavg: f64, repeat_stats: &mut RepeatStats
    ) -> u32 {
        let atype = indel_type.unsigned_abs() as usize;
        if window.tbeg < cons_left || window.qend <= window.qbeg || window.qend > read.len() {
            return UNINFORMATIVE_SCORE;
        }

        let mut tbeg = window.tbeg;
        let mut tend = [0; 2];
        for (c, te) in tend.iter_mut().enumerate() {
            *te = window.tend[c].min(cons_left + consensus[c].len()).max(tbeg);
        }
        let at = |c: usize, ref_pos: usize| consensus[c][ref_pos - cons_left];

        // only unknown bases shared by both targets are trimmed from the start
        let span = (tend[0] - tbeg).min(tend[1] - tbeg);
        let leading = (0..span)
            .take_while(|&l| at(0, tbeg + l) == Base::N && at(1, tbeg + l) == Base::N)
            .count();
        if leading > atype {
            tbeg += leading - atype;
        }
        for (c, te) in tend.iter_mut().enumerate() {
            let te_start = (*te).max(tbeg);
            let trailing = (tbeg..te_start).rev()
                .take_while(|&p| at(c, p) == Base::N)
                .count();
            *te = te_start;
            if trailing > atype {
                *te -= trailing - atype;
            }
        }
        let target = |c: usize| &consensus[c][tbeg - cons_left..tend[c] - cons_left];

        let query = &read.sequence()[window.qbeg..window.qend];
        let quals: Vec<u8> = read.qualities()[window.qbeg..window.qend].iter()
            .map(|q| (*q).clamp(MIN_BASE_QUAL, MAX_BASE_QUAL))
            .collect();

        // repeats in the secondary covering the site
        let mut repeat_score = 0;
        let mut qual_sum = 0.0;
        let mut qual_count = 0;
        let mut qual_min = u8::MAX;
        for rep in self.finder.find_repeats(target(1)).iter().filter(|r| r.covers(window.qpos)) {
            let span = rep.span();
            repeat_score += span / rep.period;
            repeat_stats.max_span = repeat_stats.max_span.max(span);
            repeat_stats.max_copies = repeat_stats.max_copies.max(span / rep.period);
            for &q in quals.get(rep.start..rep.last().min(quals.len())).unwrap_or(&[]) {
                qual_sum += q as f64;
                qual_min = qual_min.min(q);
                qual_count += 1;
            }
            // a repeat running off the read end does not confirm the indel length
            if rep.start + tbeg <= window.r_start || rep.last() + tbeg >= window.r_end {
                repeat_score += 2 * span;
            }
        }
        let (repeat_qual, repeat_min_qual) = if qual_count > 0 {
            (qual_sum / qual_count as f64, qual_min as f64)
        } else {
            (qavg, qavg)
        };
        let mismatch_cost = repeat_min_qual.min(MAX_BASE_QUAL as f64);

        let secondary_score = self.glocal_score(target(1), query, mismatch_cost);
        let primary_score = if target(0) != target(1) {
            self.glocal_score(target(0), query, mismatch_cost)
        } else {
            None
        };
        let best = match (primary_score, secondary_score) {
            (Some(p), Some(s)) => p.min(s),
            (Some(sc), None) | (None, Some(sc)) => sc,
            (None, None) => {
                trace!("read failed to align to type {indel_type}");
                return UNINFORMATIVE_SCORE;
            }
        };

        // truncated after every step
        let length_score = (0.5 * (100.0 * best as f64 / query.len() as f64 + 0.499)) as i64;
        let repeat_adjusted = (length_score as f64 + repeat_score as f64 * (qavg / (repeat_min_qual + 1.0) + qavg / repeat_qual)) as i64;
        let normalized = (repeat_adjusted as f64 * self.indel_bias / 10.0).clamp(0.0, 255.0) as u8;
        pack_score(best, normalized)
    }

    /// Quality-weighted edit distance, or None if the alignment failed or the deletion bias drove it negative
    fn glocal_score(&self, target: &[Base], query: &[Base], mismatch_cost: f64) -> Option<u32> {
        let alignment = self.aligner.align(target, query)?;
        let length_delta = alignment.target_len() as f64 - query.len() as f64;
        let score = mismatch_cost * (alignment.edit_distance as f64 - self.del_bias * length_delta);
        if score < 0.0 {
            None
        } else {
            Some(score as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_htslib::bam::record::CigarString;
    use crate::indel_config::IndelConfigBuilder;
    use crate::sequence_alignment::EditDistanceAligner;
    use crate::tandem_repeat::StrFinder;

    fn deletion_read() -> PileupRead {
        PileupRead::new(0, CigarString::try_from("10M1D5M").unwrap(), b"AGCTACGAGGTGATA", vec![30; 15], 9, -1).unwrap()
    }

    fn window(tend: [usize; 2]) -> ReadWindow {
        ReadWindow { qbeg: 0, qend: 15, qpos: 9, tbeg: 0, tend, r_start: 0, r_end: 15 }
    }

    fn score(consensus: [&[u8]; 2], window: ReadWindow, indel_type: i32, stats: &mut RepeatStats) -> u32 {
        let aligner = EditDistanceAligner::default();
        let finder = StrFinder::default();
        let config = IndelConfig::default();
        let realigner = Realigner::new(&aligner, &finder, &config);
        let primary = Base::from_ascii_slice(consensus[0]);
        let secondary = Base::from_ascii_slice(consensus[1]);
        realigner.score(&deletion_read(), [&primary, &secondary], 0, window, indel_type, 30.0, stats)
    }

    #[test]
    fn test_exact_match() {
        let mut stats = RepeatStats::default();
        let cons = b"AGCTACGAGGTGATA";
        let packed = score([cons, cons], window([15, 15]), -1, &mut stats);
        assert_eq!(raw_score(packed), 0);
        assert_eq!(normalized_score(packed), 0);
        // GG covers the site
        assert_eq!(stats, RepeatStats { max_span: 1, max_copies: 1 });
    }

    #[test]
    fn test_missing_base() {
        let mut stats = RepeatStats::default();
        let cons = b"AGCTACGAGGGTGATA";
        let packed = score([cons, cons], window([16, 16]), 0, &mut stats);
        // one edit at the minimum repeat quality
        assert_eq!(raw_score(packed), 30);
        // 0.5 * (200 + .499) is 100, plus 2 * (30 / 31 + 30 / 30) is 103, scaled by 1/10
        assert_eq!(normalized_score(packed), 10);
        assert_eq!(stats, RepeatStats { max_span: 2, max_copies: 2 });
    }

    #[test]
    fn test_best_of_pair() {
        let mut stats = RepeatStats::default();
        let packed = score([b"AGCTACGAGGGTGATA", b"AGCTACGAGGTGATA"], window([16, 15]), 0, &mut stats);
        assert_eq!(raw_score(packed), 0);
        let packed = score([b"AGCTACGAGGTGATA", b"AGCTACGAGGGTGATA"], window([15, 16]), 0, &mut stats);
        assert_eq!(raw_score(packed), 0);
    }

    #[test]
    fn test_unknown_padding() {
        let mut stats = RepeatStats::default();
        let cons = b"AGCTACGAGGTGATANNNNNN";
        let packed = score([cons, cons], window([21, 21]), -1, &mut stats);
        assert_eq!(raw_score(packed), 0);
    }

    #[test]
    fn test_uninformative() {
        let mut stats = RepeatStats::default();
        let cons = b"AGCTACGAGGTGATA";
        let mut empty = window([15, 15]);
        empty.qend = 0;
        assert_eq!(score([cons, cons], empty, -1, &mut stats), UNINFORMATIVE_SCORE);

        // aligner gives up on everything
        let aligner = EditDistanceAligner::with_max_edit_distance(0);
        let finder = StrFinder::default();
        let config = IndelConfig::default();
        let realigner = Realigner::new(&aligner, &finder, &config);
        let target = Base::from_ascii_slice(b"TTTTTTTTTTTTTTTT");
        let packed = realigner.score(&deletion_read(), [&target, &target], 0, window([16, 16]), 0, 30.0, &mut stats);
        assert_eq!(packed, UNINFORMATIVE_SCORE);
    }

    #[test]
    fn test_deletion_bias() {
        // a bias above 1 makes consuming extra target negative, which counts as a failed alignment
        let aligner = EditDistanceAligner::default();
        let finder = StrFinder::default();
        let config = IndelConfigBuilder::default()
            .del_bias(2.0)
            .build().unwrap();
        let realigner = Realigner::new(&aligner, &finder, &config);
        let target = Base::from_ascii_slice(b"AGCTACGAGGGTGATA");
        let mut stats = RepeatStats::default();
        let packed = realigner.score(&deletion_read(), [&target, &target], 0, window([16, 16]), 0, 30.0, &mut stats);
        assert_eq!(packed, UNINFORMATIVE_SCORE);
    }
}
