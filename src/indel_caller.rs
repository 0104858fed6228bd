/*!
Calls indels at a single pileup site.
The caller discovers candidate indel sizes, builds per-sample consensus sequences for each, realigns every read against them, and calibrates the resulting scores into per-read qualities.
When a site is called, every read receives an `IndelAnnotation` and up to four alleles are reported.

# Example usage
```rust
use rust_htslib::bam::record::CigarString;
use indel_con::indel_caller::IndelCaller;
use indel_con::indel_config::IndelConfig;
use indel_con::pileup::PileupRead;
use indel_con::read_stats::NoReadStats;

let reference = b"AGCTATGAGGCTGATA";
let mut reads: Vec<PileupRead> = (0..10)
    .map(|_| PileupRead::new(0, CigarString::try_from("10M1D5M").unwrap(), b"AGCTATGAGGTGATA", vec![30; 15], 9, -1).unwrap())
    .collect();
reads.extend((0..10).map(|_| PileupRead::new(0, CigarString::try_from("16M").unwrap(), reference, vec![30; 16], 9, 0).unwrap()));
let mut pileup = vec![reads];

let caller = IndelCaller::new(IndelConfig::default());
let call = caller.call_site(&mut pileup, 9, reference, &mut NoReadStats).unwrap().unwrap();
assert_eq!(call.indel_types(), [Some(0), Some(-1), None, None]);
assert_eq!(call.n_alt(), 10);
assert_eq!(pileup[0][0].annotation().unwrap().allele(), 1);
```
*/

use log::{debug, trace};
use simple_error::bail;
use std::cmp::Ordering;

use crate::allele_types::find_candidate_types;
use crate::base::Base;
use crate::calibration::QualityCalibrator;
use crate::cigar::{has_ref_skip, reference_len, reference_to_query};
use crate::consensus::ConsensusBuilder;
use crate::indel_config::IndelConfig;
use crate::insertion_consensus::InsertionConsensus;
use crate::pileup::{PileupRead, MAX_CALLED_ALLELES};
use crate::read_stats::{mapq_bucket, read_position, ReadStatsRecorder};
use crate::realign::{ReadWindow, Realigner, RepeatStats, UNINFORMATIVE_SCORE};
use crate::sequence_alignment::{EditDistanceAligner, GlocalAligner};
use crate::tandem_repeat::{homopolymer_run, indel_region, total_repeat_span, RepeatFinder, StrFinder};

/// Half-width of the read window used for the average base quality
const QUAL_WINDOW: usize = 50;
/// Extra context added to the narrowed long-read window
const MIN_WINDOW_PAD: usize = 10;
/// Extra slack added to the alignment band when bounding the targets
const BAND_PAD: usize = 20;

/// The outcome of a called site
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndelSiteCall {
    /// Called indel sizes by allele slot, the reference first
    indel_types: [Option<i32>; MAX_CALLED_ALLELES],
    /// Inserted sequence of each chosen slot
    insertion_consensus: InsertionConsensus,
    /// Number of reference bases after the site the indel could slide over
    indel_region: usize,
    /// Reads called as a non-reference allele
    n_alt: usize,
    /// Indel-carrying read count of the best-supported sample
    max_support: usize,
    /// Indel-carrying read fraction of the best-supported sample
    max_frac: f64,
    /// Longest repeat covering the site
    repeat_stats: RepeatStats,
    /// Homopolymer run length used for SeqQ
    homopolymer_run: usize
}

impl IndelSiteCall {
    // Getters
    pub fn indel_types(&self) -> [Option<i32>; MAX_CALLED_ALLELES] {
        self.indel_types
    }

    pub fn insertion_consensus(&self) -> &InsertionConsensus {
        &self.insertion_consensus
    }

    /// The inserted sequence of an allele slot, empty unless the slot is an insertion
    pub fn inserted_sequence(&self, slot: usize) -> &[Base] {
        if slot < self.insertion_consensus.num_slots() {
            self.insertion_consensus.sequence(slot)
        } else {
            &[]
        }
    }

    pub fn indel_region(&self) -> usize {
        self.indel_region
    }

    pub fn n_alt(&self) -> usize {
        self.n_alt
    }

    pub fn max_support(&self) -> usize {
        self.max_support
    }

    pub fn max_frac(&self) -> f64 {
        self.max_frac
    }

    pub fn repeat_stats(&self) -> RepeatStats {
        self.repeat_stats
    }

    pub fn homopolymer_run(&self) -> usize {
        self.homopolymer_run
    }
}

/// Indel caller with a pluggable aligner and repeat finder
#[derive(Debug, Default)]
pub struct IndelCaller<A: GlocalAligner = EditDistanceAligner, F: RepeatFinder = StrFinder> {
    config: IndelConfig,
    aligner: A,
    finder: F
}

impl IndelCaller {
    /// Creates a caller with the default edit-distance aligner and a tandem repeat finder limited to `config.max_repeat_period`
    pub fn new(config: IndelConfig) -> IndelCaller {
        let finder = StrFinder::with_max_period(config.max_repeat_period);
        IndelCaller {
            config,
            aligner: EditDistanceAligner::default(),
            finder
        }
    }
}

impl<A: GlocalAligner, F: RepeatFinder> IndelCaller<A, F> {
    /// Creates a caller with custom components
    /// # Arguments
    /// * `config` - thresholds and penalties
    /// * `aligner` - glocal aligner used to score reads
    /// * `finder` - tandem repeat finder
    pub fn with_components(config: IndelConfig, aligner: A, finder: F) -> IndelCaller<A, F> {
        IndelCaller { config, aligner, finder }
    }

    pub fn config(&self) -> &IndelConfig {
        &self.config
    }

    /// Tests a site for indels.
    /// Returns `Ok(None)` when the site is not called, in which case no read is modified.
    /// Otherwise every read in `pileup` gets an annotation and the chosen alleles are returned.
    /// Read statistics are recorded once per read for any site with candidate indels, called or not.
    /// # Arguments
    /// * `pileup` - the reads at the site, grouped by sample
    /// * `pos` - the site, the reference base before the indel
    /// * `reference` - ASCII reference sequence in the same coordinates as the reads
    /// * `stats` - receives per-read statistics
    /// # Errors
    /// * if `pos` is outside of the reference
    pub fn call_site<R: ReadStatsRecorder>(
        &self, pileup: &mut [Vec<PileupRead>], pos: usize, reference: &[u8], stats: &mut R
    ) -> Result<Option<IndelSiteCall>, Box<dyn std::error::Error>> {
        if pos >= reference.len() {
            bail!("Site {pos} is outside of a reference of length {}", reference.len());
        }

        if !pileup.iter().flatten().any(|r| r.indel() != 0) {
            debug!("pos {pos}: no indels");
            return Ok(None);
        }

        let qavg = self.site_quality(pileup, pos);
        let candidates = match find_candidate_types(pileup, pos, reference, &self.config) {
            Some(c) => c,
            None => return Ok(None)
        };
        let types = candidates.types();
        let n_types = types.len();

        // window grows with the largest candidate, deletions extend it to the right
        let magnitude = types[0].unsigned_abs().max(types[n_types - 1].unsigned_abs()) as usize;
        let max_indel = (20 * magnitude + self.config.indel_window / 4).min(self.config.indel_window);
        let biggest_del = candidates.biggest_deletion();
        let biggest_ins = candidates.biggest_insertion();
        let left = pos.saturating_sub(max_indel);
        let right = (pos + max_indel + biggest_del.unsigned_abs() as usize)
            .max(pos + 1)
            .min(reference.len());
        debug!("pos {pos}: window [{left}, {right}), qavg {qavg:.2}");

        let max_ins = biggest_ins as usize;
        let insertions = InsertionConsensus::new(pileup, types, max_ins);
        let site_indel_region = types.iter().enumerate()
            .map(|(t, &size)| match size.cmp(&0) {
                Ordering::Equal => 0,
                Ordering::Greater => indel_region(reference, pos, size as usize, Some(insertions.sequence(t))),
                Ordering::Less => indel_region(reference, pos, size.unsigned_abs() as usize, None)
            })
            .max()
            .unwrap_or(0);

        let mut run_len = homopolymer_run(reference, pos);
        let run_base = reference.get(pos + 1).map_or(Base::N, |&c| Base::from_ascii(c)).nibble();
        let mut run_ins: u8 = 0;
        let mut repeat_stats = RepeatStats { max_span: run_len, max_copies: run_len / 4 };

        let widest = biggest_del.unsigned_abs().max(biggest_ins.unsigned_abs()) as usize;
        let mut band = (biggest_ins - biggest_del) as usize;
        let builder = ConsensusBuilder::new(reference, pos, left, right, biggest_del, self.config.min_support)?;
        let realigner = Realigner::new(&self.aligner, &self.finder, &self.config);
        let mut scores: Vec<u32> = vec![0; candidates.num_reads() * n_types];

        for (t, &indel_type) in types.iter().enumerate() {
            let mut row = 0;
            for sample in pileup.iter() {
                let pair = builder.build(sample, indel_type);
                band = band.max(pair.band());
                let primary = pair.primary();
                let secondary = pair.secondary();

                // does the inserted sequence extend the flanking homopolymer
                if indel_type > 0 {
                    if let Some(&first) = primary.get(pair.site_offset()) {
                        let same = primary[pair.site_offset()..].iter()
                            .take(indel_type as usize)
                            .take_while(|&&b| b == first)
                            .count();
                        if same == indel_type as usize {
                            run_ins |= first.nibble();
                        }
                    }
                } else if indel_type < 0 {
                    run_ins |= 0xff;
                }

                let min_window = widest +
                    pair.left_shift().unsigned_abs() as usize +
                    pair.right_shift().unsigned_abs() as usize +
                    total_repeat_span(&self.finder.find_repeats(primary)) +
                    MIN_WINDOW_PAD;

                for read in sample.iter() {
                    let k = row;
                    row += 1;

                    if t == 0 {
                        let position = read_position(read, self.config.position_buckets);
                        stats.record(
                            read.indel() != 0,
                            mapq_bucket(read.mapq(), self.config.mapq_buckets),
                            position.softclip_len,
                            position.position_bucket
                        );
                    }

                    if read.is_unmapped() || has_ref_skip(read.cigar()) {
                        continue;
                    }

                    let is_long = read.len() > self.config.long_read_length;
                    let (left2, right2) = read_bounds(pos, left, right, min_window, is_long);

                    let r_start = read.ref_start();
                    let r_end = (r_start + reference_len(read.cigar())).saturating_sub(1);
                    let (qbeg, tbeg) = reference_to_query(r_start, read.cigar(), left2, false);
                    let (qpos, _) = reference_to_query(r_start, read.cigar(), pos, false);
                    let (qend, tend) = reference_to_query(r_start, read.cigar(), right2, true);

                    let wband = band + 2 * widest + BAND_PAD;
                    let tbeg = left2.max(tbeg.saturating_sub(wband));
                    let score = if tend > tbeg {
                        let window = ReadWindow {
                            qbeg,
                            qend,
                            qpos: qpos.saturating_sub(qbeg),
                            tbeg,
                            tend: [
                                (left + primary.len()).min(tend + wband),
                                (left + secondary.len()).min(tend + wband)
                            ],
                            r_start,
                            r_end
                        };
                        realigner.score(read, [primary, secondary], left, window, indel_type, qavg, &mut repeat_stats)
                    } else {
                        // read sits entirely inside the deletion
                        UNINFORMATIVE_SCORE
                    };
                    trace!("type {indel_type} read {k}: {score:#08x}");
                    scores[k * n_types + t] = score;
                }
            }
        }

        if run_base & run_ins == 0 {
            // inserted bases differ from the flanking homopolymer
            run_len = 1;
        }

        let calibration = QualityCalibrator::new(&self.config)
            .calibrate(pileup, &scores, &candidates, run_len, qavg)?;
        if calibration.n_alt() == 0 {
            debug!("pos {pos}: no reads called as an alternate allele");
            return Ok(None);
        }

        for (read, &annotation) in pileup.iter_mut().flatten().zip(calibration.annotations().iter()) {
            read.set_annotation(annotation);
        }

        let call = IndelSiteCall {
            indel_types: calibration.chosen_types(types),
            insertion_consensus: insertions.select(calibration.chosen()),
            indel_region: site_indel_region,
            n_alt: calibration.n_alt(),
            max_support: candidates.max_support(),
            max_frac: candidates.max_frac(),
            repeat_stats,
            homopolymer_run: run_len
        };
        debug!("pos {pos}: called {:?} with {} alternate reads", call.indel_types, call.n_alt);
        Ok(Some(call))
    }

    /// Average base quality near the site over every read, smoothed so an empty pileup is well defined
    fn site_quality(&self, pileup: &[Vec<PileupRead>], pos: usize) -> f64 {
        let mut qual_sum = 0.0;
        let mut qual_count = 0.0;
        let mut qual_max = 0;
        for read in pileup.iter().flatten() {
            let start = read.qpos().saturating_sub(QUAL_WINDOW);
            let end = (read.qpos() + QUAL_WINDOW).min(read.len());
            for &q in read.qualities()[start..end].iter() {
                qual_sum += q as f64;
                qual_count += 1.0;
                qual_max = qual_max.max(q);
            }
        }
        debug!("pos {pos}: max base quality {qual_max}");
        (qual_sum + 1.0) / (qual_count + 1.0)
    }
}

/// Reference bounds a read is realigned over; long reads only need `min_window` bases of context on each side of the site
fn read_bounds(pos: usize, left: usize, right: usize, min_window: usize, is_long: bool) -> (usize, usize) {
    if !is_long {
        return (left, right);
    }
    let left2 = if pos - left >= min_window { left.max(pos - min_window) } else { left };
    let right2 = if right - pos >= min_window { right.min(pos + min_window) } else { right };
    (left2, right2)
}
