/*!
Turns the per-read, per-type score matrix into per-read qualities and the final set of called alleles.
```
use indel_con::calibration::estimate_seq_q;
use indel_con::indel_config::IndelConfig;
let config = IndelConfig::default();
// short indel outside of a homopolymer is capped by the open penalty
assert_eq!(estimate_seq_q(&config, -1, 1), 40);
// the same indel in a 20 bp homopolymer is much less credible
assert_eq!(estimate_seq_q(&config, -1, 20), 25);
```
*/

use log::{debug, trace};
use priority_queue::PriorityQueue;
use simple_error::bail;

use crate::allele_types::CandidateTypes;
use crate::indel_config::IndelConfig;
use crate::pileup::{IndelAnnotation, PileupRead, MAX_CALLED_ALLELES};
use crate::realign::raw_score;

/// Normalised scores above this fully suppress IndelQ
const MAX_NORMALIZED_SCORE: u64 = 111;
/// Upper bound for both qualities
const MAX_QUAL: i32 = 255;

/// Key sorting a read's scores: score first, then type index
type ScoreKey = u64;

fn score_key(score: u32, t: usize) -> ScoreKey {
    (score as u64) << 6 | t as u64
}

fn key_type(key: ScoreKey) -> usize {
    (key & 0x3f) as usize
}

fn key_raw(key: ScoreKey) -> i32 {
    raw_score((key >> 6) as u32) as i32
}

fn key_normalized(key: ScoreKey) -> u64 {
    (key >> 6) & 0xff
}

/// Sequence-context confidence for an indel of `size` in a homopolymer of `run_len`.
/// Larger indels are more credible, longer homopolymers less so.
/// # Arguments
/// * `config` - provides the open, extension, and tandem penalties
/// * `size` - signed indel size
/// * `run_len` - homopolymer run length at the site, at least 1
pub fn estimate_seq_q(config: &IndelConfig, size: i32, run_len: usize) -> i32 {
    let l = size.abs();
    let q = config.open_q + config.ext_q * (l - 1);
    let qh = (config.tandem_q as f64 * l as f64 / run_len.max(1) as f64 + 0.499) as i32;
    q.min(qh)
}

/// Lowest base quality in the homopolymer around the site of a read
fn homopolymer_min_qual(read: &PileupRead) -> u8 {
    let seq = read.sequence();
    let qual = read.qualities();
    let qpos = read.qpos();
    let mut min_q = qual[qpos];

    // left, from the site back
    let base_left = seq[if qpos + 1 < seq.len() { qpos + 1 } else { qpos }];
    for l in (0..=qpos).rev() {
        if seq[l] != base_left {
            break;
        }
        min_q = min_q.min(qual[l]);
    }

    // right, including the first base that breaks the run
    if let Some(&base) = seq.get(qpos + 1) {
        for l in (qpos + 1)..seq.len() {
            min_q = min_q.min(qual[l]);
            if seq[l] != base {
                break;
            }
        }
    }
    min_q
}

/// Final per-read calls and chosen alleles of a site
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Calibration {
    /// Indices into the candidate types, the reference first, at most 4
    chosen: Vec<usize>,
    /// One annotation per read, in pileup order
    annotations: Vec<IndelAnnotation>,
    /// Reads called as a non-reference allele
    n_alt: usize
}

impl Calibration {
    // Getters
    pub fn chosen(&self) -> &[usize] {
        &self.chosen
    }

    pub fn annotations(&self) -> &[IndelAnnotation] {
        &self.annotations
    }

    pub fn n_alt(&self) -> usize {
        self.n_alt
    }

    /// The chosen indel sizes by slot, unused slots are None
    pub fn chosen_types(&self, types: &[i32]) -> [Option<i32>; MAX_CALLED_ALLELES] {
        let mut ret = [None; MAX_CALLED_ALLELES];
        for (slot, &t) in ret.iter_mut().zip(self.chosen.iter()) {
            *slot = Some(types[t]);
        }
        ret
    }
}

/// Derives qualities from the score matrix and picks the alleles to report
#[derive(Debug)]
pub struct QualityCalibrator<'a> {
    config: &'a IndelConfig
}

impl<'a> QualityCalibrator<'a> {
    pub fn new(config: &'a IndelConfig) -> QualityCalibrator<'a> {
        QualityCalibrator { config }
    }

    /// Calibrates every read and selects up to 4 alleles, the reference always first.
    /// Reads whose best type is not selected become no-calls with zero qualities.
    /// # Arguments
    /// * `pileup` - the reads at the site, grouped by sample
    /// * `scores` - packed scores, one row of `candidates.len()` per read in pileup order
    /// * `candidates` - the candidate types
    /// * `run_len` - homopolymer run length used for SeqQ
    /// * `qavg` - average base quality around the site
    /// # Errors
    /// * if the score matrix does not match the pileup and candidates
    pub fn calibrate(
        &self, pileup: &[Vec<PileupRead>], scores: &[u32], candidates: &CandidateTypes, run_len: usize, qavg: f64
    ) -> Result<Calibration, Box<dyn std::error::Error>> {
        let types = candidates.types();
        let n_types = types.len();
        let ref_type = candidates.ref_index();
        let num_reads: usize = pileup.iter().map(|s| s.len()).sum();
        if n_types < 2 || scores.len() != num_reads * n_types {
            bail!("Score matrix has {} entries, expected {num_reads} reads by {n_types} types", scores.len());
        }

        let mut sum_q: Vec<i64> = vec![0; n_types];
        let mut best_types: Vec<usize> = Vec::with_capacity(num_reads);
        let mut quals: Vec<(u8, u8)> = Vec::with_capacity(num_reads);

        for (read, row) in pileup.iter().flatten().zip(scores.chunks_exact(n_types)) {
            let mut keys: Vec<ScoreKey> = row.iter().enumerate()
                .map(|(t, &s)| score_key(s, t))
                .collect();
            keys.sort_unstable();

            let best = key_type(keys[0]);
            let (mut indel_q, mut seq_q) = if best == ref_type {
                (key_raw(keys[1]) - key_raw(keys[0]), estimate_seq_q(self.config, types[key_type(keys[1])], run_len))
            } else {
                let ref_key = keys.iter().find(|&&k| key_type(k) == ref_type).copied().unwrap_or(keys[0]);
                (key_raw(ref_key) - key_raw(keys[0]), estimate_seq_q(self.config, types[best], run_len))
            };

            if self.config.poly_mqual {
                let min_q = homopolymer_min_qual(read) as f64;
                seq_q = (seq_q as f64 + (qavg / 20.0).min(min_q - qavg / 10.0)) as i32;
                indel_q = (indel_q as f64 + (qavg / 20.0).min(min_q - qavg / 5.0)) as i32;
                seq_q = seq_q.max(0);
                indel_q = indel_q.max(0);
            }

            // poorly aligning reads lose their indel confidence
            let normalized = key_normalized(keys[0]);
            indel_q = if normalized > MAX_NORMALIZED_SCORE {
                0
            } else {
                ((1.0 - normalized as f64 / MAX_NORMALIZED_SCORE as f64) * indel_q as f64 + 0.499) as i32
            };
            let seq_q = seq_q.clamp(0, MAX_QUAL);
            let indel_q = indel_q.min(seq_q).clamp(0, MAX_QUAL);

            sum_q[best] += indel_q as i64;
            best_types.push(best);
            quals.push((seq_q as u8, indel_q as u8));
        }

        // reference first, then the best supported alternatives; ties go to the larger index
        let mut pqueue: PriorityQueue<usize, (i64, usize)> = PriorityQueue::new();
        for (t, &q) in sum_q.iter().enumerate() {
            if t != ref_type {
                pqueue.push(t, (q, t));
            }
        }
        let mut chosen = vec![ref_type];
        while chosen.len() < MAX_CALLED_ALLELES {
            match pqueue.pop() {
                Some((t, _priority)) => chosen.push(t),
                None => break
            };
        }
        debug!("sum_q {sum_q:?}, chosen types {:?}", chosen.iter().map(|&t| types[t]).collect::<Vec<i32>>());

        let mut n_alt = 0;
        let mut annotations = Vec::with_capacity(num_reads);
        for (&best, &(seq_q, indel_q)) in best_types.iter().zip(quals.iter()) {
            let annotation = match chosen.iter().position(|&c| c == best) {
                Some(j) => {
                    if j > 0 {
                        n_alt += 1;
                    }
                    IndelAnnotation::new(j as u8, seq_q, indel_q)?
                },
                None => IndelAnnotation::no_call()
            };
            trace!("{annotation:?}");
            annotations.push(annotation);
        }

        Ok(Calibration {
            chosen,
            annotations,
            n_alt
        })
    }
}
