/*!
Discovery of the candidate indel sizes at a site.
The reference size 0 is always a candidate; other sizes must pass the support thresholds of `IndelConfig`.
*/

use itertools::Itertools;
use log::debug;

use crate::base::Base;
use crate::cigar::query_len;
use crate::indel_config::IndelConfig;
use crate::pileup::PileupRead;

/// The candidate indel sizes at a site, sorted ascending with exactly one 0 (the reference allele)
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateTypes {
    /// Signed indel sizes, strictly increasing
    types: Vec<i32>,
    /// Index of the 0 entry in `types`
    ref_index: usize,
    /// Longest read in the pileup, from its CIGAR
    max_read_len: usize,
    /// Total number of reads in the pileup
    num_reads: usize,
    /// Indel-carrying read count of the best-supported sample
    max_support: usize,
    /// Indel-carrying read fraction of the best-supported sample
    max_frac: f64
}

impl CandidateTypes {
    // Getters
    pub fn types(&self) -> &[i32] {
        &self.types
    }

    pub fn ref_index(&self) -> usize {
        self.ref_index
    }

    pub fn max_read_len(&self) -> usize {
        self.max_read_len
    }

    pub fn num_reads(&self) -> usize {
        self.num_reads
    }

    pub fn max_support(&self) -> usize {
        self.max_support
    }

    pub fn max_frac(&self) -> f64 {
        self.max_frac
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Most negative size, or 0 if there are no deletions
    pub fn biggest_deletion(&self) -> i32 {
        self.types[0].min(0)
    }

    /// Largest positive size, or 0 if there are no insertions
    pub fn biggest_insertion(&self) -> i32 {
        self.types[self.types.len() - 1].max(0)
    }
}

/// Scans all reads at a site and returns the indel sizes worth testing.
/// Returns `None` when the site should not be called: no indel has enough support, there are too many distinct sizes, or the reference after the site is mostly unknown.
/// # Arguments
/// * `pileup` - the reads at the site, grouped by sample
/// * `pos` - the site, the base before the indel
/// * `reference` - ASCII reference sequence in the same coordinates as the reads
/// * `config` - thresholds
pub fn find_candidate_types(pileup: &[Vec<PileupRead>], pos: usize, reference: &[u8], config: &IndelConfig) -> Option<CandidateTypes> {
    let num_reads: usize = pileup.iter().map(|s| s.len()).sum();

    // the reference is always a candidate
    let mut sizes: Vec<i32> = vec![0];
    let mut max_read_len = 0;
    let mut max_support = 0;
    let mut max_frac = 0.0;
    let mut sample_support_ok = false;
    let mut total_alt = 0;
    let mut total_reads = 0;

    for sample in pileup.iter() {
        let mut num_alt = 0;
        for read in sample.iter() {
            if read.indel() != 0 {
                num_alt += 1;
                sizes.push(read.indel());
            }
            max_read_len = max_read_len.max(query_len(read.cigar()));
        }
        if sample.is_empty() {
            continue;
        }

        let frac = num_alt as f64 / sample.len() as f64;
        if num_alt >= config.min_support && frac >= config.min_frac {
            sample_support_ok = true;
        }
        if num_alt > max_support && frac > 0.0 {
            max_support = num_alt;
            max_frac = frac;
        }
        total_alt += num_alt;
        total_reads += sample.len();
    }

    let size_counts: Vec<(usize, i32)> = sizes.into_iter()
        .sorted_unstable()
        .dedup_with_count()
        .collect();

    let support_ok = if config.per_sample_filter {
        sample_support_ok
    } else {
        total_reads > 0 &&
            total_alt >= config.min_support &&
            total_alt as f64 / total_reads as f64 >= config.min_frac
    };

    if size_counts.len() == 1 || !support_ok {
        debug!("pos {pos}: insufficient indel support ({total_alt} of {total_reads} reads)");
        return None;
    }

    if size_counts.len() >= config.max_types {
        debug!("pos {pos}: excessive indel alleles ({}), skipping", size_counts.len());
        return None;
    }

    // long stretches of N in the reference look like indels, skip if half or more of what follows the site is unknown
    let scan_end = (pos + (2 * config.indel_window).min(max_read_len)).min(reference.len());
    if scan_end > pos {
        let num_unknown = reference[pos..scan_end].iter()
            .filter(|&&c| Base::from_ascii(c).is_unknown())
            .count();
        if 2 * num_unknown >= scan_end - pos {
            debug!("pos {pos}: {num_unknown} of {} reference bases are unknown", scan_end - pos);
            return None;
        }
    }

    let types: Vec<i32> = size_counts.iter()
        .filter(|&&(count, size)| {
            size == 0 || (
                count >= config.min_support &&
                (config.per_sample_filter || count as f64 / total_reads as f64 >= config.min_frac)
            )
        })
        .map(|&(_count, size)| size)
        .collect();

    if types.len() <= 1 {
        debug!("pos {pos}: no indel size passed the support filters");
        return None;
    }

    let ref_index = types.iter().position(|&t| t == 0)?;
    debug!("pos {pos}: candidate indel types {types:?}");

    Some(CandidateTypes {
        types,
        ref_index,
        max_read_len,
        num_reads,
        max_support,
        max_frac
    })
}
