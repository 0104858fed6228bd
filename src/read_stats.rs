/*!
Per-read statistics collected while a site is scored: mapping quality, soft-clip proximity and the relative position of the site in the read, split by reference and alternate reads.
*/

use rust_htslib::bam::record::Cigar;

use crate::pileup::PileupRead;

/// Soft-clip length histograms are capped to this many buckets
pub const SOFTCLIP_BUCKETS: usize = 100;
/// Mapping qualities are capped below this value before bucketing
const MAX_MAPQ: usize = 59;

/// Receiver for the per-read statistics gathered while scoring a site.
/// Each read is reported at most once per site.
pub trait ReadStatsRecorder {
    /// Records one read
    /// # Arguments
    /// * `is_alt` - true if the read carries an indel at the site
    /// * `mapq_bucket` - scaled mapping quality
    /// * `softclip_len` - scaled soft-clip length, less than `SOFTCLIP_BUCKETS`
    /// * `position_bucket` - relative position of the site in the read
    fn record(&mut self, is_alt: bool, mapq_bucket: usize, softclip_len: usize, position_bucket: usize);
}

/// Recorder that drops everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoReadStats;

impl ReadStatsRecorder for NoReadStats {
    fn record(&mut self, _is_alt: bool, _mapq_bucket: usize, _softclip_len: usize, _position_bucket: usize) {}
}

/// Histograms split by reference and alternate reads; these persist across sites and are typically used to build filtering annotations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IndelReadStats {
    ref_mapq: Vec<u64>,
    alt_mapq: Vec<u64>,
    ref_softclip: Vec<u64>,
    alt_softclip: Vec<u64>,
    ref_position: Vec<u64>,
    alt_position: Vec<u64>
}

impl IndelReadStats {
    /// Creates empty histograms
    /// # Arguments
    /// * `mapq_buckets` - number of mapping quality buckets
    /// * `position_buckets` - number of read position buckets
    pub fn new(mapq_buckets: usize, position_buckets: usize) -> IndelReadStats {
        IndelReadStats {
            ref_mapq: vec![0; mapq_buckets],
            alt_mapq: vec![0; mapq_buckets],
            ref_softclip: vec![0; SOFTCLIP_BUCKETS],
            alt_softclip: vec![0; SOFTCLIP_BUCKETS],
            ref_position: vec![0; position_buckets],
            alt_position: vec![0; position_buckets]
        }
    }

    /// Total reads recorded as (reference, alternate)
    pub fn counts(&self) -> (u64, u64) {
        (self.ref_mapq.iter().sum(), self.alt_mapq.iter().sum())
    }

    // Getters
    pub fn mapq(&self, is_alt: bool) -> &[u64] {
        if is_alt { &self.alt_mapq } else { &self.ref_mapq }
    }

    pub fn softclip(&self, is_alt: bool) -> &[u64] {
        if is_alt { &self.alt_softclip } else { &self.ref_softclip }
    }

    pub fn position(&self, is_alt: bool) -> &[u64] {
        if is_alt { &self.alt_position } else { &self.ref_position }
    }
}

impl ReadStatsRecorder for IndelReadStats {
    fn record(&mut self, is_alt: bool, mapq_bucket: usize, softclip_len: usize, position_bucket: usize) {
        // out of range buckets land in the last one
        fn bump(hist: &mut [u64], index: usize) {
            if let Some(last) = hist.len().checked_sub(1) {
                hist[index.min(last)] += 1;
            }
        }
        if is_alt {
            bump(&mut self.alt_mapq, mapq_bucket);
            bump(&mut self.alt_softclip, softclip_len);
            bump(&mut self.alt_position, position_bucket);
        } else {
            bump(&mut self.ref_mapq, mapq_bucket);
            bump(&mut self.ref_softclip, softclip_len);
            bump(&mut self.ref_position, position_bucket);
        }
    }
}

/// Scales a mapping quality into `mapq_buckets` buckets after capping it at 59
pub fn mapq_bucket(mapq: u8, mapq_buckets: usize) -> usize {
    let capped = (mapq as usize).min(MAX_MAPQ);
    (capped as f64 * mapq_buckets as f64 / (MAX_MAPQ + 1) as f64) as usize
}

/// Soft-clip and position summary of a read relative to the site
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReadPosition {
    /// Length of the nearest soft-clip, scaled by its distance to the site and capped at 99
    pub softclip_len: usize,
    /// Relative position of the site in the unclipped read, in `[0, position_buckets]`
    pub position_bucket: usize
}

/// Computes where the site falls in the read and how close it is to a soft-clip.
/// # Arguments
/// * `read` - the read
/// * `position_buckets` - number of relative position buckets
pub fn read_position(read: &PileupRead, position_buckets: usize) -> ReadPosition {
    let mut softclip_len = 0;
    let mut softclip_dist: Option<usize> = None;
    let mut at_left = true;
    let mut epos = read.qpos() as i64;
    let mut unclipped_len = read.len();

    for op in read.cigar().iter() {
        match *op {
            Cigar::SoftClip(l) => {
                let l = l as usize;
                unclipped_len = unclipped_len.saturating_sub(l);
                if at_left {
                    softclip_len += l;
                    epos -= softclip_len as i64;
                    softclip_dist = Some(epos.max(0) as usize);
                } else {
                    let right_dist = read.len().saturating_sub(l + read.qpos());
                    if softclip_dist.map_or(true, |d| d > right_dist) {
                        // closer to the right clip than the left one
                        softclip_dist = Some(right_dist);
                        softclip_len = l;
                    }
                }
            },
            Cigar::HardClip(_) => {},
            _ => at_left = false
        };
    }

    let epos = epos.max(0) as usize;
    let indel = read.indel();
    let epos = if indel > 0 && (unclipped_len as i64 - (epos as i64 + indel as i64)) < epos as i64 {
        // near the end of the read, so use the end of the insertion
        epos + indel as usize - 1
    } else {
        epos
    };
    let position_bucket = (epos as f64 / (unclipped_len + 1) as f64 * position_buckets as f64) as usize;

    let softclip_len = if softclip_len > 0 {
        // a clip right next to the site gets the largest value
        let dist = softclip_dist.unwrap_or(0).max(1);
        (15 * softclip_len / dist).min(SOFTCLIP_BUCKETS - 1)
    } else {
        0
    };

    ReadPosition {
        softclip_len,
        position_bucket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::CigarString;

    fn read(cigar: &str, qpos: usize, indel: i32) -> PileupRead {
        let cigar = CigarString::try_from(cigar).unwrap();
        let len = crate::cigar::query_len(&cigar.0);
        PileupRead::new(100, cigar, &vec![b'A'; len], vec![30; len], qpos, indel).unwrap()
    }

    #[test]
    fn test_mapq_bucket() {
        assert_eq!(mapq_bucket(0, 60), 0);
        assert_eq!(mapq_bucket(30, 60), 30);
        assert_eq!(mapq_bucket(255, 60), 59);
        assert_eq!(mapq_bucket(59, 30), 29);
    }

    #[test]
    fn test_position_no_clip() {
        let p = read_position(&read("100M", 49, 0), 100);
        assert_eq!(p.softclip_len, 0);
        assert_eq!(p.position_bucket, 48);
    }

    #[test]
    fn test_position_left_clip() {
        // 10 clipped, site is 5 bases past the clip
        let p = read_position(&read("10S90M", 15, 0), 100);
        assert_eq!(p.softclip_len, 30);
        assert_eq!(p.position_bucket, 5);
    }

    #[test]
    fn test_position_right_clip_closer() {
        let p = read_position(&read("5S85M10S", 80, 0), 100);
        // 100 - 10 - 80 = 10 bases from the right clip
        assert_eq!(p.softclip_len, 15);
    }

    #[test]
    fn test_recorder() {
        let mut stats = IndelReadStats::new(60, 100);
        stats.record(true, 59, 3, 50);
        stats.record(false, 10, 0, 1000);
        stats.record(false, 20, 0, 2);
        assert_eq!(stats.counts(), (2, 1));
        assert_eq!(stats.mapq(true)[59], 1);
        // out of range is clamped into the last bucket
        assert_eq!(stats.position(false)[99], 1);
    }
}
