/*!
Synthetic pileups with a planted indel, for tests and benchmarks.
*/

use rand::distributions::Uniform;
use rand::{Rng, SeedableRng};
use simple_error::bail;

use rust_htslib::bam::record::CigarString;
use crate::pileup::PileupRead;

const DNA: [u8; 4] = [b'A', b'C', b'G', b'T'];
/// Minimum number of aligned bases kept on either side of the site
const FLANK: usize = 5;
/// Base quality of error-free bases
const GOOD_QUAL: u8 = 30;
/// Base quality of substituted bases
const ERROR_QUAL: u8 = 10;

/// A generated reference and pileup with a planted indel
#[derive(Clone, Debug)]
pub struct SyntheticSite {
    /// ASCII reference
    pub reference: Vec<u8>,
    /// The site, the reference base before the planted indel
    pub pos: usize,
    /// The inserted sequence, empty for deletions
    pub inserted: Vec<u8>,
    /// Reads grouped by sample
    pub pileup: Vec<Vec<PileupRead>>
}

/// Creates a test site we can verify is working.
/// Reads either match the reference or carry the planted indel right after the site, and both receive random substitutions away from the site.
/// # Arguments
/// * `ref_len` - the length of the reference, the site is in the middle
/// * `num_samples` - the number of samples
/// * `reads_per_sample` - the number of reads in each sample
/// * `read_len` - the length of every read
/// * `indel` - the planted indel size, negative for deletions
/// * `alt_frac` - probability that a read carries the indel
/// * `error_rate` - per-base substitution rate
/// # Errors
/// * if the reads cannot cover the site with enough flank, or the rates are outside of [0, 1]
pub fn generate_site(
    ref_len: usize, num_samples: usize, reads_per_sample: usize, read_len: usize,
    indel: i32, alt_frac: f64, error_rate: f64
) -> Result<SyntheticSite, Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&alt_frac) || !(0.0..=1.0).contains(&error_rate) {
        bail!("Rates must be in [0, 1], got alt_frac={alt_frac} error_rate={error_rate}");
    }
    let size = indel.unsigned_abs() as usize;
    let pos = ref_len / 2;
    if read_len < 2 * FLANK + size + 1 || pos + 1 + size + read_len > ref_len || pos + 1 < read_len {
        bail!("Reads of length {read_len} with an indel of {indel} do not fit in a reference of length {ref_len}");
    }

    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let base_distribution = Uniform::new(0, DNA.len());
    let sub_distribution = Uniform::new(1, DNA.len());
    let unit_distribution = Uniform::new(0.0, 1.0);
    // site offset in the read, leaving a flank on both sides
    let offset_distribution = Uniform::new_inclusive(FLANK - 1, read_len - FLANK - size - 1);

    let reference: Vec<u8> = (0..ref_len)
        .map(|_i| DNA[rng.sample(base_distribution)])
        .collect();
    let inserted: Vec<u8> = if indel > 0 {
        (0..size).map(|_i| DNA[rng.sample(base_distribution)]).collect()
    } else {
        vec![]
    };

    let mut pileup = Vec::with_capacity(num_samples);
    for _s in 0..num_samples {
        let mut reads = Vec::with_capacity(reads_per_sample);
        for _r in 0..reads_per_sample {
            let qpos = rng.sample(offset_distribution);
            let start = pos - qpos;
            let left = qpos + 1;
            let is_alt = indel != 0 && rng.sample(unit_distribution) < alt_frac;

            let (mut seq, cigar, read_indel) = if !is_alt {
                (reference[start..start + read_len].to_vec(), format!("{read_len}M"), 0)
            } else if indel < 0 {
                let right = read_len - left;
                let mut seq = reference[start..=pos].to_vec();
                seq.extend_from_slice(&reference[pos + 1 + size..pos + 1 + size + right]);
                (seq, format!("{left}M{size}D{right}M"), indel)
            } else {
                let right = read_len - left - size;
                let mut seq = reference[start..=pos].to_vec();
                seq.extend_from_slice(&inserted);
                seq.extend_from_slice(&reference[pos + 1..pos + 1 + right]);
                (seq, format!("{left}M{size}I{right}M"), indel)
            };

            let mut quals = vec![GOOD_QUAL; read_len];
            for (i, (c, q)) in seq.iter_mut().zip(quals.iter_mut()).enumerate() {
                // the site and the indel stay clean
                if (qpos..=qpos + size).contains(&i) {
                    continue;
                }
                if rng.sample(unit_distribution) < error_rate {
                    let index = DNA.iter().position(|d| d == c).unwrap_or(0);
                    *c = DNA[(index + rng.sample(sub_distribution)) % DNA.len()];
                    *q = ERROR_QUAL;
                }
            }

            reads.push(PileupRead::new(start, CigarString::try_from(cigar.as_str())?, &seq, quals, qpos, read_indel)?);
        }
        pileup.push(reads);
    }

    Ok(SyntheticSite {
        reference,
        pos,
        inserted,
        pileup
    })
}
