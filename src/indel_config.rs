/*!
Contains configuration information for the indel caller.
Typical usage is to the use the builder to construct the config, e.g.
```
use indel_con::indel_config::{IndelConfig, IndelConfigBuilder};
let config: IndelConfig = IndelConfigBuilder::default()
    .min_support(3)
    .per_sample_filter(true)
    .build()
    .unwrap();
```
*/

/**
Contains configuration information for the indel caller.
Quality-style values (`open_q`, `ext_q`, `tandem_q`) are phred-like error likelihoods, so larger values mean more trust in an observed indel.
```
use indel_con::indel_config::{IndelConfig, IndelConfigBuilder};
let config: IndelConfig = IndelConfigBuilder::default()
    .indel_window(80)
    .poly_mqual(true)
    .build()
    .unwrap();
assert_eq!(config.indel_window, 80);
```
*/
#[derive(derive_builder::Builder, Clone, Debug)]
#[builder(default)]
pub struct IndelConfig {
    /// Phred-scaled likelihood of an indel open being a sequencing error
    pub open_q: i32,
    /// Phred-scaled likelihood of each additional indel base being a sequencing error
    pub ext_q: i32,
    /// Scale of the homopolymer term in SeqQ, divided by the run length
    pub tandem_q: i32,
    /// Minimum number of reads supporting an indel for it to become a candidate
    pub min_support: usize,
    /// Minimum fraction of reads supporting an indel for it to become a candidate
    pub min_frac: f64,
    /// If true, support thresholds are applied per sample; otherwise against all reads at the site
    pub per_sample_filter: bool,
    /// Maximum half-size of the realignment window around the site
    pub indel_window: usize,
    /// Weight applied to the net deletion balance of an alignment; positive values forgive deletions relative to insertions
    pub del_bias: f64,
    /// Multiplier on the length-normalized alignment score, applied in tenths
    pub indel_bias: f64,
    /// If true, SeqQ and IndelQ are adjusted by the minimum base quality in the homopolymer at the site
    pub poly_mqual: bool,
    /// Number of mapping quality buckets in the read statistics histograms
    pub mapq_buckets: usize,
    /// Number of relative read position buckets in the read statistics histograms
    pub position_buckets: usize,
    /// Sites with this many distinct indel sizes (including the reference) are skipped
    pub max_types: usize,
    /// Reads longer than this are realigned over a narrower window
    pub long_read_length: usize,
    /// Longest tandem repeat motif considered when scoring reads
    pub max_repeat_period: usize
}

impl Default for IndelConfig {
    fn default() -> Self {
        Self {
            // short-read friendly; long-read data typically wants a lower open_q
            open_q: 40,
            ext_q: 20,
            // effectively disables the homopolymer cap for short runs
            tandem_q: 500,
            min_support: 2,
            min_frac: 0.05,
            // pooled filtering makes rare indels in a single sample hard to call, but it is the historic default
            per_sample_filter: false,
            indel_window: 110,
            // no preference between insertion and deletion errors
            del_bias: 0.0,
            indel_bias: 1.0,
            poly_mqual: false,
            // mapping qualities are capped at 59 before bucketing
            mapq_buckets: 60,
            position_buckets: 100,
            // the allele index is stored in 6 bits
            max_types: 64,
            long_read_length: 1000,
            max_repeat_period: 14
        }
    }
}
