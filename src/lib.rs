/*!
# indel_con
This library calls small insertions and deletions from a pileup of aligned reads by realigning every read against locally built consensus sequences.

Key benefits:
* Candidate indel sizes are discovered from the reads themselves, with per-sample or pooled support filters
* Each sample gets a primary and secondary consensus per candidate, so heterozygous sites in other samples do not bias the realignment
* Realignment scores are adjusted for tandem repeats and homopolymers before being turned into per-read qualities

Performance notes:
* Every read is aligned against every candidate consensus, so cost grows with depth times the number of distinct indel sizes
* Reads longer than `IndelConfig::long_read_length` are realigned over a narrower window around the site

# Example usage
```rust
use rust_htslib::bam::record::CigarString;
use indel_con::indel_caller::IndelCaller;
use indel_con::indel_config::IndelConfigBuilder;
use indel_con::pileup::PileupRead;
use indel_con::read_stats::IndelReadStats;

let reference = b"AGCTATGAGGCTGATA";
let mut sample = vec![];
for _ in 0..8 {
    // a two base insertion after position 9
    sample.push(PileupRead::new(0, CigarString::try_from("10M2I6M").unwrap(), b"AGCTATGAGGATCTGATA", vec![30; 18], 9, 2).unwrap());
    sample.push(PileupRead::new(0, CigarString::try_from("16M").unwrap(), reference, vec![30; 16], 9, 0).unwrap());
}
let mut pileup = vec![sample];

let config = IndelConfigBuilder::default()
    .min_support(3)
    .build()
    .unwrap();
let mut stats = IndelReadStats::new(config.mapq_buckets, config.position_buckets);
let caller = IndelCaller::new(config);
let call = caller.call_site(&mut pileup, 9, reference, &mut stats).unwrap().unwrap();

// slot 0 is always the reference
assert_eq!(call.indel_types(), [Some(0), Some(2), None, None]);
assert_eq!(call.n_alt(), 8);
assert_eq!(stats.counts(), (8, 8));
```
*/

/// Candidate indel size discovery
pub mod allele_types;
/// Nucleotide encoding shared by the rest of the crate
pub mod base;
/// Conversion of realignment scores into per-read qualities
pub mod calibration;
/// CIGAR lengths and coordinate walking
pub mod cigar;
/// Per-sample primary and secondary consensus construction
pub mod consensus;
/// Utility for generating synthetic pileups
pub mod example_gen;
/// Base and insertion frequency tallies
pub mod frequency;
/// Main functionality for calling indels at a site
pub mod indel_caller;
/// Configuration for IndelCaller
pub mod indel_config;
/// Majority inserted sequences per candidate size
pub mod insertion_consensus;
/// Pileup read representation and the per-read indel annotation
pub mod pileup;
/// Per-read statistics histograms
pub mod read_stats;
/// Scoring of reads against consensus sequences
pub mod realign;
/// Basic pair-wise alignment utilities
pub mod sequence_alignment;
/// Tandem repeat and homopolymer detection
pub mod tandem_repeat;
