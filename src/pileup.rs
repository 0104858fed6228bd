/*!
The per-read view of a pileup column that the indel caller consumes, and the packed per-read annotation it produces.
```
use indel_con::pileup::IndelAnnotation;
let annotation = IndelAnnotation::new(1, 40, 23).unwrap();
let code = annotation.pack();
assert_eq!(code, 1 << 16 | 40 << 8 | 23);
assert_eq!(IndelAnnotation::unpack(code), annotation);
```
*/

use rust_htslib::bam::record::{Cigar, CigarString};
use simple_error::bail;

use crate::base::Base;
use crate::cigar::query_len;

/// Number of alleles that can be reported for a site
pub const MAX_CALLED_ALLELES: usize = 4;
/// Allele index that marks a read without a call
pub const NO_CALL_ALLELE: u8 = MAX_CALLED_ALLELES as u8;

/// Bit widths of the packed annotation fields
const ALLELE_BITS: u32 = 6;
const QUAL_BITS: u32 = 8;
const ALLELE_MASK: u32 = (1 << ALLELE_BITS) - 1;
const QUAL_MASK: u32 = (1 << QUAL_BITS) - 1;

/// Per-read indel call, stored in 22 bits as `allele:6 | seq_q:8 | indel_q:8` from high to low.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct IndelAnnotation {
    /// Index into the called alleles, `NO_CALL_ALLELE` if the read supports none of them
    allele: u8,
    /// Confidence that the called allele is the right one among the candidates
    seq_q: u8,
    /// Confidence that an indel is present at all
    indel_q: u8
}

impl IndelAnnotation {
    /// Constructor
    /// # Errors
    /// * if `allele` does not fit in 6 bits
    pub fn new(allele: u8, seq_q: u8, indel_q: u8) -> Result<IndelAnnotation, Box<dyn std::error::Error>> {
        if allele as u32 > ALLELE_MASK {
            bail!("Allele index {allele} does not fit in {ALLELE_BITS} bits");
        }
        Ok(IndelAnnotation { allele, seq_q, indel_q })
    }

    /// Annotation for a read that supports none of the called alleles
    pub fn no_call() -> IndelAnnotation {
        IndelAnnotation { allele: NO_CALL_ALLELE, seq_q: 0, indel_q: 0 }
    }

    /// Packs into the 22-bit integer representation
    pub fn pack(&self) -> u32 {
        (self.allele as u32) << (2 * QUAL_BITS) | (self.seq_q as u32) << QUAL_BITS | self.indel_q as u32
    }

    /// Unpacks from the 22-bit integer representation, bits above 22 are ignored
    pub fn unpack(code: u32) -> IndelAnnotation {
        IndelAnnotation {
            allele: ((code >> (2 * QUAL_BITS)) & ALLELE_MASK) as u8,
            seq_q: ((code >> QUAL_BITS) & QUAL_MASK) as u8,
            indel_q: (code & QUAL_MASK) as u8
        }
    }

    pub fn is_no_call(&self) -> bool {
        self.allele == NO_CALL_ALLELE
    }

    // Getters
    pub fn allele(&self) -> u8 {
        self.allele
    }

    pub fn seq_q(&self) -> u8 {
        self.seq_q
    }

    pub fn indel_q(&self) -> u8 {
        self.indel_q
    }
}

/// A read overlapping the site under test, as produced by a pileup engine.
/// Everything except `annotation` is read-only to the indel caller.
#[derive(Clone, Debug, Default)]
pub struct PileupRead {
    /// Reference coordinate of the first aligned base
    ref_start: usize,
    /// Alignment of the read against the reference
    cigar: Vec<Cigar>,
    /// Read bases, soft-clips included
    sequence: Vec<Base>,
    /// Phred base qualities, same length as `sequence`
    qualities: Vec<u8>,
    /// Offset in `sequence` of the base aligned to the site
    qpos: usize,
    /// Size of the indel immediately after the site; negative for deletions, 0 if none
    indel: i32,
    /// True if the site itself falls inside a deletion in this read
    is_del: bool,
    /// True if the read is flagged as unmapped
    is_unmapped: bool,
    /// Mapping quality
    mapq: u8,
    /// Written by the indel caller when a site is called
    annotation: Option<IndelAnnotation>
}

impl PileupRead {
    /// Constructor
    /// # Arguments
    /// * `ref_start` - reference coordinate of the first aligned base
    /// * `cigar` - the read alignment
    /// * `sequence` - ASCII read sequence
    /// * `qualities` - phred base qualities
    /// * `qpos` - offset in `sequence` of the base aligned to the site
    /// * `indel` - signed indel size following the site
    /// # Errors
    /// * if the CIGAR, sequence, and qualities disagree on the read length
    /// * if `qpos` is outside of the read
    pub fn new(
        ref_start: usize, cigar: CigarString, sequence: &[u8], qualities: Vec<u8>, qpos: usize, indel: i32
    ) -> Result<PileupRead, Box<dyn std::error::Error>> {
        if sequence.len() != qualities.len() {
            bail!("Sequence length {} does not match quality length {}", sequence.len(), qualities.len());
        }
        let cigar = cigar.0;
        let cigar_len = query_len(&cigar);
        if cigar_len != sequence.len() {
            bail!("CIGAR describes {} bases but the sequence has {}", cigar_len, sequence.len());
        }
        if qpos >= sequence.len() {
            bail!("Site offset {qpos} is outside of a read of length {}", sequence.len());
        }
        Ok(PileupRead {
            ref_start,
            cigar,
            sequence: Base::from_ascii_slice(sequence),
            qualities,
            qpos,
            indel,
            is_del: false,
            is_unmapped: false,
            mapq: 60,
            annotation: None
        })
    }

    /// Sets the mapping quality
    pub fn with_mapq(mut self, mapq: u8) -> PileupRead {
        self.mapq = mapq;
        self
    }

    /// Marks that the site is inside a deletion in this read
    pub fn with_is_del(mut self, is_del: bool) -> PileupRead {
        self.is_del = is_del;
        self
    }

    /// Marks the read as unmapped
    pub fn with_unmapped(mut self, is_unmapped: bool) -> PileupRead {
        self.is_unmapped = is_unmapped;
        self
    }

    pub fn set_annotation(&mut self, annotation: IndelAnnotation) {
        self.annotation = Some(annotation);
    }

    // Getters
    pub fn ref_start(&self) -> usize {
        self.ref_start
    }

    pub fn cigar(&self) -> &[Cigar] {
        &self.cigar
    }

    pub fn sequence(&self) -> &[Base] {
        &self.sequence
    }

    pub fn qualities(&self) -> &[u8] {
        &self.qualities
    }

    pub fn qpos(&self) -> usize {
        self.qpos
    }

    pub fn indel(&self) -> i32 {
        self.indel
    }

    pub fn is_del(&self) -> bool {
        self.is_del
    }

    pub fn is_unmapped(&self) -> bool {
        self.is_unmapped
    }

    pub fn mapq(&self) -> u8 {
        self.mapq
    }

    pub fn annotation(&self) -> Option<IndelAnnotation> {
        self.annotation
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_round_trip_corners() {
        for allele in 0..=NO_CALL_ALLELE {
            for &seq_q in [0u8, 1, 128, 255].iter() {
                for &indel_q in [0u8, 7, 254, 255].iter() {
                    let annotation = IndelAnnotation::new(allele, seq_q, indel_q).unwrap();
                    let code = annotation.pack();
                    assert!(code < 1 << 22);
                    assert_eq!(IndelAnnotation::unpack(code), annotation);
                }
            }
        }
    }

    #[test]
    fn test_allele_overflow() {
        assert!(IndelAnnotation::new(64, 0, 0).is_err());
        assert!(IndelAnnotation::new(63, 0, 0).is_ok());
    }

    #[test]
    fn test_no_call() {
        let nc = IndelAnnotation::no_call();
        assert!(nc.is_no_call());
        assert_eq!(nc.pack(), 4 << 16);
    }

    #[test]
    fn test_read_validation() {
        let cigar = CigarString::try_from("4M").unwrap();
        assert!(PileupRead::new(0, cigar.clone(), b"ACGT", vec![30; 4], 1, 0).is_ok());
        assert!(PileupRead::new(0, cigar.clone(), b"ACGT", vec![30; 3], 1, 0).is_err());
        assert!(PileupRead::new(0, cigar.clone(), b"ACGTA", vec![30; 5], 1, 0).is_err());
        assert!(PileupRead::new(0, cigar, b"ACGT", vec![30; 4], 4, 0).is_err());
    }
}
