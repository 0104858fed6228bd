/*!
Coordinate walking over `rust_htslib` CIGAR operations.
```
use indel_con::cigar::{query_len, reference_len};
use rust_htslib::bam::record::{Cigar, CigarString};
let cigar = CigarString::try_from("2S5M1I3M2D4M").unwrap();
assert_eq!(cigar.0[0], Cigar::SoftClip(2));
assert_eq!(query_len(&cigar.0), 15);
assert_eq!(reference_len(&cigar.0), 14);
```
*/

use rust_htslib::bam::record::Cigar;

/// Number of read bases described by the CIGAR, soft-clips included
pub fn query_len(cigar: &[Cigar]) -> usize {
    cigar.iter()
        .map(|op| match *op {
            Cigar::Match(l) | Cigar::Ins(l) | Cigar::SoftClip(l) | Cigar::Equal(l) | Cigar::Diff(l) => l as usize,
            _ => 0
        })
        .sum()
}

/// Number of reference bases spanned by the CIGAR
pub fn reference_len(cigar: &[Cigar]) -> usize {
    cigar.iter()
        .map(|op| match *op {
            Cigar::Match(l) | Cigar::Del(l) | Cigar::RefSkip(l) | Cigar::Equal(l) | Cigar::Diff(l) => l as usize,
            _ => 0
        })
        .sum()
}

/// Returns true if the CIGAR has a reference skip (N) operation, e.g. a spliced read
pub fn has_ref_skip(cigar: &[Cigar]) -> bool {
    cigar.iter().any(|op| matches!(op, Cigar::RefSkip(_)))
}

/// Maps a reference coordinate onto an offset in the read.
/// Returns the read offset and the reference coordinate it actually corresponds to, which differs from `target` when the target is not covered by an aligned base.
/// # Arguments
/// * `ref_start` - the reference coordinate of the first aligned base of the read
/// * `cigar` - the read alignment
/// * `target` - the reference coordinate to map
/// * `is_left` - if `target` falls in a deletion, report the reference coordinate at the start of the deletion instead of the end
pub fn reference_to_query(ref_start: usize, cigar: &[Cigar], target: usize, is_left: bool) -> (usize, usize) {
    let mut x = ref_start;
    let mut y = 0;
    let mut last_y = 0;
    for op in cigar.iter() {
        let l = op.len() as usize;
        match op {
            Cigar::Match(_) | Cigar::Equal(_) | Cigar::Diff(_) => {
                if ref_start > target {
                    // read starts after the target
                    return (y, ref_start);
                }
                if x + l > target {
                    return (y + (target - x), target);
                }
                x += l;
                y += l;
                last_y = y;
            },
            Cigar::Ins(_) | Cigar::SoftClip(_) => {
                y += l;
            },
            Cigar::Del(_) | Cigar::RefSkip(_) => {
                if x + l > target {
                    let reached = if is_left { x } else { x + l };
                    return (y, reached);
                }
                x += l;
            },
            Cigar::HardClip(_) | Cigar::Pad(_) => {}
        };
    }
    (last_y, x)
}
