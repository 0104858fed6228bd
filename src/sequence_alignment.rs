use crate::base::Base;

/// Result of a glocal alignment, where the query is fully aligned inside the target
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GlocalAlignment {
    /// Unit-cost edit distance between the query and the aligned part of the target
    pub edit_distance: usize,
    /// First target offset used by the alignment
    pub target_start: usize,
    /// One past the last target offset used by the alignment
    pub target_end: usize
}

impl GlocalAlignment {
    /// Number of target bases covered by the alignment
    pub fn target_len(&self) -> usize {
        self.target_end - self.target_start
    }
}

/// Anything that can align a query glocally against a target.
/// Returning `None` means the aligner could not produce an alignment, which callers treat as uninformative.
pub trait GlocalAligner {
    /// Aligns all of `query` against some substring of `target`, without penalizing unused target bases at either end.
    /// # Arguments
    /// * `target` - the longer sequence, typically a consensus
    /// * `query` - the sequence that must be fully aligned, typically a read
    fn align(&self, target: &[Base], query: &[Base]) -> Option<GlocalAlignment>;
}

/// Unit-cost semi-global edit distance via a two-row dynamic program.
/// Among equally good alignments, the one ending leftmost in the target wins, and for that end the start that keeps the aligned span shortest.
/// # Examples
/// ```rust
/// use indel_con::base::Base;
/// use indel_con::sequence_alignment::{EditDistanceAligner, GlocalAligner};
/// let target = Base::from_ascii_slice(b"TTTTACGTACGTTTTT");
/// let query = Base::from_ascii_slice(b"ACGAACGT");
/// let alignment = EditDistanceAligner::default().align(&target, &query).unwrap();
/// assert_eq!(alignment.edit_distance, 1);
/// assert_eq!((alignment.target_start, alignment.target_end), (4, 12));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct EditDistanceAligner {
    /// If set, alignments with a larger edit distance are reported as failures
    max_edit_distance: Option<usize>
}

impl EditDistanceAligner {
    /// Creates an aligner that gives up above a maximum edit distance
    pub fn with_max_edit_distance(max_edit_distance: usize) -> EditDistanceAligner {
        EditDistanceAligner {
            max_edit_distance: Some(max_edit_distance)
        }
    }
}

impl GlocalAligner for EditDistanceAligner {
    fn align(&self, target: &[Base], query: &[Base]) -> Option<GlocalAlignment> {
        if target.is_empty() || query.is_empty() {
            return None;
        }

        let n = target.len();

        // each cell is (cost, start offset in target); the first row is free so every target offset can start an alignment
        let mut prev: Vec<(usize, usize)> = (0..=n).map(|j| (0, j)).collect();
        let mut curr: Vec<(usize, usize)> = vec![(0, 0); n + 1];

        for (i, &q) in query.iter().enumerate() {
            // consuming query bases with no target is all insertions
            curr[0] = (i + 1, 0);
            for (j, &t) in target.iter().enumerate() {
                let (diag_cost, diag_start) = prev[j];
                let diag = (diag_cost + usize::from(q != t), diag_start);
                // query base inserted relative to the target
                let up = (prev[j + 1].0 + 1, prev[j + 1].1);
                // target base deleted from the query
                let left = (curr[j].0 + 1, curr[j].1);

                // lower cost first, then the later start for a tighter span
                let mut best = diag;
                for candidate in [up, left] {
                    if candidate.0 < best.0 || (candidate.0 == best.0 && candidate.1 > best.1) {
                        best = candidate;
                    }
                }
                curr[j + 1] = best;
            }
            std::mem::swap(&mut prev, &mut curr);
        }

        // prev now holds the last query row, pick the leftmost best end
        let (end, &(cost, start)) = prev.iter().enumerate()
            .skip(1)
            .min_by_key(|(j, &(cost, _start))| (cost, *j))?;

        if self.max_edit_distance.map_or(false, |m| cost > m) {
            return None;
        }

        Some(GlocalAlignment {
            edit_distance: cost,
            target_start: start,
            target_end: end
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(target: &[u8], query: &[u8]) -> Option<GlocalAlignment> {
        EditDistanceAligner::default().align(&Base::from_ascii_slice(target), &Base::from_ascii_slice(query))
    }

    #[test]
    fn test_exact_inside() {
        let alignment = run(b"GGGGACGTACGTGGGG", b"ACGTACGT").unwrap();
        assert_eq!(alignment, GlocalAlignment { edit_distance: 0, target_start: 4, target_end: 12 });
        assert_eq!(alignment.target_len(), 8);
    }

    #[test]
    fn test_mismatch() {
        let alignment = run(b"ACGTACGTACGT", b"ACGTACCTACGT").unwrap();
        assert_eq!(alignment.edit_distance, 1);
        assert_eq!(alignment.target_len(), 12);
    }

    #[test]
    fn test_deletion_in_query() {
        // query is missing a base, so the target span is longer than the query
        let alignment = run(b"TTACGTAACGTTT", b"ACGTACGT").unwrap();
        assert_eq!(alignment.edit_distance, 1);
        assert_eq!(alignment.target_len(), 9);
    }

    #[test]
    fn test_insertion_in_query() {
        let alignment = run(b"TTACGTACGTTT", b"ACGTAACGT").unwrap();
        assert_eq!(alignment.edit_distance, 1);
        assert_eq!(alignment.target_len(), 8);
    }

    #[test]
    fn test_query_longer_than_target() {
        let alignment = run(b"ACGT", b"AACGTT").unwrap();
        assert_eq!(alignment.edit_distance, 2);
    }

    #[test]
    fn test_empty() {
        assert!(run(b"", b"ACGT").is_none());
        assert!(run(b"ACGT", b"").is_none());
    }

    #[test]
    fn test_max_edit_distance() {
        let aligner = EditDistanceAligner::with_max_edit_distance(1);
        let target = Base::from_ascii_slice(b"AAAAAAAA");
        assert!(aligner.align(&target, &Base::from_ascii_slice(b"AAAC")).is_some());
        assert!(aligner.align(&target, &Base::from_ascii_slice(b"ACCC")).is_none());
    }
}
