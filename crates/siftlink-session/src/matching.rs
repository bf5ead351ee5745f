//! Match scratch arena and result unpacking.

use siftlink_core::error::{BridgeError, Result};
use siftlink_core::types::MatchResult;

/// Fixed-capacity index-pair buffer the matcher writes into.
///
/// Allocated once when the matcher is created and never resized. Contents
/// are only meaningful for the call that just wrote them.
pub struct MatchScratch {
    pairs: Box<[[i32; 2]]>,
}

impl MatchScratch {
    pub fn new(capacity: usize) -> Self {
        Self {
            pairs: vec![[0; 2]; capacity].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.pairs.len()
    }

    /// The first `n` slots, for one engine call.
    pub fn request(&mut self, n: usize) -> Result<&mut [[i32; 2]]> {
        let capacity = self.pairs.len();
        self.pairs
            .get_mut(..n)
            .ok_or(BridgeError::MatcherCapacityExceeded {
                requested: n,
                capacity,
            })
    }
}

/// Convert the engine's `count` pairs into parallel index sequences.
///
/// Every index is checked against its set; a negative count, a count above
/// what was requested, or an out-of-range index discards the whole result.
pub fn unpack_matches(
    pairs: &[[i32; 2]],
    count: i32,
    rows_a: usize,
    rows_b: usize,
) -> Result<MatchResult> {
    let n = usize::try_from(count)
        .map_err(|_| BridgeError::EngineRuntime(format!("matcher returned count {count}")))?;
    let Some(written) = pairs.get(..n) else {
        return Err(BridgeError::EngineRuntime(format!(
            "matcher returned {n} matches for a request of {}",
            pairs.len()
        )));
    };
    let mut result = MatchResult {
        indices_a: Vec::with_capacity(n),
        indices_b: Vec::with_capacity(n),
    };
    for &[i, j] in written {
        let in_range = |idx: i32, rows: usize| usize::try_from(idx).is_ok_and(|v| v < rows);
        if !in_range(i, rows_a) || !in_range(j, rows_b) {
            return Err(BridgeError::EngineRuntime(format!(
                "matcher returned out-of-range pair ({i}, {j}) for sets of {rows_a} and {rows_b}"
            )));
        }
        result.indices_a.push(i as u32);
        result.indices_b.push(j as u32);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn scratch_never_grows() {
        let mut scratch = MatchScratch::new(4);
        assert_eq!(scratch.request(4).expect("fits").len(), 4);
        let err = scratch.request(5).expect_err("over capacity");
        assert!(matches!(
            err,
            BridgeError::MatcherCapacityExceeded {
                requested: 5,
                capacity: 4
            }
        ));
        assert_eq!(scratch.capacity(), 4);
    }

    #[test]
    fn unpacks_parallel_sequences() {
        let pairs = [[0, 2], [1, 0], [9, 9]];
        let result = unpack_matches(&pairs, 2, 2, 3).expect("valid");
        assert_eq!(result.indices_a, vec![0, 1]);
        assert_eq!(result.indices_b, vec![2, 0]);
    }

    #[test]
    fn zero_matches_is_empty() {
        let result = unpack_matches(&[[0, 0]; 3], 0, 3, 3).expect("valid");
        assert!(result.is_empty());
    }

    #[test]
    fn rejects_negative_count() {
        let err = unpack_matches(&[[0, 0]], -1, 1, 1).expect_err("negative");
        assert!(matches!(err, BridgeError::EngineRuntime(_)));
    }

    #[test]
    fn rejects_count_above_request() {
        let err = unpack_matches(&[[0, 0]], 2, 1, 1).expect_err("overflow");
        assert!(matches!(err, BridgeError::EngineRuntime(_)));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let err = unpack_matches(&[[0, 3]], 1, 1, 3).expect_err("j == |B|");
        assert!(err.to_string().contains("out-of-range"));
        let err = unpack_matches(&[[-1, 0]], 1, 1, 3).expect_err("negative index");
        assert!(matches!(err, BridgeError::EngineRuntime(_)));
    }

    proptest! {
        #[test]
        fn accepted_results_respect_set_bounds(
            rows_a in 1usize..32,
            rows_b in 1usize..32,
            raw in proptest::collection::vec((-2i32..40, -2i32..40), 0..32),
            count in -2i32..40,
        ) {
            let pairs: Vec<[i32; 2]> = raw.iter().map(|&(i, j)| [i, j]).collect();
            if let Ok(result) = unpack_matches(&pairs, count, rows_a, rows_b) {
                prop_assert_eq!(result.indices_a.len(), result.indices_b.len());
                prop_assert!(result.len() <= pairs.len());
                for (i, j) in result.pairs() {
                    prop_assert!((i as usize) < rows_a);
                    prop_assert!((j as usize) < rows_b);
                }
            }
        }
    }
}
