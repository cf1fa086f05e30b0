//! Static work partition of an index space across ranks

use std::ops::Range;

/// Contiguous sub-range of `0..n` owned by `rank` out of `count` ranks.
///
/// The first `n % count` ranks get one extra item, so ranges differ in
/// length by at most one and concatenate (in rank order) to `0..n`.
#[inline]
pub fn partition(n: usize, count: usize, rank: usize) -> Range<usize> {
    debug_assert!(rank < count);
    let chunk = n / count;
    let rem = n % count;
    let start = rank * chunk + rank.min(rem);
    let len = chunk + usize::from(rank < rem);
    start..start + len
}
