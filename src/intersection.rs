//! Merge based intersection of sorted neighbor lists.

/// Return the number of matching positions between two ascending sequences.
///
/// Two cursors walk `set0` and `set1`; the smaller side advances, and on a
/// match the count grows and both sides advance. A value repeated in both
/// lists therefore matches once per pair of repeats.
///
/// **NB** Both inputs must be sorted in ascending order. Unsorted input is not
/// detected and silently produces a wrong count.
pub fn sorted_intersection_count(set0: &[u64], set1: &[u64]) -> u64 {
    let mut count = 0;
    let (mut i, mut j) = (0, 0);
    while i < set0.len() && j < set1.len() {
        if set0[i] < set1[j] {
            i += 1;
        } else if set0[i] > set1[j] {
            j += 1;
        } else {
            count += 1;
            i += 1;
            j += 1;
        }
    }
    count
}
