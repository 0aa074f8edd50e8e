//! Longest increasing subsequence.
//!
//! The keyed children diff records, for every node of the new list, the
//! position (plus one) of the old node it was matched with. The longest
//! strictly increasing run of those positions is the largest set of nodes
//! that are already in the right relative order; only the rest have to move.

/// Indices of one longest strictly increasing subsequence of `values`,
/// in ascending order.
///
/// Zeros mark entries that take no part in the sequence. Runs in
/// O(n log n): patience sorting keeps, for every length, the index of the
/// smallest tail seen so far, and each entry remembers its predecessor so
/// the winning run can be walked back from its last element.
pub fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessors: Vec<Option<usize>> = vec![None; values.len()];

    for (index, &value) in values.iter().enumerate() {
        if value == 0 {
            continue;
        }
        // Leftmost tail that is not smaller than `value`.
        let position = tails.partition_point(|&tail| values[tail] < value);
        if position > 0 {
            predecessors[index] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(index);
        } else {
            tails[position] = index;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(index) = cursor {
        result.push(index);
        cursor = predecessors[index];
    }
    result.reverse();
    result
}
