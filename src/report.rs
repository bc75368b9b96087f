//! Reporting helpers for fixed-radius searches.

use crate::types::{DataValue, ObservationIndex};

/// Number of neighbors after removing the observation itself from a
/// `search_all` count that included it.
#[inline]
pub fn count_all_neighbors_without_self(count: usize) -> usize {
    count.saturating_sub(1)
}

/// Sort the `(distance, index)` pairs found by a fixed-radius search and copy
/// them into the outputs.
///
/// If `self_index` is supplied, that observation is left out of the output.
pub fn report_all_neighbors<T: DataValue>(
    all_neighbors: &mut [(T, ObservationIndex)],
    indices: Option<&mut Vec<ObservationIndex>>,
    distances: Option<&mut Vec<T>>,
    self_index: Option<ObservationIndex>,
) {
    if indices.is_none() && distances.is_none() {
        return;
    }
    all_neighbors.sort_unstable_by_key(|&(d, i)| (d.ordered(), i));

    let kept = all_neighbors
        .iter()
        .filter(|&&(_, i)| Some(i) != self_index);

    match (indices, distances) {
        (Some(idx), Some(dist)) => {
            idx.clear();
            dist.clear();
            for &(d, i) in kept {
                idx.push(i);
                dist.push(d);
            }
        }
        (Some(idx), None) => {
            idx.clear();
            idx.extend(kept.map(|&(_, i)| i));
        }
        (None, Some(dist)) => {
            dist.clear();
            dist.extend(kept.map(|&(d, _)| d));
        }
        (None, None) => {}
    }
}
