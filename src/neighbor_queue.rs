//! Bounded priority queue for tracking nearest neighbors.

use crate::types::{DataValue, ObservationIndex};
use std::collections::BinaryHeap;

/// Helper to track the `k` nearest neighbors of an observation of interest.
///
/// This is a max-heap of (distance, index) pairs, so the furthest retained
/// neighbor sits at the top. Once the queue is full, incoming neighbors
/// displace the furthest one if they are closer. Among tied distances,
/// neighbors with lower indices prevail.
///
/// When searching for the neighbors of an existing observation, callers should
/// reset the queue to `k + 1` and use [`NeighborQueue::report_excluding`] to
/// drop the observation itself from the output.
#[derive(Debug)]
pub struct NeighborQueue<T: DataValue> {
    nearest: BinaryHeap<(T::Ordered, ObservationIndex)>,
    capacity: usize,
    full: bool,
    scratch: Vec<(T, ObservationIndex)>,
}

impl<T: DataValue> NeighborQueue<T> {
    /// Create a queue retaining a single neighbor; see [`NeighborQueue::reset`].
    pub fn new() -> Self {
        Self {
            nearest: BinaryHeap::new(),
            capacity: 1,
            full: false,
            scratch: Vec::new(),
        }
    }

    /// Create a queue retaining up to `k` neighbors.
    pub fn with_capacity(k: usize) -> Self {
        let mut queue = Self::new();
        queue.reset(k);
        queue
    }

    /// Remove all neighbors and retain up to `k` from now on.
    ///
    /// `k` is clamped to at least 1, as a full queue must always have a limit.
    /// Storage grows with the neighbors actually added, so `k` may exceed the
    /// number of observations.
    pub fn reset(&mut self, k: usize) {
        debug_assert!(k > 0, "neighbor queue capacity must be positive");
        self.capacity = k.max(1);
        self.full = false;
        self.nearest.clear();
    }

    /// Whether the queue holds `k` neighbors.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Distance of the furthest retained neighbor.
    ///
    /// Only meaningful when [`NeighborQueue::is_full`] is true; returns
    /// infinity on an empty queue.
    #[inline]
    pub fn limit(&self) -> T {
        self.nearest
            .peek()
            .map(|&(d, _)| T::from_ordered(d))
            .unwrap_or_else(T::infinity)
    }

    /// Number of neighbors in the queue.
    #[inline]
    pub fn len(&self) -> usize {
        self.nearest.len()
    }

    /// Whether the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nearest.is_empty()
    }

    /// Offer a potential neighbor `i` at distance `d`.
    #[inline]
    pub fn add(&mut self, i: ObservationIndex, d: T) {
        self.nearest.push((d.ordered(), i));
        if self.full {
            self.nearest.pop();
        } else if self.nearest.len() == self.capacity {
            self.full = true;
        }
    }

    /// Drain the queue into the outputs, sorted by increasing distance.
    ///
    /// Either output may be `None` if it is not required.
    pub fn report(
        &mut self,
        mut indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
    ) {
        let mut position = self.nearest.len();
        if let Some(out) = indices.as_deref_mut() {
            out.clear();
            out.resize(position, 0);
        }
        if let Some(out) = distances.as_deref_mut() {
            out.clear();
            out.resize(position, T::zero());
        }

        while let Some((d, i)) = self.nearest.pop() {
            position -= 1;
            if let Some(out) = indices.as_deref_mut() {
                out[position] = i;
            }
            if let Some(out) = distances.as_deref_mut() {
                out[position] = T::from_ordered(d);
            }
        }
        self.full = false;
    }

    /// Drain the queue into the outputs, excluding `self_index`.
    ///
    /// If `self_index` is not among the retained neighbors (e.g. more than `k`
    /// duplicates at zero distance), the furthest neighbor is dropped instead,
    /// so exactly `len() - 1` neighbors are always reported.
    pub fn report_excluding(
        &mut self,
        mut indices: Option<&mut Vec<ObservationIndex>>,
        mut distances: Option<&mut Vec<T>>,
        self_index: ObservationIndex,
    ) {
        // Popped in decreasing order of distance.
        self.scratch.clear();
        let mut found_self = false;
        while let Some((d, i)) = self.nearest.pop() {
            if !found_self && i == self_index {
                found_self = true;
            } else {
                self.scratch.push((T::from_ordered(d), i));
            }
        }
        if !found_self && !self.scratch.is_empty() {
            self.scratch.remove(0);
        }
        self.full = false;

        if let Some(out) = indices.as_deref_mut() {
            out.clear();
            out.extend(self.scratch.iter().rev().map(|&(_, i)| i));
        }
        if let Some(out) = distances.as_deref_mut() {
            out.clear();
            out.extend(self.scratch.iter().rev().map(|&(d, _)| d));
        }
    }
}

impl<T: DataValue> Default for NeighborQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
