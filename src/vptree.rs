//! Vantage-point tree search.
//!
//! Each node of the tree holds a vantage point and a radius. Observations
//! closer to the vantage point than the radius go into the left subtree and
//! the rest go into the right subtree. Searches use the triangle inequality to
//! skip subtrees that cannot contain any neighbor closer than the current
//! furthest one. See Yianilos (1993) for the original description.
//!
//! Construction is deterministic: the vantage points are chosen with a
//! generator seeded from the dimensions of the dataset, so the same data
//! always gives the same tree.

use crate::distances::{save_metric, DistanceMetric, EuclideanDistance, ManhattanDistance};
use crate::error::{KnnError, Result};
use crate::find_nearest_neighbors::{cap_k, cap_k_query};
use crate::matrix::{copy_observations, gather_observations, Matrix};
use crate::neighbor_queue::NeighborQueue;
use crate::persistence::{prefixed, quick_load, quick_save, save_algorithm, LoadRegistry, PrebuiltConfig};
use crate::report::{count_all_neighbors_without_self, report_all_neighbors};
use crate::searcher::{check_observation, check_query, clear_outputs, Builder, Prebuilt, Searcher};
use crate::types::{DataValue, ObservationIndex};
use rand::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Name written to `ALGORITHM` by saved VP tree indices.
pub const VPTREE_ALGORITHM: &str = "knncolle::Vptree";

/// Child value for "no subtree". The root is node 0 and is never a child.
const LEAF: ObservationIndex = 0;

const DATA_FILE: &str = "DATA";
const RADIUS_FILE: &str = "NODE_RADIUS";
const INDEX_FILE: &str = "NODE_INDEX";
const LEFT_FILE: &str = "NODE_LEFT";
const RIGHT_FILE: &str = "NODE_RIGHT";

/// Builds [`VptreePrebuilt`] indices.
#[derive(Debug, Clone)]
pub struct VptreeBuilder<T: DataValue> {
    metric: Arc<dyn DistanceMetric<T>>,
}

impl<T: DataValue> VptreeBuilder<T> {
    /// Create a builder using `metric`.
    pub fn new(metric: Arc<dyn DistanceMetric<T>>) -> Self {
        Self { metric }
    }

    /// Create a builder using the Euclidean distance.
    pub fn euclidean() -> Self {
        Self::new(Arc::new(EuclideanDistance))
    }

    /// Create a builder using the Manhattan distance.
    pub fn manhattan() -> Self {
        Self::new(Arc::new(ManhattanDistance))
    }
}

impl<T: DataValue> Builder<T> for VptreeBuilder<T> {
    fn build(&self, matrix: &dyn Matrix<T>) -> Result<Box<dyn Prebuilt<T>>> {
        let data = copy_observations(matrix)?;
        let prebuilt = VptreePrebuilt::new(
            matrix.num_dimensions(),
            matrix.num_observations(),
            data,
            Arc::clone(&self.metric),
        )?;
        tracing::debug!(
            observations = prebuilt.num_observations,
            dimensions = prebuilt.num_dimensions,
            nodes = prebuilt.nodes.len(),
            metric = self.metric.name(),
            "built VP tree"
        );
        Ok(Box::new(prebuilt))
    }
}

#[derive(Debug, Clone, Copy)]
struct Node<T> {
    /// Normalized distance from the vantage point to the median observation.
    radius: T,

    /// Original index of the vantage point.
    index: ObservationIndex,

    /// Node holding observations closer than `radius`.
    left: ObservationIndex,

    /// Node holding observations at or beyond `radius`.
    right: ObservationIndex,
}

/// Vantage-point tree index.
///
/// Observations are stored in node order, so that the coordinates of node `n`
/// sit at position `n` of the data.
#[derive(Debug)]
pub struct VptreePrebuilt<T: DataValue> {
    num_dimensions: usize,
    num_observations: ObservationIndex,
    data: Vec<T>,
    metric: Arc<dyn DistanceMetric<T>>,
    nodes: Vec<Node<T>>,
    new_locations: Vec<ObservationIndex>,
}

struct TreeBuilder<'a, T: DataValue> {
    data: &'a [T],
    num_dimensions: usize,
    metric: &'a dyn DistanceMetric<T>,
    items: Vec<(T, ObservationIndex)>,
    nodes: Vec<Node<T>>,
    rng: StdRng,
}

impl<T: DataValue> TreeBuilder<'_, T> {
    fn observation(&self, i: ObservationIndex) -> &[T] {
        let start = i as usize * self.num_dimensions;
        &self.data[start..start + self.num_dimensions]
    }

    fn build(&mut self, lower: usize, upper: usize) -> ObservationIndex {
        let pos = self.nodes.len();
        self.nodes.push(Node {
            radius: T::zero(),
            index: 0,
            left: LEAF,
            right: LEAF,
        });

        let gap = upper - lower;
        if gap > 1 {
            // Move a random vantage point to the start of the range.
            let chosen = (self.rng.gen::<u64>() % gap as u64) as usize + lower;
            self.items.swap(lower, chosen);
            let vantage = self.items[lower].1;
            self.nodes[pos].index = vantage;

            for i in (lower + 1)..upper {
                let other = self.items[i].1;
                self.items[i].0 = self
                    .metric
                    .raw(self.observation(vantage), self.observation(other));
            }

            // Partition around the median distance, excluding the vantage point.
            let median = lower + gap / 2;
            let lower_p1 = lower + 1;
            self.items[lower_p1..upper]
                .select_nth_unstable_by_key(median - lower_p1, |&(d, i)| (d.ordered(), i));
            self.nodes[pos].radius = self.metric.normalize(self.items[median].0);

            if lower_p1 < median {
                let left = self.build(lower_p1, median);
                self.nodes[pos].left = left;
            }
            if median < upper {
                let right = self.build(median, upper);
                self.nodes[pos].right = right;
            }
        } else {
            self.nodes[pos].index = self.items[lower].1;
        }

        pos as ObservationIndex
    }
}

impl<T: DataValue> VptreePrebuilt<T> {
    /// Build a tree over a contiguous store of `num_observations` observations.
    pub fn new(
        num_dimensions: usize,
        num_observations: ObservationIndex,
        data: Vec<T>,
        metric: Arc<dyn DistanceMetric<T>>,
    ) -> Result<Self> {
        if data.len() != num_dimensions * num_observations as usize {
            return Err(KnnError::invalid_argument(format!(
                "data length {} does not match {} dimensions x {} observations",
                data.len(),
                num_dimensions,
                num_observations
            )));
        }

        if num_observations == 0 {
            return Ok(Self {
                num_dimensions,
                num_observations,
                data,
                metric,
                nodes: Vec::new(),
                new_locations: Vec::new(),
            });
        }

        // Seeded from the dataset shape so that ties are broken consistently
        // for any given dataset.
        let seed = 1_234_567_890u64
            .wrapping_mul(num_observations as u64)
            .wrapping_add(num_dimensions as u64);

        let mut builder = TreeBuilder {
            data: &data,
            num_dimensions,
            metric: metric.as_ref(),
            items: (0..num_observations).map(|i| (T::zero(), i)).collect(),
            nodes: Vec::with_capacity(num_observations as usize),
            rng: StdRng::seed_from_u64(seed),
        };
        builder.build(0, num_observations as usize);
        let nodes = builder.nodes;

        // Store the data in node order for better cache locality.
        let order: Vec<ObservationIndex> = nodes.iter().map(|n| n.index).collect();
        let reordered = gather_observations(&data, num_dimensions, &order);
        let mut new_locations = vec![0; num_observations as usize];
        for (pos, &original) in order.iter().enumerate() {
            new_locations[original as usize] = pos as ObservationIndex;
        }

        Ok(Self {
            num_dimensions,
            num_observations,
            data: reordered,
            metric,
            nodes,
            new_locations,
        })
    }

    fn node_observation(&self, node: ObservationIndex) -> &[T] {
        let start = node as usize * self.num_dimensions;
        &self.data[start..start + self.num_dimensions]
    }

    fn distance_to_node(&self, node: ObservationIndex, target: &[T]) -> T {
        self.metric
            .normalize(self.metric.raw(self.node_observation(node), target))
    }

    fn search_nn(
        &self,
        node_index: ObservationIndex,
        target: &[T],
        max_dist: &mut T,
        nearest: &mut NeighborQueue<T>,
    ) {
        let dist = self.distance_to_node(node_index, target);
        let node = &self.nodes[node_index as usize];
        if dist <= *max_dist {
            nearest.add(node.index, dist);
            if nearest.is_full() {
                *max_dist = nearest.limit();
            }
        }

        if dist < node.radius {
            // Inside the ball, so the left subtree is more promising.
            if node.left != LEAF && dist - *max_dist <= node.radius {
                self.search_nn(node.left, target, max_dist, nearest);
            }
            if node.right != LEAF && dist + *max_dist >= node.radius {
                self.search_nn(node.right, target, max_dist, nearest);
            }
        } else {
            if node.right != LEAF && dist + *max_dist >= node.radius {
                self.search_nn(node.right, target, max_dist, nearest);
            }
            if node.left != LEAF && dist - *max_dist <= node.radius {
                self.search_nn(node.left, target, max_dist, nearest);
            }
        }
    }

    fn search_all_nodes<F>(&self, node_index: ObservationIndex, target: &[T], threshold: T, found: &mut F)
    where
        F: FnMut(ObservationIndex, T),
    {
        let dist = self.distance_to_node(node_index, target);
        let node = &self.nodes[node_index as usize];
        if dist <= threshold {
            found(node.index, dist);
        }

        if node.left != LEAF && dist - threshold <= node.radius {
            self.search_all_nodes(node.left, target, threshold, found);
        }
        if node.right != LEAF && dist + threshold >= node.radius {
            self.search_all_nodes(node.right, target, threshold, found);
        }
    }

    fn count_within(&self, target: &[T], threshold: T) -> usize {
        let mut count = 0;
        self.search_all_nodes(0, target, threshold, &mut |_, _| count += 1);
        count
    }

    fn collect_within(&self, target: &[T], threshold: T, all_neighbors: &mut Vec<(T, ObservationIndex)>) {
        all_neighbors.clear();
        self.search_all_nodes(0, target, threshold, &mut |i, d| all_neighbors.push((d, i)));
    }
}

impl<T: DataValue> Prebuilt<T> for VptreePrebuilt<T> {
    fn num_observations(&self) -> ObservationIndex {
        self.num_observations
    }

    fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    fn initialize(&self) -> Box<dyn Searcher<T> + '_> {
        Box::new(VptreeSearcher {
            parent: self,
            nearest: NeighborQueue::new(),
            all_neighbors: Vec::new(),
        })
    }

    fn save(&self, prefix: &Path) -> Result<()> {
        save_algorithm(prefix, VPTREE_ALGORITHM)?;
        PrebuiltConfig::new::<T>(self.num_observations, self.num_dimensions)
            .with_num_nodes(self.nodes.len())
            .save(prefix)?;
        save_metric(self.metric.as_ref(), prefix)?;
        quick_save(&prefixed(prefix, DATA_FILE), &self.data)?;

        let radii: Vec<T> = self.nodes.iter().map(|n| n.radius).collect();
        let indices: Vec<ObservationIndex> = self.nodes.iter().map(|n| n.index).collect();
        let lefts: Vec<ObservationIndex> = self.nodes.iter().map(|n| n.left).collect();
        let rights: Vec<ObservationIndex> = self.nodes.iter().map(|n| n.right).collect();
        quick_save(&prefixed(prefix, RADIUS_FILE), &radii)?;
        quick_save(&prefixed(prefix, INDEX_FILE), &indices)?;
        quick_save(&prefixed(prefix, LEFT_FILE), &lefts)?;
        quick_save(&prefixed(prefix, RIGHT_FILE), &rights)
    }
}

/// Reload a VP tree index saved by [`Prebuilt::save`].
pub fn load_vptree_prebuilt<T: DataValue>(
    prefix: &Path,
    registry: &LoadRegistry<T>,
) -> Result<Box<dyn Prebuilt<T>>> {
    let config = PrebuiltConfig::load(prefix)?;
    config.check_numeric_type::<T>()?;
    let num_nodes = PrebuiltConfig::require(config.num_nodes, "num_nodes")?;
    if num_nodes != config.num_observations as usize {
        return Err(KnnError::data_loss(format!(
            "VP tree has {} nodes for {} observations",
            num_nodes, config.num_observations
        )));
    }

    let metric = registry.metrics().load(prefix)?;
    let data = quick_load(&prefixed(prefix, DATA_FILE), config.data_length()?)?;
    let radii: Vec<T> = quick_load(&prefixed(prefix, RADIUS_FILE), num_nodes)?;
    let indices: Vec<ObservationIndex> = quick_load(&prefixed(prefix, INDEX_FILE), num_nodes)?;
    let lefts: Vec<ObservationIndex> = quick_load(&prefixed(prefix, LEFT_FILE), num_nodes)?;
    let rights: Vec<ObservationIndex> = quick_load(&prefixed(prefix, RIGHT_FILE), num_nodes)?;

    let mut nodes = Vec::with_capacity(num_nodes);
    let mut new_locations = vec![0; num_nodes];
    for pos in 0..num_nodes {
        let node = Node {
            radius: radii[pos],
            index: indices[pos],
            left: lefts[pos],
            right: rights[pos],
        };
        // Children always come after their parent, which also rules out cycles.
        let valid_child = |n: ObservationIndex| n == LEAF || (pos < n as usize && (n as usize) < num_nodes);
        if (node.index as usize) >= num_nodes || !valid_child(node.left) || !valid_child(node.right) {
            return Err(KnnError::data_loss(format!(
                "VP tree node {} refers to an invalid node or observation",
                pos
            )));
        }
        new_locations[node.index as usize] = pos as ObservationIndex;
        nodes.push(node);
    }

    Ok(Box::new(VptreePrebuilt {
        num_dimensions: config.num_dimensions,
        num_observations: config.num_observations,
        data,
        metric,
        nodes,
        new_locations,
    }))
}

/// Searcher on a [`VptreePrebuilt`] index.
pub struct VptreeSearcher<'a, T: DataValue> {
    parent: &'a VptreePrebuilt<T>,
    nearest: NeighborQueue<T>,
    all_neighbors: Vec<(T, ObservationIndex)>,
}

impl<T: DataValue> Searcher<T> for VptreeSearcher<'_, T> {
    fn search(
        &mut self,
        i: ObservationIndex,
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        check_observation(i, self.parent.num_observations)?;
        let location = self.parent.new_locations[i as usize];
        self.nearest
            .reset(cap_k(k, self.parent.num_observations) + 1);
        let mut max_dist = T::max_value();
        self.parent.search_nn(
            0,
            self.parent.node_observation(location),
            &mut max_dist,
            &mut self.nearest,
        );
        self.nearest.report_excluding(indices, distances, i);
        Ok(())
    }

    fn search_query(
        &mut self,
        query: &[T],
        k: usize,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<()> {
        check_query(query, self.parent.num_dimensions)?;
        let k = cap_k_query(k, self.parent.num_observations);
        if k == 0 {
            clear_outputs(indices, distances);
            return Ok(());
        }

        self.nearest.reset(k);
        let mut max_dist = T::max_value();
        self.parent
            .search_nn(0, query, &mut max_dist, &mut self.nearest);
        self.nearest.report(indices, distances);
        Ok(())
    }

    fn can_search_all(&self) -> bool {
        true
    }

    fn search_all(
        &mut self,
        i: ObservationIndex,
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        check_observation(i, self.parent.num_observations)?;
        let location = self.parent.new_locations[i as usize];
        let target = self.parent.node_observation(location);

        if indices.is_none() && distances.is_none() {
            let count = self.parent.count_within(target, threshold);
            return Ok(count_all_neighbors_without_self(count));
        }

        self.parent
            .collect_within(target, threshold, &mut self.all_neighbors);
        report_all_neighbors(&mut self.all_neighbors, indices, distances, Some(i));
        Ok(count_all_neighbors_without_self(self.all_neighbors.len()))
    }

    fn search_all_query(
        &mut self,
        query: &[T],
        threshold: T,
        indices: Option<&mut Vec<ObservationIndex>>,
        distances: Option<&mut Vec<T>>,
    ) -> Result<usize> {
        check_query(query, self.parent.num_dimensions)?;
        if self.parent.nodes.is_empty() {
            clear_outputs(indices, distances);
            return Ok(0);
        }

        if indices.is_none() && distances.is_none() {
            return Ok(self.parent.count_within(query, threshold));
        }

        self.parent
            .collect_within(query, threshold, &mut self.all_neighbors);
        report_all_neighbors(&mut self.all_neighbors, indices, distances, None);
        Ok(self.all_neighbors.len())
    }
}
