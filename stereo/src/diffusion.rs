//! Max-sum diffusion solver.
//!
//! Iteratively shifts mass between node potentials and edge potentials
//! through per-directed-half-edge messages until a thresholded
//! crossing-out of the reparametrized problem leaves a consistent
//! sub-problem, then extracts a labeling from the survivors.
//!
//! Messages are packed per pixel as `offset + label * 4 + slot`, one
//! slot per outgoing direction. The slot is `2 * d_row + d_col - 1`
//! computed with `node - neighbor` deltas toward a lesser neighbor and
//! `2 * d_row + d_col + 1` with `neighbor - node` deltas toward a
//! greater one: left = 0, up = 1, right = 2, down = 3. The two halves
//! of an edge sit at mirrored slots, and the edge's reparametrized cost
//! is the raw pairwise penalty plus the sum of both half-edge messages.

use rayon::prelude::*;

use mrf_core::Result;

use crate::boolean_graph::BooleanGraph;
use crate::graph::{DisparityGraph, DisparityNode};
use crate::labeling::Labeling;
use crate::DisparityFinder;

const MAX_NEIGHBORS: usize = 4;

/// Default bound on diffusion iterations; convergence is not guaranteed
/// on degenerate inputs.
const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Packed per-directed-half-edge message store.
struct MessageTable {
    cols: usize,
    offsets: Vec<usize>,
    values: Vec<f64>,
}

fn message_slot(node: DisparityNode, neighbor: DisparityNode) -> usize {
    if neighbor.row <= node.row && neighbor.col <= node.col {
        2 * (node.row - neighbor.row) + (node.col - neighbor.col) - 1
    } else {
        2 * (neighbor.row - node.row) + (neighbor.col - node.col) + 1
    }
}

impl MessageTable {
    fn new<C: Copy + Default + Into<f64>>(graph: &DisparityGraph<C>) -> Self {
        let mut offsets = Vec::with_capacity(graph.rows() * graph.cols());
        let mut total = 0;
        for pixel in graph.available_nodes() {
            offsets.push(total);
            total += graph.max_disparity(pixel) * MAX_NEIGHBORS;
        }
        Self {
            cols: graph.cols(),
            offsets,
            values: vec![0.0; total],
        }
    }

    /// Cell of the half-edge message `node -> neighbor` at the node's
    /// label.
    fn index(&self, node: DisparityNode, neighbor: DisparityNode) -> usize {
        self.offsets[node.row * self.cols + node.col]
            + node.disparity * MAX_NEIGHBORS
            + message_slot(node, neighbor)
    }

    /// Sum of both half-edge messages of an edge at the given labels.
    fn passed(&self, node: DisparityNode, neighbor: DisparityNode) -> f64 {
        self.values[self.index(node, neighbor)] + self.values[self.index(neighbor, node)]
    }

    fn reset(&mut self) {
        self.values.fill(0.0);
    }
}

/// Reparametrized minimum over the neighbor's feasible labels:
/// `phi(node -> neighbor) + min over k' of (phi(neighbor -> node, k') + g)`.
fn min_edge_penalty<C: Copy + Default + Into<f64>>(
    graph: &DisparityGraph<C>,
    messages: &MessageTable,
    node: DisparityNode,
    neighbor: DisparityNode,
) -> f64 {
    let mut best = f64::INFINITY;
    for disparity in graph.neighbor_disparities(node, neighbor) {
        let labeled = DisparityNode::new(neighbor.row, neighbor.col, disparity);
        let penalty = messages.passed(node, labeled) + graph.penalty(node, labeled);
        if penalty < best {
            best = penalty;
        }
    }
    debug_assert!(best.is_finite(), "edge minimum must be finite");
    best
}

/// Message deltas for one pixel: for every label, pull each outgoing
/// message to the average of the per-neighbor minima, leaving the
/// minimum equal across all neighbors without changing any labeling's
/// total energy.
fn node_updates<C: Copy + Default + Into<f64>>(
    graph: &DisparityGraph<C>,
    messages: &MessageTable,
    pixel: DisparityNode,
) -> Vec<(usize, f64)> {
    let neighbors = graph.neighbors(pixel, false);
    if neighbors.is_empty() {
        return Vec::new();
    }
    let mut updates = Vec::with_capacity(graph.max_disparity(pixel) * neighbors.len());
    let mut minima = Vec::with_capacity(neighbors.len());
    for disparity in graph.disparities(pixel) {
        let node = DisparityNode::new(pixel.row, pixel.col, disparity);
        minima.clear();
        minima.extend(
            neighbors
                .iter()
                .map(|&neighbor| min_edge_penalty(graph, messages, node, neighbor)),
        );
        let average = minima.iter().sum::<f64>() / neighbors.len() as f64;
        for (&neighbor, &minimum) in neighbors.iter().zip(&minima) {
            updates.push((messages.index(node, neighbor), average - minimum));
        }
    }
    updates
}

/// Finds disparities by message passing on the reparametrized problem.
pub struct DiffusionFinder<'g, C> {
    graph: &'g DisparityGraph<C>,
    labeling: Labeling<'g, C>,
    boolean_graph: BooleanGraph<'g, C>,
    messages: MessageTable,
    max_iterations: usize,
}

impl<'g, C: Copy + Default + Into<f64> + Sync> DiffusionFinder<'g, C> {
    pub fn new(graph: &'g DisparityGraph<C>) -> Self {
        Self {
            graph,
            labeling: Labeling::new(graph),
            boolean_graph: BooleanGraph::new(graph),
            messages: MessageTable::new(graph),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// One diffusion iteration: a red sweep then a black sweep over the
    /// checkerboard partition. Nodes of one color have no neighbors of
    /// the same color, so each sweep is data-parallel.
    fn iteration(&mut self) {
        self.half_iteration(0);
        self.half_iteration(1);
    }

    fn half_iteration(&mut self, parity: usize) {
        let graph = self.graph;
        let messages = &self.messages;
        let updates: Vec<Vec<(usize, f64)>> = self
            .labeling
            .nodes()
            .par_iter()
            .filter(|pixel| (pixel.row ^ pixel.col) & 1 == parity)
            .map(|&pixel| node_updates(graph, messages, DisparityNode::new(pixel.row, pixel.col, 0)))
            .collect();
        for (index, delta) in updates.into_iter().flatten() {
            self.messages.values[index] += delta;
        }
    }

    /// Cross out every labeled edge whose reparametrized cost exceeds
    /// the edge's best achievable minimum by more than `threshold`,
    /// then ask the crossing-out engine whether a labeling survives.
    fn is_finished(&mut self, threshold: f64) -> bool {
        self.boolean_graph.initialize();
        for index in 0..self.labeling.nodes().len() {
            let pixel = self.labeling.nodes()[index];
            for neighbor in self.graph.neighbors(pixel, true) {
                let mut minimum = f64::INFINITY;
                for disparity in self.graph.disparities(pixel) {
                    let node = DisparityNode::new(pixel.row, pixel.col, disparity);
                    minimum =
                        minimum.min(min_edge_penalty(self.graph, &self.messages, node, neighbor));
                }
                let cutoff = minimum + threshold;
                for disparity in self.graph.disparities(pixel) {
                    let node = DisparityNode::new(pixel.row, pixel.col, disparity);
                    for neighbor_disparity in self.graph.neighbor_disparities(node, neighbor) {
                        let labeled =
                            DisparityNode::new(neighbor.row, neighbor.col, neighbor_disparity);
                        let cost = self.messages.passed(node, labeled)
                            + self.graph.penalty(node, labeled);
                        if cost > cutoff {
                            self.boolean_graph.remove_edge(node, labeled);
                        }
                    }
                }
            }
        }
        self.boolean_graph.is_finished()
    }

    /// Fallback when the iteration budget runs out: move every pixel to
    /// the admissible label with the smallest reparametrized local
    /// score. Goes through the checked setter, so feasibility is
    /// preserved.
    fn greedy_relabel(&mut self) -> Result<()> {
        for index in 0..self.labeling.nodes().len() {
            let current = self.labeling.nodes()[index];
            let neighbors = self.graph.neighbors(current, false);
            let mut best = current.disparity;
            let mut best_score = f64::INFINITY;
            for disparity in self.labeling.node_disparities(current) {
                let node = DisparityNode::new(current.row, current.col, disparity);
                let score: f64 = neighbors
                    .iter()
                    .map(|&neighbor| min_edge_penalty(self.graph, &self.messages, node, neighbor))
                    .sum();
                if score < best_score {
                    best_score = score;
                    best = disparity;
                }
            }
            self.labeling
                .set_node(DisparityNode::new(current.row, current.col, best))?;
        }
        Ok(())
    }
}

impl<'g, C: Copy + Default + Into<f64> + Sync> DisparityFinder<'g, C> for DiffusionFinder<'g, C> {
    fn find(&mut self) -> Result<Labeling<'g, C>> {
        self.messages.reset();
        let pixel_count = (self.graph.rows() * self.graph.cols()) as f64;
        let threshold = 1.0 / (8.0 * pixel_count);

        let mut iterations = 0;
        while !self.is_finished(threshold) {
            if iterations >= self.max_iterations {
                tracing::warn!(
                    iterations,
                    "diffusion stopped before the reduced problem became consistent"
                );
                self.greedy_relabel()?;
                return Ok(self.labeling.clone());
            }
            iterations += 1;
            self.iteration();
            tracing::debug!(iterations, "diffusion iteration finished");
        }
        self.boolean_graph.extract_into(&mut self.labeling);
        Ok(self.labeling.clone())
    }
}
