//! Crossing-out engine: arc consistency over availability masks.
//!
//! Tracks which (node, label) and (edge, (label, label)) combinations
//! are still alive, deletes combinations that lost support to a fixed
//! point, and extracts a feasible labeling from whatever survives.
//!
//! Storage is packed 1-D with precomputed per-pixel offsets. Node bits
//! live at `node_offsets[pixel] + label`. Edge bits are kept only for
//! the canonical direction (lesser pixel first in row-major order) at
//! `edge_offsets[pixel] + label * label_stride + slot_base + neighbor_label`,
//! where the forward slot is `2 * d_row + (d_col - 1)`: 0 for the right
//! neighbor, 1 for the one below. Bits outside the feasible label
//! windows are never consulted.

use crate::graph::{DisparityGraph, DisparityNode};
use crate::labeling::Labeling;

pub struct BooleanGraph<'g, C> {
    graph: &'g DisparityGraph<C>,
    pixels: Vec<DisparityNode>,
    node_bits: Vec<bool>,
    node_offsets: Vec<usize>,
    edge_bits: Vec<bool>,
    edge_offsets: Vec<usize>,
}

impl<'g, C: Copy + Default + Into<f64>> BooleanGraph<'g, C> {
    /// Allocate masks sized by the graph's label ranges, all alive.
    pub fn new(graph: &'g DisparityGraph<C>) -> Self {
        let pixels = graph.available_nodes();

        let mut node_offsets = Vec::with_capacity(pixels.len());
        let mut node_total = 0;
        let mut edge_offsets = Vec::with_capacity(pixels.len());
        let mut edge_total = 0;
        for &pixel in &pixels {
            node_offsets.push(node_total);
            node_total += graph.max_disparity(pixel);

            edge_offsets.push(edge_total);
            edge_total += graph.max_disparity(pixel) * Self::label_stride(graph, pixel);
        }

        let mut boolean_graph = Self {
            graph,
            pixels,
            node_bits: vec![false; node_total],
            node_offsets,
            edge_bits: vec![false; edge_total],
            edge_offsets,
        };
        boolean_graph.initialize();
        boolean_graph
    }

    /// Bits occupied by one source label of a pixel: one slot per
    /// forward neighbor, each sized by that neighbor's label count.
    fn label_stride(graph: &DisparityGraph<C>, pixel: DisparityNode) -> usize {
        let mut stride = 0;
        for neighbor in graph.neighbors(pixel, true) {
            stride += graph.max_disparity(neighbor);
        }
        stride
    }

    /// Reset every mask bit to alive. Called before each removal
    /// procedure.
    pub fn initialize(&mut self) {
        self.node_bits.fill(true);
        self.edge_bits.fill(true);
    }

    fn node_bit_index(&self, node: DisparityNode) -> usize {
        self.node_offsets[self.graph.node_index(node)] + node.disparity
    }

    /// Bit index of a canonically-directed edge; `node` must be the
    /// lesser pixel.
    fn edge_bit_index(&self, node: DisparityNode, neighbor: DisparityNode) -> usize {
        debug_assert!(node.pixel() < neighbor.pixel());
        let pixel_index = self.graph.node_index(node);
        let stride = Self::label_stride(self.graph, node);
        let slot = 2 * (neighbor.row - node.row) + (neighbor.col - node.col) - 1;
        // Slot 1 (down) sits after the right neighbor's labels, if any.
        let slot_base = if slot == 0 {
            0
        } else {
            stride - self.graph.max_disparity(neighbor)
        };
        self.edge_offsets[pixel_index] + node.disparity * stride + slot_base + neighbor.disparity
    }

    fn edge_available(&self, node: DisparityNode, neighbor: DisparityNode) -> bool {
        if node.pixel() < neighbor.pixel() {
            self.edge_bits[self.edge_bit_index(node, neighbor)]
        } else {
            self.edge_bits[self.edge_bit_index(neighbor, node)]
        }
    }

    /// Kill one labeled edge. Idempotent.
    pub fn remove_edge(&mut self, node: DisparityNode, neighbor: DisparityNode) {
        let index = if node.pixel() < neighbor.pixel() {
            self.edge_bit_index(node, neighbor)
        } else {
            self.edge_bit_index(neighbor, node)
        };
        self.edge_bits[index] = false;
    }

    /// Kill one labeled node along with every incident labeled edge.
    pub fn remove_node(&mut self, node: DisparityNode) {
        let index = self.node_bit_index(node);
        self.node_bits[index] = false;
        for neighbor in self.graph.neighbors(node, false) {
            for disparity in self.graph.neighbor_disparities(node, neighbor) {
                self.remove_edge(
                    node,
                    DisparityNode::new(neighbor.row, neighbor.col, disparity),
                );
            }
        }
    }

    pub fn node_available(&self, node: DisparityNode) -> bool {
        self.node_bits[self.node_bit_index(node)]
    }

    /// One deletion sweep: a labeled node survives only while every
    /// neighbor still offers a live label on a live edge. A node is
    /// removed as soon as its first unsupported neighbor is found.
    fn deletion_sweep(&mut self) -> bool {
        let mut changed = false;
        for index in 0..self.pixels.len() {
            let pixel = self.pixels[index];
            for disparity in self.graph.disparities(pixel) {
                let node = DisparityNode::new(pixel.row, pixel.col, disparity);
                if !self.node_available(node) {
                    continue;
                }
                for neighbor in self.graph.neighbors(node, false) {
                    let supported = self
                        .graph
                        .neighbor_disparities(node, neighbor)
                        .map(|d| DisparityNode::new(neighbor.row, neighbor.col, d))
                        .any(|n| self.node_available(n) && self.edge_available(node, n));
                    if !supported {
                        self.remove_node(node);
                        changed = true;
                        break;
                    }
                }
            }
        }
        changed
    }

    /// Run the deletion loop to a fixed point and report whether any
    /// labeling survives. On a globally empty reduction the masks are
    /// wiped so that no stale bit outlives the failure.
    pub fn is_finished(&mut self) -> bool {
        while self.deletion_sweep() {}

        if self.node_bits.iter().any(|&alive| alive) {
            return true;
        }
        self.edge_bits.fill(false);
        false
    }

    /// Write the first surviving label of every pixel into `labeling`.
    ///
    /// Requires a preceding [`Self::is_finished`] that returned `true`;
    /// arc consistency together with the ordering constraints makes the
    /// picked labels pairwise feasible.
    pub fn extract_into(&self, labeling: &mut Labeling<'g, C>) {
        for &pixel in &self.pixels {
            let survivor = self
                .graph
                .disparities(pixel)
                .find(|&d| self.node_available(DisparityNode::new(pixel.row, pixel.col, d)))
                .expect("extraction requires a non-empty reduced problem");
            labeling.set_node_force(DisparityNode::new(pixel.row, pixel.col, survivor));
        }
    }
}
