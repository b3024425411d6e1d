//! A complete disparity assignment over the right image.

use std::cell::Cell;

use mrf_core::{Error, Result};

use crate::graph::{DisparityGraph, DisparityNode};
use crate::map::DisparityMap;

/// One labeled node per right-image pixel, row-major.
///
/// Every mutation goes through an admissibility check against the
/// current neighbor labels, so all incident edges stay feasible and the
/// total penalty stays finite.
#[derive(Debug, Clone)]
pub struct Labeling<'g, C> {
    graph: &'g DisparityGraph<C>,
    nodes: Vec<DisparityNode>,
    penalty: Cell<Option<f64>>,
}

impl<'g, C: Copy + Default + Into<f64>> Labeling<'g, C> {
    /// Start from the all-zero labeling, which is feasible for every
    /// pair because constant labelings satisfy the ordering constraint.
    pub fn new(graph: &'g DisparityGraph<C>) -> Self {
        Self {
            graph,
            nodes: graph.available_nodes(),
            penalty: Cell::new(None),
        }
    }

    pub fn graph(&self) -> &'g DisparityGraph<C> {
        self.graph
    }

    /// The current assignment, row-major.
    pub fn nodes(&self) -> &[DisparityNode] {
        &self.nodes
    }

    /// Current label of a pixel.
    pub fn disparity(&self, row: usize, col: usize) -> usize {
        self.nodes[row * self.graph.cols() + col].disparity
    }

    /// The graph's neighbors of a node, carrying their current labels.
    pub fn neighbors(&self, node: DisparityNode, directed: bool) -> Vec<DisparityNode> {
        self.graph
            .neighbors(node, directed)
            .into_iter()
            .map(|neighbor| self.nodes[self.graph.node_index(neighbor)])
            .collect()
    }

    /// Labels of `node`'s pixel that keep all incident edges feasible
    /// given the neighbors' current labels: the intersection of every
    /// neighbor's admissible window. Always a contiguous range.
    pub fn node_disparities(&self, node: DisparityNode) -> std::ops::Range<usize> {
        let mut start = self.graph.min_disparity(node);
        let mut end = self.graph.max_disparity(node);
        for neighbor in self.neighbors(node, false) {
            let window = self.graph.neighbor_disparities(neighbor, node);
            start = start.max(window.start);
            end = end.min(window.end);
        }
        start..end
    }

    /// Relabel one pixel.
    ///
    /// Fails with [`Error::DisparityNotAdmissible`] when the label would
    /// make an incident edge infeasible; the labeling is unchanged.
    pub fn set_node(&mut self, node: DisparityNode) -> Result<()> {
        self.graph.check_node(node)?;
        if !self.node_disparities(node).contains(&node.disparity) {
            return Err(Error::DisparityNotAdmissible {
                row: node.row,
                col: node.col,
                disparity: node.disparity,
            });
        }
        let index = self.graph.node_index(node);
        self.nodes[index] = node;
        self.penalty.set(None);
        Ok(())
    }

    /// Unchecked relabel, for labels already certified feasible by the
    /// crossing-out engine.
    pub(crate) fn set_node_force(&mut self, node: DisparityNode) {
        let index = self.graph.node_index(node);
        self.nodes[index] = node;
        self.penalty.set(None);
    }

    /// Total energy: the pairwise penalty summed once per undirected
    /// edge (each node against its forward neighbors). Memoized until
    /// the next relabel.
    pub fn penalty(&self) -> f64 {
        if let Some(value) = self.penalty.get() {
            return value;
        }
        let mut total = 0.0;
        for &node in &self.nodes {
            for neighbor in self.neighbors(node, true) {
                total += self.graph.penalty(node, neighbor);
            }
        }
        debug_assert!(total.is_finite(), "labeling penalty must stay finite");
        self.penalty.set(Some(total));
        total
    }

    /// Copy another labeling's assignment into this one.
    ///
    /// Both labelings must be bound to the same graph.
    pub fn assign(&mut self, other: &Labeling<'g, C>) -> Result<()> {
        if !std::ptr::eq(self.graph, other.graph) {
            return Err(Error::GraphMismatch);
        }
        self.nodes.clone_from(&other.nodes);
        self.penalty.set(other.penalty.get());
        Ok(())
    }

    /// Export the assignment as a dense disparity map.
    pub fn to_disparity_map(&self) -> DisparityMap {
        DisparityMap::from_labeling(self)
    }
}
