//! The disparity MRF
//!
//! Nodes are right-image pixels, labels are non-negative horizontal
//! disparities into the left image. Horizontal neighbors are subject to
//! an ordering constraint: corresponding left-image pixels must keep
//! their left-to-right order, so the right node of a horizontal pair may
//! lag its left neighbor's disparity by at most one.

use std::ops::Range;

use mrf_core::{Error, Image, Result};

/// A right-image pixel together with a candidate disparity label.
///
/// Identity for storage and lookup is `(row, col)`; the disparity is
/// the mutable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisparityNode {
    pub row: usize,
    pub col: usize,
    pub disparity: usize,
}

impl DisparityNode {
    pub fn new(row: usize, col: usize, disparity: usize) -> Self {
        Self {
            row,
            col,
            disparity,
        }
    }

    /// The pixel coordinate, used for row-major ordering of nodes.
    pub fn pixel(&self) -> (usize, usize) {
        (self.row, self.col)
    }
}

/// The MRF over a rectified image pair.
///
/// Owns both images and the smoothness weight; deeply immutable after
/// construction so labelings and solvers can share it by reference.
#[derive(Debug, Clone)]
pub struct DisparityGraph<C> {
    left: Image<C>,
    right: Image<C>,
    consistency: f64,
}

impl<C: Copy + Default + Into<f64>> DisparityGraph<C> {
    /// Build the graph for a rectified pair with a smoothness weight of 1.
    ///
    /// The right image must be non-empty and no wider than the left,
    /// and both images must have the same number of rows.
    pub fn new(left: Image<C>, right: Image<C>) -> Result<Self> {
        if right.is_empty() {
            return Err(Error::ImagesIncompatible(
                "right image must not be empty".to_string(),
            ));
        }
        if left.rows() != right.rows() {
            return Err(Error::ImagesIncompatible(format!(
                "images must have the same number of rows, got {} and {}",
                left.rows(),
                right.rows()
            )));
        }
        if left.cols() < right.cols() {
            return Err(Error::ImagesIncompatible(format!(
                "left image must be at least as wide as the right one, got {} and {}",
                left.cols(),
                right.cols()
            )));
        }
        Ok(Self {
            left,
            right,
            consistency: 1.0,
        })
    }

    /// Replace the smoothness weight, which must be non-negative.
    pub fn with_consistency(mut self, consistency: f64) -> Result<Self> {
        if !(consistency >= 0.0) {
            return Err(Error::ImagesIncompatible(format!(
                "consistency weight must be non-negative, got {consistency}"
            )));
        }
        self.consistency = consistency;
        Ok(self)
    }

    /// Rows of the right image.
    pub fn rows(&self) -> usize {
        self.right.rows()
    }

    /// Columns of the right image.
    pub fn cols(&self) -> usize {
        self.right.cols()
    }

    /// Columns of the left image, the exclusive bound on `col + disparity`.
    pub fn left_cols(&self) -> usize {
        self.left.cols()
    }

    pub fn consistency(&self) -> f64 {
        self.consistency
    }

    /// Validate that a node lies inside the right image and its
    /// disparity does not run off the left image.
    pub fn check_node(&self, node: DisparityNode) -> Result<()> {
        if node.row >= self.rows()
            || node.col >= self.cols()
            || node.col + node.disparity >= self.left.cols()
        {
            return Err(Error::NodeOutOfRange {
                row: node.row,
                col: node.col,
                disparity: node.disparity,
            });
        }
        Ok(())
    }

    fn assert_node(&self, node: DisparityNode) {
        debug_assert!(
            self.check_node(node).is_ok(),
            "invalid node ({}, {}, {})",
            node.row,
            node.col,
            node.disparity
        );
    }

    /// Row-major index of the node's pixel.
    pub(crate) fn node_index(&self, node: DisparityNode) -> usize {
        node.row * self.cols() + node.col
    }

    /// Number of 4-adjacent neighbors inside the grid: 2 for corners,
    /// 3 on borders, 4 in the interior.
    pub fn neighbor_count(&self, node: DisparityNode) -> usize {
        usize::from(node.row > 0)
            + usize::from(node.row + 1 < self.rows())
            + usize::from(node.col > 0)
            + usize::from(node.col + 1 < self.cols())
    }

    /// Squared difference between the right pixel and the left pixel it
    /// points at.
    pub fn node_penalty(&self, node: DisparityNode) -> f64 {
        self.assert_node(node);
        let right: f64 = self.right.get(node.row, node.col).into();
        let left: f64 = self.left.get(node.row, node.col + node.disparity).into();
        let difference = right - left;
        difference * difference
    }

    /// Whether the labeled pair forms a feasible edge: 4-adjacent, and
    /// for horizontal pairs the ordering constraint holds.
    ///
    /// # Panics
    ///
    /// Panics when both nodes name the same pixel.
    pub fn edge_exists(&self, a: DisparityNode, b: DisparityNode) -> bool {
        assert!(
            a.pixel() != b.pixel(),
            "a pixel cannot be connected with itself"
        );
        self.assert_node(a);
        self.assert_node(b);

        if a.row.abs_diff(b.row) + a.col.abs_diff(b.col) != 1 {
            return false;
        }
        if a.row != b.row {
            return true;
        }
        let (left_node, right_node) = if a.col < b.col { (a, b) } else { (b, a) };
        right_node.disparity + 1 >= left_node.disparity
    }

    /// Pairwise penalty of an edge: the data terms of both endpoints
    /// normalized by their neighbor counts, plus the weighted squared
    /// label difference. Infeasible pairs cost infinity.
    pub fn penalty(&self, a: DisparityNode, b: DisparityNode) -> f64 {
        if !self.edge_exists(a, b) {
            return f64::INFINITY;
        }
        let data = self.node_penalty(a) / self.neighbor_count(a) as f64
            + self.node_penalty(b) / self.neighbor_count(b) as f64;
        let difference = a.disparity as f64 - b.disparity as f64;
        data + self.consistency * difference * difference
    }

    /// In-grid 4-neighbors of a pixel in right, down, left, up order,
    /// carrying label zero. With `directed`, only the two forward
    /// neighbors (right and down) are returned.
    pub fn neighbors(&self, node: DisparityNode, directed: bool) -> Vec<DisparityNode> {
        let mut result = Vec::with_capacity(4);
        if node.col + 1 < self.cols() {
            result.push(DisparityNode::new(node.row, node.col + 1, 0));
        }
        if node.row + 1 < self.rows() {
            result.push(DisparityNode::new(node.row + 1, node.col, 0));
        }
        if !directed {
            if node.col > 0 {
                result.push(DisparityNode::new(node.row, node.col - 1, 0));
            }
            if node.row > 0 {
                result.push(DisparityNode::new(node.row - 1, node.col, 0));
            }
        }
        result
    }

    /// All pixels of the right image as zero-labeled nodes, row-major.
    pub fn available_nodes(&self) -> Vec<DisparityNode> {
        let mut nodes = Vec::with_capacity(self.rows() * self.cols());
        for row in 0..self.rows() {
            for col in 0..self.cols() {
                nodes.push(DisparityNode::new(row, col, 0));
            }
        }
        nodes
    }

    pub fn min_disparity(&self, _node: DisparityNode) -> usize {
        0
    }

    /// Exclusive upper bound on the labels of a pixel.
    pub fn max_disparity(&self, node: DisparityNode) -> usize {
        self.left.cols() - node.col
    }

    /// The full admissible label range of a pixel.
    pub fn disparities(&self, node: DisparityNode) -> Range<usize> {
        self.min_disparity(node)..self.max_disparity(node)
    }

    /// Labels of `neighbor` that form a feasible edge with `node` at its
    /// current label. Empty for pairs that are not 4-adjacent.
    ///
    /// A neighbor to the right may lag `node` by at most one
    /// (`k' >= k - 1`); a neighbor to the left may lead by at most one
    /// (`k' <= k + 1`); vertical neighbors are unconstrained.
    pub fn neighbor_disparities(
        &self,
        node: DisparityNode,
        neighbor: DisparityNode,
    ) -> Range<usize> {
        self.assert_node(node);
        if node.row.abs_diff(neighbor.row) + node.col.abs_diff(neighbor.col) != 1 {
            return 0..0;
        }
        let limit = self.left.cols() - neighbor.col;
        if node.row != neighbor.row {
            return 0..limit;
        }
        if neighbor.col > node.col {
            node.disparity.saturating_sub(1)..limit
        } else {
            0..(node.disparity + 2).min(limit)
        }
    }

    /// Inclusive lower bound of [`Self::neighbor_disparities`].
    pub fn min_neighbor_disparity(&self, node: DisparityNode, neighbor: DisparityNode) -> usize {
        self.neighbor_disparities(node, neighbor).start
    }

    /// Exclusive upper bound of [`Self::neighbor_disparities`].
    pub fn max_neighbor_disparity(&self, node: DisparityNode, neighbor: DisparityNode) -> usize {
        self.neighbor_disparities(node, neighbor).end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_pair(rows: usize, cols: usize) -> DisparityGraph<u8> {
        let left = Image::new(rows, cols).unwrap();
        let right = Image::new(rows, cols).unwrap();
        DisparityGraph::new(left, right).unwrap()
    }

    #[test]
    fn test_create_successful() {
        zero_pair(10, 10);
    }

    #[test]
    fn test_create_rejects_incompatible_pairs() {
        let narrow = Image::<u8>::new(10, 5).unwrap();
        let wide = Image::<u8>::new(10, 10).unwrap();
        let short = Image::<u8>::new(5, 10).unwrap();
        let empty = Image::<u8>::new(0, 0).unwrap();

        assert!(DisparityGraph::new(narrow.clone(), wide.clone()).is_err());
        assert!(DisparityGraph::new(wide.clone(), short).is_err());
        assert!(DisparityGraph::new(wide.clone(), empty).is_err());
        assert!(DisparityGraph::new(wide, narrow).is_ok());
    }

    #[test]
    fn test_negative_consistency_rejected() {
        let graph = zero_pair(10, 10);
        assert!(graph.clone().with_consistency(0.0).is_ok());
        assert!(graph.with_consistency(-1.0).is_err());
    }

    #[test]
    fn test_node_penalty() {
        let mut left = Image::<u8>::new(10, 10).unwrap();
        let mut right = Image::<u8>::new(10, 10).unwrap();
        right.set(0, 0, 3);
        left.set(0, 0, 1);
        left.set(0, 1, 2);
        let graph = DisparityGraph::new(left, right).unwrap();

        assert_eq!(graph.node_penalty(DisparityNode::new(0, 0, 0)), 4.0);
        assert_eq!(graph.node_penalty(DisparityNode::new(0, 0, 1)), 1.0);
    }

    #[test]
    fn test_edge_penalty() {
        let mut left = Image::<u8>::new(10, 10).unwrap();
        let mut right = Image::<u8>::new(10, 10).unwrap();
        right.set(0, 0, 9);
        right.set(0, 1, 8);
        left.set(0, 0, 4);
        left.set(0, 2, 5);
        let graph = DisparityGraph::new(left, right).unwrap();

        assert_eq!(graph.node_penalty(DisparityNode::new(0, 0, 0)), 25.0);
        assert_eq!(graph.node_penalty(DisparityNode::new(0, 1, 1)), 9.0);

        let a = DisparityNode::new(0, 0, 0);
        let b = DisparityNode::new(0, 1, 1);
        assert_eq!(graph.penalty(a, b), 25.0 / 2.0 + 9.0 / 3.0 + 1.0);
        assert_eq!(graph.penalty(b, a), 25.0 / 2.0 + 9.0 / 3.0 + 1.0);

        let c = DisparityNode::new(0, 5, 2);
        let d = DisparityNode::new(0, 6, 3);
        assert_eq!(graph.penalty(c, d), 1.0);
        assert!(graph.edge_exists(c, d));
        assert!(graph.edge_exists(d, c));
    }

    #[test]
    fn test_consistency_affects_weight() {
        let mut left = Image::<u8>::new(10, 10).unwrap();
        let mut right = Image::<u8>::new(10, 10).unwrap();
        right.set(0, 0, 9);
        right.set(0, 1, 8);
        left.set(0, 0, 4);
        left.set(0, 2, 5);
        let graph = DisparityGraph::new(left, right)
            .unwrap()
            .with_consistency(10.0)
            .unwrap();

        let a = DisparityNode::new(0, 0, 0);
        let b = DisparityNode::new(0, 1, 1);
        assert_eq!(graph.penalty(a, b), 25.0 / 2.0 + 9.0 / 3.0 + 10.0);
        assert_eq!(
            graph.penalty(DisparityNode::new(0, 5, 2), DisparityNode::new(0, 6, 3)),
            10.0
        );
    }

    #[test]
    fn test_vertical_disparity_independence() {
        let graph = zero_pair(10, 10);
        let a = DisparityNode::new(5, 5, 3);
        let b = DisparityNode::new(6, 5, 0);
        assert!(graph.edge_exists(a, b));
        assert_eq!(graph.penalty(a, b), 9.0);
    }

    #[test]
    fn test_infeasible_edges() {
        let graph = zero_pair(10, 10);
        let pairs = [
            // diagonal
            (DisparityNode::new(1, 0, 0), DisparityNode::new(0, 1, 0)),
            // too far apart
            (DisparityNode::new(0, 0, 0), DisparityNode::new(0, 5, 0)),
            (DisparityNode::new(0, 0, 0), DisparityNode::new(5, 0, 0)),
            // ordering violation
            (DisparityNode::new(0, 5, 3), DisparityNode::new(0, 6, 1)),
        ];
        for (a, b) in pairs {
            assert!(!graph.edge_exists(a, b), "{a:?} {b:?}");
            assert!(!graph.edge_exists(b, a), "{a:?} {b:?}");
            assert_eq!(graph.penalty(a, b), f64::INFINITY);
            assert_eq!(graph.penalty(b, a), f64::INFINITY);
        }
    }

    #[test]
    #[should_panic]
    fn test_self_edge_panics() {
        let graph = zero_pair(3, 3);
        graph.edge_exists(DisparityNode::new(1, 1, 0), DisparityNode::new(1, 1, 1));
    }

    #[test]
    fn test_neighbor_count() {
        let graph = zero_pair(10, 10);
        assert_eq!(graph.neighbor_count(DisparityNode::new(0, 0, 0)), 2);
        assert_eq!(graph.neighbor_count(DisparityNode::new(9, 9, 0)), 2);
        assert_eq!(graph.neighbor_count(DisparityNode::new(0, 4, 0)), 3);
        assert_eq!(graph.neighbor_count(DisparityNode::new(9, 4, 0)), 3);
        assert_eq!(graph.neighbor_count(DisparityNode::new(5, 5, 0)), 4);
    }

    #[test]
    fn test_available_nodes() {
        let graph = zero_pair(10, 10);
        let nodes = graph.available_nodes();
        assert_eq!(nodes.len(), 100);
        for node in &nodes {
            assert_eq!(node.disparity, 0);
        }
        assert_eq!(nodes[0].pixel(), (0, 0));
        assert_eq!(nodes[99].pixel(), (9, 9));
    }

    #[test]
    fn test_neighbors() {
        let graph = zero_pair(10, 10);

        let neighbors = graph.neighbors(DisparityNode::new(0, 0, 0), false);
        assert_eq!(neighbors.len(), 2);
        assert_eq!(neighbors[0].pixel(), (0, 1));
        assert_eq!(neighbors[1].pixel(), (1, 0));
        for neighbor in neighbors {
            assert!(graph.edge_exists(DisparityNode::new(0, 0, 0), neighbor));
        }

        let forward = graph.neighbors(DisparityNode::new(5, 6, 0), true);
        assert_eq!(forward.len(), 2);
        assert_eq!(forward[0].pixel(), (5, 7));
        assert_eq!(forward[1].pixel(), (6, 6));

        assert!(graph.neighbors(DisparityNode::new(9, 9, 0), true).is_empty());
        assert_eq!(graph.neighbors(DisparityNode::new(9, 9, 0), false).len(), 2);
    }

    #[test]
    fn test_forward_neighbors_reach_every_pixel() {
        let graph = zero_pair(5, 5);
        let mut visited = vec![false; 25];
        let mut queue = vec![DisparityNode::new(0, 0, 0)];
        while let Some(node) = queue.pop() {
            visited[graph.node_index(node)] = true;
            queue.extend(graph.neighbors(node, true));
        }
        assert!(visited.iter().all(|&seen| seen));
    }

    #[test]
    fn test_neighbor_disparities_windows() {
        let graph = zero_pair(10, 10);

        // Rightward neighbor: may lag by at most one.
        let window =
            graph.neighbor_disparities(DisparityNode::new(4, 2, 2), DisparityNode::new(4, 3, 0));
        assert_eq!(window, 1..7);
        assert_eq!(window.len(), 6);

        // Leftward neighbor: may lead by at most one.
        let window =
            graph.neighbor_disparities(DisparityNode::new(4, 3, 2), DisparityNode::new(4, 2, 0));
        assert_eq!(window, 0..4);

        // Vertical neighbor: unconstrained.
        let window =
            graph.neighbor_disparities(DisparityNode::new(4, 2, 2), DisparityNode::new(5, 2, 0));
        assert_eq!(window, 0..8);

        // Non-adjacent pixels have no feasible labels.
        let window =
            graph.neighbor_disparities(DisparityNode::new(4, 2, 2), DisparityNode::new(5, 3, 0));
        assert!(window.is_empty());
    }

    #[test]
    fn test_neighbor_disparities_all_feasible() {
        let graph = zero_pair(10, 10);
        for node in [DisparityNode::new(0, 0, 1), DisparityNode::new(5, 6, 3)] {
            for neighbor in graph.neighbors(node, false) {
                let window = graph.neighbor_disparities(node, neighbor);
                assert!(!window.is_empty());
                for disparity in window {
                    let labeled = DisparityNode::new(neighbor.row, neighbor.col, disparity);
                    assert!(graph.edge_exists(node, labeled), "{node:?} {labeled:?}");
                }
            }
        }
    }

    #[test]
    fn test_float_pixels() {
        let mut left = Image::<f32>::new(2, 3).unwrap();
        let mut right = Image::<f32>::new(2, 3).unwrap();
        right.set(0, 0, 1.5);
        left.set(0, 1, 1.0);
        let graph = DisparityGraph::new(left, right).unwrap();

        assert_eq!(graph.node_penalty(DisparityNode::new(0, 0, 0)), 2.25);
        assert_eq!(graph.node_penalty(DisparityNode::new(0, 0, 1)), 0.25);
    }

    #[test]
    fn test_disparity_bounds() {
        let left = Image::<u8>::new(4, 8).unwrap();
        let right = Image::<u8>::new(4, 5).unwrap();
        let graph = DisparityGraph::new(left, right).unwrap();

        assert_eq!(graph.disparities(DisparityNode::new(0, 0, 0)), 0..8);
        assert_eq!(graph.disparities(DisparityNode::new(0, 4, 0)), 0..4);
        assert!(graph.check_node(DisparityNode::new(0, 4, 3)).is_ok());
        assert!(graph.check_node(DisparityNode::new(0, 4, 4)).is_err());
        assert!(graph.check_node(DisparityNode::new(4, 0, 0)).is_err());
        assert!(graph.check_node(DisparityNode::new(0, 5, 0)).is_err());
    }
}
