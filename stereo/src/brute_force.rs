//! Exhaustive reference solver.
//!
//! Enumerates feasible labelings by recursing over pixels in row-major
//! order; exponential in the pixel count, intended as a ground-truth
//! oracle for tiny inputs only.

use mrf_core::Result;

use crate::graph::{DisparityGraph, DisparityNode};
use crate::labeling::Labeling;
use crate::DisparityFinder;

pub struct BruteForceFinder<'g, C> {
    graph: &'g DisparityGraph<C>,
}

impl<'g, C: Copy + Default + Into<f64>> BruteForceFinder<'g, C> {
    pub fn new(graph: &'g DisparityGraph<C>) -> Self {
        Self { graph }
    }

    /// Enumerate the labels of the pixel at `position` against the rest
    /// of the running labeling, recording every improvement.
    ///
    /// The running labeling is complete and feasible at every step:
    /// each candidate goes through the checked setter, so intermediate
    /// penalties are always finite.
    fn search(
        &self,
        labeling: &mut Labeling<'g, C>,
        best: &mut Labeling<'g, C>,
        position: usize,
    ) -> Result<()> {
        if position == labeling.nodes().len() {
            return Ok(());
        }
        let pixel = labeling.nodes()[position];
        for disparity in labeling.node_disparities(pixel) {
            let candidate = DisparityNode::new(pixel.row, pixel.col, disparity);
            // The window may have shifted while deeper pixels moved.
            if labeling.set_node(candidate).is_err() {
                continue;
            }
            if labeling.penalty() < best.penalty() {
                best.assign(labeling)?;
            }
            self.search(labeling, best, position + 1)?;
        }
        Ok(())
    }
}

impl<'g, C: Copy + Default + Into<f64>> DisparityFinder<'g, C> for BruteForceFinder<'g, C> {
    fn find(&mut self) -> Result<Labeling<'g, C>> {
        let mut labeling = Labeling::new(self.graph);
        let mut best = labeling.clone();
        self.search(&mut labeling, &mut best, 0)?;
        Ok(best)
    }
}
