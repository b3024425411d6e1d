//! Stereo disparity estimation by energy minimization
//!
//! This crate computes dense horizontal disparity maps for rectified
//! grayscale pairs by minimizing the energy of a pairwise Markov random
//! field: a data term per right-image pixel plus a smoothness and
//! ordering term per 4-adjacent pixel pair.

pub mod boolean_graph;
pub mod brute_force;
pub mod diffusion;
pub mod graph;
pub mod labeling;
pub mod map;

pub use boolean_graph::*;
pub use brute_force::*;
pub use diffusion::*;
pub use graph::*;
pub use labeling::*;
pub use map::*;

pub use mrf_core::{Error, Image, Result};

/// Capability shared by the disparity solvers.
///
/// Implementations own whatever working state they need; `find`
/// produces a complete, feasible labeling of the right image.
pub trait DisparityFinder<'g, C> {
    fn find(&mut self) -> Result<Labeling<'g, C>>;
}
