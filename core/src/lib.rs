pub mod image;

pub use self::image::*;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Incompatible image pair: {0}")]
    ImagesIncompatible(String),

    #[error("Invalid image dimensions: {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("Node ({row}, {col}) with disparity {disparity} is out of range")]
    NodeOutOfRange {
        row: usize,
        col: usize,
        disparity: usize,
    },

    #[error("Disparity {disparity} is not admissible at ({row}, {col})")]
    DisparityNotAdmissible {
        row: usize,
        col: usize,
        disparity: usize,
    },

    #[error("Labelings are bound to different disparity graphs")]
    GraphMismatch,
}

pub type Result<T> = std::result::Result<T, Error>;
