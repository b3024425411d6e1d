//! Dense disparity map export.

use image::{GrayImage, Luma};

use crate::labeling::Labeling;

/// Row-major integer disparity map over the right image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisparityMap {
    pub data: Vec<u32>,
    pub rows: usize,
    pub cols: usize,
}

impl DisparityMap {
    /// Snapshot a labeling's assignment.
    pub fn from_labeling<C: Copy + Default + Into<f64>>(labeling: &Labeling<'_, C>) -> Self {
        let graph = labeling.graph();
        Self {
            data: labeling
                .nodes()
                .iter()
                .map(|node| node.disparity as u32)
                .collect(),
            rows: graph.rows(),
            cols: graph.cols(),
        }
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.data[row * self.cols + col]
    }

    /// Normalize the disparity range to a grayscale image for
    /// visualization.
    pub fn to_image(&self) -> GrayImage {
        let max = self.data.iter().copied().max().unwrap_or(0);
        let mut img = GrayImage::new(self.cols as u32, self.rows as u32);
        for (index, &disparity) in self.data.iter().enumerate() {
            let value = if max > 0 {
                (disparity * 255 / max) as u8
            } else {
                0
            };
            let col = (index % self.cols) as u32;
            let row = (index / self.cols) as u32;
            img.put_pixel(col, row, Luma([value]));
        }
        img
    }
}
