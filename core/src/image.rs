use ::image::{GrayImage, Luma};

use crate::{Error, Result};

/// Row-major scalar image buffer.
///
/// Pixels are written once by the decoding side and treated as
/// immutable for the lifetime of any graph built on top of the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<C> {
    rows: usize,
    cols: usize,
    data: Vec<C>,
}

impl<C: Copy + Default> Image<C> {
    /// Create a zero-filled buffer with the given dimensions.
    ///
    /// A buffer is either empty in both dimensions or in neither.
    pub fn new(rows: usize, cols: usize) -> Result<Self> {
        if (rows == 0) != (cols == 0) {
            return Err(Error::InvalidDimensions { rows, cols });
        }
        Ok(Self {
            rows,
            cols,
            data: vec![C::default(); rows * cols],
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read one pixel.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range read; callers are expected to index
    /// within `rows()` and `cols()`.
    pub fn get(&self, row: usize, col: usize) -> C {
        assert!(
            row < self.rows && col < self.cols,
            "pixel ({row}, {col}) outside a {}x{} image",
            self.rows,
            self.cols
        );
        self.data[row * self.cols + col]
    }

    /// Write one pixel.
    ///
    /// # Panics
    ///
    /// Panics on an out-of-range write.
    pub fn set(&mut self, row: usize, col: usize, value: C) {
        assert!(
            row < self.rows && col < self.cols,
            "pixel ({row}, {col}) outside a {}x{} image",
            self.rows,
            self.cols
        );
        self.data[row * self.cols + col] = value;
    }

    /// Fill one row from a slice, for decoders and test fixtures.
    ///
    /// # Panics
    ///
    /// Panics when `values` does not span exactly one row.
    pub fn set_row(&mut self, row: usize, values: &[C]) {
        assert_eq!(values.len(), self.cols, "row length mismatch");
        let start = row * self.cols;
        self.data[start..start + self.cols].copy_from_slice(values);
    }
}

impl Image<u8> {
    /// Copy a decoded grayscale image into a scalar buffer.
    pub fn from_gray(img: &GrayImage) -> Self {
        Self {
            rows: img.height() as usize,
            cols: img.width() as usize,
            data: img.as_raw().clone(),
        }
    }

    /// Render the buffer back into a grayscale image.
    pub fn to_gray(&self) -> GrayImage {
        let mut img = GrayImage::new(self.cols as u32, self.rows as u32);
        for row in 0..self.rows {
            for col in 0..self.cols {
                img.put_pixel(col as u32, row as u32, Luma([self.get(row, col)]));
            }
        }
        img
    }
}
