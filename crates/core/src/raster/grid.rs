//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::{Calibration, RasterElement};
use ndarray::{s, Array2};

/// A calibrated 2D sample grid.
///
/// `Raster<T>` stores values of type `T` in a single row-major buffer
/// with the lateral calibration of the scan it came from. Topography images,
/// tip shapes and masks are all rasters.
///
/// Each grid has exactly one owner. Operators borrow their inputs and return
/// freshly allocated outputs; storage is released on drop.
///
/// # Type Parameters
///
/// - `T`: The cell value type, must implement [`RasterElement`]
///
/// # Example
///
/// ```ignore
/// use tipmorph_core::Raster;
///
/// // Create a 64x64 field filled with zeros
/// let mut image: Raster<f64> = Raster::new(64, 64);
///
/// // Set a value
/// image.set(10, 20, 4.2e-9)?;
///
/// // Get a value
/// let value = image.get(10, 20)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterElement> {
    /// Samples stored in row-major order (row, col)
    data: Array2<T>,
    /// Lateral calibration
    calibration: Calibration,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    ///
    /// Aborts on allocation failure like any `Vec`; use [`Raster::try_new`]
    /// where the size comes from untrusted input.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new zero-filled raster, reporting allocation failure as an error
    pub fn try_new(rows: usize, cols: usize) -> Result<Self> {
        Self::try_filled(rows, cols, T::zero())
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Fallible version of [`Raster::filled`]
    pub fn try_filled(rows: usize, cols: usize, value: T) -> Result<Self> {
        let len = rows
            .checked_mul(cols)
            .ok_or(Error::Allocation { rows, cols })?;
        let mut buf: Vec<T> = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| Error::Allocation { rows, cols })?;
        buf.resize(len, value);
        Self::from_vec(buf, rows, cols)
    }

    /// Create a raster from existing row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from nested rows; all rows must have the same length
    pub fn from_rows(rows: &[Vec<T>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(Error::InvalidDimensions {
                width: bad.len(),
                height: rows.len(),
            });
        }
        let flat: Vec<T> = rows.iter().flatten().copied().collect();
        Self::from_vec(flat, rows.len(), cols)
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            calibration: Calibration::default(),
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    #[inline]
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Set value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    #[inline]
    pub unsafe fn set_unchecked(&mut self, row: usize, col: usize, value: T) {
        unsafe { *self.data.uget_mut((row, col)) = value; }
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the calibration
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Set the calibration
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Physical width of the field
    pub fn xreal(&self) -> f64 {
        self.calibration.xreal(self.cols())
    }

    /// Physical height of the field
    pub fn yreal(&self) -> f64 {
        self.calibration.yreal(self.rows())
    }

    // Geometry

    /// Copy of the raster mirrored along columns (`xflip`) and/or rows (`yflip`)
    pub fn flipped(&self, xflip: bool, yflip: bool) -> Result<Self> {
        let (rows, cols) = self.shape();
        let mut out = Self::try_filled(rows, cols, T::zero())?;
        out.calibration = self.calibration;
        for ((r, c), v) in out.data.indexed_iter_mut() {
            let sr = if yflip { rows - 1 - r } else { r };
            let sc = if xflip { cols - 1 - c } else { c };
            *v = self.data[(sr, sc)];
        }
        Ok(out)
    }

    /// Copy of the rectangle starting at (row, col) with the given size
    pub fn extract(&self, row: usize, col: usize, rows: usize, cols: usize) -> Result<Self> {
        if row + rows > self.rows() || col + cols > self.cols() {
            return Err(Error::IndexOutOfBounds {
                row: row + rows,
                col: col + cols,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        let data = self
            .data
            .slice(s![row..row + rows, col..col + cols])
            .to_owned();
        let calibration = self.calibration.with_origin(
            self.calibration.origin_x + self.calibration.itor(col as f64),
            self.calibration.origin_y + self.calibration.jtor(row as f64),
        );
        Ok(Self { data, calibration })
    }

    /// Embed the raster into a larger one of size `rows` x `cols` filled with
    /// `fill`, placing the original at (`top`, `left`)
    pub fn padded(&self, top: usize, left: usize, rows: usize, cols: usize, fill: T) -> Result<Self> {
        if top + self.rows() > rows || left + self.cols() > cols {
            return Err(Error::SizeMismatch {
                er: top + self.rows(),
                ec: left + self.cols(),
                ar: rows,
                ac: cols,
            });
        }
        let mut out = Self::try_filled(rows, cols, fill)?;
        out.data
            .slice_mut(s![top..top + self.rows(), left..left + self.cols()])
            .assign(&self.data);
        out.calibration = self.calibration.with_origin(
            self.calibration.origin_x - self.calibration.itor(left as f64),
            self.calibration.origin_y - self.calibration.jtor(top as f64),
        );
        Ok(out)
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        let mean = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };

        RasterStatistics { min, max, mean }
    }
}

impl Raster<f64> {
    /// Minimum sample, `NaN` for an empty raster
    pub fn min(&self) -> f64 {
        self.data.iter().copied().fold(f64::NAN, f64::min)
    }

    /// Maximum sample, `NaN` for an empty raster
    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(f64::NAN, f64::max)
    }

    /// Add a constant to every sample
    pub fn add_scalar(&mut self, value: f64) {
        self.data.mapv_inplace(|v| v + value);
    }

    /// Bilinear resampling to a new pixel size, keeping the physical extent
    pub fn resampled(&self, rows: usize, cols: usize) -> Result<Self> {
        if rows == 0 || cols == 0 || self.is_empty() {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        let (src_rows, src_cols) = self.shape();
        let sy = src_rows as f64 / rows as f64;
        let sx = src_cols as f64 / cols as f64;

        let mut out = Self::try_new(rows, cols)?;
        for r in 0..rows {
            let fy = ((r as f64 + 0.5) * sy - 0.5).clamp(0.0, (src_rows - 1) as f64);
            let r0 = fy.floor() as usize;
            let r1 = (r0 + 1).min(src_rows - 1);
            let ty = fy - r0 as f64;
            for c in 0..cols {
                let fx = ((c as f64 + 0.5) * sx - 0.5).clamp(0.0, (src_cols - 1) as f64);
                let c0 = fx.floor() as usize;
                let c1 = (c0 + 1).min(src_cols - 1);
                let tx = fx - c0 as f64;

                let top = self.data[(r0, c0)] * (1.0 - tx) + self.data[(r0, c1)] * tx;
                let bottom = self.data[(r1, c0)] * (1.0 - tx) + self.data[(r1, c1)] * tx;
                out.data[(r, c)] = top * (1.0 - ty) + bottom * ty;
            }
        }

        out.calibration = Calibration {
            dx: self.calibration.dx * sx,
            dy: self.calibration.dy * sy,
            ..self.calibration
        };
        Ok(out)
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f64> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_try_new_zeroed() {
        let raster: Raster<f64> = Raster::try_new(4, 3).unwrap();
        assert_eq!(raster.len(), 12);
        assert!(raster.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_try_new_overflow_is_allocation_error() {
        let err = Raster::<f64>::try_new(usize::MAX, 2).unwrap_err();
        assert!(matches!(err, Error::Allocation { .. }));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
        assert!(raster.set(0, 10, 1.0).is_err());
    }

    #[test]
    fn test_from_rows_rejects_jagged() {
        let ok = Raster::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(ok.get(1, 0).unwrap(), 3.0);
        assert!(Raster::from_rows(&[vec![1.0, 2.0], vec![3.0]]).is_err());
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f64> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f64).unwrap();
            }
        }

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(0.0));
        assert_eq!(stats.max, Some(99.0));
        assert_relative_eq!(stats.mean.unwrap(), 49.5);
        assert_eq!(raster.min(), 0.0);
        assert_eq!(raster.max(), 99.0);
    }

    #[test]
    fn test_flipped() {
        let r = Raster::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let f = r.flipped(true, true).unwrap();
        assert_eq!(f.get(0, 0).unwrap(), 6.0);
        assert_eq!(f.get(1, 2).unwrap(), 1.0);
        let fx = r.flipped(true, false).unwrap();
        assert_eq!(fx.get(0, 0).unwrap(), 3.0);
        assert_eq!(fx.get(1, 0).unwrap(), 6.0);
    }

    #[test]
    fn test_pad_then_extract() {
        let r = Raster::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let p = r.padded(1, 2, 4, 5, -1.0).unwrap();
        assert_eq!(p.shape(), (4, 5));
        assert_eq!(p.get(0, 0).unwrap(), -1.0);
        assert_eq!(p.get(1, 2).unwrap(), 1.0);
        assert_eq!(p.get(2, 3).unwrap(), 4.0);
        let back = p.extract(1, 2, 2, 2).unwrap();
        assert_eq!(back.data(), r.data());
        assert!(p.extract(3, 0, 2, 2).is_err());
    }

    #[test]
    fn test_resample_constant_and_pitch() {
        let mut r = Raster::filled(4, 4, 7.0);
        r.set_calibration(Calibration::new(2.0, 2.0));
        let out = r.resampled(8, 8).unwrap();
        assert!(out.data().iter().all(|&v| (v - 7.0).abs() < 1e-12));
        assert_relative_eq!(out.calibration().dx, 1.0);
        assert_relative_eq!(out.xreal(), r.xreal());
    }
}
