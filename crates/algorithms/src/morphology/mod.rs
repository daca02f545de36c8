//! Grayscale morphology with an arbitrary structuring element
//!
//! The structuring element is a tip height field with a designated apex
//! pixel. Operators work in index space only:
//! - **Reflection**: point reflection with sign negation
//! - **Dilation**: scan simulation, surface max-plus the tip
//! - **Erosion**: surface reconstruction, image min-minus the tip
//! - **Opening**: erosion then dilation with the centred apex
//! - **Certainty map**: pixels where the reconstruction touched exactly once

mod certainty;
mod dilate;
mod erode;
mod opening;
mod reflect;

pub use certainty::{certainty_map, CertaintyParams};
pub use dilate::{dilation, Dilation, DilationParams};
pub use erode::{erosion, Erosion, ErosionParams};
pub use opening::{opening, Opening};
pub use reflect::reflect;

use crate::maybe_rayon::*;
use serde::{Deserialize, Serialize};
use tipmorph_core::raster::{Calibration, Raster, RasterElement};
use tipmorph_core::{Error, Result};

/// Origin of a structuring element, in tip pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Apex {
    pub col: usize,
    pub row: usize,
}

impl Apex {
    pub fn new(col: usize, row: usize) -> Self {
        Self { col, row }
    }

    /// Geometric centre `(cols/2, rows/2)` of a tip
    pub fn center<T: RasterElement>(tip: &Raster<T>) -> Self {
        Self::new(tip.cols() / 2, tip.rows() / 2)
    }

    /// Apex of the same tip after point reflection
    pub fn reflected<T: RasterElement>(&self, tip: &Raster<T>) -> Self {
        Self::new(
            tip.cols().saturating_sub(1 + self.col),
            tip.rows().saturating_sub(1 + self.row),
        )
    }

    /// Check that the apex lies inside the tip
    pub fn validate<T: RasterElement>(&self, tip: &Raster<T>) -> Result<()> {
        if self.col >= tip.cols() || self.row >= tip.rows() {
            return Err(Error::invalid(
                "apex",
                format!("({}, {})", self.col, self.row),
                format!("must lie inside the {}x{} tip", tip.cols(), tip.rows()),
            ));
        }
        Ok(())
    }
}

/// Shared operand checks: non-empty fields and an apex inside the tip
pub(crate) fn check_operands(field: &Raster<f64>, tip: &Raster<f64>, apex: Apex) -> Result<()> {
    if field.is_empty() {
        return Err(Error::invalid(
            "image",
            format!("{}x{}", field.cols(), field.rows()),
            "must not be empty",
        ));
    }
    if tip.is_empty() {
        return Err(Error::invalid(
            "tip",
            format!("{}x{}", tip.cols(), tip.rows()),
            "must not be empty",
        ));
    }
    apex.validate(tip)
}

/// Allocate an operator output, reporting failure as [`Error::Allocation`]
pub(crate) fn allocate_output(
    rows: usize,
    cols: usize,
    calibration: Calibration,
    fill: f64,
) -> Result<Raster<f64>> {
    let mut output = Raster::try_filled(rows, cols, fill)?;
    output.set_calibration(calibration);
    Ok(output)
}

/// Run `kernel(row, samples)` over every row of a preallocated output
pub(crate) fn fill_rows<F>(output: &mut Raster<f64>, kernel: F) -> Result<()>
where
    F: Fn(usize, &mut [f64]) + Sync + Send,
{
    let cols = output.cols();
    if cols == 0 {
        return Ok(());
    }
    let buf = output
        .data_mut()
        .as_slice_mut()
        .ok_or_else(|| Error::Other("output grid is not contiguous".into()))?;
    buf.par_chunks_mut(cols)
        .enumerate()
        .for_each(|(row, samples)| kernel(row, samples));
    Ok(())
}
