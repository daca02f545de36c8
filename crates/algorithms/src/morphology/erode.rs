//! Grayscale erosion by a tip (surface reconstruction)
//!
//! `R[j][i] = min { I[j+py][i+px] - T[py+yc][px+xc] }`. Note the offsets
//! enter with the opposite sign to dilation: the image is shifted under the
//! tip. Each output is an upper bound on the true surface height.

use tipmorph_core::raster::Raster;
use tipmorph_core::{Algorithm, Error, Result};

use super::{allocate_output, check_operands, fill_rows, Apex};

/// Parameters for erosion
#[derive(Debug, Clone, Default)]
pub struct ErosionParams {
    /// Tip apex, the tip centre when `None`
    pub apex: Option<Apex>,
}

/// Erosion algorithm: input is `(image, tip)`
#[derive(Debug, Clone, Default)]
pub struct Erosion;

impl Algorithm for Erosion {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = Raster<f64>;
    type Params = ErosionParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Erosion"
    }

    fn description(&self) -> &'static str {
        "Grayscale erosion of an image by a tip (surface reconstruction)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (image, tip) = input;
        let apex = params.apex.unwrap_or_else(|| Apex::center(&tip));
        erosion(&image, &tip, apex)
    }
}

/// Erode `image` by `tip` with the given apex.
///
/// The output has the dimensions of `image`.
pub fn erosion(image: &Raster<f64>, tip: &Raster<f64>, apex: Apex) -> Result<Raster<f64>> {
    check_operands(image, tip, apex)?;

    let (rows, cols) = image.shape();
    let (tip_rows, tip_cols) = tip.shape();
    let xc = apex.col as isize;
    let yc = apex.row as isize;

    let mut output = allocate_output(rows, cols, *image.calibration(), f64::INFINITY)?;
    fill_rows(&mut output, |row, samples| {
        let j = row as isize;
        let py_min = (-j).max(-yc);
        let py_max = (tip_rows as isize - yc).min(rows as isize - j) - 1;

        for (col, out) in samples.iter_mut().enumerate() {
            let i = col as isize;
            let px_min = (-i).max(-xc);
            let px_max = (tip_cols as isize - xc).min(cols as isize - i) - 1;

            let mut min = f64::INFINITY;
            for py in py_min..=py_max {
                for px in px_min..=px_max {
                    // SAFETY: offsets are clipped so both indices stay in bounds
                    let v = unsafe {
                        image.get_unchecked((j + py) as usize, (i + px) as usize)
                            - tip.get_unchecked((py + yc) as usize, (px + xc) as usize)
                    };
                    if v < min {
                        min = v;
                    }
                }
            }
            *out = min;
        }
    })?;

    Ok(output)
}
