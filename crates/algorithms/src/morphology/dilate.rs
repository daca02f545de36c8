//! Grayscale dilation by a tip (scan simulation)
//!
//! `R[j][i] = max { S[j-py][i-px] + T[py+yc][px+xc] }` over the tip offsets
//! that keep both indices inside their grids. The output has the size of
//! the surface; near the border the tip is clipped rather than the surface
//! padded.

use tipmorph_core::raster::Raster;
use tipmorph_core::{Algorithm, Error, Result};

use super::{allocate_output, check_operands, fill_rows, Apex};

/// Parameters for dilation
#[derive(Debug, Clone, Default)]
pub struct DilationParams {
    /// Tip apex, the tip centre when `None`
    pub apex: Option<Apex>,
}

/// Dilation algorithm: input is `(surface, tip)`
#[derive(Debug, Clone, Default)]
pub struct Dilation;

impl Algorithm for Dilation {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = Raster<f64>;
    type Params = DilationParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Dilation"
    }

    fn description(&self) -> &'static str {
        "Grayscale dilation of a surface by a tip (simulated scan)"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let (surface, tip) = input;
        let apex = params.apex.unwrap_or_else(|| Apex::center(&tip));
        dilation(&surface, &tip, apex)
    }
}

/// Dilate `surface` by `tip` with the given apex.
///
/// The output has the dimensions of `surface`. The tip may be larger than
/// the surface.
pub fn dilation(surface: &Raster<f64>, tip: &Raster<f64>, apex: Apex) -> Result<Raster<f64>> {
    check_operands(surface, tip, apex)?;

    let (rows, cols) = surface.shape();
    let (tip_rows, tip_cols) = tip.shape();
    let xc = apex.col as isize;
    let yc = apex.row as isize;

    let mut output = allocate_output(rows, cols, *surface.calibration(), f64::NEG_INFINITY)?;
    fill_rows(&mut output, |row, samples| {
        let j = row as isize;
        let py_min = (j - rows as isize + 1).max(-yc);
        let py_max = (tip_rows as isize - yc - 1).min(j);

        for (col, out) in samples.iter_mut().enumerate() {
            let i = col as isize;
            let px_min = (i - cols as isize + 1).max(-xc);
            let px_max = (tip_cols as isize - xc - 1).min(i);

            let mut max = f64::NEG_INFINITY;
            for py in py_min..=py_max {
                for px in px_min..=px_max {
                    // SAFETY: offsets are clipped so both indices stay in bounds
                    let v = unsafe {
                        surface.get_unchecked((j - py) as usize, (i - px) as usize)
                            + tip.get_unchecked((py + yc) as usize, (px + xc) as usize)
                    };
                    if v > max {
                        max = v;
                    }
                }
            }
            *out = max;
        }
    })?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tipmorph_core::raster::Calibration;

    fn make_raster(rows: usize, cols: usize, value: f64) -> Raster<f64> {
        Raster::filled(rows, cols, value)
    }

    #[test]
    fn test_dilation_by_zero_point_is_identity() {
        let surface = Raster::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let tip = make_raster(1, 1, 0.0);
        let result = dilation(&surface, &tip, Apex::new(0, 0)).unwrap();
        assert_eq!(result, surface);
    }

    #[test]
    fn test_dilation_uniform_adds_tip_max() {
        let surface = make_raster(6, 6, 5.0);
        let tip = Raster::from_rows(&[
            vec![-2.0, -1.0, -2.0],
            vec![-1.0, 0.0, -1.0],
            vec![-2.0, -1.0, -2.0],
        ])
        .unwrap();
        let result = dilation(&surface, &tip, Apex::new(1, 1)).unwrap();
        for &v in result.data().iter() {
            assert!((v - 5.0).abs() < 1e-12, "Flat surface should stay flat, got {}", v);
        }
    }

    #[test]
    fn test_dilation_spreads_spike_as_tip_image() {
        let mut surface = make_raster(5, 5, 0.0);
        surface.set(2, 2, 10.0).unwrap();
        let tip = Raster::from_rows(&[
            vec![-3.0, -1.0, -3.0],
            vec![-1.0, 0.0, -1.0],
            vec![-3.0, -1.0, -3.0],
        ])
        .unwrap();
        let result = dilation(&surface, &tip, Apex::new(1, 1)).unwrap();

        assert_eq!(result.get(2, 2).unwrap(), 10.0);
        assert_eq!(result.get(2, 1).unwrap(), 9.0);
        assert_eq!(result.get(1, 2).unwrap(), 9.0);
        assert_eq!(result.get(1, 1).unwrap(), 7.0);
        // Beyond the tip footprint the flat background dominates
        assert_eq!(result.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_dilation_offset_apex_shifts_image() {
        let mut surface = make_raster(4, 4, 0.0);
        surface.set(1, 1, 1.0).unwrap();
        // Two-pixel tip, apex on the left sample
        let tip = Raster::from_rows(&[vec![0.0, -0.5]]).unwrap();
        let result = dilation(&surface, &tip, Apex::new(0, 0)).unwrap();

        // Offset px=1 reads surface at i-1, so the spike appears to its right
        assert_eq!(result.get(1, 1).unwrap(), 1.0);
        assert_eq!(result.get(1, 2).unwrap(), 0.5);
        assert_eq!(result.get(1, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_dilation_tip_larger_than_surface() {
        let surface = Raster::from_rows(&[vec![1.0, 0.0]]).unwrap();
        let tip = make_raster(3, 5, -1.0);
        let result = dilation(&surface, &tip, Apex::new(2, 1)).unwrap();
        assert_eq!(result.shape(), (1, 2));
        assert_eq!(result.get(0, 1).unwrap(), 0.0);
    }

    #[test]
    fn test_dilation_keeps_surface_calibration() {
        let mut surface = make_raster(3, 4, 1.0);
        surface.set_calibration(Calibration::new(2e-9, 3e-9));
        let result = dilation(&surface, &make_raster(1, 1, 0.0), Apex::new(0, 0)).unwrap();
        assert_eq!(result.calibration(), surface.calibration());
        assert_eq!(result.shape(), (3, 4));
    }

    #[test]
    fn test_dilation_algorithm_defaults_to_centre() {
        let mut surface = make_raster(5, 5, 0.0);
        surface.set(2, 2, 4.0).unwrap();
        let tip = make_raster(3, 3, -1.0);
        let via_trait = Dilation
            .execute_default((surface.clone(), tip.clone()))
            .unwrap();
        let direct = dilation(&surface, &tip, Apex::new(1, 1)).unwrap();
        assert_eq!(via_trait, direct);
    }
}
