//! Tip operations on calibrated fields
//!
//! Tips are stored upright (apex at the top, as a height map of the probe).
//! Before entering the morphological operators the tip is resampled to
//! the surface pitch, mirrored in x and y and shifted so its apex sits at
//! height zero.

use tipmorph_core::raster::{Calibration, Raster};
use tipmorph_core::{Error, Result};
use tracing::debug;

use crate::morphology::{certainty_map, dilation, erosion, Apex, CertaintyParams};

/// Resample `tip` so its pixel pitch equals `pitch`.
///
/// The physical extent is kept; each dimension gets at least one pixel.
pub fn match_tip_pitch(tip: &Raster<f64>, pitch: &Calibration) -> Result<Raster<f64>> {
    if tip.is_empty() {
        return Err(Error::invalid(
            "tip",
            format!("{}x{}", tip.cols(), tip.rows()),
            "must not be empty",
        ));
    }
    for (name, value) in [("dx", pitch.dx), ("dy", pitch.dy)] {
        if !(value.is_finite() && value > 0.0) {
            return Err(Error::invalid(name, value, "pixel pitch must be positive"));
        }
    }

    let cols = ((tip.xreal() / pitch.dx).round() as usize).max(1);
    let rows = ((tip.yreal() / pitch.dy).round() as usize).max(1);

    let mut matched = if (rows, cols) == tip.shape() {
        tip.clone()
    } else {
        debug!(
            from_cols = tip.cols(),
            from_rows = tip.rows(),
            cols,
            rows,
            "resampling tip to surface pitch"
        );
        tip.resampled(rows, cols)?
    };
    let cal = *matched.calibration();
    matched.set_calibration(Calibration { dx: pitch.dx, dy: pitch.dy, ..cal });
    Ok(matched)
}

/// Tip as a structuring element: surface pitch, mirrored, maximum at zero
fn structuring_tip(tip: &Raster<f64>, pitch: &Calibration) -> Result<Raster<f64>> {
    let mut element = match_tip_pitch(tip, pitch)?.flipped(true, true)?;
    let max = element.max();
    element.add_scalar(-max);
    Ok(element)
}

/// Image of `surface` scanned with `tip` (dilation).
pub fn simulate_scan(tip: &Raster<f64>, surface: &Raster<f64>) -> Result<Raster<f64>> {
    let element = structuring_tip(tip, surface.calibration())?;
    dilation(surface, &element, Apex::center(&element))
}

/// Best upper bound on the surface that produced `image` (erosion).
pub fn reconstruct_surface(tip: &Raster<f64>, image: &Raster<f64>) -> Result<Raster<f64>> {
    let element = structuring_tip(tip, image.calibration())?;
    erosion(image, &element, Apex::center(&element))
}

/// Certainty map of the reconstruction of `image` by `tip`.
///
/// The image is padded by the tip size with its minimum so that pixels
/// near the border can be certified, then the map is cropped back.
pub fn tip_certainty_map(
    tip: &Raster<f64>,
    image: &Raster<f64>,
    params: &CertaintyParams,
) -> Result<Raster<u8>> {
    let element = structuring_tip(tip, image.calibration())?;
    let apex = Apex::center(&element);
    let (tip_rows, tip_cols) = element.shape();
    let (rows, cols) = image.shape();
    let (top, left) = (tip_rows / 2, tip_cols / 2);

    let large = image.padded(top, left, rows + tip_rows, cols + tip_cols, image.min())?;
    let eroded = erosion(&large, &element, apex)?;

    // Tolerance follows the unpadded image range
    let params = CertaintyParams {
        tolerance: Some(match params.tolerance {
            Some(t) => t,
            None => (image.max() - image.min()) / 100.0,
        }),
    };
    let cmap = certainty_map(&large, &element, &eroded, apex, &params)?;
    cmap.extract(top, left, rows, cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn calibrated(mut r: Raster<f64>, pitch: f64) -> Raster<f64> {
        r.set_calibration(Calibration::new(pitch, pitch));
        r
    }

    fn upright_pyramid() -> Raster<f64> {
        calibrated(
            Raster::from_rows(&[
                vec![0.0, 1.0, 0.0],
                vec![1.0, 2.0, 1.0],
                vec![0.0, 1.0, 0.0],
            ])
            .unwrap(),
            1e-9,
        )
    }

    #[test]
    fn test_match_tip_pitch_same_pitch_keeps_data() {
        let tip = upright_pyramid();
        let matched = match_tip_pitch(&tip, &Calibration::new(1e-9, 1e-9)).unwrap();
        assert_eq!(matched.data(), tip.data());
    }

    #[test]
    fn test_match_tip_pitch_coarser_surface() {
        let tip = calibrated(Raster::filled(10, 10, 1.0), 1e-9);
        let matched = match_tip_pitch(&tip, &Calibration::new(2e-9, 2e-9)).unwrap();
        assert_eq!(matched.shape(), (5, 5));
        assert_relative_eq!(matched.calibration().dx, 2e-9);
    }

    #[test]
    fn test_match_tip_pitch_keeps_one_pixel() {
        let tip = calibrated(Raster::filled(2, 2, 1.0), 1e-9);
        let matched = match_tip_pitch(&tip, &Calibration::new(1e-6, 1e-6)).unwrap();
        assert_eq!(matched.shape(), (1, 1));
    }

    #[test]
    fn test_simulate_scan_of_spike_shows_tip() {
        let mut surface = calibrated(Raster::filled(7, 7, 0.0), 1e-9);
        surface.set(3, 3, 5.0).unwrap();
        let image = simulate_scan(&upright_pyramid(), &surface).unwrap();

        assert_eq!(image.get(3, 3).unwrap(), 5.0);
        assert_eq!(image.get(3, 2).unwrap(), 4.0);
        assert_eq!(image.get(2, 2).unwrap(), 3.0);
        assert_eq!(image.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn test_reconstruction_bounds_surface() {
        let mut surface = calibrated(Raster::filled(9, 9, 0.0), 1e-9);
        surface.set(4, 4, 5.0).unwrap();
        surface.set(2, 6, 3.0).unwrap();
        let tip = upright_pyramid();
        let image = simulate_scan(&tip, &surface).unwrap();
        let recon = reconstruct_surface(&tip, &image).unwrap();

        for ((r, s), i) in recon.data().iter().zip(surface.data().iter()).zip(image.data().iter()) {
            assert!(r >= s && r <= i);
        }
        assert_eq!(recon.get(4, 4).unwrap(), 5.0);
    }

    #[test]
    fn test_tip_certainty_map_marks_peak() {
        let mut surface = calibrated(Raster::filled(9, 9, 0.0), 1e-9);
        surface.set(4, 4, 5.0).unwrap();
        let tip = upright_pyramid();
        let image = simulate_scan(&tip, &surface).unwrap();
        let cmap = tip_certainty_map(&tip, &image, &CertaintyParams::default()).unwrap();

        assert_eq!(cmap.shape(), image.shape());
        assert_eq!(cmap.get(4, 4).unwrap(), 1);
    }

    #[test]
    fn test_zero_pitch_rejected() {
        let tip = upright_pyramid();
        assert!(match_tip_pitch(&tip, &Calibration::new(0.0, 1e-9)).is_err());
    }
}
