//! Blind tip estimation on calibrated fields
//!
//! Wraps the iterated estimator with the field preparation it needs. The
//! tip is taken and returned upright, in the convention of
//! [`simulate_scan`](super::surface::simulate_scan); the estimator itself
//! refines the mirrored structuring element with its apex at height zero.
//! Both fields can be quantized to integer height levels first. The
//! returned tip has its lowest sample at zero.

use serde::{Deserialize, Serialize};
use tipmorph_core::progress::{proceed, Progress};
use tipmorph_core::raster::Raster;
use tipmorph_core::{Error, Result};
use tracing::{info, warn};

use super::estimate::{estimate, EstimateMethod, EstimateParams, EstimateReport};
use super::radius::tip_radius;
use super::surface::match_tip_pitch;
use crate::morphology::Apex;

/// Number of height levels spanning the surface range when quantizing
const QUANTIZATION_LEVELS: f64 = 10_000.0;

/// Parameters for blind estimation
#[derive(Debug, Clone)]
pub struct BlindParams {
    /// Noise threshold in surface height units
    pub threshold: f64,
    /// Also use locations near the image border
    pub use_edges: bool,
    /// Outer loop strategy
    pub method: EstimateMethod,
    /// Run on integer height levels (1/10000 of the surface range)
    pub quantize: bool,
    /// Upper bound on the number of passes
    pub max_iterations: usize,
}

impl Default for BlindParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            use_edges: true,
            method: EstimateMethod::Full,
            quantize: true,
            max_iterations: 10_000,
        }
    }
}

/// Estimated tip with the estimator's report
#[derive(Debug, Clone)]
pub struct BlindResult {
    pub tip: Raster<f64>,
    pub report: EstimateReport,
}

/// Tip estimated from one horizontal stripe of the surface
#[derive(Debug, Clone)]
pub struct StripeTip {
    /// First surface row of the stripe
    pub row: usize,
    /// Number of rows in the stripe
    pub height: usize,
    /// Physical y coordinate of the stripe centre
    pub center_y: f64,
    pub tip: Raster<f64>,
    pub report: EstimateReport,
    /// Estimation completed and refined the tip at least once
    pub good: bool,
    /// Apex radius of the stripe tip, when it could be fitted
    pub radius: Option<f64>,
}

/// Summary of one stripe, as written to reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSummary {
    pub row: usize,
    pub height: usize,
    pub center_y: f64,
    pub good: bool,
    pub radius: Option<f64>,
    pub report: EstimateReport,
}

impl From<&StripeTip> for StripeSummary {
    fn from(stripe: &StripeTip) -> Self {
        Self {
            row: stripe.row,
            height: stripe.height,
            center_y: stripe.center_y,
            good: stripe.good,
            radius: stripe.radius,
            report: stripe.report.clone(),
        }
    }
}

/// Estimate the tip that imaged `surface`, starting from `tip`.
///
/// `tip` is the starting estimate, usually flat zero or a conservative
/// model; its size sets the size of the result. It is resampled to the
/// surface pitch first.
pub fn blind_estimate(
    tip: &Raster<f64>,
    surface: &Raster<f64>,
    params: &BlindParams,
    progress: &mut dyn Progress,
) -> Result<BlindResult> {
    proceed(progress.set_message("Converting fields"))?;
    // Work on the structuring element, mirrored back at the end
    let mut work = match_tip_pitch(tip, surface.calibration())?.flipped(true, true)?;
    let max = work.max();
    work.add_scalar(-max);
    let apex = Apex::center(&work);

    let surface_min = surface.min();
    let step = (surface.max() - surface_min) / QUANTIZATION_LEVELS;
    let quantize = params.quantize && step > 0.0 && step.is_finite();

    let mut estimate_params = EstimateParams {
        threshold: params.threshold,
        use_edges: params.use_edges,
        method: params.method,
        max_iterations: params.max_iterations,
    };

    let report = if quantize {
        let levels = |v: f64| v.trunc();
        let mut image = surface.clone();
        image.data_mut().mapv_inplace(|v| levels((v - surface_min) / step));
        work.data_mut().mapv_inplace(|v| levels(v / step));
        estimate_params.threshold = levels(params.threshold / step);

        proceed(progress.set_message("Starting estimation"))?;
        let report = estimate(&image, &mut work, apex, &estimate_params, progress)?;
        work.data_mut().mapv_inplace(|v| v * step);
        report
    } else {
        proceed(progress.set_message("Starting estimation"))?;
        estimate(surface, &mut work, apex, &estimate_params, progress)?
    };

    proceed(progress.set_message("Converting fields"))?;
    let mut work = work.flipped(true, true)?;
    let min = work.min();
    work.add_scalar(-min);

    if !report.converged {
        warn!(iterations = report.iterations, "tip estimation hit the iteration limit");
    }
    info!(
        cols = work.cols(),
        rows = work.rows(),
        refinements = report.total_refinements(),
        "blind tip estimation done"
    );
    Ok(BlindResult { tip: work, report })
}

/// Estimate one tip per horizontal stripe of `surface`.
///
/// Stripes overlap by the tip height; stripe `i` of `n` starts at row
/// `i·(rows−tip_rows)/n`. Every stripe starts from `tip`. Stripes shorter
/// than the tip are skipped. The sequence of tips shows tip wear during
/// the scan.
pub fn blind_estimate_stripes(
    tip: &Raster<f64>,
    surface: &Raster<f64>,
    nstripes: usize,
    params: &BlindParams,
    progress: &mut dyn Progress,
) -> Result<Vec<StripeTip>> {
    if nstripes == 0 {
        return Err(Error::invalid("nstripes", nstripes, "must be at least 1"));
    }
    let start = match_tip_pitch(tip, surface.calibration())?;
    let tip_rows = start.rows();
    let (rows, cols) = surface.shape();
    if tip_rows > rows {
        return Err(Error::invalid(
            "tip",
            format!("{}x{}", start.cols(), tip_rows),
            format!("must not be taller than the {} row surface", rows),
        ));
    }

    let mut stripes = Vec::with_capacity(nstripes);
    for i in 0..nstripes {
        let row = i * (rows - tip_rows) / nstripes;
        let height = (i + 1) * (rows - tip_rows) / nstripes + tip_rows - row;
        if height < tip_rows {
            continue;
        }

        proceed(progress.set_message(&format!("Stripe {}/{}", i + 1, nstripes)))?;
        let stripe = surface.extract(row, 0, height, cols)?;
        let result = blind_estimate(&start, &stripe, params, progress)?;
        let good = result.report.total_refinements() > 0;
        let radius = if good { tip_radius(&result.tip) } else { None };
        let center_y = surface.calibration().jtor(row as f64 + 0.5 * height as f64);

        info!(stripe = i + 1, row, height, good, ?radius, "stripe tip estimated");
        stripes.push(StripeTip {
            row,
            height,
            center_y,
            tip: result.tip,
            report: result.report,
            good,
            radius,
        });
    }

    Ok(stripes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tip::surface::simulate_scan;
    use tipmorph_core::{Calibration, Silent};

    fn calibrated(mut r: Raster<f64>) -> Raster<f64> {
        r.set_calibration(Calibration::new(1e-9, 1e-9));
        r
    }

    fn spiky_surface(rows: usize, cols: usize) -> Raster<f64> {
        let mut surface = calibrated(Raster::filled(rows, cols, 0.0));
        for (row, col) in [(4, 4), (4, 12), (12, 7), (rows - 5, cols - 5)] {
            surface.set(row, col, 10.0).unwrap();
        }
        surface
    }

    fn cone_tip() -> Raster<f64> {
        let mut tip = calibrated(Raster::new(5, 5));
        for row in 0..5 {
            for col in 0..5 {
                let d = (row as f64 - 2.0).abs().max((col as f64 - 2.0).abs());
                tip.set(row, col, 8.0 - 2.0 * d).unwrap();
            }
        }
        tip
    }

    #[test]
    fn test_blind_recovers_tip_from_spikes() {
        let surface = spiky_surface(20, 20);
        let truth = cone_tip();
        let image = simulate_scan(&truth, &surface).unwrap();
        let start = calibrated(Raster::filled(5, 5, 0.0));

        for quantize in [false, true] {
            let params = BlindParams {
                quantize,
                ..Default::default()
            };
            let result = blind_estimate(&start, &image, &params, &mut Silent).unwrap();
            assert!(result.report.converged);
            // Both are compared with their lowest sample at zero
            for (e, t) in result.tip.data().iter().zip(truth.data().iter()) {
                let t = t - truth.min();
                assert!((e - t).abs() < 5e-3, "estimate {} vs true {}", e, t);
            }
        }
    }

    #[test]
    fn test_blind_keeps_orientation_of_asymmetric_tip() {
        let surface = spiky_surface(20, 20);
        let truth = calibrated(
            Raster::from_rows(&[
                vec![0.0, 1.0, 0.0],
                vec![2.0, 5.0, 1.0],
                vec![0.0, 3.0, 0.0],
            ])
            .unwrap(),
        );
        let image = simulate_scan(&truth, &surface).unwrap();
        let start = calibrated(Raster::filled(3, 3, 0.0));
        let params = BlindParams {
            quantize: false,
            ..Default::default()
        };
        let result = blind_estimate(&start, &image, &params, &mut Silent).unwrap();
        assert_eq!(result.tip, truth);
    }

    #[test]
    fn test_blind_flat_surface_keeps_flat_tip() {
        let surface = calibrated(Raster::filled(10, 10, 2.0));
        let start = calibrated(Raster::filled(3, 3, 0.0));
        let result = blind_estimate(&start, &surface, &BlindParams::default(), &mut Silent).unwrap();
        assert!(result.tip.data().iter().all(|&v| v == 0.0));
        assert_eq!(result.report.total_refinements(), 0);
    }

    #[test]
    fn test_stripes_cover_surface() {
        let surface = spiky_surface(30, 20);
        let image = simulate_scan(&cone_tip(), &surface).unwrap();
        let start = calibrated(Raster::filled(5, 5, 0.0));
        let stripes = blind_estimate_stripes(&start, &image, 3, &BlindParams::default(), &mut Silent).unwrap();

        assert_eq!(stripes.len(), 3);
        assert_eq!(stripes[0].row, 0);
        assert_eq!(stripes[0].height, 13);
        assert_eq!(stripes[2].row + stripes[2].height, 30);
        assert!(stripes[0].good);
    }

    #[test]
    fn test_zero_stripes_rejected() {
        let surface = spiky_surface(20, 20);
        let start = calibrated(Raster::filled(5, 5, 0.0));
        assert!(blind_estimate_stripes(&start, &surface, 0, &BlindParams::default(), &mut Silent).is_err());
    }
}
