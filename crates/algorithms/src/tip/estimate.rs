//! Iterated blind tip estimation
//!
//! Two drivers repeat the single-location refinement until the tip stops
//! changing:
//! - **Full**: every pass opens the image with the current tip and refines
//!   at every location the opening does not explain. Passes repeat until
//!   one refines nothing.
//! - **Partial**: refines only at sharp local maxima, repeating while more
//!   than `max_count` locations still improved the tip.

use serde::{Deserialize, Serialize};
use tipmorph_core::progress::{proceed, Progress};
use tipmorph_core::raster::Raster;
use tipmorph_core::Result;
use tracing::{debug, info};

use super::candidates::{pass_range, select_candidates};
use super::refine::{check_estimator_inputs, refine_at, RefineParams};
use crate::morphology::{opening, Apex};

/// Outer loop strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateMethod {
    /// Full-raster passes until no location refines the tip
    #[default]
    Full,
    /// Passes over local maxima until at most `max_count` locations refine
    Partial { max_count: usize },
}

impl EstimateMethod {
    /// Partial estimation with the customary stopping count
    pub fn partial() -> Self {
        EstimateMethod::Partial { max_count: 20 }
    }
}

/// Parameters for iterated estimation
#[derive(Debug, Clone)]
pub struct EstimateParams {
    /// Noise margin in height units
    pub threshold: f64,
    /// Also refine at locations near the image border
    pub use_edges: bool,
    /// Outer loop strategy
    pub method: EstimateMethod,
    /// Upper bound on the number of passes
    pub max_iterations: usize,
}

impl Default for EstimateParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            use_edges: true,
            method: EstimateMethod::Full,
            max_iterations: 10_000,
        }
    }
}

impl EstimateParams {
    fn refine(&self) -> RefineParams {
        RefineParams {
            threshold: self.threshold,
            use_edges: self.use_edges,
        }
    }
}

/// Outcome of an iterated estimation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimateReport {
    /// Number of passes run
    pub iterations: usize,
    /// Locations that refined the tip, per pass
    pub counts: Vec<usize>,
    /// Whether the stopping rule was met before `max_iterations`
    pub converged: bool,
}

impl EstimateReport {
    /// Total number of refining locations over all passes
    pub fn total_refinements(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// One full-raster pass.
///
/// Opens the image with the current tip and refines at every location
/// where the image exceeds its opening by more than the threshold.
/// Returns the number of locations that lowered at least one tip sample.
pub fn estimate_iteration(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    params: &RefineParams,
    progress: &mut dyn Progress,
) -> Result<usize> {
    check_estimator_inputs(image, tip, apex, params.threshold)?;
    full_pass(image, tip, apex, params, progress)
}

fn full_pass(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    params: &RefineParams,
    progress: &mut dyn Progress,
) -> Result<usize> {
    let open = opening(image, tip)?;
    let (im_rows, im_cols) = image.shape();
    let (tip_rows, tip_cols) = tip.shape();

    let Some((rows, cols)) = pass_range(im_rows, im_cols, tip_rows, tip_cols, apex) else {
        return Ok(0);
    };
    let first_row = *rows.start();
    let span = (*rows.end() - first_row).max(1) as f64;

    let mut count = 0;
    for jxp in rows {
        for ixp in cols.clone() {
            let excess = image.data()[[jxp, ixp]] - open.data()[[jxp, ixp]];
            if excess > params.threshold && refine_at(image, tip, apex, ixp, jxp, params) > 0 {
                count += 1;
            }
        }
        proceed(progress.set_fraction((jxp - first_row) as f64 / span))?;
    }

    Ok(count)
}

/// Full estimation: repeat full passes until one refines nothing.
pub fn estimate_full(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    params: &EstimateParams,
    progress: &mut dyn Progress,
) -> Result<EstimateReport> {
    check_estimator_inputs(image, tip, apex, params.threshold)?;
    let refine = params.refine();
    let mut report = EstimateReport::default();

    while report.iterations < params.max_iterations {
        report.iterations += 1;
        proceed(progress.set_message(&format!(
            "Iterating estimate (iteration {})",
            report.iterations
        )))?;

        let count = full_pass(image, tip, apex, &refine, progress)?;
        report.counts.push(count);
        debug!(iteration = report.iterations, count, "full estimation pass");
        proceed(progress.set_message(&format!("{} image locations produced refinement", count)))?;

        if count == 0 {
            report.converged = true;
            break;
        }
    }

    info!(
        iterations = report.iterations,
        converged = report.converged,
        "full tip estimation finished"
    );
    Ok(report)
}

/// Partial estimation over sharp local maxima only.
///
/// Faster than [`estimate_full`] but stops once no more than `max_count`
/// locations refine the tip in a pass.
pub fn estimate_partial(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    max_count: usize,
    params: &EstimateParams,
    progress: &mut dyn Progress,
) -> Result<EstimateReport> {
    check_estimator_inputs(image, tip, apex, params.threshold)?;
    let refine = params.refine();

    proceed(progress.set_message("Searching for local maxima"))?;
    let candidates = select_candidates(image, tip.shape(), apex);
    proceed(progress.set_message(&format!("Found {} internal local maxima", candidates.len())))?;
    debug!(candidates = candidates.len(), "selected refinement locations");

    let n = candidates.len().max(1) as f64;
    let mut report = EstimateReport::default();

    while report.iterations < params.max_iterations {
        report.iterations += 1;
        proceed(progress.set_message(&format!(
            "Iterating estimate (iteration {})",
            report.iterations
        )))?;

        let mut count = 0;
        for (i, &(col, row)) in candidates.iter().enumerate() {
            if refine_at(image, tip, apex, col, row, &refine) > 0 {
                count += 1;
            }
            proceed(progress.set_fraction(i as f64 / n))?;
        }
        report.counts.push(count);
        debug!(iteration = report.iterations, count, "partial estimation pass");
        proceed(progress.set_message(&format!("{} image locations produced refinement", count)))?;

        if count == 0 || count <= max_count {
            report.converged = true;
            break;
        }
    }

    proceed(progress.set_fraction(1.0))?;
    info!(
        iterations = report.iterations,
        converged = report.converged,
        "partial tip estimation finished"
    );
    Ok(report)
}

/// Run the estimator selected by `params.method`.
pub fn estimate(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    params: &EstimateParams,
    progress: &mut dyn Progress,
) -> Result<EstimateReport> {
    match params.method {
        EstimateMethod::Full => estimate_full(image, tip, apex, params, progress),
        EstimateMethod::Partial { max_count } => {
            estimate_partial(image, tip, apex, max_count, params, progress)
        }
    }
}
