//! Tip estimation and tip-aware surface operations
//!
//! - [`estimate_point`]: refine a tip upper bound from one image location
//! - [`estimate_full`] / [`estimate_partial`]: iterate refinement over an image
//! - [`blind_estimate`]: physical-unit wrapper with resampling and quantization
//! - [`simulate_scan`], [`reconstruct_surface`], [`tip_certainty_map`]
//! - [`tip_model`]: analytical pyramid and sphere tips
//! - [`tip_radius`]: apex curvature from a quadratic fit

mod blind;
mod candidates;
mod estimate;
mod model;
mod radius;
mod refine;
mod surface;

pub use blind::{blind_estimate, blind_estimate_stripes, BlindParams, BlindResult, StripeSummary, StripeTip};
pub use candidates::{is_local_maximum, neighbourhood_radius, select_candidates};
pub use estimate::{
    estimate, estimate_full, estimate_iteration, estimate_partial, EstimateMethod, EstimateParams,
    EstimateReport,
};
pub use model::{guess_resolution, tip_model, tip_model_with_resolution, TipModel, TipModelParams};
pub use radius::{tip_curvatures, tip_radius};
pub use refine::{estimate_point, RefineParams};
pub use surface::{match_tip_pitch, reconstruct_surface, simulate_scan, tip_certainty_map};
