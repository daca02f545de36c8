//! # tipmorph Algorithms
//!
//! Grayscale morphology and blind tip estimation for scanning probe
//! microscopy height fields.
//!
//! ## Modules
//!
//! - **morphology**: Dilation, erosion, opening, reflection and certainty maps
//!   with an explicit tip apex
//! - **tip**: Blind tip estimation (full and partial), scan simulation,
//!   surface reconstruction, model tips and apex radius

pub mod morphology;
pub mod tip;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::morphology::{
        certainty_map, dilation, erosion, opening, reflect, Apex, CertaintyParams, Dilation,
        DilationParams, Erosion, ErosionParams, Opening,
    };
    pub use crate::tip::{
        blind_estimate, blind_estimate_stripes, estimate, estimate_full, estimate_partial,
        estimate_point, reconstruct_surface, simulate_scan, tip_certainty_map, tip_model,
        tip_radius, BlindParams, EstimateMethod, EstimateParams, EstimateReport, RefineParams,
        TipModel, TipModelParams,
    };
    pub use tipmorph_core::prelude::*;
}
