//! # tipmorph Core
//!
//! Core types, traits and I/O for the tipmorph tip-estimation library.
//!
//! This crate provides:
//! - `Raster<T>`: Dense 2D sample grid with physical calibration
//! - `Calibration`: Pixel pitch and origin of a scan
//! - `Progress`: Outward progress reporting with cooperative cancellation
//! - Algorithm traits for consistent API
//! - I/O for float TIFF fields

pub mod error;
pub mod io;
pub mod progress;
pub mod raster;

pub use error::{Error, Result};
pub use progress::{proceed, FnProgress, Progress, Silent};
pub use raster::{Calibration, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::progress::{Progress, Silent};
    pub use crate::raster::{Calibration, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Core trait for all algorithms in tipmorph.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
