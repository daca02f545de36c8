//! Grid data structures and operations

mod calibration;
mod element;
mod grid;

pub use calibration::Calibration;
pub use element::RasterElement;
pub use grid::{Raster, RasterStatistics};
