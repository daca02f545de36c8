//! Morphological opening (erosion followed by dilation)
//!
//! The opening of an image by a tip is the image that tip would record
//! from the reconstructed surface. Pixels where the image lies above its
//! opening carry information the tip estimate does not yet explain.

use tipmorph_core::raster::Raster;
use tipmorph_core::{Algorithm, Error, Result};

use super::{dilation, erosion, Apex};

/// Opening algorithm: input is `(image, tip)`
#[derive(Debug, Clone, Default)]
pub struct Opening;

impl Algorithm for Opening {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Opening"
    }

    fn description(&self) -> &'static str {
        "Morphological opening (erosion then dilation) with the centred tip apex"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        opening(&input.0, &input.1)
    }
}

/// Open `image` by `tip`, both steps using the apex `(cols/2, rows/2)`.
pub fn opening(image: &Raster<f64>, tip: &Raster<f64>) -> Result<Raster<f64>> {
    let apex = Apex::center(tip);
    let eroded = erosion(image, tip, apex)?;
    dilation(&eroded, tip, apex)
}
