//! Physical calibration of a scanned field

use serde::{Deserialize, Serialize};

/// Lateral calibration of a grid.
///
/// Maps pixel indices (col, row) to physical coordinates:
/// ```text
/// x = origin_x + col * dx
/// y = origin_y + row * dy
/// ```
///
/// Unlike map rasters, scan rows grow downwards with positive `dy`.
/// The morphological operators work in index space only; calibration is
/// carried so tips and surfaces can be matched in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel pitch along columns
    pub dx: f64,
    /// Pixel pitch along rows
    pub dy: f64,
}

impl Calibration {
    /// Create a calibration with the given pitches and origin at zero
    pub fn new(dx: f64, dy: f64) -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            dx,
            dy,
        }
    }

    /// Set the origin, keeping the pitch
    pub fn with_origin(mut self, origin_x: f64, origin_y: f64) -> Self {
        self.origin_x = origin_x;
        self.origin_y = origin_y;
        self
    }

    /// Column distance in pixels to physical length
    pub fn itor(&self, col: f64) -> f64 {
        col * self.dx
    }

    /// Row distance in pixels to physical length
    pub fn jtor(&self, row: f64) -> f64 {
        row * self.dy
    }

    /// Physical length along x to a pixel count (truncated)
    pub fn rtoi(&self, x: f64) -> i64 {
        (x / self.dx) as i64
    }

    /// Physical width of `cols` pixels
    pub fn xreal(&self, cols: usize) -> f64 {
        cols as f64 * self.dx
    }

    /// Physical height of `rows` pixels
    pub fn yreal(&self, rows: usize) -> f64 {
        rows as f64 * self.dy
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_length_conversions() {
        let cal = Calibration::new(1e-8, 2e-8).with_origin(1e-6, 0.0);
        assert_relative_eq!(cal.itor(3.0), 3e-8);
        assert_relative_eq!(cal.jtor(2.5), 5e-8);
        assert_eq!(cal.rtoi(5.5e-8), 5);
        assert_relative_eq!(cal.xreal(100), 1e-6);
        assert_relative_eq!(cal.yreal(50), 1e-6);
        assert_relative_eq!(cal.origin_x, 1e-6);
    }

    #[test]
    fn test_default_is_unit_pitch() {
        let cal = Calibration::default();
        assert_eq!(cal, Calibration::new(1.0, 1.0));
        assert_relative_eq!(cal.xreal(7), 7.0);
    }
}
