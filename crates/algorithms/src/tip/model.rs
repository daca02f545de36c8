//! Analytical tip models
//!
//! Presets produce upright tip height maps sampled at a given pitch:
//! n-sided pyramids rounded at the apex by a ball, the common contact and
//! non-contact probe shapes, and a spherical "delta" tip.

use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_6, PI, SQRT_2};
use tipmorph_core::raster::{Calibration, Raster};
use tipmorph_core::{Error, Result};

/// Tip model preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TipModel {
    /// Pyramid with `sides` faces and apex half-angle `angle` (radians)
    Pyramid { sides: u32, angle: f64 },
    /// Four-sided contact-mode probe
    Contact,
    /// Three-sided non-contact probe
    NonContact,
    /// Spherical cap, or a single spike for zero radius
    Delta,
}

impl Default for TipModel {
    fn default() -> Self {
        TipModel::Pyramid {
            sides: 4,
            angle: 54.735_610_32_f64.to_radians(),
        }
    }
}

/// Half-angle of the contact and non-contact presets
fn probe_half_angle() -> f64 {
    FRAC_PI_2 - SQRT_2.atan()
}

impl TipModel {
    /// Faces and apex half-angle of the pyramidal presets
    fn pyramid(&self) -> Option<(u32, f64)> {
        match *self {
            TipModel::Pyramid { sides, angle } => Some((sides, angle)),
            TipModel::Contact => Some((4, probe_half_angle())),
            TipModel::NonContact => Some((3, probe_half_angle())),
            TipModel::Delta => None,
        }
    }

    /// Angle used to estimate the lateral size of the tip
    fn size_angle(&self) -> Option<f64> {
        match *self {
            TipModel::Pyramid { angle, .. } => Some(angle),
            TipModel::Contact => Some(SQRT_2.atan()),
            TipModel::NonContact => Some(70.0_f64.to_radians()),
            TipModel::Delta => None,
        }
    }

    fn validate(&self) -> Result<()> {
        if let TipModel::Pyramid { sides, angle } = *self {
            if !(3..=100).contains(&sides) {
                return Err(Error::invalid("sides", sides, "must be between 3 and 100"));
            }
            if !(angle > 0.0 && angle < FRAC_PI_2) {
                return Err(Error::invalid("angle", angle, "must be inside (0, pi/2)"));
            }
        }
        Ok(())
    }
}

/// Physical parameters of a tip model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipModelParams {
    /// Tip height, usually the height range of the surface it will scan
    pub height: f64,
    /// Apex radius
    pub radius: f64,
    /// Rotation about the tip axis (radians)
    pub rotation: f64,
}

impl Default for TipModelParams {
    fn default() -> Self {
        Self {
            height: 1e-6,
            radius: 200e-9,
            rotation: 0.0,
        }
    }
}

impl TipModelParams {
    /// Parameters with the height set to the range of `surface`
    pub fn for_surface(surface: &Raster<f64>) -> Self {
        Self {
            height: surface.max() - surface.min(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.height.is_finite() && self.height >= 0.0) {
            return Err(Error::invalid("height", self.height, "must be finite and non-negative"));
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(Error::invalid("radius", self.radius, "must be finite and non-negative"));
        }
        if !self.rotation.is_finite() {
            return Err(Error::invalid("rotation", self.rotation, "must be finite"));
        }
        Ok(())
    }
}

/// Suggested tip size in pixels (square) for the given pitch
pub fn guess_resolution(model: &TipModel, pitch: &Calibration, params: &TipModelParams) -> usize {
    match model.size_angle() {
        Some(angle) => {
            let xreal = 2.0 * (params.height + params.radius) / angle.tan();
            pitch.rtoi(xreal).clamp(10, 500) as usize
        }
        None => {
            if params.radius == 0.0 {
                return 20;
            }
            let h = params.height;
            let xreal = SQRT_2 * (h * (2.0 * params.radius - h)).sqrt();
            pitch.rtoi(xreal).clamp(20, 500) as usize
        }
    }
}

/// Create a model tip with a guessed size, limited to 20..=1000 pixels.
pub fn tip_model(model: &TipModel, pitch: &Calibration, params: &TipModelParams) -> Result<Raster<f64>> {
    let n = guess_resolution(model, pitch, params).clamp(20, 1000);
    tip_model_with_resolution(model, pitch, params, n, n)
}

/// Create a model tip of `cols` x `rows` pixels.
pub fn tip_model_with_resolution(
    model: &TipModel,
    pitch: &Calibration,
    params: &TipModelParams,
    cols: usize,
    rows: usize,
) -> Result<Raster<f64>> {
    model.validate()?;
    params.validate()?;
    if !(pitch.dx > 0.0 && pitch.dy > 0.0) {
        return Err(Error::invalid("pitch", pitch.dx.min(pitch.dy), "must be positive"));
    }

    let mut tip = Raster::try_new(rows, cols)?;
    tip.set_calibration(Calibration::new(pitch.dx, pitch.dy));

    match model.pyramid() {
        Some((sides, angle)) => {
            create_pyramid(&mut tip, angle, sides, params.rotation);
            round_pyramid(&mut tip, angle, sides, params.radius);
        }
        None => create_delta(&mut tip, params.height, params.radius),
    }
    Ok(tip)
}

fn create_pyramid(tip: &mut Raster<f64>, alpha: f64, sides: u32, theta: f64) {
    let (rows, cols) = tip.shape();
    let n = sides as f64;
    let add = if sides == 3 { FRAC_PI_6 } else { FRAC_PI_4 } + theta;
    let half_cols = (cols / 2) as f64;
    let half_rows = (rows / 2) as f64;
    let radius = (half_cols * half_cols + half_rows * half_rows).sqrt();
    let nangle = PI / n;
    let height = tip.calibration().itor(radius) * nangle.cos() / alpha.tan();
    let ir = 1.0 / (radius * nangle.cos());
    let (sa, ca) = add.sin_cos();
    let sector = 2.0 * PI / n;

    tip.data_mut().indexed_iter_mut().for_each(|((row, col), v)| {
        let ccol = col as f64 - half_cols;
        let crow = row as f64 - half_rows;
        let rcol = -ccol * ca + crow * sa;
        let rrow = ccol * sa + crow * ca;
        let phi = rrow.atan2(rcol) + PI;
        let phic = (phi / sector).floor() * sector + nangle;
        let vm = rcol * phic.cos() + rrow * phic.sin();
        *v = height * (1.0 + vm * ir);
    });
}

fn round_pyramid(tip: &mut Raster<f64>, angle: f64, sides: u32, ball_radius: f64) {
    let height = tip.max();
    let beta = (angle.tan() / (PI / sides as f64).cos()).atan();
    let center_z = height - ball_radius / beta.sin();
    let cal = *tip.calibration();
    let center_x = tip.xreal() / 2.0;
    let center_y = tip.yreal() / 2.0;
    let cutoff = center_z + ball_radius * beta.sin();

    tip.data_mut().indexed_iter_mut().for_each(|((row, col), v)| {
        if *v > cutoff {
            let dcol = cal.itor(col as f64) - center_x;
            let drow = cal.jtor(row as f64) - center_y;
            let sphere = ball_radius * ball_radius - dcol * dcol - drow * drow;
            let zd = if sphere >= 0.0 { sphere.sqrt() } else { 0.0 };
            *v = v.min(center_z + zd);
        }
    });
}

fn create_delta(tip: &mut Raster<f64>, height: f64, radius: f64) {
    let (rows, cols) = tip.shape();
    tip.data_mut().fill(0.0);
    if radius == 0.0 {
        tip.data_mut()[[rows / 2, cols / 2]] = height;
        return;
    }

    let cal = *tip.calibration();
    let cc = tip.xreal() / 2.0;
    let cr = tip.yreal() / 2.0;
    tip.data_mut().indexed_iter_mut().for_each(|((row, col), v)| {
        let dx = cal.itor(col as f64) - cc;
        let dy = cal.jtor(row as f64) - cr;
        let val = radius * radius - dx * dx - dy * dy;
        if val > 0.0 {
            *v = (val.sqrt() - radius + height).max(0.0);
        }
    });
}
