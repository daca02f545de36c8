//! Single-location tip refinement
//!
//! At image location `(ixp, jxp)` every tip sample is lowered to the
//! tightest height the local image still allows, assuming the tip apex
//! touched the surface there. The tip is only ever lowered.

use tipmorph_core::raster::Raster;
use tipmorph_core::{Error, Result};

use crate::morphology::Apex;

/// Parameters for tip refinement
#[derive(Debug, Clone)]
pub struct RefineParams {
    /// Noise margin; a sample is only lowered when it improves by more than this
    pub threshold: f64,
    /// Also refine at locations whose tip footprint crosses the image border
    pub use_edges: bool,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            use_edges: true,
        }
    }
}

/// Refine `tip` from the image at `(col, row)`, in place.
///
/// Returns the number of tip samples that were lowered. Lets callers
/// visit the most informative locations first.
pub fn estimate_point(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    (col, row): (usize, usize),
    params: &RefineParams,
) -> Result<usize> {
    check_estimator_inputs(image, tip, apex, params.threshold)?;
    if row >= image.rows() || col >= image.cols() {
        return Err(Error::IndexOutOfBounds {
            row,
            col,
            rows: image.rows(),
            cols: image.cols(),
        });
    }
    Ok(refine_at(image, tip, apex, col, row, params))
}

/// Validation shared by every estimator entry point
pub(crate) fn check_estimator_inputs(
    image: &Raster<f64>,
    tip: &Raster<f64>,
    apex: Apex,
    threshold: f64,
) -> Result<()> {
    crate::morphology::check_operands(image, tip, apex)?;
    if tip.rows() > image.rows() || tip.cols() > image.cols() {
        return Err(Error::invalid(
            "tip",
            format!("{}x{}", tip.cols(), tip.rows()),
            format!("must not be larger than the {}x{} image", image.cols(), image.rows()),
        ));
    }
    if !threshold.is_finite() || threshold < 0.0 {
        return Err(Error::invalid(
            "threshold",
            threshold,
            "must be finite and non-negative",
        ));
    }
    Ok(())
}

/// Refinement at a location known to be inside the image
pub(crate) fn refine_at(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    ixp: usize,
    jxp: usize,
    params: &RefineParams,
) -> usize {
    let (im_rows, im_cols) = image.shape();
    let (tip_rows, tip_cols) = tip.shape();

    let interior = jxp + 1 >= tip_rows
        && jxp + tip_rows <= im_rows
        && ixp + 1 >= tip_cols
        && ixp + tip_cols <= im_cols;

    if interior {
        refine_interior(image, tip, apex, ixp, jxp, params.threshold)
    } else if params.use_edges {
        refine_edge(image, tip, apex, ixp, jxp, params.threshold)
    } else {
        0
    }
}

fn refine_interior(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    ixp: usize,
    jxp: usize,
    threshold: f64,
) -> usize {
    let (tip_rows, tip_cols) = tip.shape();
    let (xc, yc) = (apex.col, apex.row);
    // SAFETY: the location is interior, so every translated index below is in bounds
    let imagep = unsafe { image.get_unchecked(jxp, ixp) };
    let mut count = 0;

    for jx in 0..tip_rows {
        for ix in 0..tip_cols {
            let mut dil: Option<f64> = None;
            for jd in 0..tip_rows {
                for id in 0..tip_cols {
                    let t = unsafe { tip.get_unchecked(jd, id) };
                    let apex_height = unsafe { image.get_unchecked(jxp + yc - jd, ixp + xc - id) };
                    if imagep - apex_height > t {
                        continue;
                    }
                    let temp = unsafe { image.get_unchecked(jx + jxp - jd, ix + ixp - id) } + t - imagep;
                    dil = Some(dil.map_or(temp, |d| d.max(temp)));
                }
            }

            let Some(dil) = dil else { continue };
            let current = unsafe { tip.get_unchecked(jx, ix) };
            if dil < current - threshold {
                unsafe { tip.set_unchecked(jx, ix, dil + threshold) };
                count += 1;
            }
        }
    }

    count
}

/// Image sample at signed coordinates, `None` off the image
fn sample(image: &Raster<f64>, row: isize, col: isize) -> Option<f64> {
    if row < 0 || col < 0 || row as usize >= image.rows() || col as usize >= image.cols() {
        return None;
    }
    // SAFETY: bounds checked above
    Some(unsafe { image.get_unchecked(row as usize, col as usize) })
}

fn refine_edge(
    image: &Raster<f64>,
    tip: &mut Raster<f64>,
    apex: Apex,
    ixp: usize,
    jxp: usize,
    threshold: f64,
) -> usize {
    let (tip_rows, tip_cols) = tip.shape();
    let (xc, yc) = (apex.col as isize, apex.row as isize);
    let (ixp, jxp) = (ixp as isize, jxp as isize);
    let Some(imagep) = sample(image, jxp, ixp) else {
        return 0;
    };
    let mut count = 0;

    for jx in 0..tip_rows as isize {
        'next: for ix in 0..tip_cols as isize {
            let mut dil: Option<f64> = None;
            for jd in 0..tip_rows as isize {
                for id in 0..tip_cols as isize {
                    // SAFETY: jd and id range over the tip, only image reads can leave the grid
                    let t = unsafe { tip.get_unchecked(jd as usize, id as usize) };

                    // Off-image apex: the unseen surface may be arbitrarily high there
                    let apex_in_contact = match sample(image, jxp + yc - jd, ixp + xc - id) {
                        None => true,
                        Some(h) => imagep - h <= t,
                    };
                    if !apex_in_contact {
                        continue;
                    }

                    // An unseen point under a touching apex bounds nothing
                    let Some(v) = sample(image, jxp + jx - jd, ixp + ix - id) else {
                        continue 'next;
                    };
                    let temp = v + t - imagep;
                    dil = Some(dil.map_or(temp, |d| d.max(temp)));
                }
            }

            let Some(dil) = dil else { continue };
            let (jx, ix) = (jx as usize, ix as usize);
            // SAFETY: jx and ix range over the tip
            let current = unsafe { tip.get_unchecked(jx, ix) };
            if dil < current - threshold {
                unsafe { tip.set_unchecked(jx, ix, dil + threshold) };
                count += 1;
            }
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spike_image() -> Raster<f64> {
        let mut image = Raster::filled(5, 5, 0.0);
        image.set(2, 2, 10.0).unwrap();
        image
    }

    #[test]
    fn test_spike_sharpens_flat_tip() {
        let image = spike_image();
        let mut tip = Raster::filled(3, 3, 0.0);
        let changed = estimate_point(
            &image,
            &mut tip,
            Apex::new(1, 1),
            (2, 2),
            &RefineParams::default(),
        )
        .unwrap();

        assert_eq!(changed, 8);
        assert_eq!(tip.get(1, 1).unwrap(), 0.0);
        for (row, col) in [(0, 0), (0, 1), (1, 0), (2, 2), (1, 2)] {
            assert_eq!(tip.get(row, col).unwrap(), -10.0);
        }
    }

    #[test]
    fn test_threshold_blocks_small_improvements() {
        let image = spike_image();
        let mut tip = Raster::filled(3, 3, 0.0);
        let params = RefineParams {
            threshold: 10.0,
            use_edges: true,
        };
        let changed = estimate_point(&image, &mut tip, Apex::new(1, 1), (2, 2), &params).unwrap();
        assert_eq!(changed, 0);
        assert!(tip.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_threshold_is_added_to_new_value() {
        let image = spike_image();
        let mut tip = Raster::filled(3, 3, 0.0);
        let params = RefineParams {
            threshold: 1.0,
            use_edges: true,
        };
        estimate_point(&image, &mut tip, Apex::new(1, 1), (2, 2), &params).unwrap();
        assert_eq!(tip.get(0, 0).unwrap(), -9.0);
    }

    #[test]
    fn test_edge_location_ignored_without_use_edges() {
        let image = spike_image();
        let mut tip = Raster::filled(3, 3, 0.0);
        let params = RefineParams {
            threshold: 0.0,
            use_edges: false,
        };
        let changed = estimate_point(&image, &mut tip, Apex::new(1, 1), (0, 0), &params).unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn test_edge_location_with_visible_footprint() {
        let mut image = Raster::filled(5, 5, 0.0);
        image.set(1, 2, 10.0).unwrap();
        let mut tip = Raster::filled(3, 3, 0.0);
        let changed = estimate_point(
            &image,
            &mut tip,
            Apex::new(1, 1),
            (2, 1),
            &RefineParams::default(),
        )
        .unwrap();

        assert_eq!(changed, 8);
        assert_eq!(tip.get(1, 1).unwrap(), 0.0);
        assert_eq!(tip.get(2, 0).unwrap(), -10.0);
    }

    #[test]
    fn test_edge_rule_matches_interior_rule_inside() {
        let mut image = Raster::new(7, 7);
        for row in 0..7 {
            for col in 0..7 {
                image.set(row, col, ((row * 5 + col * 3) % 11) as f64).unwrap();
            }
        }
        let start = Raster::from_rows(&[
            vec![-1.0, 0.0, -2.0],
            vec![0.0, 0.0, -1.0],
            vec![-3.0, -1.0, 0.0],
        ])
        .unwrap();

        for (apex, (col, row)) in [(Apex::new(1, 1), (3, 3)), (Apex::new(0, 2), (2, 4))] {
            let mut by_interior = start.clone();
            let mut by_edge = start.clone();
            let a = refine_interior(&image, &mut by_interior, apex, col, row, 0.5);
            let b = refine_edge(&image, &mut by_edge, apex, col, row, 0.5);
            assert_eq!(a, b);
            assert_eq!(by_interior, by_edge);
        }
    }

    #[test]
    fn test_corner_spike_is_uninformative() {
        // Apex placements off the image count as contacts, and each tip
        // sample then needs an unseen image point
        let mut image = Raster::filled(5, 5, 0.0);
        image.set(0, 0, 10.0).unwrap();
        let mut tip = Raster::filled(3, 3, 0.0);
        let changed = estimate_point(
            &image,
            &mut tip,
            Apex::new(1, 1),
            (0, 0),
            &RefineParams::default(),
        )
        .unwrap();

        assert_eq!(changed, 0);
        assert!(tip.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_estimate_point_rejects_bad_inputs() {
        let image = spike_image();
        let mut tip = Raster::filled(3, 3, 0.0);
        let params = RefineParams::default();
        assert!(estimate_point(&image, &mut tip, Apex::new(3, 1), (2, 2), &params).is_err());
        assert!(estimate_point(&image, &mut tip, Apex::new(1, 1), (5, 2), &params).is_err());

        let bad = RefineParams {
            threshold: -1.0,
            use_edges: true,
        };
        assert!(estimate_point(&image, &mut tip, Apex::new(1, 1), (2, 2), &bad).is_err());

        let mut big_tip = Raster::filled(7, 7, 0.0);
        assert!(estimate_point(&image, &mut big_tip, Apex::new(3, 3), (2, 2), &params).is_err());
    }
}
