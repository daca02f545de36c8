//! Certainty map of a surface reconstruction
//!
//! For every placement of the reflected tip in the image interior, the
//! tip is compared against the eroded surface. A placement that touches
//! the reconstruction at exactly one point pins that surface pixel down:
//! the reconstruction there is exact, not just an upper bound.

use tipmorph_core::raster::Raster;
use tipmorph_core::{Error, Result};

use super::{check_operands, Apex};

/// Parameters for the certainty map
#[derive(Debug, Clone, Default)]
pub struct CertaintyParams {
    /// Height difference still counted as a touch.
    /// `None` uses 1/100 of the image height range.
    pub tolerance: Option<f64>,
}

/// Mark surface pixels reconstructed with a single tip contact.
///
/// `eroded` is the erosion of `image` by `tip` with the same `apex`.
/// Returns a mask of the image size holding 1 at certain pixels and 0
/// elsewhere. Placements whose footprint would reach past the image border
/// are skipped, so pixels only touched from there stay 0.
pub fn certainty_map(
    image: &Raster<f64>,
    tip: &Raster<f64>,
    eroded: &Raster<f64>,
    apex: Apex,
    params: &CertaintyParams,
) -> Result<Raster<u8>> {
    check_operands(image, tip, apex)?;
    if eroded.shape() != image.shape() {
        return Err(Error::SizeMismatch {
            er: image.rows(),
            ec: image.cols(),
            ar: eroded.rows(),
            ac: eroded.cols(),
        });
    }

    let tolerance = match params.tolerance {
        Some(t) if t.is_finite() && t >= 0.0 => t,
        Some(t) => {
            return Err(Error::invalid(
                "tolerance",
                t,
                "must be finite and non-negative",
            ))
        }
        None => (image.max() - image.min()) / 100.0,
    };

    let (im_rows, im_cols) = image.shape();
    let (tip_rows, tip_cols) = tip.shape();
    let rxc = tip_cols - 1 - apex.col;
    let ryc = tip_rows - 1 - apex.row;

    let mut cmap: Raster<u8> = Raster::try_new(im_rows, im_cols)?;
    cmap.set_calibration(*image.calibration());
    if tip_rows > im_rows || tip_cols > im_cols {
        return Ok(cmap);
    }

    for imy in ryc..=(im_rows + ryc - tip_rows) {
        for imx in rxc..=(im_cols + rxc - tip_cols) {
            let tpx_max = (tip_cols - 1).min(im_cols - 1 + rxc - imx);
            let tpy_max = (tip_rows - 1).min(im_rows - 1 + ryc - imy);
            let tpx_min = rxc.saturating_sub(imx);
            let tpy_min = ryc.saturating_sub(imy);

            let height = image.data()[[imy, imx]];
            let mut touches = 0;
            let mut touched = (0, 0);
            'scan: for tpy in tpy_min..=tpy_max {
                for tpx in tpx_min..=tpx_max {
                    let y = tpy + imy - ryc;
                    let x = tpx + imx - rxc;
                    let probe = height - tip.data()[[tip_rows - 1 - tpy, tip_cols - 1 - tpx]];
                    if (probe - eroded.data()[[y, x]]).abs() <= tolerance {
                        touches += 1;
                        touched = (y, x);
                        if touches >= 2 {
                            break 'scan;
                        }
                    }
                }
            }

            if touches == 1 {
                cmap.data_mut()[touched] = 1;
            }
        }
    }

    Ok(cmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::morphology::{dilation, erosion};

    fn sharp_tip() -> Raster<f64> {
        Raster::from_rows(&[
            vec![-4.0, -2.0, -4.0],
            vec![-2.0, 0.0, -2.0],
            vec![-4.0, -2.0, -4.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_isolated_feature_is_certain() {
        let mut surface = Raster::filled(9, 9, 0.0);
        surface.set(4, 4, 6.0).unwrap();
        let tip = sharp_tip();
        let apex = Apex::new(1, 1);
        let image = dilation(&surface, &tip, apex).unwrap();
        let eroded = erosion(&image, &tip, apex).unwrap();

        let cmap = certainty_map(&image, &tip, &eroded, apex, &CertaintyParams::default()).unwrap();
        assert_eq!(cmap.shape(), (9, 9));
        assert_eq!(cmap.get(4, 4).unwrap(), 1);
    }

    #[test]
    fn test_flat_surface_has_no_single_contacts() {
        let image = Raster::filled(7, 7, 1.0);
        let tip = Raster::filled(3, 3, 0.0);
        let apex = Apex::new(1, 1);
        let eroded = erosion(&image, &tip, apex).unwrap();
        let cmap = certainty_map(&image, &tip, &eroded, apex, &CertaintyParams::default()).unwrap();
        assert!(cmap.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let image = Raster::filled(5, 5, 0.0);
        let eroded = Raster::filled(4, 5, 0.0);
        let tip = sharp_tip();
        let result = certainty_map(&image, &tip, &eroded, Apex::new(1, 1), &CertaintyParams::default());
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let image = Raster::filled(5, 5, 0.0);
        let tip = sharp_tip();
        let params = CertaintyParams { tolerance: Some(-1.0) };
        let result = certainty_map(&image, &tip, &image, Apex::new(1, 1), &params);
        assert!(result.is_err());
    }
}
