//! Selection of informative image locations
//!
//! Sharp local maxima constrain the tip the most. Flat tops are rejected
//! because too many neighbours tie with the centre.

use tipmorph_core::raster::Raster;

use crate::morphology::Apex;

/// Neighbourhood half-size used for a tip of the given shape
pub fn neighbourhood_radius(tip_rows: usize, tip_cols: usize) -> usize {
    (tip_rows.max(tip_cols) / 10).max(1)
}

/// Whether `(col, row)` is a usable local maximum of `image`.
///
/// The `(2·delta+1)²` window is clipped to the image. Scanning it in row
/// order, every sample at least as high as the running maximum is counted
/// and becomes the new maximum. The location qualifies when the final
/// maximum is its own height and no more than a fifth of the full window
/// was counted.
pub fn is_local_maximum(image: &Raster<f64>, col: usize, row: usize, delta: usize) -> bool {
    let (rows, cols) = image.shape();
    let data = image.data();
    let centre = data[[row, col]];

    let row_lo = row.saturating_sub(delta);
    let row_hi = (row + delta).min(rows - 1);
    let col_lo = col.saturating_sub(delta);
    let col_hi = (col + delta).min(cols - 1);

    let mut max = centre;
    let mut count = 0;
    for r in row_lo..=row_hi {
        for c in col_lo..=col_hi {
            let v = data[[r, c]];
            if v >= max {
                count += 1;
                max = v;
            }
        }
    }

    let side = 2 * delta + 1;
    max == centre && count <= side * side / 5
}

/// Locations `(col, row)` worth refining the tip at, in scan order.
///
/// Scans the same range as a full estimation pass.
pub fn select_candidates(image: &Raster<f64>, tip_shape: (usize, usize), apex: Apex) -> Vec<(usize, usize)> {
    let (im_rows, im_cols) = image.shape();
    let (tip_rows, tip_cols) = tip_shape;
    let delta = neighbourhood_radius(tip_rows, tip_cols);

    let Some((row_range, col_range)) = pass_range(im_rows, im_cols, tip_rows, tip_cols, apex) else {
        return Vec::new();
    };

    let mut candidates = Vec::new();
    for row in row_range {
        for col in col_range.clone() {
            if is_local_maximum(image, col, row, delta) {
                candidates.push((col, row));
            }
        }
    }
    candidates
}

/// Rows and columns visited by an estimation pass:
/// `[tip_rows-1-yc, im_rows-1-yc]` and `[tip_cols-1-xc, im_cols-1-xc]`
pub(crate) fn pass_range(
    im_rows: usize,
    im_cols: usize,
    tip_rows: usize,
    tip_cols: usize,
    apex: Apex,
) -> Option<(std::ops::RangeInclusive<usize>, std::ops::RangeInclusive<usize>)> {
    let row_lo = tip_rows.checked_sub(1 + apex.row)?;
    let col_lo = tip_cols.checked_sub(1 + apex.col)?;
    let row_hi = im_rows.checked_sub(1 + apex.row)?;
    let col_hi = im_cols.checked_sub(1 + apex.col)?;
    if row_lo > row_hi || col_lo > col_hi {
        return None;
    }
    Some((row_lo..=row_hi, col_lo..=col_hi))
}
