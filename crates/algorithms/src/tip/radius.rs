//! Apex radius of an estimated tip
//!
//! A quadratic `z = a + bx·x + by·y + cxx·x² + cxy·xy + cyy·y²` is fitted
//! by least squares to the tip samples within `R = 2 + ln(cols·rows)/4`
//! pixels of the centre. The centre pixel itself is left out. Principal
//! curvatures at the origin give the radius `-2/(k1+k2)`; tips point
//! upwards, so their curvatures are negative.

use tipmorph_core::raster::Raster;

/// Principal curvatures `(k1, k2)` at the tip centre, `k1 <= k2`.
///
/// Returns `None` when the fit is singular.
pub fn tip_curvatures(tip: &Raster<f64>) -> Option<(f64, f64)> {
    let (rows, cols) = tip.shape();
    if rows == 0 || cols == 0 {
        return None;
    }
    let r_max = 2.0 + 0.25 * ((cols * rows) as f64).ln();
    let dx = tip.calibration().dx;
    let dy = tip.calibration().dy;
    let scale = (dx * dy).sqrt() * r_max;
    if !(scale.is_finite() && scale > 0.0) {
        return None;
    }
    let xc = 0.5 * cols as f64 - 0.5;
    let yc = 0.5 * rows as f64 - 0.5;

    // Sums for the normal equations; odd moments vanish on the symmetric window
    let (mut n, mut sx2, mut sy2, mut sx4, mut sx2y2, mut sy4) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    let mut rhs = [0.0_f64; 6];

    for i in 0..rows {
        let y = (i as f64 - yc) * dy / scale;
        for j in 0..cols {
            let di = i as f64 - yc;
            let dj = j as f64 - xc;
            let rr = di * di + dj * dj;
            if rr > r_max * r_max || rr < 1e-6 {
                continue;
            }
            let x = (j as f64 - xc) * dx / scale;
            let z = tip.data()[[i, j]] / scale;
            let (xx, yy) = (x * x, y * y);

            n += 1.0;
            sx2 += xx;
            sy2 += yy;
            sx4 += xx * xx;
            sx2y2 += xx * yy;
            sy4 += yy * yy;

            rhs[0] += z;
            rhs[1] += x * z;
            rhs[2] += y * z;
            rhs[3] += xx * z;
            rhs[4] += x * y * z;
            rhs[5] += yy * z;
        }
    }

    // Upper triangle of the 6x6 normal matrix, row by row
    let mut ata = [0.0_f64; 21];
    ata[0] = n;
    ata[3] = sx2; // (0,3)
    ata[5] = sy2; // (0,5)
    ata[6] = sx2; // (1,1)
    ata[11] = sy2; // (2,2)
    ata[15] = sx4; // (3,3)
    ata[17] = sx2y2; // (3,5)
    ata[18] = sx2y2; // (4,4)
    ata[20] = sy4; // (5,5)

    let coeffs = solve_6x6_upper(&ata, &rhs)?;
    let (k1, k2) = curvature_at_origin(&coeffs);
    Some((k1 / scale, k2 / scale))
}

/// Apex radius `-2/(k1+k2)` of the tip, `None` when a curvature vanishes.
pub fn tip_radius(tip: &Raster<f64>) -> Option<f64> {
    let (k1, k2) = tip_curvatures(tip)?;
    if k1 == 0.0 || k2 == 0.0 {
        return None;
    }
    Some(-2.0 / (k1 + k2))
}

/// Principal curvatures of the fitted quadratic at the origin, `k1 <= k2`
fn curvature_at_origin(coeffs: &[f64; 6]) -> (f64, f64) {
    let (a, bx, by) = (coeffs[0], coeffs[1], coeffs[2]);
    let (mut cxx, mut cxy, mut cyy) = (coeffs[3], coeffs[4], coeffs[5]);

    if cxx.abs() + cxy.abs() + cyy.abs() <= 1e-10 * (a.abs() + bx.abs() + by.abs()) {
        return (0.0, 0.0);
    }

    // Rotate into the gradient direction and correct for the slope
    let b = bx.hypot(by);
    if b > 1e-10 {
        let (c, s) = (bx / b, by / b);
        let (c2, s2, cs) = (c * c, s * s, c * s);
        let qb = 1.0_f64.hypot(b);
        let cxx1 = (cxx * c2 + cxy * cs + cyy * s2) / (qb * qb * qb);
        let cxy1 = (2.0 * (cyy - cxx) * cs + cxy * (c2 - s2)) / (qb * qb);
        let cyy1 = (cyy * c2 - cxy * cs + cxx * s2) / qb;
        cxx = cxx1;
        cxy = cxy1;
        cyy = cyy1;
    }

    let cm = cxx - cyy;
    let cp = cxx + cyy;
    let k_a = cp + cm.hypot(cxy);
    let k_b = cp - cm.hypot(cxy);
    (k_a.min(k_b), k_a.max(k_b))
}

/// Solve a symmetric 6x6 system given by its upper triangle
fn solve_6x6_upper(ata: &[f64; 21], atz: &[f64; 6]) -> Option<[f64; 6]> {
    let mut m = [[0.0_f64; 7]; 6]; // augmented matrix [A | b]
    let mut idx = 0;
    for i in 0..6 {
        for j in i..6 {
            m[i][j] = ata[idx];
            m[j][i] = ata[idx];
            idx += 1;
        }
        m[i][6] = atz[i];
    }

    // Gaussian elimination with partial pivoting
    for col in 0..6 {
        let mut max_val = m[col][col].abs();
        let mut max_row = col;
        for row in (col + 1)..6 {
            if m[row][col].abs() > max_val {
                max_val = m[row][col].abs();
                max_row = row;
            }
        }

        if max_val < 1e-15 {
            return None;
        }

        if max_row != col {
            m.swap(col, max_row);
        }

        let pivot = m[col][col];
        for row in (col + 1)..6 {
            let factor = m[row][col] / pivot;
            for j in col..7 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0_f64; 6];
    for i in (0..6).rev() {
        let mut sum = m[i][6];
        for j in (i + 1)..6 {
            sum -= m[i][j] * x[j];
        }
        x[i] = sum / m[i][i];
    }

    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tipmorph_core::Calibration;

    /// Spherical cap of radius `r` (in pixels) centred on the grid
    fn sphere_tip(size: usize, r: f64) -> Raster<f64> {
        let mut tip = Raster::new(size, size);
        let c = 0.5 * size as f64 - 0.5;
        for row in 0..size {
            for col in 0..size {
                let dr = row as f64 - c;
                let dc = col as f64 - c;
                tip.set(row, col, (r * r - dr * dr - dc * dc).max(0.0).sqrt()).unwrap();
            }
        }
        tip
    }

    #[test]
    fn test_sphere_radius() {
        let tip = sphere_tip(21, 40.0);
        let radius = tip_radius(&tip).unwrap();
        assert_relative_eq!(radius, 40.0, max_relative = 0.05);
    }

    #[test]
    fn test_radius_scales_with_pitch() {
        let mut tip = sphere_tip(21, 40.0);
        tip.data_mut().mapv_inplace(|v| v * 1e-9);
        tip.set_calibration(Calibration::new(1e-9, 1e-9));
        let radius = tip_radius(&tip).unwrap();
        assert_relative_eq!(radius, 40e-9, max_relative = 0.05);
    }

    #[test]
    fn test_flat_tip_has_no_radius() {
        let tip = Raster::filled(9, 9, 1.0);
        assert_eq!(tip_radius(&tip), None);
    }

    #[test]
    fn test_elliptic_curvatures_ordered() {
        let mut tip = Raster::new(15, 15);
        for row in 0..15 {
            for col in 0..15 {
                let x = col as f64 - 7.0;
                let y = row as f64 - 7.0;
                tip.set(row, col, -0.02 * x * x - 0.08 * y * y).unwrap();
            }
        }
        let (k1, k2) = tip_curvatures(&tip).unwrap();
        assert!(k1 < k2);
        assert_relative_eq!(k1, -0.16, max_relative = 1e-6);
        assert_relative_eq!(k2, -0.04, max_relative = 1e-6);
    }

    #[test]
    fn test_solve_identity() {
        let mut ata = [0.0; 21];
        for (k, i) in [0usize, 6, 11, 15, 18, 20].iter().enumerate() {
            ata[*i] = (k + 1) as f64;
        }
        let x = solve_6x6_upper(&ata, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        for v in x {
            assert_relative_eq!(v, 1.0);
        }
    }
}
