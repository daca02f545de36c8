//! Point reflection of a height field

use tipmorph_core::raster::Raster;
use tipmorph_core::Result;

use super::{allocate_output, fill_rows};

/// Reflect a field through its centre and negate it:
/// `R[j][i] = -S[rows-1-j][cols-1-i]`.
///
/// Turns a tip into the structuring element that describes the same probe
/// seen from the surface side.
pub fn reflect(field: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = field.shape();
    let mut out = allocate_output(rows, cols, *field.calibration(), 0.0)?;
    fill_rows(&mut out, |row, samples| {
        for (col, v) in samples.iter_mut().enumerate() {
            // SAFETY: row < rows and col < cols, so the mirrored index is in bounds
            *v = -unsafe { field.get_unchecked(rows - 1 - row, cols - 1 - col) };
        }
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_values() {
        let s = Raster::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let r = reflect(&s).unwrap();
        assert_eq!(r.shape(), (2, 3));
        assert_eq!(r.get(0, 0).unwrap(), -6.0);
        assert_eq!(r.get(0, 2).unwrap(), -4.0);
        assert_eq!(r.get(1, 0).unwrap(), -3.0);
        assert_eq!(r.get(1, 2).unwrap(), -1.0);
    }

    #[test]
    fn test_reflect_involution() {
        let s = Raster::from_rows(&[
            vec![0.5, -1.0, 2.25, 7.0],
            vec![3.0, 0.0, -4.5, 1.0],
            vec![9.0, 8.0, 7.5, -6.0],
        ])
        .unwrap();
        assert_eq!(reflect(&reflect(&s).unwrap()).unwrap(), s);
    }
}
