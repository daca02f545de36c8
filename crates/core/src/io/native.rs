//! Float TIFF reading/writing
//!
//! Uses the `tiff` crate for the container. Lateral calibration travels in
//! the ModelPixelScale/ModelTiepoint tags so fields written here reload
//! with the same pixel pitch.

use crate::error::{Error, Result};
use crate::raster::{Calibration, Raster, RasterElement};
use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{Gray32Float, Gray64Float};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;

/// Options for writing TIFF files
#[derive(Debug, Clone, Default)]
pub struct TiffOptions {
    /// Store samples as 32-bit floats instead of 64-bit
    pub single_precision: bool,
}

/// Read a TIFF file into a Raster
pub fn read_tiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    decode_tiff(file)
}

/// Read a TIFF from an in-memory buffer into a Raster
pub fn read_tiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_tiff(Cursor::new(data))
}

fn cast_all<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: num_traits::NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or(T::fill_value()))
        .collect()
}

/// Internal: decode a TIFF from any `Read + Seek` source
fn decode_tiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::Other(format!("TIFF decode error: {}", e)))?;

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::Other(format!("Cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::Other(format!("Cannot read image data: {}", e)))?;

    let data: Vec<T> = match result {
        DecodingResult::F32(buf) => cast_all(buf),
        DecodingResult::F64(buf) => cast_all(buf),
        DecodingResult::U8(buf) => cast_all(buf),
        DecodingResult::U16(buf) => cast_all(buf),
        DecodingResult::U32(buf) => cast_all(buf),
        DecodingResult::I16(buf) => cast_all(buf),
        DecodingResult::I32(buf) => cast_all(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Some(calibration) = read_calibration(&mut decoder) {
        raster.set_calibration(calibration);
    }

    Ok(raster)
}

/// Pixel pitch and origin from the scale/tiepoint tags, if both are present
fn read_calibration<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<Calibration> {
    let scale = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_PIXEL_SCALE)).ok()?;
    let tiepoint = decoder.get_tag_f64_vec(Tag::Unknown(MODEL_TIEPOINT)).ok()?;

    if scale.len() < 2 || tiepoint.len() < 6 || scale[0] <= 0.0 || scale[1] <= 0.0 {
        return None;
    }
    // tiepoint: [I, J, K, X, Y, Z]
    let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
    let origin_y = tiepoint[4] - tiepoint[1] * scale[1];
    Some(Calibration::new(scale[0], scale[1]).with_origin(origin_x, origin_y))
}

/// Write a Raster to a TIFF file
pub fn write_tiff<T, P>(raster: &Raster<T>, path: P, options: Option<TiffOptions>) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = BufWriter::new(File::create(path.as_ref())?);
    encode_tiff(raster, file, &options.unwrap_or_default())
}

/// Write a Raster to an in-memory TIFF buffer
pub fn write_tiff_to_buffer<T>(raster: &Raster<T>, options: Option<TiffOptions>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_tiff(raster, Cursor::new(&mut buf), &options.unwrap_or_default())?;
    Ok(buf)
}

/// Internal: encode a Raster as TIFF into any `Write + Seek` sink
fn encode_tiff<T, W>(raster: &Raster<T>, writer: W, options: &TiffOptions) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let mut encoder = TiffEncoder::new(writer)
        .map_err(|e| Error::Other(format!("TIFF encoder error: {}", e)))?;

    let (rows, cols) = raster.shape();
    let cal = raster.calibration();
    let scale = [cal.dx, cal.dy, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, cal.origin_x, cal.origin_y, 0.0];

    macro_rules! write_image {
        ($color:ty, $sample:ty) => {{
            let data: Vec<$sample> = raster
                .data()
                .iter()
                .map(|&v| num_traits::cast(v).unwrap_or(<$sample>::NAN))
                .collect();
            let mut image = encoder
                .new_image::<$color>(cols as u32, rows as u32)
                .map_err(|e| Error::Other(format!("Cannot create TIFF image: {}", e)))?;
            image
                .encoder()
                .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &scale[..])
                .map_err(|e| Error::Other(format!("Cannot write scale tag: {}", e)))?;
            image
                .encoder()
                .write_tag(Tag::Unknown(MODEL_TIEPOINT), &tiepoint[..])
                .map_err(|e| Error::Other(format!("Cannot write tiepoint tag: {}", e)))?;
            image
                .write_data(&data)
                .map_err(|e| Error::Other(format!("Cannot write image data: {}", e)))?;
        }};
    }

    if options.single_precision {
        write_image!(Gray32Float, f32);
    } else {
        write_image!(Gray64Float, f64);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn sample_field() -> Raster<f64> {
        let mut r = Raster::new(6, 9);
        for row in 0..6 {
            for col in 0..9 {
                r.set(row, col, (row as f64 * 0.37 + col as f64).sin() * 1e-8).unwrap();
            }
        }
        r.set_calibration(Calibration::new(2e-9, 3e-9).with_origin(1e-7, -4e-8));
        r
    }

    #[test]
    fn test_buffer_roundtrip_keeps_values_and_pitch() {
        let field = sample_field();
        let buf = write_tiff_to_buffer(&field, None).unwrap();
        let back: Raster<f64> = read_tiff_from_buffer(&buf).unwrap();

        assert_eq!(back.shape(), field.shape());
        assert_eq!(back.data(), field.data());
        assert_relative_eq!(back.calibration().dx, 2e-9);
        assert_relative_eq!(back.calibration().dy, 3e-9);
        assert_relative_eq!(back.calibration().origin_x, 1e-7);
        assert_relative_eq!(back.calibration().origin_y, -4e-8);
    }

    #[test]
    fn test_file_roundtrip_single_precision() {
        let field = sample_field();
        let tmp = NamedTempFile::new().unwrap();
        write_tiff(&field, tmp.path(), Some(TiffOptions { single_precision: true })).unwrap();
        let back: Raster<f64> = read_tiff(tmp.path()).unwrap();
        for (a, b) in back.data().iter().zip(field.data().iter()) {
            assert!((a - b).abs() < 1e-14);
        }
    }
}
