//! I/O for reading and writing calibrated fields

mod native;

pub use native::{read_tiff, read_tiff_from_buffer, write_tiff, write_tiff_to_buffer, TiffOptions};
