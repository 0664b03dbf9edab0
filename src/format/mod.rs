//! File format support.
//!
//! [`tiff`] decodes the single-plane TIFF files HCS instruments write, and
//! [`detect`] recognizes which files belong to a ScanR dataset.

pub mod detect;
pub mod tiff;

pub use detect::{detect_format, is_this_type, DatasetFormat};
