//! Format detection for HCS dataset files.
//!
//! A ScanR dataset can be opened through any of its files:
//!
//! - **Descriptor files**: identified by their fixed names
//!   (`experiment_descriptor.xml`, `experiment_descriptor.dat`, `AcquisitionLog.dat`)
//! - **Plane files**: TIFFs whose first IFD carries the `Software` tag
//!   written by the acquisition software. The `.tif` suffix alone is not enough.

use std::path::Path;

use tracing::debug;

use crate::error::FormatError;
use crate::io::{file_name, has_suffix, FileRangeReader, RangeReader};

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, ValueReader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};

// =============================================================================
// Constants
// =============================================================================

/// XML experiment descriptor, the file a dataset is initialized from
pub const DESCRIPTOR_FILE: &str = "experiment_descriptor.xml";

/// Binary companion of the descriptor
pub const EXPERIMENT_FILE: &str = "experiment_descriptor.dat";

/// Acquisition log written next to the descriptor
pub const ACQUISITION_FILE: &str = "AcquisitionLog.dat";

/// `Software` tag value written into every ScanR plane
pub const SCANR_SOFTWARE: &str = "National Instruments IMAQ";

// =============================================================================
// DatasetFormat
// =============================================================================

/// Detected dataset format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    /// Olympus ScanR plate (descriptor XML + one TIFF per plane)
    ScanR,
}

impl DatasetFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            DatasetFormat::ScanR => "Olympus ScanR",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Whether `name` is one of the fixed ScanR descriptor file names.
pub fn is_descriptor_name(name: &str) -> bool {
    name == DESCRIPTOR_FILE || name == EXPERIMENT_FILE || name == ACQUISITION_FILE
}

/// Whether `path` belongs to a ScanR dataset.
///
/// Descriptor files are recognized by name. TIFF files are only recognized
/// when `open` is set, by reading their `Software` tag; unreadable files are
/// reported as not matching.
pub fn is_this_type(path: &Path, open: bool) -> bool {
    if file_name(path).is_some_and(is_descriptor_name) {
        return true;
    }

    if !open || !(has_suffix(path, "tif") || has_suffix(path, "tiff")) {
        return false;
    }

    match FileRangeReader::open(path) {
        Ok(reader) => is_scanr_tiff(&reader),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "Could not open file for detection");
            false
        }
    }
}

/// Detect the format of the dataset `path` belongs to.
///
/// # Returns
/// * `Ok(DatasetFormat)` - The detected format
/// * `Err(FormatError::UnsupportedFormat)` - File is not part of a recognized dataset
pub fn detect_format(path: &Path) -> Result<DatasetFormat, FormatError> {
    if is_this_type(path, true) {
        Ok(DatasetFormat::ScanR)
    } else {
        Err(FormatError::UnsupportedFormat {
            reason: format!("{} is not part of a ScanR dataset", path.display()),
        })
    }
}

/// Whether the TIFF behind `reader` was written by ScanR acquisition software.
pub fn is_scanr_tiff<R: RangeReader>(reader: &R) -> bool {
    match read_software(reader) {
        Ok(Some(software)) => software.trim() == SCANR_SOFTWARE,
        Ok(None) => false,
        Err(err) => {
            debug!(file = reader.identifier(), error = %err, "Not a readable TIFF");
            false
        }
    }
}

/// Read the `Software` tag of the first IFD.
///
/// Returns `None` if the tag is not present.
pub fn read_software<R: RangeReader>(reader: &R) -> Result<Option<String>, FormatError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: "File too small to be a valid TIFF".to_string(),
        });
    }

    let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
    let header_bytes = reader.read_exact_at(0, header_len)?;
    let header = TiffHeader::parse(&header_bytes, reader.size())?;

    // Read first IFD entry count, then the full IFD
    let count_bytes = reader.read_exact_at(header.first_ifd_offset, header.ifd_count_size())?;
    let entry_count = header.read_entry_count(&count_bytes);
    let ifd_size = Ifd::calculate_size(entry_count, &header);
    let ifd_bytes = reader.read_exact_at(header.first_ifd_offset, ifd_size)?;
    let ifd = Ifd::parse(&ifd_bytes, &header)?;

    let entry = match ifd.get_entry_by_tag(TiffTag::Software) {
        Some(e) => e,
        None => return Ok(None),
    };
    let values = ValueReader::new(reader, &header);
    Ok(Some(values.read_string(entry)?))
}

/// Check if bytes represent a valid TIFF header.
///
/// This is a quick check that can be used before attempting full parsing.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match u16::from_le_bytes([bytes[0], bytes[1]]) {
        0x4949 => ByteOrder::LittleEndian,
        0x4D4D => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}

// =============================================================================
// Tests
// =============================================================================
