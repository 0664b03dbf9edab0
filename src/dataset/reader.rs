//! DatasetReader trait for format-agnostic plane access.
//!
//! A dataset is a set of series, each a stack of 2D planes addressed by a
//! linear plane index. Format readers reconstruct that addressing from
//! whatever physical layout the format uses and expose it through
//! [`DatasetReader`], so consumers never deal with file layout.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ReadError;
use crate::metadata::CoreMetadata;

use super::decoder::PlaneRegion;

// =============================================================================
// FileGroupOption
// =============================================================================

/// Whether a dataset's files must be opened together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FileGroupOption {
    /// Individual files are meaningless on their own
    MustGroup,
    /// Files may be opened alone or as a group
    CanGroup,
    /// Each file is a complete dataset
    CannotGroup,
}

// =============================================================================
// DatasetReader Trait
// =============================================================================

/// Format-agnostic interface for reading planes from a multi-series dataset.
///
/// # Example
///
/// ```ignore
/// use hcs_reader::{DatasetReader, PlaneRegion, ScanrReader};
///
/// let reader = ScanrReader::open("plate/experiment_descriptor.xml", Default::default())?;
/// for series in 0..reader.series_count() {
///     let core = reader.core_metadata(series).unwrap();
///     let bytes = reader.open_plane(series, 0)?;
///     assert_eq!(bytes.len(), core.plane_byte_len());
/// }
/// ```
pub trait DatasetReader: Send + Sync {
    /// Short human-readable format name.
    fn format_name(&self) -> &'static str;

    /// Number of series, 0 if nothing is open.
    fn series_count(&self) -> usize;

    /// Dimensional metadata of one series.
    ///
    /// Returns `None` if `series` is out of range.
    fn core_metadata(&self, series: usize) -> Option<&CoreMetadata>;

    /// Copy `region` of plane `plane` in series `series` into `buf`.
    ///
    /// `buf` must hold at least the region's byte length. Planes that were
    /// never acquired leave `buf` untouched and still return `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No dataset is open
    /// - Series or plane index is out of range
    /// - The region does not fit in the plane, or `buf` is too small
    /// - The backing file cannot be decoded
    fn read_plane(
        &self,
        series: usize,
        plane: usize,
        region: PlaneRegion,
        buf: &mut [u8],
    ) -> Result<(), ReadError>;

    /// Read a full plane into a freshly zeroed buffer.
    fn open_plane(&self, series: usize, plane: usize) -> Result<Vec<u8>, ReadError> {
        let count = self.series_count();
        let core = self
            .core_metadata(series)
            .ok_or(ReadError::SeriesOutOfRange { series, count })?;
        let region = PlaneRegion::full(core.size_x, core.size_y);
        let mut buf = vec![0u8; core.plane_byte_len()];
        self.read_plane(series, plane, region, &mut buf)?;
        Ok(buf)
    }

    /// Files backing one series.
    ///
    /// With `no_pixels`, only companion metadata files are returned.
    fn used_files(&self, series: usize, no_pixels: bool) -> Result<Vec<PathBuf>, ReadError>;

    /// Grouping requirement for files of this format.
    fn file_group_option(&self, path: &Path) -> FileGroupOption;

    /// Release all dataset state. Later reads fail with `NotInitialized`.
    fn close(&mut self);
}

/// Validate a plane request against `core` and return the plane's series record.
///
/// Shared by readers so every format reports bounds errors identically.
pub fn check_plane_parameters<'a>(
    core: &'a [CoreMetadata],
    series: usize,
    plane: usize,
    region: &PlaneRegion,
    buf_len: usize,
) -> Result<&'a CoreMetadata, ReadError> {
    let meta = core.get(series).ok_or(ReadError::SeriesOutOfRange {
        series,
        count: core.len(),
    })?;

    if plane >= meta.image_count as usize {
        return Err(ReadError::PlaneOutOfRange {
            plane,
            count: meta.image_count as usize,
        });
    }

    if !region.fits_within(meta.size_x, meta.size_y) {
        return Err(ReadError::RegionOutOfBounds {
            x: region.x,
            y: region.y,
            width: region.width,
            height: region.height,
            size_x: meta.size_x,
            size_y: meta.size_y,
        });
    }

    let required =
        region.pixel_count() * meta.pixel_type.bytes_per_pixel() * meta.samples_per_pixel as usize;
    if buf_len < required {
        return Err(ReadError::BufferTooSmall {
            required,
            actual: buf_len,
        });
    }

    Ok(meta)
}

// =============================================================================
// Tests
// =============================================================================
