//! Delegate decoder interface.
//!
//! A dataset reader never decodes pixel files itself: it opens one file at a
//! time through a [`PlaneDecoder`], samples its [`PlaneHeader`], and asks the
//! returned [`PlaneSource`] to copy a sub-rectangle of one page into a caller
//! buffer. Dropping the source closes the file.

use std::path::Path;

use serde::Serialize;

use crate::error::TiffError;
use crate::metadata::PixelType;

// =============================================================================
// PlaneRegion
// =============================================================================

/// A sub-rectangle of a plane, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaneRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PlaneRegion {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole `size_x` x `size_y` plane.
    pub const fn full(size_x: u32, size_y: u32) -> Self {
        Self::new(0, 0, size_x, size_y)
    }

    /// Whether the region is non-empty and lies inside a plane of the given size.
    pub fn fits_within(&self, size_x: u32, size_y: u32) -> bool {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        self.width > 0
            && self.height > 0
            && right <= u64::from(size_x)
            && bottom <= u64::from(size_y)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// =============================================================================
// PlaneHeader
// =============================================================================

/// Geometry and encoding sampled from a single plane file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaneHeader {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    pub samples_per_pixel: u32,
    pub rgb: bool,
    pub interleaved: bool,
    pub indexed: bool,
    pub little_endian: bool,
    /// Number of pages (IFDs) in the file
    pub page_count: usize,
    /// Value of the Software tag, if present
    pub software: Option<String>,
}

impl PlaneHeader {
    /// Bytes needed to hold `region` of one page.
    pub fn region_byte_len(&self, region: &PlaneRegion) -> usize {
        region.pixel_count() * self.pixel_type.bytes_per_pixel() * self.samples_per_pixel as usize
    }
}

// =============================================================================
// Decoder traits
// =============================================================================

/// One opened plane file.
pub trait PlaneSource {
    /// Header of the file's first page.
    fn header(&self) -> &PlaneHeader;

    /// Copy `region` of page `page` into the start of `buf`.
    fn read_plane(&self, page: usize, region: PlaneRegion, buf: &mut [u8]) -> Result<(), TiffError>;
}

/// Opens plane files.
///
/// Implementations must be shareable across threads; any state they keep
/// between opens (such as parsed layouts) must be internally synchronized.
pub trait PlaneDecoder: Send + Sync {
    /// The opened-file type.
    type Source: PlaneSource;

    /// Open `path` and parse enough of it to answer [`PlaneSource::header`].
    fn open(&self, path: &Path) -> Result<Self::Source, TiffError>;

    /// Drop any state cached between opens.
    fn clear(&self) {}
}
