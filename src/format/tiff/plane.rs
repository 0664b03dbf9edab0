//! Uncompressed single-plane TIFF decoding.
//!
//! Acquisition software in the HCS world writes every plane as its own small
//! TIFF file: one page (occasionally a few), strip-organized, chunky,
//! uncompressed. That is the subset supported here:
//!
//! - **Organization**: strips only (tiled files are rejected)
//! - **Compression**: none
//! - **Planar configuration**: chunky (1), or any value when there is a single sample
//! - **Pixel layouts**: 8/16/32-bit integers (signed or unsigned), 32/64-bit IEEE floats
//!
//! Region reads copy one row at a time straight out of the strip that holds
//! it, so no more than the requested bytes are ever read from disk.
//!
//! [`TiffDecoder`] implements [`PlaneDecoder`]. It keeps a bounded LRU cache
//! of parsed [`TiffLayout`]s keyed by path so that repeated reads of the same
//! file skip IFD parsing. The file itself is opened and closed on every call.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use tracing::debug;

use crate::dataset::{PlaneDecoder, PlaneHeader, PlaneRegion, PlaneSource};
use crate::error::TiffError;
use crate::io::{FileRangeReader, RangeReader};
use crate::metadata::PixelType;

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{Compression, Photometric, TiffTag};
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of pages to parse (safety limit)
const MAX_PAGES: usize = 4096;

/// Default number of parsed layouts kept by [`TiffDecoder`]
pub const DEFAULT_LAYOUT_CACHE_CAPACITY: usize = 64;

const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_IEEEFP: u16 = 3;

const PLANAR_CHUNKY: u32 = 1;

// =============================================================================
// PageLayout
// =============================================================================

/// Strip geometry of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub width: u32,
    pub height: u32,
    pub pixel_type: PixelType,
    pub samples_per_pixel: u32,
    pub photometric: Photometric,
    pub rows_per_strip: u32,
    pub strip_offsets: Vec<u64>,
    pub strip_byte_counts: Vec<u64>,
}

impl PageLayout {
    /// Build a page layout from a parsed IFD.
    fn from_ifd<R: RangeReader>(ifd: &Ifd, values: &ValueReader<'_, R>) -> Result<Self, TiffError> {
        let byte_order = values.byte_order();

        let width = required_u32(ifd, TiffTag::ImageWidth, values)?;
        let height = required_u32(ifd, TiffTag::ImageLength, values)?;

        let compression = optional_u64(ifd, TiffTag::Compression, values)?.unwrap_or(1);
        let compression = u16::try_from(compression).ok().and_then(Compression::from_u16);
        match compression {
            Some(c) if c.is_supported() => {}
            Some(c) => return Err(TiffError::UnsupportedCompression(c.name().to_string())),
            None => {
                return Err(TiffError::UnsupportedCompression(
                    "unknown scheme".to_string(),
                ))
            }
        }

        if ifd.is_tiled() {
            return Err(TiffError::TiledOrganization);
        }

        let samples_per_pixel = optional_u64(ifd, TiffTag::SamplesPerPixel, values)?.unwrap_or(1);
        let samples_per_pixel = u32::try_from(samples_per_pixel)
            .ok()
            .filter(|&s| s > 0)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: TiffTag::SamplesPerPixel.name(),
                message: format!("invalid sample count {}", samples_per_pixel),
            })?;

        let planar = ifd
            .get_u32(TiffTag::PlanarConfiguration, byte_order)
            .unwrap_or(PLANAR_CHUNKY);
        if planar != PLANAR_CHUNKY && samples_per_pixel > 1 {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::PlanarConfiguration.name(),
                message: format!("planar configuration {} is not supported", planar),
            });
        }

        let bits = optional_u64(ifd, TiffTag::BitsPerSample, values)?.unwrap_or(1);
        let sample_format =
            optional_u64(ifd, TiffTag::SampleFormat, values)?.unwrap_or(u64::from(SAMPLE_FORMAT_UINT));
        let bits = u16::try_from(bits).unwrap_or(u16::MAX);
        let sample_format = u16::try_from(sample_format).unwrap_or(u16::MAX);
        let pixel_type = pixel_type_for(bits, sample_format)?;

        let photometric = ifd
            .get_u32(TiffTag::PhotometricInterpretation, byte_order)
            .and_then(|v| u16::try_from(v).ok())
            .map(Photometric::from_u16)
            .unwrap_or(Photometric::BlackIsZero);

        let rows_per_strip = optional_u64(ifd, TiffTag::RowsPerStrip, values)?
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(height)
            .clamp(1, height.max(1));

        let strip_offsets = match ifd.get_entry_by_tag(TiffTag::StripOffsets) {
            Some(entry) => values.read_u64_array(entry, TiffTag::StripOffsets.name())?,
            None => return Err(TiffError::MissingTag(TiffTag::StripOffsets.name())),
        };
        let strip_byte_counts = match ifd.get_entry_by_tag(TiffTag::StripByteCounts) {
            Some(entry) => values.read_u64_array(entry, TiffTag::StripByteCounts.name())?,
            None => return Err(TiffError::MissingTag(TiffTag::StripByteCounts.name())),
        };

        let strips_needed = height.div_ceil(rows_per_strip) as usize;
        if strip_offsets.len() < strips_needed || strip_byte_counts.len() < strips_needed {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::StripOffsets.name(),
                message: format!(
                    "{} rows in strips of {} need {} strips, found {} offsets and {} byte counts",
                    height,
                    rows_per_strip,
                    strips_needed,
                    strip_offsets.len(),
                    strip_byte_counts.len()
                ),
            });
        }

        Ok(PageLayout {
            width,
            height,
            pixel_type,
            samples_per_pixel,
            photometric,
            rows_per_strip,
            strip_offsets,
            strip_byte_counts,
        })
    }

    /// Bytes per pixel including all samples.
    #[inline]
    pub fn pixel_stride(&self) -> usize {
        self.pixel_type.bytes_per_pixel() * self.samples_per_pixel as usize
    }

    /// Bytes in one full row.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width as usize * self.pixel_stride()
    }

    /// File offset and length of the bytes of `row` spanning `region`'s columns.
    fn row_span(&self, row: u32, region: &PlaneRegion) -> Result<(u64, usize), TiffError> {
        let strip = (row / self.rows_per_strip) as usize;
        let row_in_strip = (row % self.rows_per_strip) as u64;
        let stride = self.pixel_stride() as u64;

        let start = row_in_strip * self.row_stride() as u64 + u64::from(region.x) * stride;
        let len = u64::from(region.width) * stride;

        let strip_len = self.strip_byte_counts[strip];
        if start + len > strip_len {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::StripByteCounts.name(),
                message: format!(
                    "strip {} holds {} bytes, row {} needs {}",
                    strip,
                    strip_len,
                    row,
                    start + len
                ),
            });
        }

        Ok((self.strip_offsets[strip] + start, len as usize))
    }
}

fn pixel_type_for(bits: u16, sample_format: u16) -> Result<PixelType, TiffError> {
    match (bits, sample_format) {
        (8, SAMPLE_FORMAT_UINT) => Ok(PixelType::Uint8),
        (8, SAMPLE_FORMAT_INT) => Ok(PixelType::Int8),
        (16, SAMPLE_FORMAT_UINT) => Ok(PixelType::Uint16),
        (16, SAMPLE_FORMAT_INT) => Ok(PixelType::Int16),
        (32, SAMPLE_FORMAT_UINT) => Ok(PixelType::Uint32),
        (32, SAMPLE_FORMAT_INT) => Ok(PixelType::Int32),
        (32, SAMPLE_FORMAT_IEEEFP) => Ok(PixelType::Float),
        (64, SAMPLE_FORMAT_IEEEFP) => Ok(PixelType::Double),
        _ => Err(TiffError::UnsupportedPixelLayout {
            bits,
            sample_format,
        }),
    }
}

fn optional_u64<R: RangeReader>(
    ifd: &Ifd,
    tag: TiffTag,
    values: &ValueReader<'_, R>,
) -> Result<Option<u64>, TiffError> {
    ifd.get_entry_by_tag(tag)
        .map(|entry| values.read_first_u64(entry, tag.name()))
        .transpose()
}

fn required_u32<R: RangeReader>(
    ifd: &Ifd,
    tag: TiffTag,
    values: &ValueReader<'_, R>,
) -> Result<u32, TiffError> {
    let value = optional_u64(ifd, tag, values)?.ok_or(TiffError::MissingTag(tag.name()))?;
    u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
        tag: tag.name(),
        message: format!("{} does not fit in 32 bits", value),
    })
}

// =============================================================================
// TiffLayout
// =============================================================================

/// Parsed structure of a plane file: header, every page and descriptive tags.
#[derive(Debug, Clone, PartialEq)]
pub struct TiffLayout {
    pub header: TiffHeader,
    pub pages: Vec<PageLayout>,
    /// File size at parse time, used to detect rewritten files
    pub file_size: u64,
    /// Header of the first page in decoder terms
    pub plane_header: PlaneHeader,
    pub image_description: Option<String>,
    pub date_time: Option<String>,
}

impl TiffLayout {
    /// Parse the header and every page of a TIFF file.
    pub fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let file_size = reader.size();
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(file_size) as usize;
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, file_size)?;

        let ifds = Self::parse_all_ifds(reader, &header)?;
        let first = ifds.first().ok_or(TiffError::InvalidIfdOffset(header.first_ifd_offset))?;

        let values = ValueReader::new(reader, &header);
        let software = Self::read_ascii(first, TiffTag::Software, &values)?;
        let image_description = Self::read_ascii(first, TiffTag::ImageDescription, &values)?;
        let date_time = Self::read_ascii(first, TiffTag::DateTime, &values)?;

        let pages = ifds
            .iter()
            .map(|ifd| PageLayout::from_ifd(ifd, &values))
            .collect::<Result<Vec<_>, _>>()?;

        let page = &pages[0];
        let plane_header = PlaneHeader {
            width: page.width,
            height: page.height,
            pixel_type: page.pixel_type,
            samples_per_pixel: page.samples_per_pixel,
            rgb: page.samples_per_pixel > 1 || page.photometric == Photometric::Rgb,
            interleaved: page.samples_per_pixel > 1,
            indexed: page.photometric == Photometric::Palette,
            little_endian: header.byte_order == ByteOrder::LittleEndian,
            page_count: pages.len(),
            software,
        };

        debug!(
            file = reader.identifier(),
            pages = pages.len(),
            width = page.width,
            height = page.height,
            pixel_type = %page.pixel_type,
            "Parsed TIFF layout"
        );

        Ok(TiffLayout {
            header,
            pages,
            file_size,
            plane_header,
            image_description,
            date_time,
        })
    }

    /// Parse all IFDs in the file following the next-IFD chain.
    fn parse_all_ifds<R: RangeReader>(reader: &R, header: &TiffHeader) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_PAGES {
            // First, read just enough to get the entry count
            let count_size = header.ifd_count_size();
            let count_bytes = reader.read_exact_at(offset, count_size)?;
            let entry_count = header.read_entry_count(&count_bytes);

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            let next_offset = ifd.next_ifd_offset;
            ifds.push(ifd);

            // A chain that points back at itself would never terminate
            if next_offset == offset {
                break;
            }
            offset = next_offset;
        }

        Ok(ifds)
    }

    fn read_ascii<R: RangeReader>(
        ifd: &Ifd,
        tag: TiffTag,
        values: &ValueReader<'_, R>,
    ) -> Result<Option<String>, TiffError> {
        ifd.get_entry_by_tag(tag)
            .map(|entry| values.read_string(entry))
            .transpose()
    }

    pub fn page(&self, page: usize) -> Result<&PageLayout, TiffError> {
        self.pages.get(page).ok_or(TiffError::PageOutOfRange {
            page,
            count: self.pages.len(),
        })
    }
}

// =============================================================================
// TiffPlaneSource
// =============================================================================

/// An opened plane file.
pub struct TiffPlaneSource<R: RangeReader = FileRangeReader> {
    reader: R,
    layout: Arc<TiffLayout>,
}

impl<R: RangeReader> TiffPlaneSource<R> {
    /// Parse `reader` and wrap it.
    pub fn new(reader: R) -> Result<Self, TiffError> {
        let layout = Arc::new(TiffLayout::parse(&reader)?);
        Ok(Self { reader, layout })
    }

    /// Wrap `reader` with an already parsed layout.
    pub fn with_layout(reader: R, layout: Arc<TiffLayout>) -> Self {
        Self { reader, layout }
    }

    pub fn layout(&self) -> &Arc<TiffLayout> {
        &self.layout
    }
}

impl<R: RangeReader> PlaneSource for TiffPlaneSource<R> {
    fn header(&self) -> &PlaneHeader {
        &self.layout.plane_header
    }

    fn read_plane(&self, page: usize, region: PlaneRegion, buf: &mut [u8]) -> Result<(), TiffError> {
        let layout = self.layout.page(page)?;

        if !region.fits_within(layout.width, layout.height) {
            return Err(TiffError::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                page_width: layout.width,
                page_height: layout.height,
            });
        }

        let row_len = region.width as usize * layout.pixel_stride();
        let required = row_len * region.height as usize;
        if buf.len() < required {
            return Err(TiffError::BufferTooSmall {
                required,
                actual: buf.len(),
            });
        }

        for (i, row) in (region.y..region.y + region.height).enumerate() {
            let (offset, len) = layout.row_span(row, &region)?;
            let bytes = self.reader.read_exact_at(offset, len)?;
            buf[i * row_len..(i + 1) * row_len].copy_from_slice(&bytes);
        }

        Ok(())
    }
}

// =============================================================================
// TiffDecoder
// =============================================================================

/// [`PlaneDecoder`] for local uncompressed TIFF files.
///
/// # Thread Safety
///
/// The layout cache sits behind a `Mutex`; every `open` gets its own file
/// handle, so concurrent reads never share I/O state.
pub struct TiffDecoder {
    /// `None` when layout caching is disabled
    layouts: Option<Mutex<LruCache<PathBuf, Arc<TiffLayout>>>>,
}

impl TiffDecoder {
    /// Create a decoder with the default layout cache capacity.
    pub fn new() -> Self {
        Self::with_layout_cache(DEFAULT_LAYOUT_CACHE_CAPACITY)
    }

    /// Create a decoder caching up to `capacity` layouts; 0 disables caching.
    pub fn with_layout_cache(capacity: usize) -> Self {
        Self {
            layouts: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Number of layouts currently cached.
    pub fn cached_count(&self) -> usize {
        self.layouts.as_ref().map_or(0, |cache| lock(cache).len())
    }

    fn cached_layout(&self, path: &Path, file_size: u64) -> Option<Arc<TiffLayout>> {
        let mut cache = lock(self.layouts.as_ref()?);
        let cached = cache
            .get(path)
            .map(|layout| (layout.file_size == file_size).then(|| Arc::clone(layout)));
        match cached {
            Some(Some(layout)) => Some(layout),
            Some(None) => {
                debug!(path = %path.display(), "Dropping stale TIFF layout");
                cache.pop(path);
                None
            }
            None => None,
        }
    }

    fn store_layout(&self, path: &Path, layout: &Arc<TiffLayout>) {
        if let Some(cache) = self.layouts.as_ref() {
            lock(cache).put(path.to_path_buf(), Arc::clone(layout));
        }
    }
}

impl Default for TiffDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaneDecoder for TiffDecoder {
    type Source = TiffPlaneSource<FileRangeReader>;

    fn open(&self, path: &Path) -> Result<Self::Source, TiffError> {
        let reader = FileRangeReader::open(path)?;

        if let Some(layout) = self.cached_layout(path, reader.size()) {
            return Ok(TiffPlaneSource::with_layout(reader, layout));
        }

        let source = TiffPlaneSource::new(reader)?;
        self.store_layout(path, source.layout());
        Ok(source)
    }

    fn clear(&self) {
        if let Some(cache) = self.layouts.as_ref() {
            lock(cache).clear();
        }
    }
}

/// Lock the cache, recovering from a poisoned mutex.
///
/// The cache only holds immutable `Arc`s, so a panic while it was held
/// cannot leave it inconsistent.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Tests
// =============================================================================
