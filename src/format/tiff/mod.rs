//! TIFF parser for single-plane image files.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: Contains metadata and pointers to image data.
//!   Plane files usually carry a single IFD; multi-page files expose one page per IFD.
//!
//! - **Strips**: Pixel rows are stored in strips of `RowsPerStrip` rows, located by
//!   `StripOffsets` / `StripByteCounts`.

mod parser;
mod plane;
mod tags;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use plane::{
    PageLayout, TiffDecoder, TiffLayout, TiffPlaneSource, DEFAULT_LAYOUT_CACHE_CAPACITY,
};
pub use tags::{Compression, FieldType, Photometric, TiffTag};
pub use values::{parse_u64_array, ValueReader};
