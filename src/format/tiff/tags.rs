//! TIFF tag and field type definitions.
//!
//! Only the vocabulary needed to locate and describe single uncompressed
//! planes is defined. Unknown tags are carried through parsing untouched.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit ASCII character
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two Longs: numerator, denominator
    Rational = 5,
    /// Signed 8-bit integer
    SByte = 6,
    /// Undefined byte data
    Undefined = 7,
    /// Signed 16-bit integer
    SShort = 8,
    /// Signed 32-bit integer
    SLong = 9,
    /// Two SLongs
    SRational = 10,
    /// IEEE single precision
    Float = 11,
    /// IEEE double precision
    Double = 12,
    /// Unsigned 64-bit integer (BigTIFF only)
    Long8 = 16,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational | FieldType::SRational | FieldType::Double | FieldType::Long8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    /// Check if `count` values of this type fit in the entry's value field
    /// (4 bytes classic, 8 bytes BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        self.size_in_bytes() as u64 * count <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs used to describe a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    ImageDescription = 270,
    StripOffsets = 273,
    SamplesPerPixel = 277,
    RowsPerStrip = 278,
    StripByteCounts = 279,
    PlanarConfiguration = 284,
    /// Acquisition software; ScanR writes "National Instruments IMAQ"
    Software = 305,
    DateTime = 306,
    ColorMap = 320,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    /// 1 = unsigned, 2 = signed, 3 = IEEE float
    SampleFormat = 339,
}

impl TiffTag {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            262 => Some(TiffTag::PhotometricInterpretation),
            270 => Some(TiffTag::ImageDescription),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            284 => Some(TiffTag::PlanarConfiguration),
            305 => Some(TiffTag::Software),
            306 => Some(TiffTag::DateTime),
            320 => Some(TiffTag::ColorMap),
            322 => Some(TiffTag::TileWidth),
            323 => Some(TiffTag::TileLength),
            324 => Some(TiffTag::TileOffsets),
            325 => Some(TiffTag::TileByteCounts),
            339 => Some(TiffTag::SampleFormat),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::PhotometricInterpretation => "PhotometricInterpretation",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::StripOffsets => "StripOffsets",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::RowsPerStrip => "RowsPerStrip",
            TiffTag::StripByteCounts => "StripByteCounts",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::Software => "Software",
            TiffTag::DateTime => "DateTime",
            TiffTag::ColorMap => "ColorMap",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::SampleFormat => "SampleFormat",
        }
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
///
/// Plane files written by acquisition software are stored uncompressed;
/// every other scheme is reported as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    OldJpeg = 6,
    Jpeg = 7,
    Deflate = 8,
    PackBits = 32773,
    AdobeDeflate = 32946,
}

impl Compression {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::Deflate),
            32773 => Some(Compression::PackBits),
            32946 => Some(Compression::AdobeDeflate),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Compression::None)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old-style JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::PackBits => "PackBits",
            Compression::AdobeDeflate => "Adobe Deflate",
        }
    }
}

// =============================================================================
// Photometric Interpretation
// =============================================================================

/// Photometric interpretation values that affect plane metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    WhiteIsZero,
    BlackIsZero,
    Rgb,
    Palette,
    Other(u16),
}

impl Photometric {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Photometric::WhiteIsZero,
            1 => Photometric::BlackIsZero,
            2 => Photometric::Rgb,
            3 => Photometric::Palette,
            other => Photometric::Other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_sizes() {
        assert_eq!(FieldType::Byte.size_in_bytes(), 1);
        assert_eq!(FieldType::Short.size_in_bytes(), 2);
        assert_eq!(FieldType::Long.size_in_bytes(), 4);
        assert_eq!(FieldType::Rational.size_in_bytes(), 8);
        assert_eq!(FieldType::Long8.size_in_bytes(), 8);
    }

    #[test]
    fn test_fits_inline() {
        assert!(FieldType::Short.fits_inline(2, false));
        assert!(!FieldType::Short.fits_inline(3, false));
        assert!(FieldType::Short.fits_inline(4, true));
        assert!(!FieldType::Rational.fits_inline(1, false));
        assert!(FieldType::Rational.fits_inline(1, true));
    }

    #[test]
    fn test_tag_round_trip() {
        for tag in [TiffTag::Software, TiffTag::SampleFormat, TiffTag::StripOffsets] {
            assert_eq!(TiffTag::from_u16(tag.as_u16()), Some(tag));
        }
        assert_eq!(TiffTag::from_u16(9999), None);
    }

    #[test]
    fn test_only_uncompressed_supported() {
        assert!(Compression::None.is_supported());
        assert!(!Compression::Lzw.is_supported());
        assert_eq!(Compression::from_u16(32773), Some(Compression::PackBits));
    }

    #[test]
    fn test_photometric() {
        assert_eq!(Photometric::from_u16(3), Photometric::Palette);
        assert_eq!(Photometric::from_u16(6), Photometric::Other(6));
    }
}
