use thiserror::Error;

/// I/O errors that can occur when reading dataset files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying read failed
    #[error("Read error on {path}: {message}")]
    Read { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },
}

impl IoError {
    /// Wrap a `std::io::Error` together with the path it concerns.
    pub fn from_io(path: impl AsRef<std::path::Path>, err: std::io::Error) -> Self {
        let path = path.as_ref().display().to_string();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::Read {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors that can occur when parsing or decoding TIFF plane files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only uncompressed planes are supported)")]
    UnsupportedCompression(String),

    /// Bit depth / sample format combination with no pixel type
    #[error("Unsupported pixel layout: {bits} bits per sample, sample format {sample_format}")]
    UnsupportedPixelLayout { bits: u16, sample_format: u16 },

    /// File uses tiles instead of strips
    #[error("Unsupported organization: file uses tiles instead of strips")]
    TiledOrganization,

    /// Requested page (IFD) does not exist
    #[error("Page {page} out of range: file has {count} page(s)")]
    PageOutOfRange { page: usize, count: usize },

    /// Requested rectangle does not fit inside the page
    #[error("Region {x},{y} {width}x{height} out of bounds for {page_width}x{page_height} page")]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        page_width: u32,
        page_height: u32,
    },

    /// Destination buffer cannot hold the requested region
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },
}

/// Errors raised while initializing a dataset
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the dataset
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// The experiment descriptor could not be located
    #[error("Could not find {name} in {dir}")]
    MissingDescriptor { name: String, dir: String },

    /// A numeric descriptor key carried non-numeric text
    #[error("Invalid integer for key '{key}': '{value}'")]
    InvalidNumber { key: String, value: String },

    /// The descriptor document is not well-formed
    #[error("Descriptor XML error: {0}")]
    Xml(String),

    /// No plane file matched any lattice coordinate
    #[error("No plane files could be resolved in {dir}")]
    NoPixelFiles { dir: String },

    /// Descriptor dimensions describe more planes than can be laid out
    #[error("Dataset dimensions too large: {reason}")]
    DimensionsTooLarge { reason: String },

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors returned from plane reads
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// Reader has no open dataset
    #[error("No dataset is open")]
    NotInitialized,

    /// Series index beyond the series count
    #[error("Series {series} out of range: dataset has {count} series")]
    SeriesOutOfRange { series: usize, count: usize },

    /// Plane index beyond the series' image count
    #[error("Plane {plane} out of range: series has {count} plane(s)")]
    PlaneOutOfRange { plane: usize, count: usize },

    /// Requested rectangle does not fit inside the plane
    #[error(
        "Region {x},{y} {width}x{height} out of bounds for {size_x}x{size_y} plane"
    )]
    RegionOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        size_x: u32,
        size_y: u32,
    },

    /// Caller buffer cannot hold the requested region
    #[error("Buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    /// Decoding the backing file failed
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

impl From<TiffError> for ReadError {
    fn from(err: TiffError) -> Self {
        ReadError::Format(FormatError::Tiff(err))
    }
}
