//! # HCS Reader
//!
//! A reader for high-content screening (HCS) plate datasets, currently
//! Olympus ScanR.
//!
//! An HCS dataset is stored as hundreds of loose single-plane TIFF files
//! plus a small XML descriptor. This library reconstructs the plate's
//! (well, field, Z, T, channel) addressing from the descriptor and the
//! plane file names, and exposes it as "series + plane index -> bytes".
//!
//! ## Features
//!
//! - **Descriptor parsing**: folds the ScanR experiment descriptor into
//!   counts, channel names and well labels
//! - **Grid resolution**: well grid from labels, or a standard plate guess
//! - **Sparse plates**: wells and fields without files are pruned; missing
//!   planes leave the caller's buffer untouched
//! - **Plane decoding**: uncompressed strip TIFF reader with a parsed-layout cache
//!
//! ## Architecture
//!
//! - [`io`] - File range reads and directory listings
//! - [`mod@format`] - TIFF parsing/decoding and format detection
//! - [`metadata`] - Series metadata and metadata sink records
//! - [`dataset`] - Format-agnostic reader and decoder traits
//! - [`scanr`] - The ScanR pipeline and reader
//! - [`config`] - CLI configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use hcs_reader::{DatasetReader, ReaderOptions, ScanrReader};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = ScanrReader::open("plate/experiment_descriptor.xml", ReaderOptions::default())?;
//!     for series in 0..reader.series_count() {
//!         let plane = reader.open_plane(series, 0)?;
//!         println!("series {}: {} bytes", series, plane.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod format;
pub mod io;
pub mod metadata;
pub mod scanr;

// Re-export commonly used types
pub use config::{Cli, Command};
pub use dataset::{
    check_plane_parameters, DatasetReader, FileGroupOption, PlaneDecoder, PlaneHeader,
    PlaneRegion, PlaneSource,
};
pub use error::{FormatError, IoError, ReadError, TiffError};
pub use format::tiff::{TiffDecoder, TiffLayout, TiffPlaneSource};
pub use format::{detect_format, is_this_type, DatasetFormat};
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use metadata::{
    CoreMetadata, DimensionOrder, MetadataLevel, MetadataRecord, MetadataSink, MetadataStore,
    NamingConvention, PixelType,
};
pub use scanr::{
    DescriptorAccumulator, FileLattice, FileLatticeBuilder, GridGeometry, ReaderOptions,
    ScanrReader, SeriesMaterializer,
};
