//! Olympus ScanR plate support.
//!
//! A ScanR plate is a directory holding `experiment_descriptor.xml` and a
//! `data/` directory with one TIFF per plane:
//!
//! ```text
//! plate/
//! ├── experiment_descriptor.xml
//! ├── AcquisitionLog.dat
//! └── data/
//!     ├── --W00001--P00001--Z00000--T00000--GFP.tif
//!     └── ...
//! ```
//!
//! Opening proceeds in four steps, each in its own module:
//!
//! 1. [`descriptor`] folds the descriptor into counts, channels and well labels
//! 2. [`grid`] derives the plate's well grid
//! 3. [`lattice`] matches plane files to (well, field, Z, T, channel) coordinates
//! 4. [`series`] turns the lattice into per-series metadata
//!
//! [`ScanrReader`] runs the pipeline and serves plane reads.

pub mod descriptor;
pub mod grid;
pub mod lattice;
pub mod reader;
pub mod series;

pub use descriptor::{
    parse_document, parse_events, tokenize, DescriptorAccumulator, DescriptorEvent,
    DescriptorParser, WellLabels,
};
pub use grid::{fallback_grid, resolve_grid, GridGeometry, LabelAxes};
pub use lattice::{
    axis_token, FileLattice, FileLatticeBuilder, LatticeWell, DATA_DIR, MAX_LATTICE_ENTRIES,
};
pub use reader::{locate_descriptor, ReaderOptions, ScanrReader};
pub use series::{image_id, naming_conventions, SeriesMaterializer};
