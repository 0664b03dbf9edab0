//! Dataset abstraction layer.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        CLI / downstream consumer        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          DatasetReader Trait            │
//! │  (series + plane index -> bytes)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              ScanrReader                │
//! │ (descriptor, grid, lattice, series)     │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │         PlaneDecoder Trait              │
//! │   (one file -> header + plane bytes)    │
//! └─────────────────────────────────────────┘
//! ```

mod decoder;
mod reader;

pub use decoder::{PlaneDecoder, PlaneHeader, PlaneRegion, PlaneSource};
pub use reader::{check_plane_parameters, DatasetReader, FileGroupOption};
