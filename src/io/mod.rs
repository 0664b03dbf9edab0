//! Local file access for dataset initialization and plane reads.
//!
//! Plane decoding only ever needs small ranges of each file (header, IFD,
//! strip rows), so files are accessed through the [`RangeReader`] trait.
//! Directory listings are taken once per dataset open and sorted so that
//! lattice resolution does not depend on filesystem enumeration order.

mod listing;
mod range_reader;

pub use listing::{file_name, has_suffix, list_files};
pub use range_reader::{FileRangeReader, MemoryRangeReader, RangeReader};
