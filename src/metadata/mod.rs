//! Dimensional metadata and metadata sink records.

mod core;
mod store;

pub use self::core::{Axis, CoreMetadata, DimensionOrder, PixelType};
pub use store::{MetadataLevel, MetadataRecord, MetadataSink, MetadataStore, NamingConvention};
