//! Metadata sink records.
//!
//! Readers report normalized plate, well and image metadata as a stream of
//! [`MetadataRecord`]s into a [`MetadataSink`]. What happens to the records
//! afterwards (OME-XML generation, a database, a JSON report) is up to the
//! sink. [`MetadataStore`] is the in-memory sink used by the CLI and tests.

use serde::Serialize;

// =============================================================================
// Enumerations
// =============================================================================

/// How plate rows or columns are labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingConvention {
    /// A, B, C, ...
    Letter,
    /// 1, 2, 3, ...
    Number,
}

/// How much metadata a reader should emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MetadataLevel {
    /// Geometry, well/sample structure and image names only
    Minimal,
    /// Everything, including channel names and plate naming conventions
    #[default]
    All,
}

// =============================================================================
// MetadataRecord
// =============================================================================

/// One normalized metadata fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum MetadataRecord {
    /// Free-form key/value pair read from the dataset
    Global { key: String, value: String },
    ImageCreationDate { image: usize, date: String },
    ImageId { image: usize, id: String },
    ImageName { image: usize, name: String },
    ChannelName {
        image: usize,
        channel: usize,
        name: String,
    },
    WellRow { plate: usize, well: usize, row: u32 },
    WellColumn {
        plate: usize,
        well: usize,
        column: u32,
    },
    WellSampleIndex {
        plate: usize,
        well: usize,
        sample: usize,
        index: usize,
    },
    WellSampleImageRef {
        plate: usize,
        well: usize,
        sample: usize,
        image_id: String,
    },
    PlateRowNamingConvention {
        plate: usize,
        convention: NamingConvention,
    },
    PlateColumnNamingConvention {
        plate: usize,
        convention: NamingConvention,
    },
    PlateName { plate: usize, name: Option<String> },
}

/// Receiver of metadata records.
pub trait MetadataSink {
    fn record(&mut self, record: MetadataRecord);
}

// =============================================================================
// MetadataStore
// =============================================================================

/// In-memory sink that keeps records in arrival order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataStore {
    records: Vec<MetadataRecord>,
}

impl MetadataSink for MetadataStore {
    fn record(&mut self, record: MetadataRecord) {
        self.records.push(record);
    }
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Most recent global value for `key`.
    pub fn global(&self, key: &str) -> Option<&str> {
        self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::Global { key: k, value } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn image_name(&self, image: usize) -> Option<&str> {
        self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::ImageName { image: i, name } if *i == image => Some(name.as_str()),
            _ => None,
        })
    }

    /// Channel names of `image`, ordered by channel index.
    pub fn channel_names(&self, image: usize) -> Vec<&str> {
        let mut channels: Vec<(usize, &str)> = self
            .records
            .iter()
            .filter_map(|r| match r {
                MetadataRecord::ChannelName {
                    image: i,
                    channel,
                    name,
                } if *i == image => Some((*channel, name.as_str())),
                _ => None,
            })
            .collect();
        channels.sort_by_key(|(c, _)| *c);
        channels.into_iter().map(|(_, name)| name).collect()
    }

    /// `(row, column)` recorded for `well` on `plate`.
    pub fn well_position(&self, plate: usize, well: usize) -> Option<(u32, u32)> {
        let row = self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::WellRow { plate: p, well: w, row } if *p == plate && *w == well => {
                Some(*row)
            }
            _ => None,
        })?;
        let column = self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::WellColumn {
                plate: p,
                well: w,
                column,
            } if *p == plate && *w == well => Some(*column),
            _ => None,
        })?;
        Some((row, column))
    }

    /// `(row, column)` naming conventions recorded for `plate`.
    pub fn naming_conventions(&self, plate: usize) -> Option<(NamingConvention, NamingConvention)> {
        let row = self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::PlateRowNamingConvention { plate: p, convention } if *p == plate => {
                Some(*convention)
            }
            _ => None,
        })?;
        let column = self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::PlateColumnNamingConvention { plate: p, convention } if *p == plate => {
                Some(*convention)
            }
            _ => None,
        })?;
        Some((row, column))
    }

    pub fn plate_name(&self, plate: usize) -> Option<&str> {
        self.records.iter().rev().find_map(|r| match r {
            MetadataRecord::PlateName { plate: p, name } if *p == plate => name.as_deref(),
            _ => None,
        })
    }
}
