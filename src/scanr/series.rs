//! Series materialization.
//!
//! Turns a resolved [`FileLattice`] into one [`CoreMetadata`] per
//! (well, position) pair and reports plate/well/image records to a
//! [`MetadataSink`]. Plane geometry and encoding are sampled from the first
//! resolved file; ScanR records pixel signedness backwards, so the sampled
//! 8- and 16-bit types are flipped.

use tracing::debug;

use crate::dataset::{PlaneDecoder, PlaneSource};
use crate::error::FormatError;
use crate::metadata::{
    CoreMetadata, DimensionOrder, MetadataLevel, MetadataRecord, MetadataSink, NamingConvention,
};

use super::descriptor::DescriptorAccumulator;
use super::lattice::FileLattice;

/// The only plate in a ScanR dataset
const PLATE: usize = 0;

/// Plates with more rows than letters get numbered rows
const MAX_LETTER_ROWS: u32 = 26;

/// OME-style image identifier of series `series`.
pub fn image_id(series: usize) -> String {
    format!("Image:{}", series)
}

/// Row and column naming conventions for a plate with `rows` rows.
pub fn naming_conventions(rows: u32) -> (NamingConvention, NamingConvention) {
    if rows > MAX_LETTER_ROWS {
        (NamingConvention::Number, NamingConvention::Letter)
    } else {
        (NamingConvention::Letter, NamingConvention::Number)
    }
}

/// Builds per-series metadata from a resolved lattice.
#[derive(Debug, Clone, Default)]
pub struct SeriesMaterializer {
    pub level: MetadataLevel,
    /// ISO-8601 timestamp recorded as every image's creation date
    pub creation_date: Option<String>,
}

impl SeriesMaterializer {
    pub fn new(level: MetadataLevel) -> Self {
        Self {
            level,
            creation_date: None,
        }
    }

    pub fn with_creation_date(mut self, date: impl Into<String>) -> Self {
        self.creation_date = Some(date.into());
        self
    }

    /// Sample the first plane, build all series and emit their records.
    pub fn materialize<D, S>(
        &self,
        lattice: &FileLattice,
        descriptor: &DescriptorAccumulator,
        decoder: &D,
        sink: &mut S,
    ) -> Result<Vec<CoreMetadata>, FormatError>
    where
        D: PlaneDecoder,
        S: MetadataSink + ?Sized,
    {
        let first = lattice.first_file().ok_or_else(|| FormatError::NoPixelFiles {
            dir: lattice.dir.display().to_string(),
        })?;

        // The sampled file is closed again before any plane is read
        let header = {
            let source = decoder.open(first)?;
            source.header().clone()
        };
        let pixel_type = header.pixel_type.swap_signedness();
        debug!(
            file = %first.display(),
            sampled = %header.pixel_type,
            corrected = %pixel_type,
            width = header.width,
            height = header.height,
            "Sampled plane header"
        );

        let positions = lattice.positions.len();
        let series_count = lattice.series_count();
        let mut core = CoreMetadata::allocate(series_count);

        for (i, meta) in core.iter_mut().enumerate() {
            let well = &lattice.wells[i / positions];
            let position = lattice.positions[i % positions];

            meta.size_x = header.width;
            meta.size_y = header.height;
            meta.size_c = lattice.channels;
            meta.size_z = lattice.slices;
            meta.size_t = lattice.timepoints;
            meta.pixel_type = pixel_type;
            meta.samples_per_pixel = header.samples_per_pixel;
            meta.rgb = header.rgb;
            meta.interleaved = header.interleaved;
            meta.indexed = header.indexed;
            meta.little_endian = header.little_endian;
            meta.dimension_order = DimensionOrder::Xyctz;
            meta.update_image_count();

            if let Some(label) = &well.label {
                meta.series_metadata.insert("Well".to_string(), label.clone());
            }
            meta.series_metadata
                .insert("Well index".to_string(), well.index.to_string());
            meta.series_metadata
                .insert("Field".to_string(), (position + 1).to_string());
        }

        for i in 0..series_count {
            self.emit_series(lattice, i, sink);
        }

        if self.level == MetadataLevel::All {
            self.emit_plate(lattice, descriptor, series_count, sink);
        }

        Ok(core)
    }

    fn emit_series<S: MetadataSink + ?Sized>(&self, lattice: &FileLattice, i: usize, sink: &mut S) {
        let positions = lattice.positions.len();
        let well_ordinal = i / positions;
        let field = i % positions;
        let well = &lattice.wells[well_ordinal];
        let id = image_id(i);

        if let Some(date) = &self.creation_date {
            sink.record(MetadataRecord::ImageCreationDate {
                image: i,
                date: date.clone(),
            });
        }
        sink.record(MetadataRecord::WellRow {
            plate: PLATE,
            well: well_ordinal,
            row: well.row,
        });
        sink.record(MetadataRecord::WellColumn {
            plate: PLATE,
            well: well_ordinal,
            column: well.column,
        });
        sink.record(MetadataRecord::WellSampleIndex {
            plate: PLATE,
            well: well_ordinal,
            sample: field,
            index: i,
        });
        sink.record(MetadataRecord::WellSampleImageRef {
            plate: PLATE,
            well: well_ordinal,
            sample: field,
            image_id: id.clone(),
        });
        sink.record(MetadataRecord::ImageId { image: i, id });
        sink.record(MetadataRecord::ImageName {
            image: i,
            name: format!(
                "Well {}, Field {} (Spot {})",
                well_ordinal + 1,
                field + 1,
                i + 1
            ),
        });
    }

    fn emit_plate<S: MetadataSink + ?Sized>(
        &self,
        lattice: &FileLattice,
        descriptor: &DescriptorAccumulator,
        series_count: usize,
        sink: &mut S,
    ) {
        for image in 0..series_count {
            for channel in 0..lattice.channels as usize {
                if let Some(name) = descriptor.channel_names.get(channel) {
                    sink.record(MetadataRecord::ChannelName {
                        image,
                        channel,
                        name: name.clone(),
                    });
                }
            }
        }

        let (rows, columns) = naming_conventions(lattice.grid.rows());
        sink.record(MetadataRecord::PlateRowNamingConvention {
            plate: PLATE,
            convention: rows,
        });
        sink.record(MetadataRecord::PlateColumnNamingConvention {
            plate: PLATE,
            convention: columns,
        });
        sink.record(MetadataRecord::PlateName {
            plate: PLATE,
            name: descriptor.plate_name.clone(),
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
