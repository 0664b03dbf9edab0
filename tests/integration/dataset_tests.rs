//! End-to-end tests against synthetic ScanR plates on disk.
//!
//! Tests verify:
//! - Series layout, pixel-type correction and plane bytes of a complete plate
//! - Pruning of wells without files and grid recomputation
//! - Missing planes leave the caller's buffer untouched
//! - Opening through companion and plane files, used files, close/reopen
//! - Single-file mode and format detection

use std::path::Path;

use hcs_reader::format::detect::is_this_type;
use hcs_reader::{
    DatasetReader, DimensionOrder, FormatError, GridGeometry, MetadataLevel, NamingConvention,
    PixelType, PlaneRegion, ReadError, ReaderOptions, ScanrReader,
};

use super::test_utils::{plane_file_name, DescriptorBuilder, Endian, PlateDir, TiffBuilder};

const WIDTH: u32 = 6;
const HEIGHT: u32 = 4;

/// Two wells (A1, A2), 1x2 fields, DAPI + GFP, every plane present.
///
/// Plane pixel `i` of (well, field, channel) holds `well * 1000 + field * 100 + channel * 10 + i`.
fn full_plate() -> PlateDir {
    let descriptor = DescriptorBuilder::new()
        .fields(1, 2)
        .channel("DAPI")
        .channel("GFP")
        .well(1, "A1")
        .well(2, "A2")
        .plate_name("Screen 42");
    let plate = PlateDir::new(&descriptor);
    plate.add_companion("AcquisitionLog.dat", b"log");
    for well in 1..=2 {
        for field in 1..=2 {
            for (c, channel) in ["DAPI", "GFP"].iter().enumerate() {
                let base = (well * 1000 + field * 100 + c as u32 * 10) as u16;
                plate.add_plane(
                    &plane_file_name(well, field, 0, 0, channel),
                    &TiffBuilder::gray16(WIDTH, HEIGHT, base, Endian::Little),
                );
            }
        }
    }
    plate
}

fn expected_plane(well: u32, field: u32, channel: u32) -> Vec<u8> {
    let base = (well * 1000 + field * 100 + channel * 10) as u16;
    TiffBuilder::gray16(WIDTH, HEIGHT, base, Endian::Little).pages[0].clone()
}

fn open(path: &Path) -> ScanrReader {
    ScanrReader::open(path, ReaderOptions::default()).unwrap()
}

// =============================================================================
// Complete Plate
// =============================================================================

#[test]
fn test_full_plate_series_layout() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());

    assert_eq!(reader.series_count(), 4);
    assert_eq!(reader.grid(), Some(GridGeometry::Explicit { rows: 1, columns: 2 }));
    for series in 0..4 {
        let core = reader.core_metadata(series).unwrap();
        assert_eq!((core.size_x, core.size_y), (WIDTH, HEIGHT));
        assert_eq!((core.size_z, core.size_c, core.size_t), (1, 2, 1));
        assert_eq!(core.image_count, 2);
        assert_eq!(core.dimension_order, DimensionOrder::Xyctz);
        // Files say signed, ScanR data is unsigned
        assert_eq!(core.pixel_type, PixelType::Uint16);
        assert!(core.little_endian);
        assert!(core.is_consistent());
    }
}

#[test]
fn test_full_plate_plane_bytes() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());

    // Series order is well-major, then field
    for well in 1..=2u32 {
        for field in 1..=2u32 {
            let series = ((well - 1) * 2 + (field - 1)) as usize;
            for channel in 0..2u32 {
                let bytes = reader.open_plane(series, channel as usize).unwrap();
                assert_eq!(
                    bytes,
                    expected_plane(well, field, channel),
                    "series {} channel {}",
                    series,
                    channel
                );
            }
        }
    }
}

#[test]
fn test_region_read() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());

    let region = PlaneRegion::new(2, 1, 3, 2);
    let mut buf = vec![0u8; 3 * 2 * 2];
    reader.read_plane(0, 1, region, &mut buf).unwrap();

    let full = expected_plane(1, 1, 1);
    let row_len = WIDTH as usize * 2;
    let mut expected = Vec::new();
    for row in 1..3 {
        let start = row * row_len + 2 * 2;
        expected.extend_from_slice(&full[start..start + 3 * 2]);
    }
    assert_eq!(buf, expected);
}

#[test]
fn test_out_of_range_reads() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());
    let mut buf = vec![0u8; (WIDTH * HEIGHT * 2) as usize];

    assert!(matches!(
        reader.read_plane(4, 0, PlaneRegion::full(WIDTH, HEIGHT), &mut buf),
        Err(ReadError::SeriesOutOfRange { series: 4, count: 4 })
    ));
    assert!(matches!(
        reader.read_plane(0, 2, PlaneRegion::full(WIDTH, HEIGHT), &mut buf),
        Err(ReadError::PlaneOutOfRange { plane: 2, count: 2 })
    ));
    assert!(matches!(
        reader.read_plane(0, 0, PlaneRegion::new(0, 0, WIDTH + 1, 1), &mut buf),
        Err(ReadError::RegionOutOfBounds { .. })
    ));
}

#[test]
fn test_concurrent_reads() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());

    std::thread::scope(|scope| {
        for series in 0..4usize {
            let reader = &reader;
            scope.spawn(move || {
                for _ in 0..5 {
                    let bytes = reader.open_plane(series, 1).unwrap();
                    let well = series as u32 / 2 + 1;
                    let field = series as u32 % 2 + 1;
                    assert_eq!(bytes, expected_plane(well, field, 1));
                }
            });
        }
    });
}

#[test]
fn test_metadata_records() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());
    let store = reader.metadata_store().unwrap();

    assert_eq!(store.plate_name(0), Some("Screen 42"));
    assert_eq!(store.channel_names(3), vec!["DAPI", "GFP"]);
    assert_eq!(store.image_name(3), Some("Well 2, Field 2 (Spot 4)"));
    assert_eq!(store.well_position(0, 1), Some((0, 1)));
    assert_eq!(
        store.naming_conventions(0),
        Some((NamingConvention::Letter, NamingConvention::Number))
    );
    assert_eq!(
        reader.global_metadata().unwrap().get("columns/well").map(String::as_str),
        Some("2")
    );
    assert_eq!(store.global("plate name"), Some("Screen 42"));
}

#[test]
fn test_minimal_metadata_level() {
    let plate = full_plate();
    let options = ReaderOptions {
        metadata_level: MetadataLevel::Minimal,
        ..ReaderOptions::default()
    };
    let reader = ScanrReader::open(plate.descriptor(), options).unwrap();
    let store = reader.metadata_store().unwrap();

    assert!(store.channel_names(0).is_empty());
    assert_eq!(store.plate_name(0), None);
    assert_eq!(store.image_name(0), Some("Well 1, Field 1 (Spot 1)"));
}

#[test]
fn test_two_by_two_fields_per_well() {
    let descriptor = DescriptorBuilder::new()
        .fields(2, 2)
        .channel("GFP")
        .channel("RFP")
        .well(1, "A1")
        .well(2, "A2");
    let plate = PlateDir::new(&descriptor);
    for well in 1..=2 {
        for field in 1..=4 {
            for channel in ["GFP", "RFP"] {
                plate.add_plane(
                    &plane_file_name(well, field, 0, 0, channel),
                    &TiffBuilder::gray8(WIDTH, HEIGHT, &[field as u8]),
                );
            }
        }
    }

    let reader = open(&plate.descriptor());
    assert_eq!(reader.series_count(), 8);
    for series in 0..8 {
        let core = reader.core_metadata(series).unwrap();
        assert_eq!((core.size_c, core.size_z, core.size_t), (2, 1, 1));
        assert_eq!(core.dimension_order, DimensionOrder::Xyctz);
        assert_eq!(
            reader.metadata_store().unwrap().channel_names(series),
            vec!["GFP", "RFP"]
        );
    }
    assert_eq!(reader.open_plane(6, 1).unwrap()[0], 3);
}

#[test]
fn test_unacquired_fields_are_dropped() {
    let descriptor = DescriptorBuilder::new()
        .fields(2, 2)
        .channel("GFP")
        .well(1, "A1")
        .well(2, "A2");
    let plate = PlateDir::new(&descriptor);
    // Field 2 only in A1, field 4 nowhere
    for (well, field) in [(1, 1), (1, 2), (1, 3), (2, 1), (2, 3)] {
        plate.add_plane(
            &plane_file_name(well, field, 0, 0, "GFP"),
            &TiffBuilder::gray8(WIDTH, HEIGHT, &[field as u8]),
        );
    }

    let reader = open(&plate.descriptor());
    assert_eq!(reader.lattice().unwrap().positions, vec![0, 1, 2]);
    assert_eq!(reader.series_count(), 6);

    // A2 field 2 was never acquired
    let mut buf = vec![0xCDu8; (WIDTH * HEIGHT) as usize];
    reader
        .read_plane(4, 0, PlaneRegion::full(WIDTH, HEIGHT), &mut buf)
        .unwrap();
    assert_eq!(buf[0], 0xCD);
    assert_eq!(reader.open_plane(5, 0).unwrap()[0], 3);
}

// =============================================================================
// Sparse Plates
// =============================================================================

#[test]
fn test_well_without_files_is_pruned() {
    let descriptor = DescriptorBuilder::new()
        .channel("GFP")
        .well(1, "A1")
        .well(14, "B2");
    let plate = PlateDir::new(&descriptor);
    plate.add_plane(
        &plane_file_name(1, 1, 0, 0, "GFP"),
        &TiffBuilder::gray8(WIDTH, HEIGHT, &[7]),
    );

    let reader = open(&plate.descriptor());
    assert_eq!(reader.series_count(), 1);
    assert_eq!(reader.grid(), Some(GridGeometry::Explicit { rows: 1, columns: 1 }));

    let lattice = reader.lattice().unwrap();
    assert!(lattice.well_labels.contains("A1"));
    assert!(!lattice.well_labels.contains("B2"));
    assert_eq!(reader.open_plane(0, 0).unwrap(), vec![7u8; (WIDTH * HEIGHT) as usize]);
}

#[test]
fn test_missing_plane_leaves_buffer_untouched() {
    let descriptor = DescriptorBuilder::new()
        .channel("DAPI")
        .channel("GFP")
        .well(1, "A1");
    let plate = PlateDir::new(&descriptor);
    plate.add_plane(
        &plane_file_name(1, 1, 0, 0, "GFP"),
        &TiffBuilder::gray8(WIDTH, HEIGHT, &[9]),
    );

    let reader = open(&plate.descriptor());
    let len = (WIDTH * HEIGHT) as usize;

    let mut buf = vec![0xABu8; len];
    reader
        .read_plane(0, 0, PlaneRegion::full(WIDTH, HEIGHT), &mut buf)
        .unwrap();
    assert_eq!(buf, vec![0xABu8; len]);

    reader
        .read_plane(0, 1, PlaneRegion::full(WIDTH, HEIGHT), &mut buf)
        .unwrap();
    assert_eq!(buf, vec![9u8; len]);
}

#[test]
fn test_unlabelled_wells_use_standard_plate() {
    let descriptor = DescriptorBuilder {
        channels: vec![("GFP".to_string(), 0)],
        ..DescriptorBuilder::new()
    };
    // Numeric selections without labels
    let xml = descriptor.build().replace(
        "<Array><Name>well selection table + cDNA</Name>\n",
        "<Array><Name>well selection table + cDNA</Name>\n<Val>1</Val><Val>2</Val><Val>3</Val>\n",
    );
    let plate = PlateDir::new(&descriptor);
    std::fs::write(plate.descriptor(), xml).unwrap();
    plate.add_plane(
        &plane_file_name(1, 1, 0, 0, "GFP"),
        &TiffBuilder::gray8(WIDTH, HEIGHT, &[1]),
    );
    plate.add_plane(
        &plane_file_name(3, 1, 0, 0, "GFP"),
        &TiffBuilder::gray8(WIDTH, HEIGHT, &[3]),
    );

    let reader = open(&plate.descriptor());
    let grid = reader.grid().unwrap();
    assert!(grid.is_inferred());
    assert_eq!(grid.columns(), 12);
    assert_eq!(reader.series_count(), 2);
    assert_eq!(reader.lattice().unwrap().wells[1].index, 3);
    assert_eq!(reader.open_plane(1, 0).unwrap(), vec![3u8; (WIDTH * HEIGHT) as usize]);
}

#[test]
fn test_idle_and_autofocus_channels_are_dropped() {
    let descriptor = DescriptorBuilder::new()
        .channel("DAPI")
        .channel("Autofocus")
        .idle_channel("Cy5")
        .channel("GFP")
        .well(1, "A1");
    let plate = PlateDir::new(&descriptor);
    for (name, fill) in [("DAPI", 1u8), ("GFP", 2)] {
        plate.add_plane(
            &plane_file_name(1, 1, 0, 0, name),
            &TiffBuilder::gray8(WIDTH, HEIGHT, &[fill]),
        );
    }

    let reader = open(&plate.descriptor());
    assert_eq!(reader.core_metadata(0).unwrap().size_c, 2);
    assert_eq!(
        reader.metadata_store().unwrap().channel_names(0),
        vec!["DAPI", "GFP"]
    );
    assert_eq!(reader.open_plane(0, 1).unwrap()[0], 2);
}

// =============================================================================
// Opening, Used Files and Close
// =============================================================================

#[test]
fn test_open_through_companion_and_plane() {
    let plate = full_plate();

    let reader = open(&plate.root().join("AcquisitionLog.dat"));
    assert_eq!(reader.series_count(), 4);

    let plane = plate.data().join(plane_file_name(2, 1, 0, 0, "GFP"));
    let reader = open(&plane);
    assert_eq!(reader.series_count(), 4);
}

#[test]
fn test_missing_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let plane = dir.path().join("plane.tif");
    TiffBuilder::gray8(2, 2, &[0]).write(&plane);

    let result = ScanrReader::open(&plane, ReaderOptions::default());
    match result {
        Err(FormatError::MissingDescriptor { name, .. }) => {
            assert_eq!(name, "experiment_descriptor.xml")
        }
        other => panic!("expected MissingDescriptor, got {:?}", other.err()),
    }
}

#[test]
fn test_used_files() {
    let plate = full_plate();
    let reader = open(&plate.descriptor());

    let metadata = reader.used_files(0, true).unwrap();
    assert_eq!(metadata.len(), 2);
    assert!(metadata.iter().all(|p| !p.to_string_lossy().ends_with(".tif")));

    let all = reader.used_files(3, false).unwrap();
    assert_eq!(all.len(), 4);
    let pixels: Vec<_> = all
        .iter()
        .filter(|p| p.to_string_lossy().ends_with(".tif"))
        .collect();
    assert_eq!(pixels.len(), 2);
    assert!(pixels
        .iter()
        .all(|p| p.to_string_lossy().contains("W00002--P00002")));
}

#[test]
fn test_close_and_reopen() {
    let plate = full_plate();
    let mut reader = open(&plate.descriptor());
    assert!(reader.decoder().cached_count() > 0);

    reader.close();
    assert_eq!(reader.series_count(), 0);
    assert_eq!(reader.decoder().cached_count(), 0);
    let mut buf = vec![0u8; 8];
    assert!(matches!(
        reader.read_plane(0, 0, PlaneRegion::new(0, 0, 1, 1), &mut buf),
        Err(ReadError::NotInitialized)
    ));

    reader.set_id(plate.descriptor()).unwrap();
    assert_eq!(reader.series_count(), 4);
    assert_eq!(reader.open_plane(0, 0).unwrap(), expected_plane(1, 1, 0));
}

// =============================================================================
// Single-File Mode and Detection
// =============================================================================

#[test]
fn test_single_file_mode() {
    let plate = full_plate();
    let plane = plate.data().join("stack.tif");
    TiffBuilder::gray8(WIDTH, HEIGHT, &[1, 2, 3]).write(&plane);

    let options = ReaderOptions {
        group_files: false,
        ..ReaderOptions::default()
    };
    let reader = ScanrReader::open(&plane, options).unwrap();

    assert_eq!(reader.series_count(), 1);
    assert!(reader.lattice().is_none());
    let core = reader.core_metadata(0).unwrap();
    assert_eq!(core.image_count, 3);
    assert_eq!(core.pixel_type, PixelType::Uint8);
    assert_eq!(reader.open_plane(0, 1).unwrap(), vec![2u8; (WIDTH * HEIGHT) as usize]);
    assert_eq!(reader.used_files(0, false).unwrap().len(), 1);
    assert_eq!(
        reader.metadata_store().unwrap().image_name(0),
        Some("stack.tif")
    );
}

#[test]
fn test_format_detection() {
    let plate = full_plate();
    let scanr = plate.data().join(plane_file_name(1, 1, 0, 0, "GFP"));
    let foreign = plate.root().join("foreign.tif");
    TiffBuilder::gray8(2, 2, &[0]).without_software().write(&foreign);

    assert!(is_this_type(&plate.descriptor(), false));
    assert!(is_this_type(&plate.root().join("AcquisitionLog.dat"), false));
    assert!(is_this_type(&scanr, true));
    assert!(!is_this_type(&scanr, false));
    assert!(!is_this_type(&foreign, true));
    assert!(!is_this_type(&plate.root().join("notes.txt"), true));
}
