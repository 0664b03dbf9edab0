//! TIFF decoder integration tests.
//!
//! Tests verify:
//! - Little- and big-endian files decode to the same pixel values
//! - Multi-page files expose every page
//! - The layout cache is reused, invalidated on rewrite and can be disabled
//! - The ScanR Software marker is read from real files

use hcs_reader::format::detect::{is_scanr_tiff, read_software, SCANR_SOFTWARE};
use hcs_reader::{
    FileRangeReader, PixelType, PlaneDecoder, PlaneRegion, PlaneSource, TiffDecoder, TiffError,
};

use super::test_utils::{Endian, TiffBuilder};

// =============================================================================
// Byte Order
// =============================================================================

#[test]
fn test_little_and_big_endian_decode_same_values() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = TiffDecoder::new();
    let mut decoded = Vec::new();

    for (name, endian) in [("le.tif", Endian::Little), ("be.tif", Endian::Big)] {
        let path = dir.path().join(name);
        TiffBuilder::gray16(5, 3, 300, endian).write(&path);

        let source = decoder.open(&path).unwrap();
        let header = source.header();
        assert_eq!(header.pixel_type, PixelType::Int16);
        assert_eq!(header.little_endian, endian == Endian::Little);

        let mut buf = vec![0u8; 5 * 3 * 2];
        source.read_plane(0, PlaneRegion::full(5, 3), &mut buf).unwrap();
        let values: Vec<u16> = buf
            .chunks_exact(2)
            .map(|b| match endian {
                Endian::Little => u16::from_le_bytes([b[0], b[1]]),
                Endian::Big => u16::from_be_bytes([b[0], b[1]]),
            })
            .collect();
        decoded.push(values);
    }

    assert_eq!(decoded[0], decoded[1]);
    assert_eq!(decoded[0][0], 300);
    assert_eq!(decoded[0][14], 314);
}

// =============================================================================
// Pages
// =============================================================================

#[test]
fn test_multi_page_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.tif");
    TiffBuilder::gray8(3, 2, &[10, 20, 30, 40]).write(&path);

    let source = TiffDecoder::new().open(&path).unwrap();
    assert_eq!(source.header().page_count, 4);

    let mut buf = vec![0u8; 6];
    for (page, fill) in [10u8, 20, 30, 40].iter().enumerate() {
        source.read_plane(page, PlaneRegion::full(3, 2), &mut buf).unwrap();
        assert_eq!(buf, vec![*fill; 6]);
    }

    assert!(matches!(
        source.read_plane(4, PlaneRegion::full(3, 2), &mut buf),
        Err(TiffError::PageOutOfRange { page: 4, count: 4 })
    ));
}

#[test]
fn test_region_and_buffer_checks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.tif");
    TiffBuilder::gray8(4, 4, &[1]).write(&path);
    let source = TiffDecoder::new().open(&path).unwrap();

    let mut small = vec![0u8; 3];
    assert!(matches!(
        source.read_plane(0, PlaneRegion::new(0, 0, 2, 2), &mut small),
        Err(TiffError::BufferTooSmall { required: 4, actual: 3 })
    ));
    let mut buf = vec![0u8; 16];
    assert!(matches!(
        source.read_plane(0, PlaneRegion::new(3, 3, 2, 1), &mut buf),
        Err(TiffError::RegionOutOfBounds { .. })
    ));
}

// =============================================================================
// Layout Cache
// =============================================================================

#[test]
fn test_layout_cache_reuse_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = TiffDecoder::with_layout_cache(2);
    for i in 0..3u8 {
        let path = dir.path().join(format!("{}.tif", i));
        TiffBuilder::gray8(2, 2, &[i]).write(&path);
        decoder.open(&path).unwrap();
    }
    // Bounded by capacity
    assert_eq!(decoder.cached_count(), 2);

    decoder.open(&dir.path().join("2.tif")).unwrap();
    assert_eq!(decoder.cached_count(), 2);

    decoder.clear();
    assert_eq!(decoder.cached_count(), 0);
}

#[test]
fn test_rewritten_file_is_reparsed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.tif");
    let decoder = TiffDecoder::new();

    TiffBuilder::gray8(2, 2, &[1]).write(&path);
    assert_eq!(decoder.open(&path).unwrap().header().width, 2);

    TiffBuilder::gray8(8, 2, &[1]).write(&path);
    let source = decoder.open(&path).unwrap();
    assert_eq!(source.header().width, 8);
    let mut buf = vec![0u8; 16];
    source.read_plane(0, PlaneRegion::full(8, 2), &mut buf).unwrap();
    assert_eq!(buf, vec![1u8; 16]);
}

#[test]
fn test_disabled_layout_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p.tif");
    TiffBuilder::gray8(2, 2, &[5]).write(&path);

    let decoder = TiffDecoder::with_layout_cache(0);
    let source = decoder.open(&path).unwrap();
    assert_eq!(decoder.cached_count(), 0);

    let mut buf = vec![0u8; 4];
    source.read_plane(0, PlaneRegion::full(2, 2), &mut buf).unwrap();
    assert_eq!(buf, vec![5u8; 4]);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = TiffDecoder::new().open(&dir.path().join("absent.tif"));
    assert!(matches!(result, Err(TiffError::Io(_))));
}

// =============================================================================
// Software Marker
// =============================================================================

#[test]
fn test_software_marker() {
    let dir = tempfile::tempdir().unwrap();
    let scanr = dir.path().join("scanr.tif");
    let plain = dir.path().join("plain.tif");
    TiffBuilder::gray8(2, 2, &[0]).write(&scanr);
    TiffBuilder::gray8(2, 2, &[0]).without_software().write(&plain);

    let reader = FileRangeReader::open(&scanr).unwrap();
    assert_eq!(read_software(&reader).unwrap().as_deref(), Some(SCANR_SOFTWARE));
    assert!(is_scanr_tiff(&reader));

    let reader = FileRangeReader::open(&plain).unwrap();
    assert_eq!(read_software(&reader).unwrap(), None);
    assert!(!is_scanr_tiff(&reader));
}
