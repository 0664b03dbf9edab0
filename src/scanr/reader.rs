//! ScanR dataset reader.
//!
//! Ties the pipeline together: locate and parse the experiment descriptor,
//! resolve the well grid, build the file lattice, materialize series, then
//! serve plane reads by opening one plane file per call through the
//! [`PlaneDecoder`].

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info};

use crate::dataset::{
    check_plane_parameters, DatasetReader, FileGroupOption, PlaneDecoder, PlaneRegion,
    PlaneSource,
};
use crate::error::{FormatError, IoError, ReadError};
use crate::format::detect::{DatasetFormat, DESCRIPTOR_FILE};
use crate::format::tiff::{TiffDecoder, DEFAULT_LAYOUT_CACHE_CAPACITY};
use crate::io::{file_name, has_suffix, list_files};
use crate::metadata::{
    CoreMetadata, DimensionOrder, MetadataLevel, MetadataRecord, MetadataSink, MetadataStore,
};

use super::descriptor::parse_document;
use super::grid::{resolve_grid, GridGeometry};
use super::lattice::{FileLattice, FileLatticeBuilder};
use super::series::{image_id, SeriesMaterializer};

/// Upper bound for the decoder layout cache
const MAX_LAYOUT_CACHE_CAPACITY: usize = 1 << 20;

// =============================================================================
// ReaderOptions
// =============================================================================

/// Options controlling how a dataset is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    /// Open the whole plate; when false a plane `.tif` is read on its own
    pub group_files: bool,
    pub metadata_level: MetadataLevel,
    /// Parsed TIFF layouts kept by the decoder; 0 disables caching
    pub layout_cache_capacity: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            group_files: true,
            metadata_level: MetadataLevel::All,
            layout_cache_capacity: DEFAULT_LAYOUT_CACHE_CAPACITY,
        }
    }
}

impl ReaderOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.layout_cache_capacity > MAX_LAYOUT_CACHE_CAPACITY {
            return Err(format!(
                "Layout cache capacity {} exceeds the maximum of {}",
                self.layout_cache_capacity, MAX_LAYOUT_CACHE_CAPACITY
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Dataset state
// =============================================================================

/// Where plane bytes come from.
#[derive(Debug)]
enum Planes {
    /// One file per plane
    Lattice(FileLattice),
    /// Every plane is a page of one TIFF
    SingleFile(PathBuf),
}

/// Everything built by a successful open. Dropped as a whole on close.
#[derive(Debug)]
struct DatasetState {
    id: PathBuf,
    core: Vec<CoreMetadata>,
    planes: Planes,
    /// Non-pixel files next to the descriptor
    metadata_files: Vec<PathBuf>,
    global_metadata: BTreeMap<String, String>,
    store: MetadataStore,
}

// =============================================================================
// ScanrReader
// =============================================================================

/// Reader for Olympus ScanR plates.
///
/// # Example
///
/// ```ignore
/// use hcs_reader::{DatasetReader, ReaderOptions, ScanrReader};
///
/// let reader = ScanrReader::open("plate/experiment_descriptor.xml", ReaderOptions::default())?;
/// println!("{} series", reader.series_count());
/// let plane = reader.open_plane(0, 0)?;
/// ```
pub struct ScanrReader<D: PlaneDecoder = TiffDecoder> {
    decoder: D,
    options: ReaderOptions,
    state: Option<DatasetState>,
}

impl ScanrReader<TiffDecoder> {
    /// Create an unopened reader backed by the TIFF decoder.
    pub fn new(options: ReaderOptions) -> Self {
        let decoder = TiffDecoder::with_layout_cache(options.layout_cache_capacity);
        Self::with_decoder(decoder, options)
    }

    /// Create a reader and open `path`.
    pub fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self, FormatError> {
        let mut reader = Self::new(options);
        reader.set_id(path)?;
        Ok(reader)
    }
}

impl<D: PlaneDecoder> ScanrReader<D> {
    pub fn with_decoder(decoder: D, options: ReaderOptions) -> Self {
        Self {
            decoder,
            options,
            state: None,
        }
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn is_open(&self) -> bool {
        self.state.is_some()
    }

    /// Canonical path of the open dataset.
    pub fn current_id(&self) -> Option<&Path> {
        self.state.as_ref().map(|s| s.id.as_path())
    }

    /// Open the dataset `path` belongs to.
    ///
    /// `path` may be the descriptor, one of its companion files, or a plane
    /// TIFF. Opening the dataset that is already open is a no-op; opening a
    /// different one closes the current one first.
    pub fn set_id(&mut self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let path = path.as_ref();
        let id = fs::canonicalize(path).map_err(|e| IoError::from_io(path, e))?;
        if self.current_id() == Some(id.as_path()) {
            debug!(path = %id.display(), "Dataset already open");
            return Ok(());
        }
        if self.is_open() {
            self.close();
        }

        let is_tiff = has_suffix(&id, "tif") || has_suffix(&id, "tiff");
        let state = if !self.options.group_files && is_tiff {
            self.init_single_file(id)?
        } else {
            self.init_plate(id)?
        };
        self.state = Some(state);
        Ok(())
    }

    fn init_plate(&self, id: PathBuf) -> Result<DatasetState, FormatError> {
        let descriptor = locate_descriptor(&id)?;
        let root = descriptor
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(descriptor = %descriptor.display(), "Parsing experiment descriptor");

        let raw = fs::read(&descriptor).map_err(|e| IoError::from_io(&descriptor, e))?;
        let acc = parse_document(&raw)?;

        let mut store = MetadataStore::new();
        let mut global_metadata = BTreeMap::new();
        for (key, value) in &acc.pairs {
            store.record(MetadataRecord::Global {
                key: key.clone(),
                value: value.clone(),
            });
            global_metadata.insert(key.clone(), value.clone());
        }

        let grid = resolve_grid(&acc.well_labels, acc.well_count);
        debug!(
            rows = grid.rows(),
            columns = grid.columns(),
            inferred = grid.is_inferred(),
            "Resolved well grid"
        );
        let lattice = FileLatticeBuilder::new(&acc, grid).build(&root)?;

        let mut materializer = SeriesMaterializer::new(self.options.metadata_level);
        materializer.creation_date = modification_date(&descriptor);
        let core = materializer.materialize(&lattice, &acc, &self.decoder, &mut store)?;

        let pixel_files: HashSet<&Path> = lattice.files.iter().filter_map(|f| f.as_deref()).collect();
        let metadata_files: Vec<PathBuf> = list_files(&root)?
            .unwrap_or_default()
            .into_iter()
            .map(|name| root.join(name))
            .filter(|path| !pixel_files.contains(path.as_path()))
            .collect();

        info!(
            dataset = %root.display(),
            series = core.len(),
            wells = lattice.wells.len(),
            positions = lattice.positions.len(),
            planes = lattice.planes_per_series(),
            resolved = lattice.resolved_count(),
            "Opened ScanR dataset"
        );

        Ok(DatasetState {
            id,
            core,
            planes: Planes::Lattice(lattice),
            metadata_files,
            global_metadata,
            store,
        })
    }

    /// Read one plane TIFF on its own: one series, one plane per page.
    fn init_single_file(&self, id: PathBuf) -> Result<DatasetState, FormatError> {
        let header = {
            let source = self.decoder.open(&id)?;
            source.header().clone()
        };

        let mut meta = CoreMetadata {
            size_x: header.width,
            size_y: header.height,
            size_z: header.page_count as u32,
            size_c: 1,
            size_t: 1,
            pixel_type: header.pixel_type,
            dimension_order: DimensionOrder::Xyczt,
            samples_per_pixel: header.samples_per_pixel,
            rgb: header.rgb,
            interleaved: header.interleaved,
            indexed: header.indexed,
            little_endian: header.little_endian,
            ..CoreMetadata::default()
        };
        meta.update_image_count();

        let mut global_metadata = BTreeMap::new();
        global_metadata.insert("ImageWidth".to_string(), header.width.to_string());
        global_metadata.insert("ImageLength".to_string(), header.height.to_string());
        global_metadata.insert("PixelType".to_string(), header.pixel_type.to_string());
        global_metadata.insert(
            "SamplesPerPixel".to_string(),
            header.samples_per_pixel.to_string(),
        );
        global_metadata.insert("PageCount".to_string(), header.page_count.to_string());
        if let Some(software) = &header.software {
            global_metadata.insert("Software".to_string(), software.clone());
        }

        let mut store = MetadataStore::new();
        for (key, value) in &global_metadata {
            store.record(MetadataRecord::Global {
                key: key.clone(),
                value: value.clone(),
            });
        }
        if let Some(date) = modification_date(&id) {
            store.record(MetadataRecord::ImageCreationDate { image: 0, date });
        }
        store.record(MetadataRecord::ImageId {
            image: 0,
            id: image_id(0),
        });
        if let Some(name) = file_name(&id) {
            store.record(MetadataRecord::ImageName {
                image: 0,
                name: name.to_string(),
            });
        }

        info!(
            file = %id.display(),
            width = header.width,
            height = header.height,
            pages = header.page_count,
            "Opened single plane file"
        );

        Ok(DatasetState {
            planes: Planes::SingleFile(id.clone()),
            id,
            core: vec![meta],
            metadata_files: Vec::new(),
            global_metadata,
            store,
        })
    }

    /// Descriptor key/value pairs (last value wins), or TIFF header fields
    /// in single-file mode.
    pub fn global_metadata(&self) -> Option<&BTreeMap<String, String>> {
        self.state.as_ref().map(|s| &s.global_metadata)
    }

    /// Records emitted while opening the dataset.
    pub fn metadata_store(&self) -> Option<&MetadataStore> {
        self.state.as_ref().map(|s| &s.store)
    }

    /// Resolved file lattice; `None` when closed or in single-file mode.
    pub fn lattice(&self) -> Option<&FileLattice> {
        match &self.state.as_ref()?.planes {
            Planes::Lattice(lattice) => Some(lattice),
            Planes::SingleFile(_) => None,
        }
    }

    pub fn grid(&self) -> Option<GridGeometry> {
        self.lattice().map(|l| l.grid)
    }

    /// Non-pixel files of the open dataset.
    pub fn metadata_files(&self) -> &[PathBuf] {
        match &self.state {
            Some(state) => &state.metadata_files,
            None => &[],
        }
    }
}

impl<D: PlaneDecoder> DatasetReader for ScanrReader<D> {
    fn format_name(&self) -> &'static str {
        DatasetFormat::ScanR.name()
    }

    fn series_count(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.core.len())
    }

    fn core_metadata(&self, series: usize) -> Option<&CoreMetadata> {
        self.state.as_ref()?.core.get(series)
    }

    fn read_plane(
        &self,
        series: usize,
        plane: usize,
        region: PlaneRegion,
        buf: &mut [u8],
    ) -> Result<(), ReadError> {
        let state = self.state.as_ref().ok_or(ReadError::NotInitialized)?;
        check_plane_parameters(&state.core, series, plane, &region, buf.len())?;

        let (path, page) = match &state.planes {
            Planes::Lattice(lattice) => match lattice.file(series, plane) {
                Some(path) => (path, 0),
                None => {
                    debug!(series, plane, "Plane was not acquired, leaving buffer untouched");
                    return Ok(());
                }
            },
            Planes::SingleFile(path) => (path.as_path(), plane),
        };

        let source = self.decoder.open(path)?;
        source.read_plane(page, region, buf)?;
        Ok(())
    }

    fn used_files(&self, series: usize, no_pixels: bool) -> Result<Vec<PathBuf>, ReadError> {
        let state = self.state.as_ref().ok_or(ReadError::NotInitialized)?;
        if series >= state.core.len() {
            return Err(ReadError::SeriesOutOfRange {
                series,
                count: state.core.len(),
            });
        }

        let mut files = state.metadata_files.clone();
        if !no_pixels {
            match &state.planes {
                Planes::Lattice(lattice) => {
                    files.extend(lattice.series_files(series).map(Path::to_path_buf))
                }
                Planes::SingleFile(path) => files.push(path.clone()),
            }
        }
        Ok(files)
    }

    fn file_group_option(&self, _path: &Path) -> FileGroupOption {
        FileGroupOption::MustGroup
    }

    fn close(&mut self) {
        if let Some(state) = self.state.take() {
            debug!(path = %state.id.display(), "Closing dataset");
        }
        self.decoder.clear();
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Find the experiment descriptor for `path`.
///
/// `path` may also be the plate directory. Plane TIFFs live in `data/`, so for
/// them the directory above their own is searched first.
pub fn locate_descriptor(path: &Path) -> Result<PathBuf, FormatError> {
    if file_name(path) == Some(DESCRIPTOR_FILE) {
        return Ok(path.to_path_buf());
    }

    let dir = if path.is_dir() {
        path
    } else {
        path.parent().unwrap_or_else(|| Path::new("."))
    };
    let mut candidates = Vec::with_capacity(2);
    if has_suffix(path, "tif") || has_suffix(path, "tiff") {
        if let Some(parent) = dir.parent() {
            candidates.push(parent);
        }
    }
    candidates.push(dir);

    candidates
        .iter()
        .map(|dir| dir.join(DESCRIPTOR_FILE))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| FormatError::MissingDescriptor {
            name: DESCRIPTOR_FILE.to_string(),
            dir: candidates[0].display().to_string(),
        })
}

/// Modification time of `path` as an RFC 3339 UTC timestamp.
fn modification_date(path: &Path) -> Option<String> {
    let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let date: DateTime<Utc> = modified.into();
    Some(date.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// =============================================================================
// Tests
// =============================================================================
