//! File lattice construction.
//!
//! ScanR names every plane file after its coordinates, e.g.
//!
//! ```text
//! --W00014--P00003--Z00000--T00000--GFP.tif
//! ```
//!
//! For every (well, position, Z, T, channel) coordinate the builder forms the
//! expected tokens and picks the first listed file containing all of them
//! plus the channel name. Wells and positions that resolve no file at all are
//! pruned, and the well grid is recomputed from the wells that survive, so
//! partially acquired plates do not produce empty series.
//!
//! # Lattice layout
//!
//! `files` is series-major. Series `s` covers `files[s * planes..(s + 1) * planes]`
//! where `planes = channels * timepoints * slices`; within a series the
//! channel varies fastest, then T, then Z (`XYCTZ`).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{FormatError, IoError};
use crate::io::list_files;

use super::descriptor::{DescriptorAccumulator, WellLabels};
use super::grid::{resolve_grid, GridGeometry, LabelAxes};

/// Subdirectory ScanR writes plane files into
pub const DATA_DIR: &str = "data";

/// Digits in every coordinate token
const TOKEN_DIGITS: usize = 5;

/// Upper bound on lattice entries (wells x positions x planes).
pub const MAX_LATTICE_ENTRIES: usize = 1 << 24;

/// Coordinate token: axis letter followed by a zero-padded 5-digit index.
pub fn axis_token(axis: char, index: u32) -> String {
    format!("{}{:0width$}", axis, index, width = TOKEN_DIGITS)
}

// =============================================================================
// FileLattice
// =============================================================================

/// A well that resolved at least one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatticeWell {
    /// Slot in the original grid walk
    pub slot: usize,
    /// Numeric index used in the `W` token
    pub index: u32,
    pub label: Option<String>,
    pub row: u32,
    pub column: u32,
}

/// Resolved plane files of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLattice {
    /// Directory the files were resolved in
    pub dir: PathBuf,
    /// Final well grid
    pub grid: GridGeometry,
    /// Surviving wells, in grid-walk order
    pub wells: Vec<LatticeWell>,
    /// Surviving field positions (0-based)
    pub positions: Vec<u32>,
    pub channels: u32,
    pub timepoints: u32,
    pub slices: u32,
    /// Labels of surviving wells
    pub well_labels: WellLabels,
    pub files: Vec<Option<PathBuf>>,
}

impl FileLattice {
    /// Planes in one series.
    pub fn planes_per_series(&self) -> usize {
        self.channels as usize * self.timepoints as usize * self.slices as usize
    }

    pub fn series_count(&self) -> usize {
        self.wells.len() * self.positions.len()
    }

    /// Lattice entry for `plane` of `series`, `None` if absent or out of range.
    pub fn file(&self, series: usize, plane: usize) -> Option<&Path> {
        self.files
            .get(series * self.planes_per_series() + plane)
            .and_then(|f| f.as_deref())
    }

    /// Resolved files of one series.
    pub fn series_files(&self, series: usize) -> impl Iterator<Item = &Path> {
        let planes = self.planes_per_series();
        let start = (series * planes).min(self.files.len());
        let end = (start + planes).min(self.files.len());
        self.files[start..end].iter().filter_map(|f| f.as_deref())
    }

    /// First resolved file in lattice order.
    pub fn first_file(&self) -> Option<&Path> {
        self.files.iter().find_map(|f| f.as_deref())
    }

    pub fn resolved_count(&self) -> usize {
        self.files.iter().filter(|f| f.is_some()).count()
    }
}

// =============================================================================
// FileLatticeBuilder
// =============================================================================

/// Product of lattice extents, `None` on overflow.
fn extent(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

/// Builds a [`FileLattice`] from descriptor data and a directory listing.
pub struct FileLatticeBuilder<'a> {
    descriptor: &'a DescriptorAccumulator,
    grid: GridGeometry,
}

/// Resolution result of one well slot.
struct SlotFiles {
    slot: usize,
    index: u32,
    label: Option<String>,
    /// One block per nominal position
    blocks: Vec<Vec<Option<PathBuf>>>,
}

impl SlotFiles {
    fn resolved(&self) -> bool {
        self.blocks.iter().any(|b| b.iter().any(Option::is_some))
    }
}

impl<'a> FileLatticeBuilder<'a> {
    pub fn new(descriptor: &'a DescriptorAccumulator, grid: GridGeometry) -> Self {
        Self { descriptor, grid }
    }

    /// List `root/data` (or `root` if it has no `data` directory) and resolve.
    pub fn build(&self, root: &Path) -> Result<FileLattice, FormatError> {
        let data_dir = root.join(DATA_DIR);
        let (dir, listing) = match list_files(&data_dir)? {
            Some(listing) => (data_dir, listing),
            None => {
                let listing = list_files(root)?
                    .ok_or_else(|| IoError::NotFound(root.display().to_string()))?;
                (root.to_path_buf(), listing)
            }
        };
        debug!(dir = %dir.display(), files = listing.len(), "Listed plane directory");
        self.resolve(&dir, &listing)
    }

    /// Number of channels to resolve; every channel name is a filename filter.
    fn channel_count(&self) -> u32 {
        let acc = self.descriptor;
        let count = if acc.size_c == 0 {
            acc.channel_names.len() as u32
        } else {
            acc.size_c
        };
        count.max(1)
    }

    fn position_count(&self) -> Result<u32, FormatError> {
        let acc = self.descriptor;
        match acc.field_rows.checked_mul(acc.field_columns) {
            Some(0) => Ok(1),
            Some(n) => Ok(n),
            None => Err(FormatError::DimensionsTooLarge {
                reason: format!(
                    "{} x {} fields per well",
                    acc.field_rows, acc.field_columns
                ),
            }),
        }
    }

    /// Resolve lattice coordinates against a sorted listing of `dir`.
    pub fn resolve(&self, dir: &Path, listing: &[String]) -> Result<FileLattice, FormatError> {
        let acc = self.descriptor;
        let labels = &acc.well_labels;

        let channels = self.channel_count();
        let slices = acc.size_z.max(1);
        let positions = self.position_count()?;
        let slots = if labels.is_empty() {
            self.grid.cell_count()
        } else {
            labels.len().min(self.grid.cell_count())
        };

        let timepoints = if acc.size_t > 0 {
            acc.size_t
        } else {
            let per_timepoint =
                extent(&[channels as usize, slots, positions as usize, slices as usize]);
            match per_timepoint.and_then(|n| listing.len().checked_div(n)) {
                Some(t) if t > 0 => t as u32,
                _ => 1,
            }
        };

        let planes = extent(&[channels as usize, timepoints as usize, slices as usize])
            .filter(|&planes| {
                extent(&[planes, slots, positions as usize])
                    .is_some_and(|entries| entries <= MAX_LATTICE_ENTRIES)
            })
            .ok_or_else(|| FormatError::DimensionsTooLarge {
                reason: format!(
                    "{} wells x {} positions x {} channels x {} timepoints x {} slices exceeds {} planes",
                    slots, positions, channels, timepoints, slices, MAX_LATTICE_ENTRIES
                ),
            })?;

        let channel_names: Vec<&str> = (0..channels as usize)
            .map(|c| acc.channel_names.get(c).map_or("", String::as_str))
            .collect();

        let mut resolved = Vec::with_capacity(slots);
        for slot in 0..slots {
            let (label, index) = match labels.get_slot(slot) {
                Some((label, index)) => (Some(label.to_string()), index),
                None => (None, slot as u32 + 1),
            };
            let well_token = axis_token('W', index);

            let mut blocks = Vec::with_capacity(positions as usize);
            for pos in 0..positions {
                let pos_token = axis_token('P', pos + 1);
                let mut block = vec![None; planes];

                for z in 0..slices {
                    let z_token = axis_token('Z', z);
                    for t in 0..timepoints {
                        let t_token = axis_token('T', t);
                        for (c, channel) in channel_names.iter().enumerate() {
                            let tokens = [
                                well_token.as_str(),
                                pos_token.as_str(),
                                z_token.as_str(),
                                t_token.as_str(),
                                *channel,
                            ];
                            let found = listing
                                .iter()
                                .find(|name| tokens.iter().all(|token| name.contains(token)));
                            if let Some(name) = found {
                                let plane = c
                                    + channels as usize
                                        * (t as usize + timepoints as usize * z as usize);
                                block[plane] = Some(dir.join(name));
                            }
                        }
                    }
                }
                blocks.push(block);
            }

            resolved.push(SlotFiles {
                slot,
                index,
                label,
                blocks,
            });
        }

        self.assemble(dir, resolved, channels, timepoints, slices)
    }

    /// Prune empty wells and positions and lay out the final lattice.
    fn assemble(
        &self,
        dir: &Path,
        resolved: Vec<SlotFiles>,
        channels: u32,
        timepoints: u32,
        slices: u32,
    ) -> Result<FileLattice, FormatError> {
        let nominal_positions = self.position_count()?;

        let (kept, pruned): (Vec<SlotFiles>, Vec<SlotFiles>) =
            resolved.into_iter().partition(SlotFiles::resolved);
        for well in &pruned {
            warn!(
                well = well.label.as_deref().unwrap_or(""),
                index = well.index,
                "No plane files found for well, dropping it"
            );
        }

        if kept.is_empty() {
            return Err(FormatError::NoPixelFiles {
                dir: dir.display().to_string(),
            });
        }

        let realized: BTreeSet<u32> = kept
            .iter()
            .flat_map(|well| {
                well.blocks
                    .iter()
                    .enumerate()
                    .filter(|(_, block)| block.iter().any(Option::is_some))
                    .map(|(pos, _)| pos as u32)
            })
            .collect();
        let positions: Vec<u32> = if (realized.len() as u32) < nominal_positions {
            warn!(
                nominal = nominal_positions,
                realized = realized.len(),
                "Some field positions have no plane files, dropping them"
            );
            realized.into_iter().collect()
        } else {
            (0..nominal_positions).collect()
        };

        let well_labels: WellLabels = kept
            .iter()
            .filter_map(|well| well.label.as_deref().map(|label| (label, well.index)))
            .collect();

        let grid = if !well_labels.is_empty() && well_labels.len() != self.grid.cell_count() {
            let grid = resolve_grid(&well_labels, well_labels.len() as u32);
            debug!(
                rows = grid.rows(),
                columns = grid.columns(),
                wells = well_labels.len(),
                "Recomputed well grid from surviving wells"
            );
            grid
        } else {
            self.grid
        };

        let axes = LabelAxes::from_labels(well_labels.labels());
        let columns = grid.columns().max(1) as usize;
        let mut wells = Vec::with_capacity(kept.len());
        let mut files = Vec::with_capacity(kept.len() * positions.len());

        for mut well in kept {
            let (row, column) = well
                .label
                .as_deref()
                .filter(|_| !grid.is_inferred())
                .and_then(|label| axes.position(label))
                .unwrap_or(((well.slot / columns) as u32, (well.slot % columns) as u32));

            for &pos in &positions {
                files.append(&mut well.blocks[pos as usize]);
            }

            wells.push(LatticeWell {
                slot: well.slot,
                index: well.index,
                label: well.label,
                row,
                column,
            });
        }

        let lattice = FileLattice {
            dir: dir.to_path_buf(),
            grid,
            wells,
            positions,
            channels,
            timepoints,
            slices,
            well_labels,
            files,
        };
        debug!(
            wells = lattice.wells.len(),
            positions = lattice.positions.len(),
            planes = lattice.planes_per_series(),
            resolved = lattice.resolved_count(),
            "Resolved file lattice"
        );
        Ok(lattice)
    }
}

// =============================================================================
// Tests
// =============================================================================
