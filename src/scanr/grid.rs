//! Plate grid geometry.
//!
//! Well labels such as `B7` carry their row (`B`) and column (`7`). When the
//! labels say nothing about geometry (numeric-only or absent), the grid is
//! inferred from the well count assuming a standard 96- or 384-well plate.

use serde::Serialize;
use tracing::warn;

use super::descriptor::WellLabels;

/// Columns of a 96-well plate
const COLUMNS_96: u32 = 12;

/// Columns of a 384-well plate
const COLUMNS_384: u32 = 24;

const MAX_WELLS_96: u32 = 96;

// =============================================================================
// GridGeometry
// =============================================================================

/// Well grid dimensions, tagged with how they were obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum GridGeometry {
    /// Read from row/column-bearing well labels
    Explicit { rows: u32, columns: u32 },
    /// Guessed from the well count
    Inferred { rows: u32, columns: u32 },
}

impl GridGeometry {
    pub const fn rows(&self) -> u32 {
        match *self {
            GridGeometry::Explicit { rows, .. } | GridGeometry::Inferred { rows, .. } => rows,
        }
    }

    pub const fn columns(&self) -> u32 {
        match *self {
            GridGeometry::Explicit { columns, .. } | GridGeometry::Inferred { columns, .. } => {
                columns
            }
        }
    }

    /// Number of well slots in the grid.
    pub const fn cell_count(&self) -> usize {
        self.rows() as usize * self.columns() as usize
    }

    pub const fn is_inferred(&self) -> bool {
        matches!(self, GridGeometry::Inferred { .. })
    }
}

// =============================================================================
// Label axes
// =============================================================================

/// Split a well label into row and column tokens.
///
/// Only labels starting with a letter carry geometry: the first character is
/// the row, the rest the column. Both are trimmed.
pub fn split_label(label: &str) -> Option<(&str, &str)> {
    let first = label.chars().next()?;
    if !first.is_alphabetic() {
        return None;
    }
    let split = first.len_utf8();
    Some((label[..split].trim(), label[split..].trim()))
}

/// Distinct row and column tokens of a label set, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelAxes {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
}

impl LabelAxes {
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut axes = LabelAxes::default();
        for (row, column) in labels.into_iter().filter_map(split_label) {
            if !row.is_empty() && !axes.rows.iter().any(|r| r == row) {
                axes.rows.push(row.to_string());
            }
            if !column.is_empty() && !axes.columns.iter().any(|c| c == column) {
                axes.columns.push(column.to_string());
            }
        }
        axes
    }

    /// `(row, column)` indices of `label` within these axes.
    pub fn position(&self, label: &str) -> Option<(u32, u32)> {
        let (row, column) = split_label(label)?;
        let row = self.rows.iter().position(|r| r == row)?;
        let column = self.columns.iter().position(|c| c == column)?;
        Some((row as u32, column as u32))
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Grid for `well_count` wells on a standard plate.
///
/// Counts up to 96 use 12 columns, anything larger 24 columns.
pub fn fallback_grid(well_count: u32) -> GridGeometry {
    let columns = if well_count <= MAX_WELLS_96 {
        COLUMNS_96
    } else {
        COLUMNS_384
    };
    GridGeometry::Inferred {
        rows: well_count.div_ceil(columns),
        columns,
    }
}

/// Derive the well grid from labels, falling back to the well count.
pub fn resolve_grid(labels: &WellLabels, well_count: u32) -> GridGeometry {
    let axes = LabelAxes::from_labels(labels.labels());
    let rows = axes.rows.len() as u32;
    let columns = axes.columns.len() as u32;

    if rows > 0 && columns > 0 {
        return GridGeometry::Explicit { rows, columns };
    }

    let grid = fallback_grid(well_count);
    warn!(
        well_count,
        labels = labels.len(),
        rows = grid.rows(),
        columns = grid.columns(),
        "Well labels carry no grid geometry, assuming a standard plate"
    );
    grid
}

// =============================================================================
// Tests
// =============================================================================
