//! Command-line configuration for the `hcs-reader` tool.
//!
//! Global reader options can also be set through environment variables:
//!
//! - `HCS_NO_GROUP` - Read a plane TIFF on its own instead of the whole plate
//! - `HCS_METADATA_LEVEL` - `all` (default) or `minimal`
//! - `HCS_LAYOUT_CACHE` - Parsed TIFF layouts to cache (default: 64, 0 disables)
//!
//! # Example
//!
//! ```text
//! hcs-reader inspect plate/experiment_descriptor.xml --json
//! hcs-reader files plate/experiment_descriptor.xml --series 3 --no-pixels
//! hcs-reader plane plate/experiment_descriptor.xml --series 0 --plane 1 -o gfp.png --png
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::format::tiff::DEFAULT_LAYOUT_CACHE_CAPACITY;
use crate::metadata::MetadataLevel;
use crate::scanr::ReaderOptions;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Inspect and extract planes from high-content screening datasets.
#[derive(Parser, Debug, Clone)]
#[command(name = "hcs-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Open only the given plane TIFF instead of the whole plate.
    #[arg(long, global = true, default_value_t = false, env = "HCS_NO_GROUP")]
    pub no_group: bool,

    /// How much metadata to collect.
    #[arg(long, global = true, value_enum, default_value_t = MetadataLevel::All, env = "HCS_METADATA_LEVEL")]
    pub metadata_level: MetadataLevel,

    /// Number of parsed TIFF layouts to cache (0 disables the cache).
    #[arg(long, global = true, default_value_t = DEFAULT_LAYOUT_CACHE_CAPACITY, env = "HCS_LAYOUT_CACHE")]
    pub layout_cache: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print series shapes, channels, well grid and metadata records
    Inspect {
        /// Descriptor, companion file or plane TIFF of the dataset
        path: PathBuf,

        /// Print a JSON report instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the files backing one series, or every series
    Files {
        path: PathBuf,

        /// Series to list (all series if omitted)
        #[arg(short, long)]
        series: Option<usize>,

        /// Only list metadata files
        #[arg(long, default_value_t = false)]
        no_pixels: bool,
    },

    /// Write one plane, or a region of it, to a file
    Plane {
        path: PathBuf,

        #[arg(short, long, default_value_t = 0)]
        series: usize,

        #[arg(short, long, default_value_t = 0)]
        plane: usize,

        /// Region origin
        #[arg(long, default_value_t = 0)]
        x: u32,

        #[arg(long, default_value_t = 0)]
        y: u32,

        /// Region size (defaults to the rest of the plane)
        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        /// Output file
        #[arg(short, long)]
        output: PathBuf,

        /// Encode as grayscale PNG instead of raw bytes
        #[arg(long, default_value_t = false)]
        png: bool,
    },
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.reader_options().validate()?;

        if let Command::Plane {
            width: Some(0), ..
        }
        | Command::Plane {
            height: Some(0), ..
        } = &self.command
        {
            return Err("Region width and height must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Reader options selected by the global flags.
    pub fn reader_options(&self) -> ReaderOptions {
        ReaderOptions {
            group_files: !self.no_group,
            metadata_level: self.metadata_level,
            layout_cache_capacity: self.layout_cache,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
