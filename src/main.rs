//! HCS Reader - inspect high-content screening datasets from the command line.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hcs_reader::{
    scanr::LatticeWell, Cli, Command, CoreMetadata, DatasetReader, FormatError, GridGeometry,
    MetadataRecord, PlaneRegion, ReadError, ReaderOptions, ScanrReader,
};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

type Result<T> = std::result::Result<T, CliError>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options = cli.reader_options();
    let result = match cli.command {
        Command::Inspect { path, json } => run_inspect(&path, options, json),
        Command::Files {
            path,
            series,
            no_pixels,
        } => run_files(&path, options, series, no_pixels),
        Command::Plane {
            path,
            series,
            plane,
            x,
            y,
            width,
            height,
            output,
            png,
        } => {
            let request = PlaneRequest {
                series,
                plane,
                x,
                y,
                width,
                height,
                output,
                png,
            };
            run_plane(&path, options, &request)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "hcs_reader=debug"
    } else {
        "hcs_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Inspect Command
// =============================================================================

#[derive(Serialize)]
struct SeriesReport<'a> {
    index: usize,
    name: Option<&'a str>,
    channels: Vec<&'a str>,
    core: &'a CoreMetadata,
}

#[derive(Serialize)]
struct InspectReport<'a> {
    format: &'static str,
    path: &'a Path,
    grid: Option<GridGeometry>,
    wells: &'a [LatticeWell],
    series: Vec<SeriesReport<'a>>,
    records: &'a [MetadataRecord],
}

fn run_inspect(path: &Path, options: ReaderOptions, json: bool) -> Result<()> {
    let reader = ScanrReader::open(path, options)?;
    let store = reader
        .metadata_store()
        .ok_or(CliError::Read(ReadError::NotInitialized))?;

    let series: Vec<SeriesReport> = (0..reader.series_count())
        .filter_map(|index| {
            reader.core_metadata(index).map(|core| SeriesReport {
                index,
                name: store.image_name(index),
                channels: store.channel_names(index),
                core,
            })
        })
        .collect();

    let report = InspectReport {
        format: reader.format_name(),
        path,
        grid: reader.grid(),
        wells: match reader.lattice() {
            Some(lattice) => &lattice.wells,
            None => &[],
        },
        series,
        records: store.records(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} dataset: {}", report.format, path.display());
    if let Some(grid) = report.grid {
        let source = if grid.is_inferred() { "inferred" } else { "from labels" };
        println!("Plate: {} x {} wells ({})", grid.rows(), grid.columns(), source);
    }
    if !report.wells.is_empty() {
        let labels: Vec<String> = report
            .wells
            .iter()
            .map(|w| w.label.clone().unwrap_or_else(|| format!("#{}", w.index)))
            .collect();
        println!("Wells: {}", labels.join(", "));
    }
    println!("Series: {}", report.series.len());
    for s in &report.series {
        println!(
            "  [{}] {}  {}x{}  Z={} C={} T={}  {} {}",
            s.index,
            s.name.unwrap_or("-"),
            s.core.size_x,
            s.core.size_y,
            s.core.size_z,
            s.core.size_c,
            s.core.size_t,
            s.core.pixel_type,
            s.core.dimension_order.as_str(),
        );
        if !s.channels.is_empty() {
            println!("      channels: {}", s.channels.join(", "));
        }
    }
    if let Some(global) = reader.global_metadata() {
        println!("Metadata:");
        for (key, value) in global {
            println!("  {} = {}", key, value);
        }
    }
    Ok(())
}

// =============================================================================
// Files Command
// =============================================================================

fn run_files(
    path: &Path,
    options: ReaderOptions,
    series: Option<usize>,
    no_pixels: bool,
) -> Result<()> {
    let reader = ScanrReader::open(path, options)?;
    let selected: Vec<usize> = match series {
        Some(s) => vec![s],
        None => (0..reader.series_count()).collect(),
    };

    for s in selected {
        if series.is_none() {
            println!("# series {}", s);
        }
        for file in reader.used_files(s, no_pixels)? {
            println!("{}", file.display());
        }
    }
    Ok(())
}

// =============================================================================
// Plane Command
// =============================================================================

struct PlaneRequest {
    series: usize,
    plane: usize,
    x: u32,
    y: u32,
    width: Option<u32>,
    height: Option<u32>,
    output: PathBuf,
    png: bool,
}

fn run_plane(path: &Path, options: ReaderOptions, request: &PlaneRequest) -> Result<()> {
    let reader = ScanrReader::open(path, options)?;
    let core = reader
        .core_metadata(request.series)
        .ok_or(ReadError::SeriesOutOfRange {
            series: request.series,
            count: reader.series_count(),
        })?;

    let region = PlaneRegion::new(
        request.x,
        request.y,
        request
            .width
            .unwrap_or_else(|| core.size_x.saturating_sub(request.x)),
        request
            .height
            .unwrap_or_else(|| core.size_y.saturating_sub(request.y)),
    );
    let bytes_per_pixel = core.pixel_type.bytes_per_pixel() * core.samples_per_pixel as usize;
    let mut buf = vec![0u8; region.pixel_count() * bytes_per_pixel];
    reader.read_plane(request.series, request.plane, region, &mut buf)?;
    debug!(
        series = request.series,
        plane = request.plane,
        bytes = buf.len(),
        "Read plane region"
    );

    if request.png {
        write_png(&request.output, core, region, buf)?;
    } else {
        fs::write(&request.output, &buf)?;
    }
    println!(
        "Wrote {}x{} region of series {} plane {} to {}",
        region.width,
        region.height,
        request.series,
        request.plane,
        request.output.display()
    );
    Ok(())
}

/// Encode a single-sample 8- or 16-bit region as grayscale PNG.
fn write_png(output: &Path, core: &CoreMetadata, region: PlaneRegion, buf: Vec<u8>) -> Result<()> {
    if core.samples_per_pixel != 1 {
        return Err(CliError::Invalid(format!(
            "PNG output needs one sample per pixel, plane has {}",
            core.samples_per_pixel
        )));
    }

    match core.pixel_type.bytes_per_pixel() {
        1 => {
            let image = image::GrayImage::from_raw(region.width, region.height, buf)
                .ok_or_else(|| CliError::Invalid("Region buffer size mismatch".to_string()))?;
            image.save_with_format(output, image::ImageFormat::Png)?;
        }
        2 => {
            let samples: Vec<u16> = buf
                .chunks_exact(2)
                .map(|b| {
                    if core.little_endian {
                        u16::from_le_bytes([b[0], b[1]])
                    } else {
                        u16::from_be_bytes([b[0], b[1]])
                    }
                })
                .collect();
            let image = image::ImageBuffer::<image::Luma<u16>, Vec<u16>>::from_raw(
                region.width,
                region.height,
                samples,
            )
            .ok_or_else(|| CliError::Invalid("Region buffer size mismatch".to_string()))?;
            image.save_with_format(output, image::ImageFormat::Png)?;
        }
        _ => {
            return Err(CliError::Invalid(format!(
                "PNG output supports 8- and 16-bit planes, plane is {}",
                core.pixel_type
            )))
        }
    }
    Ok(())
}
