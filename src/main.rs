//! wsi-reader - resolution-aware region reads from whole slide images.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_reader::{
    config::{
        Cli, Command, Mode, ReadBoundsConfig, SaveTilesConfig, SlideInfoConfig,
        SlideThumbnailConfig,
    },
    export::save_tiles,
    region::{PixelArray, WsiReader},
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::ReadBounds(config) => run_read_bounds(config),
        Command::SlideThumbnail(config) => run_slide_thumbnail(config),
        Command::SlideInfo(config) => run_slide_info(config),
        Command::SaveTiles(config) => run_save_tiles(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_reader=debug"
    } else {
        "wsi_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn open(path: &Path) -> Result<WsiReader<wsi_reader::slide::AnySlide>, String> {
    WsiReader::open(path).map_err(|e| format!("Failed to open {}: {}", path.display(), e))
}

// =============================================================================
// Commands
// =============================================================================

fn run_read_bounds(config: ReadBoundsConfig) -> Result<(), String> {
    config.validate()?;
    let reader = open(&config.wsi_input)?;

    let bounds = config.bounds().unwrap_or_else(|| {
        let (w, h) = reader.info().slide_dimensions;
        (0, 0, w as i64, h as i64)
    });

    let region = reader
        .read_bounds(bounds, config.resolution, config.units)
        .map_err(|e| format!("Read failed: {e}"))?;
    emit(&region, config.mode, config.output_path.as_deref())
}

fn run_slide_thumbnail(config: SlideThumbnailConfig) -> Result<(), String> {
    config.validate()?;
    let reader = open(&config.wsi_input)?;

    let thumbnail = match config.requested_resolution() {
        Some((resolution, units)) => reader.slide_thumbnail(resolution, units),
        None => reader.get_thumbnail(),
    }
    .map_err(|e| format!("Thumbnail failed: {e}"))?;
    emit(&thumbnail, config.mode, config.output_path.as_deref())
}

fn run_slide_info(config: SlideInfoConfig) -> Result<(), String> {
    let reader = open(&config.wsi_input)?;

    let json = serde_json::to_string_pretty(&reader.info().as_dict())
        .map_err(|e| format!("Failed to serialize metadata: {e}"))?;
    println!("{json}");
    Ok(())
}

fn run_save_tiles(config: SaveTilesConfig) -> Result<(), String> {
    config.validate()?;
    let reader = open(&config.wsi_input)?;

    let summary = save_tiles(
        &reader,
        &config.output_dir,
        config.tile_objective_value,
        config.tile_size,
    )
    .map_err(|e| format!("Tile export failed: {e}"))?;

    info!(
        "Wrote {} tile(s) to {}",
        summary.tiles.len(),
        summary.directory.display()
    );
    Ok(())
}

/// Print a summary of the array or save it, depending on the mode.
fn emit(array: &PixelArray, mode: Mode, output_path: Option<&Path>) -> Result<(), String> {
    match (mode, output_path) {
        (Mode::Save, Some(path)) => {
            array
                .save_jpeg(path)
                .map_err(|e| format!("Failed to save: {e}"))?;
            info!("Saved {}", path.display());
            Ok(())
        }
        (Mode::Save, None) => Err("--mode save needs --output-path".to_string()),
        (Mode::Show, _) => {
            let (h, w, c) = array.shape();
            println!("shape: ({h}, {w}, {c})");
            Ok(())
        }
    }
}
