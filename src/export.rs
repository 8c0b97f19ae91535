//! Tiled dump of a slide at a fixed objective power.
//!
//! Layout of `<output_dir>/<slide file name>/`:
//!
//! ```text
//! Tile_<power>_<x>_<y>.jpg   one JPEG per tile, x/y in output pixels
//! Output.csv                 iter, tile_name, x_start, y_start, x_end, y_end
//! slide_thumbnail.jpg
//! ```
//!
//! CSV coordinates are baseline pixels. Tiles on the right and bottom edges
//! are cut at the slide border instead of padded.

use std::fs;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ExportError, ReadError, ResolutionError};
use crate::resolution::Units;
use crate::region::WsiReader;
use crate::slide::SlideBackend;

/// Default objective power tiles are written at.
pub const DEFAULT_TILE_OBJECTIVE_VALUE: f64 = 20.0;

/// Default tile edge in output pixels.
pub const DEFAULT_TILE_SIZE: u32 = 5000;

pub const INDEX_FILE_NAME: &str = "Output.csv";
pub const THUMBNAIL_FILE_NAME: &str = "slide_thumbnail.jpg";

/// One row of the tile index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileRecord {
    pub iter: usize,
    pub tile_name: String,
    pub x_start: u32,
    pub y_start: u32,
    pub x_end: u32,
    pub y_end: u32,
}

/// What [`save_tiles`] wrote.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub directory: PathBuf,
    pub tiles: Vec<TileRecord>,
}

/// Write every tile of the slide at `tile_objective_value` power.
///
/// The slide must have a known objective power.
pub fn save_tiles<B: SlideBackend>(
    reader: &WsiReader<B>,
    output_dir: &Path,
    tile_objective_value: f64,
    tile_size: u32,
) -> Result<ExportSummary, ExportError> {
    let meta = reader.info();
    let slide_power = meta
        .objective_power
        .ok_or(ReadError::Resolution(ResolutionError::MissingCalibration {
            units: Units::Power.as_str(),
            field: "objective_power",
        }))?;
    if !(tile_objective_value.is_finite() && tile_objective_value > 0.0) || tile_size == 0 {
        return Err(ReadError::Resolution(ResolutionError::InvalidResolution {
            value: tile_objective_value,
            units: Units::Power.as_str(),
        })
        .into());
    }

    let slide_name = meta
        .file_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slide".to_string());
    let directory = output_dir.join(slide_name);
    fs::create_dir_all(&directory).map_err(|e| write_error(&directory, e))?;

    // Baseline pixels per output pixel
    let rescale = slide_power / tile_objective_value;
    let span = ((tile_size as f64 * rescale).round() as u32).max(1);
    let (slide_w, slide_h) = meta.slide_dimensions;

    info!(
        directory = %directory.display(),
        power = tile_objective_value,
        tile_size,
        "saving tiles"
    );

    let mut tiles = Vec::new();
    for y_start in (0..slide_h).step_by(span as usize) {
        for x_start in (0..slide_w).step_by(span as usize) {
            let x_end = (x_start + span).min(slide_w);
            let y_end = (y_start + span).min(slide_h);
            let size = (
                (((x_end - x_start) as f64 / rescale).round() as u32).max(1),
                (((y_end - y_start) as f64 / rescale).round() as u32).max(1),
            );

            let tile = reader.read_rect(
                (x_start as i64, y_start as i64),
                size,
                tile_objective_value,
                Units::Power,
            )?;

            let tile_name = format!(
                "Tile_{}_{}_{}.jpg",
                tile_objective_value,
                (x_start as f64 / rescale).round() as u32,
                (y_start as f64 / rescale).round() as u32,
            );
            tile.save_jpeg(&directory.join(&tile_name))?;
            debug!(tile = %tile_name, "saved tile");

            tiles.push(TileRecord {
                iter: tiles.len(),
                tile_name,
                x_start,
                y_start,
                x_end,
                y_end,
            });
        }
    }

    let index_path = directory.join(INDEX_FILE_NAME);
    let mut writer = Writer::from_path(&index_path)?;
    for record in &tiles {
        writer.serialize(record)?;
    }
    writer.flush().map_err(|e| write_error(&index_path, e))?;

    reader
        .get_thumbnail()?
        .save_jpeg(&directory.join(THUMBNAIL_FILE_NAME))?;

    info!(tiles = tiles.len(), "tiles saved");
    Ok(ExportSummary { directory, tiles })
}

fn write_error(path: &Path, err: std::io::Error) -> ExportError {
    ExportError::Write {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
