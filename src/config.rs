//! Command-line configuration for wsi-reader.
//!
//! Every option can also be set through an environment variable with the
//! `WSI_` prefix:
//!
//! - `WSI_INPUT` - slide file to open
//! - `WSI_RESOLUTION` / `WSI_UNITS` - requested resolution and its units
//! - `WSI_MODE` - `show` (print a summary) or `save` (write a JPEG)
//! - `WSI_OUTPUT_PATH` - output file for `save` mode
//! - `WSI_OUTPUT_DIR` - output directory for `save-tiles`
//! - `WSI_TILE_OBJECTIVE_VALUE` / `WSI_TILE_SIZE` - tile export settings

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::export::{DEFAULT_TILE_OBJECTIVE_VALUE, DEFAULT_TILE_SIZE};
use crate::resolution::Units;

// =============================================================================
// Default Values
// =============================================================================

/// Default resolution for `read-bounds` (level 0).
pub const DEFAULT_BOUNDS_RESOLUTION: f64 = 0.0;

/// Default units for `read-bounds`.
pub const DEFAULT_BOUNDS_UNITS: &str = "level";

/// Units for a `slide-thumbnail` resolution given without `--units`.
pub const DEFAULT_THUMBNAIL_UNITS: Units = Units::Power;

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-reader - resolution-aware region reads from whole slide images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-reader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Read a region given by baseline bounds.
    ReadBounds(ReadBoundsConfig),

    /// Read the whole slide at a low resolution.
    SlideThumbnail(SlideThumbnailConfig),

    /// Print slide metadata as JSON.
    SlideInfo(SlideInfoConfig),

    /// Write the slide as JPEG tiles with a CSV index.
    SaveTiles(SaveTilesConfig),
}

/// What to do with a read region.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Print the array shape
    #[default]
    Show,

    /// Write a JPEG to `--output-path`
    Save,
}

#[derive(Args, Debug, Clone)]
pub struct ReadBoundsConfig {
    /// Slide file.
    #[arg(long, env = "WSI_INPUT")]
    pub wsi_input: PathBuf,

    /// Requested resolution.
    #[arg(long, default_value_t = DEFAULT_BOUNDS_RESOLUTION, env = "WSI_RESOLUTION")]
    pub resolution: f64,

    /// Units of the resolution: level, mpp, power or baseline.
    #[arg(long, default_value = DEFAULT_BOUNDS_UNITS, env = "WSI_UNITS")]
    pub units: Units,

    /// Baseline bounds `left top right bottom`; the whole slide if omitted.
    #[arg(long, num_args = 4, value_names = ["LEFT", "TOP", "RIGHT", "BOTTOM"], allow_negative_numbers = true)]
    pub region: Option<Vec<i64>>,

    #[arg(long, value_enum, default_value_t = Mode::Show, env = "WSI_MODE")]
    pub mode: Mode,

    /// Output JPEG for `--mode save`.
    #[arg(long, env = "WSI_OUTPUT_PATH")]
    pub output_path: Option<PathBuf>,
}

impl ReadBoundsConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_output(self.mode, self.output_path.as_ref())?;
        validate_resolution(self.resolution, self.units)?;

        if let Some((left, top, right, bottom)) = self.bounds() {
            if right <= left || bottom <= top {
                return Err(format!(
                    "region must satisfy left < right and top < bottom, got {left} {top} {right} {bottom}"
                ));
            }
        }
        Ok(())
    }

    /// The `--region` values as `(left, top, right, bottom)`.
    pub fn bounds(&self) -> Option<(i64, i64, i64, i64)> {
        match self.region.as_deref() {
            Some(&[left, top, right, bottom]) => Some((left, top, right, bottom)),
            _ => None,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SlideThumbnailConfig {
    /// Slide file.
    #[arg(long, env = "WSI_INPUT")]
    pub wsi_input: PathBuf,

    /// Requested resolution. Without it the thumbnail is taken at 1.25x,
    /// or at the coarsest level when the objective power is unknown.
    #[arg(long, env = "WSI_RESOLUTION")]
    pub resolution: Option<f64>,

    /// Units of the resolution: level, mpp, power or baseline.
    #[arg(long, env = "WSI_UNITS")]
    pub units: Option<Units>,

    #[arg(long, value_enum, default_value_t = Mode::Show, env = "WSI_MODE")]
    pub mode: Mode,

    /// Output JPEG for `--mode save`.
    #[arg(long, env = "WSI_OUTPUT_PATH")]
    pub output_path: Option<PathBuf>,
}

impl SlideThumbnailConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_output(self.mode, self.output_path.as_ref())?;
        match (self.requested_resolution(), self.units) {
            (Some((value, units)), _) => validate_resolution(value, units),
            (None, Some(units)) => Err(format!("--units {units} needs --resolution")),
            (None, None) => Ok(()),
        }
    }

    /// Explicit resolution request, `None` for the default thumbnail.
    pub fn requested_resolution(&self) -> Option<(f64, Units)> {
        self.resolution
            .map(|value| (value, self.units.unwrap_or(DEFAULT_THUMBNAIL_UNITS)))
    }
}

#[derive(Args, Debug, Clone)]
pub struct SlideInfoConfig {
    /// Slide file.
    #[arg(long, env = "WSI_INPUT")]
    pub wsi_input: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct SaveTilesConfig {
    /// Slide file.
    #[arg(long, env = "WSI_INPUT")]
    pub wsi_input: PathBuf,

    /// Directory receiving one sub-directory per slide.
    #[arg(long, env = "WSI_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Objective power tiles are written at.
    #[arg(long, default_value_t = DEFAULT_TILE_OBJECTIVE_VALUE, env = "WSI_TILE_OBJECTIVE_VALUE")]
    pub tile_objective_value: f64,

    /// Tile edge in output pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,
}

impl SaveTilesConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_resolution(self.tile_objective_value, Units::Power)?;
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

fn validate_output(mode: Mode, output_path: Option<&PathBuf>) -> Result<(), String> {
    if mode == Mode::Save && output_path.is_none() {
        return Err(
            "--mode save needs an output file. Set --output-path or WSI_OUTPUT_PATH".to_string(),
        );
    }
    Ok(())
}

fn validate_resolution(value: f64, units: Units) -> Result<(), String> {
    let valid = match units {
        Units::Level => value.is_finite() && value >= 0.0,
        _ => value.is_finite() && value > 0.0,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("invalid resolution {value} for units {units}"))
    }
}

// =============================================================================
// Tests
// =============================================================================
