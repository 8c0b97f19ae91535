//! Scale negotiation between a requested resolution and stored levels.
//!
//! Every request is first turned into a [`LevelScales`] table: for each
//! stored level, the factor its pixels must be scaled by to land in the
//! requested frame. The optimal level is the coarsest one that needs no
//! enlargement; the residual factor is applied after decoding.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::slide::SlideMetadata;

use super::units::{Resolution, Scale, Units};

/// Decimal places scales are rounded to before comparing against 1.
pub const SCALE_PRECISION: i32 = 3;

/// One scale per stored level, level 0 first.
pub type LevelScales = Vec<Scale>;

// =============================================================================
// Results
// =============================================================================

/// Advisory raised while choosing a level.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionWarning {
    /// No stored level is as fine as requested; decoded pixels are enlarged
    Interpolation {
        units: Units,
        /// Resolution asked for, per axis
        requested: (f64, f64),
        /// Finest stored resolution in the same units
        available: (f64, f64),
        /// Enlargement applied to the read level
        scale: Scale,
    },
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionWarning::Interpolation {
                units,
                requested,
                available,
                scale,
            } => write!(
                f,
                "Scale > 1: requested {units} {requested:?} is finer than the best stored \
                 {available:?}; read regions will be interpolated by {scale}"
            ),
        }
    }
}

/// The level to decode and the scale left to apply afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSelection {
    pub read_level: usize,
    pub post_read_scale: Scale,
    pub warning: Option<ResolutionWarning>,
}

/// Everything needed to execute one region read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadPlan {
    pub read_level: usize,
    /// Top-left corner in the read level's frame
    pub level_location: (i64, i64),
    /// Window to decode from the read level
    pub level_read_size: (u32, u32),
    pub post_read_scale: Scale,
    /// The same window in baseline pixels
    pub baseline_read_size: (u32, u32),
    /// Final image size after resizing
    pub output_size: (u32, u32),
    pub warning: Option<ResolutionWarning>,
}

// =============================================================================
// Level scales
// =============================================================================

/// Scale of every stored level relative to the requested resolution.
///
/// # Errors
///
/// - `MissingCalibration` for `mpp`/`power` on an uncalibrated slide
/// - `LevelOutOfRange` for levels outside `[0, level_count)`
/// - `InvalidResolution` for non-finite or non-positive values
pub fn relative_level_scales(
    meta: &SlideMetadata,
    resolution: Resolution,
    units: Units,
) -> Result<LevelScales, ResolutionError> {
    let (rx, ry) = resolution.xy();
    let downsamples = &meta.level_downsamples;

    let per_level = |fx: f64, fy: f64| -> LevelScales {
        downsamples
            .iter()
            .map(|&ds| Scale::new(fx * ds, fy * ds))
            .collect()
    };

    match units {
        Units::Level => {
            let dx = interpolate_downsample(meta, rx)?;
            let dy = interpolate_downsample(meta, ry)?;
            Ok(per_level(1.0 / dx, 1.0 / dy))
        }
        Units::Mpp => {
            check_positive(rx, units)?;
            check_positive(ry, units)?;
            let (mx, my) = meta.mpp.ok_or(ResolutionError::MissingCalibration {
                units: units.as_str(),
                field: "mpp",
            })?;
            Ok(per_level(mx / rx, my / ry))
        }
        Units::Power => {
            check_positive(rx, units)?;
            check_positive(ry, units)?;
            let power = meta
                .objective_power
                .ok_or(ResolutionError::MissingCalibration {
                    units: units.as_str(),
                    field: "objective_power",
                })?;
            Ok(per_level(rx / power, ry / power))
        }
        Units::Baseline => {
            check_positive(rx, units)?;
            check_positive(ry, units)?;
            Ok(per_level(rx, ry))
        }
    }
}

fn check_positive(value: f64, units: Units) -> Result<(), ResolutionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ResolutionError::InvalidResolution {
            value,
            units: units.as_str(),
        })
    }
}

/// Downsample at a possibly fractional level, linear between stored levels.
fn interpolate_downsample(meta: &SlideMetadata, level: f64) -> Result<f64, ResolutionError> {
    let downsamples = &meta.level_downsamples;
    let count = downsamples.len();
    if !(level.is_finite() && level >= 0.0 && level < count as f64) {
        return Err(ResolutionError::LevelOutOfRange {
            level,
            level_count: count,
        });
    }

    let lower = level.floor() as usize;
    if lower + 1 >= count {
        return Ok(downsamples[count - 1]);
    }
    let t = level - lower as f64;
    Ok(downsamples[lower] + t * (downsamples[lower + 1] - downsamples[lower]))
}

// =============================================================================
// Level selection
// =============================================================================

/// Pick the coarsest level that needs no enlargement.
///
/// Falls back to level 0 with an interpolation warning when even the
/// baseline is coarser than requested.
pub fn find_optimal_level_and_downsample(
    meta: &SlideMetadata,
    resolution: Resolution,
    units: Units,
) -> Result<LevelSelection, ResolutionError> {
    let scales = relative_level_scales(meta, resolution, units)?;

    let read_level = scales
        .iter()
        .rposition(|scale| {
            let rounded = scale.rounded(SCALE_PRECISION);
            rounded.x <= 1.0 && rounded.y <= 1.0
        })
        .unwrap_or(0);

    let post_read_scale = scales[read_level];
    let rounded = post_read_scale.rounded(SCALE_PRECISION);

    let warning = (rounded.x > 1.0 || rounded.y > 1.0).then(|| {
        let requested = resolution.xy();
        let available = match units {
            Units::Mpp => (requested.0 * rounded.x, requested.1 * rounded.y),
            _ => (requested.0 / rounded.x, requested.1 / rounded.y),
        };
        ResolutionWarning::Interpolation {
            units,
            requested,
            available,
            scale: post_read_scale,
        }
    });
    if let Some(warning) = &warning {
        warn!(file = %meta.file_path.display(), "{}", warning);
    }

    debug!(
        read_level,
        scale_x = post_read_scale.x,
        scale_y = post_read_scale.y,
        "selected read level"
    );

    Ok(LevelSelection {
        read_level,
        post_read_scale,
        warning,
    })
}

// =============================================================================
// Read plans
// =============================================================================

fn round_i64(value: f64) -> i64 {
    value.round() as i64
}

fn round_u32(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Round a pixel length, rejecting lengths that do not fit in `u32`.
fn checked_length(value: f64, resolution: f64, units: Units) -> Result<u32, ResolutionError> {
    let rounded = value.round();
    if rounded.is_finite() && rounded <= u32::MAX as f64 {
        Ok(rounded.max(0.0) as u32)
    } else {
        Err(ResolutionError::InvalidResolution {
            value: resolution,
            units: units.as_str(),
        })
    }
}

/// Level read length whose scaled, rounded size reproduces `output` exactly.
fn exact_read_length(
    output: u32,
    scale: f64,
    resolution: f64,
    units: Units,
) -> Result<u32, ResolutionError> {
    let estimate = checked_length(output as f64 / scale, resolution, units)?.max(1);
    let reproduces = |len: u32| round_u32(len as f64 * scale) == output;

    Ok([estimate, estimate.saturating_add(1), estimate - 1]
        .into_iter()
        .find(|&len| len >= 1 && reproduces(len))
        .unwrap_or(estimate))
}

/// Plan a read of exactly `size` output pixels.
///
/// `location` is the top-left corner in baseline pixels.
pub fn find_read_rect_params(
    meta: &SlideMetadata,
    location: (i64, i64),
    size: (u32, u32),
    resolution: Resolution,
    units: Units,
) -> Result<ReadPlan, ResolutionError> {
    if size.0 == 0 || size.1 == 0 {
        return Err(ResolutionError::InvalidBounds {
            left: location.0,
            top: location.1,
            right: location.0 + size.0 as i64,
            bottom: location.1 + size.1 as i64,
        });
    }

    let selection = find_optimal_level_and_downsample(meta, resolution, units)?;
    let downsample = meta.level_downsamples[selection.read_level];
    let scale = selection.post_read_scale;
    let (rx, ry) = resolution.xy();

    let plan = ReadPlan {
        read_level: selection.read_level,
        level_location: (
            round_i64(location.0 as f64 / downsample),
            round_i64(location.1 as f64 / downsample),
        ),
        level_read_size: (
            exact_read_length(size.0, scale.x, rx, units)?,
            exact_read_length(size.1, scale.y, ry, units)?,
        ),
        post_read_scale: scale,
        baseline_read_size: (
            checked_length(size.0 as f64 * downsample / scale.x, rx, units)?,
            checked_length(size.1 as f64 * downsample / scale.y, ry, units)?,
        ),
        output_size: size,
        warning: selection.warning,
    };
    debug!(?plan, "read_rect plan");
    Ok(plan)
}

/// Plan a read of the baseline `bounds = (left, top, right, bottom)`.
///
/// The output size comes from rounding at the read level, so it is not
/// guaranteed to be any particular caller-chosen value.
pub fn find_read_bounds_params(
    meta: &SlideMetadata,
    bounds: (i64, i64, i64, i64),
    resolution: Resolution,
    units: Units,
) -> Result<ReadPlan, ResolutionError> {
    let (left, top, right, bottom) = bounds;
    if right <= left || bottom <= top {
        return Err(ResolutionError::InvalidBounds {
            left,
            top,
            right,
            bottom,
        });
    }

    let selection = find_optimal_level_and_downsample(meta, resolution, units)?;
    let downsample = meta.level_downsamples[selection.read_level];
    let scale = selection.post_read_scale;
    let (rx, ry) = resolution.xy();

    let level_read_size = (
        round_u32((right - left) as f64 / downsample).max(1),
        round_u32((bottom - top) as f64 / downsample).max(1),
    );

    let plan = ReadPlan {
        read_level: selection.read_level,
        level_location: (
            round_i64(left as f64 / downsample),
            round_i64(top as f64 / downsample),
        ),
        level_read_size,
        post_read_scale: scale,
        baseline_read_size: ((right - left) as u32, (bottom - top) as u32),
        output_size: (
            checked_length(level_read_size.0 as f64 * scale.x, rx, units)?.max(1),
            checked_length(level_read_size.1 as f64 * scale.y, ry, units)?.max(1),
        ),
        warning: selection.warning,
    };
    debug!(?plan, "read_bounds plan");
    Ok(plan)
}

// =============================================================================
// Tests
// =============================================================================
