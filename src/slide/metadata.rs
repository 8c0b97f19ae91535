//! Canonical slide metadata.
//!
//! Backends report raw geometry ([`PyramidGeometry`]) and a flat string
//! property map ([`SlideProperties`]). [`SlideMetadata::from_backend`] turns
//! the two into a validated snapshot with physical calibration resolved:
//!
//! 1. objective power from `wsi.objective-power`
//! 2. microns-per-pixel from `wsi.mpp-x`/`wsi.mpp-y`, falling back to the TIFF
//!    resolution tags
//! 3. a sanity check on the mpp range
//! 4. objective power inferred from mpp when it is not stored
//!
//! Every step that guesses or gives up produces a [`CalibrationWarning`],
//! returned with the metadata and logged at `warn` level.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::MetadataError;

// =============================================================================
// Property keys
// =============================================================================

/// Canonical property keys shared by every backend.
pub mod keys {
    pub const OBJECTIVE_POWER: &str = "wsi.objective-power";
    pub const MPP_X: &str = "wsi.mpp-x";
    pub const MPP_Y: &str = "wsi.mpp-y";
    pub const VENDOR: &str = "wsi.vendor";

    pub const TIFF_X_RESOLUTION: &str = "tiff.XResolution";
    pub const TIFF_Y_RESOLUTION: &str = "tiff.YResolution";
    pub const TIFF_RESOLUTION_UNIT: &str = "tiff.ResolutionUnit";
    pub const TIFF_IMAGE_DESCRIPTION: &str = "tiff.ImageDescription";
}

/// Objective magnifications an inferred power snaps to.
pub const COMMON_OBJECTIVE_POWERS: [f64; 12] =
    [1.0, 1.25, 2.0, 2.5, 4.0, 5.0, 10.0, 20.0, 40.0, 60.0, 90.0, 100.0];

/// Microns per pixel below this are treated as implausible.
pub const MIN_SENSIBLE_MPP: f64 = 0.1;

/// Microns per pixel at or above this are treated as implausible.
pub const MAX_SENSIBLE_MPP: f64 = 10.0;

// =============================================================================
// SlideProperties
// =============================================================================

/// Raw backend properties, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SlideProperties(BTreeMap<String, String>);

impl SlideProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse a property as a finite float.
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.0.insert(key.into(), value.to_string())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SlideProperties {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// =============================================================================
// PyramidGeometry
// =============================================================================

/// Level sizes and downsamples as reported by a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PyramidGeometry {
    pub level_dimensions: Vec<(u32, u32)>,
    pub level_downsamples: Vec<f64>,
}

impl PyramidGeometry {
    pub fn new(level_dimensions: Vec<(u32, u32)>, level_downsamples: Vec<f64>) -> Self {
        Self {
            level_dimensions,
            level_downsamples,
        }
    }

    /// Geometry whose downsamples are the mean of the per-axis size ratios.
    pub fn from_dimensions(level_dimensions: Vec<(u32, u32)>) -> Self {
        let level_downsamples = match level_dimensions.first() {
            Some(&(base_w, base_h)) => level_dimensions
                .iter()
                .map(|&(w, h)| {
                    (base_w as f64 / w.max(1) as f64 + base_h as f64 / h.max(1) as f64) / 2.0
                })
                .collect(),
            None => Vec::new(),
        };
        Self::new(level_dimensions, level_downsamples)
    }

    pub fn level_count(&self) -> usize {
        self.level_dimensions.len()
    }

    /// Check the invariants every reader relies on.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.level_dimensions.is_empty() {
            return Err(MetadataError::NoLevels);
        }
        if self.level_dimensions.len() != self.level_downsamples.len() {
            return Err(MetadataError::LevelTableMismatch {
                dimensions: self.level_dimensions.len(),
                downsamples: self.level_downsamples.len(),
            });
        }

        for (level, &(width, height)) in self.level_dimensions.iter().enumerate() {
            if width == 0 || height == 0 {
                return Err(MetadataError::EmptyLevel {
                    level,
                    width,
                    height,
                });
            }
        }

        if (self.level_downsamples[0] - 1.0).abs() > 1e-9 {
            return Err(MetadataError::InvalidBaselineDownsample(
                self.level_downsamples[0],
            ));
        }

        for level in 1..self.level_count() {
            let previous = self.level_dimensions[level - 1];
            let dimensions = self.level_dimensions[level];
            if dimensions.0 >= previous.0 || dimensions.1 >= previous.1 {
                return Err(MetadataError::NonDecreasingDimensions {
                    level,
                    dimensions,
                    previous,
                });
            }

            let previous = self.level_downsamples[level - 1];
            let downsample = self.level_downsamples[level];
            if !(downsample > previous) {
                return Err(MetadataError::NonMonotonicDownsample {
                    level,
                    downsample,
                    previous,
                });
            }
        }

        Ok(())
    }
}

// =============================================================================
// Warnings
// =============================================================================

/// A calibration value that was guessed, dropped or looks wrong.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationWarning {
    /// mpp derived from `tiff.XResolution`/`tiff.YResolution`
    MppFromTiffResolution { mpp: (f64, f64) },

    /// No usable mpp source
    MppUndetermined,

    /// mpp outside `[MIN_SENSIBLE_MPP, MAX_SENSIBLE_MPP)`; still used
    MppOutOfRange { mpp: (f64, f64) },

    /// Objective power snapped from `10 / mean(mpp)`
    ObjectivePowerInferred { objective_power: f64 },

    /// Neither objective power nor mpp is known
    ObjectivePowerUndetermined,
}

impl CalibrationWarning {
    pub fn message(&self) -> &'static str {
        match self {
            CalibrationWarning::MppFromTiffResolution { .. } => {
                "Falling back to TIFF resolution tag for microns-per-pixel (MPP)"
            }
            CalibrationWarning::MppUndetermined => "Unable to determine microns-per-pixel (MPP)",
            CalibrationWarning::MppOutOfRange { .. } => "MPP outside of sensible range",
            CalibrationWarning::ObjectivePowerInferred { .. } => {
                "Objective power inferred from microns-per-pixel (MPP)"
            }
            CalibrationWarning::ObjectivePowerUndetermined => "Unable to determine objective power",
        }
    }
}

impl fmt::Display for CalibrationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A value together with the calibration warnings raised while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub value: T,
    pub warnings: Vec<CalibrationWarning>,
}

// =============================================================================
// SlideMetadata
// =============================================================================

/// Validated, immutable description of an opened slide.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideMetadata {
    #[serde(serialize_with = "serialize_path")]
    pub file_path: PathBuf,
    pub slide_dimensions: (u32, u32),
    pub level_count: usize,
    pub level_dimensions: Vec<(u32, u32)>,
    pub level_downsamples: Vec<f64>,
    /// Baseline microns per pixel `(x, y)`
    pub mpp: Option<(f64, f64)>,
    pub objective_power: Option<f64>,
    pub vendor: Option<String>,
}

impl SlideMetadata {
    /// Single-level metadata with no calibration.
    pub fn new(slide_dimensions: (u32, u32)) -> Self {
        Self {
            file_path: PathBuf::new(),
            slide_dimensions,
            level_count: 1,
            level_dimensions: vec![slide_dimensions],
            level_downsamples: vec![1.0],
            mpp: None,
            objective_power: None,
            vendor: None,
        }
    }

    /// Build metadata from validated geometry and already-resolved calibration.
    pub fn from_parts(
        file_path: impl Into<PathBuf>,
        geometry: &PyramidGeometry,
        mpp: Option<(f64, f64)>,
        objective_power: Option<f64>,
        vendor: Option<String>,
    ) -> Result<Self, MetadataError> {
        geometry.validate()?;
        Ok(Self {
            file_path: file_path.into(),
            slide_dimensions: geometry.level_dimensions[0],
            level_count: geometry.level_count(),
            level_dimensions: geometry.level_dimensions.clone(),
            level_downsamples: geometry.level_downsamples.clone(),
            mpp,
            objective_power,
            vendor,
        })
    }

    /// Derive metadata from a backend's geometry and properties.
    pub fn from_backend(
        file_path: impl Into<PathBuf>,
        geometry: &PyramidGeometry,
        properties: &SlideProperties,
    ) -> Result<Resolved<Self>, MetadataError> {
        let file_path = file_path.into();
        let mut warnings = Vec::new();

        let stored_power = properties
            .get_f64(keys::OBJECTIVE_POWER)
            .filter(|p| *p > 0.0);

        let stored_mpp = match (
            properties.get_f64(keys::MPP_X).filter(|v| *v > 0.0),
            properties.get_f64(keys::MPP_Y).filter(|v| *v > 0.0),
        ) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        };

        let mpp = match stored_mpp {
            Some(mpp) => Some(mpp),
            None => match mpp_from_tiff_resolution(properties) {
                Some(mpp) => {
                    warnings.push(CalibrationWarning::MppFromTiffResolution { mpp });
                    Some(mpp)
                }
                None => {
                    warnings.push(CalibrationWarning::MppUndetermined);
                    None
                }
            },
        };

        if let Some((x, y)) = mpp {
            if !is_sensible_mpp(x) || !is_sensible_mpp(y) {
                warnings.push(CalibrationWarning::MppOutOfRange { mpp: (x, y) });
            }
        }

        let objective_power = match (stored_power, mpp) {
            (Some(power), _) => Some(power),
            (None, Some(mpp)) => {
                let power = mpp_to_common_objective_power(mpp);
                warnings.push(CalibrationWarning::ObjectivePowerInferred {
                    objective_power: power,
                });
                Some(power)
            }
            (None, None) => {
                warnings.push(CalibrationWarning::ObjectivePowerUndetermined);
                None
            }
        };

        for warning in &warnings {
            warn!(file = %file_path.display(), "{}", warning);
        }

        let vendor = properties.get(keys::VENDOR).map(str::to_string);
        let value = Self::from_parts(file_path, geometry, mpp, objective_power, vendor)?;
        Ok(Resolved { value, warnings })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Every attribute as a JSON object.
    pub fn as_dict(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(dict)) => dict,
            _ => Map::new(),
        }
    }
}

fn serialize_path<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&path.display())
}

// =============================================================================
// Calibration helpers
// =============================================================================

fn is_sensible_mpp(value: f64) -> bool {
    (MIN_SENSIBLE_MPP..MAX_SENSIBLE_MPP).contains(&value)
}

/// Microns in one resolution unit, for the unit names TIFF backends report.
pub fn microns_per_unit(unit: &str) -> Option<f64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "meter" | "m" => Some(1e6),
        "centimeter" | "cm" => Some(1e4),
        "millimeter" | "mm" => Some(1e3),
        "inch" | "in" => Some(25400.0),
        "micrometer" | "um" | "micron" => Some(1.0),
        _ => None,
    }
}

/// Convert pixels-per-unit to microns-per-pixel.
pub fn ppu_to_mpp(pixels_per_unit: f64, unit: &str) -> Option<f64> {
    if !(pixels_per_unit.is_finite() && pixels_per_unit > 0.0) {
        return None;
    }
    Some(microns_per_unit(unit)? / pixels_per_unit)
}

fn mpp_from_tiff_resolution(properties: &SlideProperties) -> Option<(f64, f64)> {
    let unit = properties.get(keys::TIFF_RESOLUTION_UNIT)?;
    let x = ppu_to_mpp(properties.get_f64(keys::TIFF_X_RESOLUTION)?, unit)?;
    let y = ppu_to_mpp(properties.get_f64(keys::TIFF_Y_RESOLUTION)?, unit)?;
    Some((x, y))
}

/// Snap `10 / mean(mpp)` to the nearest common objective power.
pub fn mpp_to_common_objective_power(mpp: (f64, f64)) -> f64 {
    let approx = 10.0 / ((mpp.0 + mpp.1) / 2.0);
    COMMON_OBJECTIVE_POWERS
        .iter()
        .copied()
        .min_by(|a, b| (a - approx).abs().total_cmp(&(b - approx).abs()))
        .unwrap_or(approx)
}

// =============================================================================
// Tests
// =============================================================================
