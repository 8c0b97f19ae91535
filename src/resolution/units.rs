//! Resolution units and values.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::ResolutionError;

/// Unit system a resolution value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// Pyramid level index, possibly fractional
    Level,

    /// Microns per pixel
    Mpp,

    /// Objective magnification
    Power,

    /// Multiple of the baseline (level 0) resolution
    Baseline,
}

impl Units {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Units::Level => "level",
            Units::Mpp => "mpp",
            Units::Power => "power",
            Units::Baseline => "baseline",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "level" => Ok(Units::Level),
            "mpp" => Ok(Units::Mpp),
            "power" => Ok(Units::Power),
            "baseline" => Ok(Units::Baseline),
            other => Err(ResolutionError::InvalidUnits(other.to_string())),
        }
    }
}

/// A requested resolution: one value for both axes or one per axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    Uniform(f64),
    PerAxis(f64, f64),
}

impl Resolution {
    /// `(x, y)` values.
    pub fn xy(&self) -> (f64, f64) {
        match *self {
            Resolution::Uniform(v) => (v, v),
            Resolution::PerAxis(x, y) => (x, y),
        }
    }
}

impl From<f64> for Resolution {
    fn from(value: f64) -> Self {
        Resolution::Uniform(value)
    }
}

impl From<(f64, f64)> for Resolution {
    fn from((x, y): (f64, f64)) -> Self {
        Resolution::PerAxis(x, y)
    }
}

/// Per-axis scale factor: output pixels per pixel of a stored level.
///
/// A scale below 1 means the level is finer than requested and is shrunk;
/// above 1 means it must be enlarged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Scale { x, y }
    }

    /// Round both axes to `decimals` places.
    pub fn rounded(&self, decimals: i32) -> Scale {
        let factor = 10f64.powi(decimals);
        Scale {
            x: (self.x * factor).round() / factor,
            y: (self.y * factor).round() / factor,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
