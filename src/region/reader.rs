//! Resolution-aware region reader.
//!
//! [`WsiReader`] owns a backend and the metadata derived from it. Each read
//! is planned by the resolver, decoded at the chosen level and resized to
//! the planned output size:
//!
//! ```text
//! request ──► ReadPlan ──► backend.decode(level, location, size) ──► resize ──► PixelArray
//! ```

use std::path::Path;

use tracing::debug;

use crate::error::{FormatError, MetadataError, ReadError, ResolutionError};
use crate::resolution::{self, LevelScales, LevelSelection, ReadPlan, Resolution, Units};
use crate::slide::{
    open_slide, AnySlide, CalibrationWarning, SlideBackend, SlideMetadata, SlideProperties,
};

use super::pixels::{resize_rgb, PixelArray};

/// Objective power used by [`WsiReader::get_thumbnail`] when the slide is
/// calibrated.
pub const THUMBNAIL_POWER: f64 = 1.25;

/// Region reader over one open slide.
#[derive(Debug)]
pub struct WsiReader<B> {
    backend: B,
    metadata: SlideMetadata,
    warnings: Vec<CalibrationWarning>,
}

impl WsiReader<AnySlide> {
    /// Detect the format of `path` and open it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let backend = open_slide(path)?;
        Ok(Self::from_backend(backend)?)
    }
}

impl<B: SlideBackend> WsiReader<B> {
    /// Wrap an open backend, deriving its metadata.
    pub fn from_backend(backend: B) -> Result<Self, MetadataError> {
        let resolved = SlideMetadata::from_backend(
            backend.file_path(),
            backend.geometry(),
            backend.properties(),
        )?;
        Ok(WsiReader {
            backend,
            metadata: resolved.value,
            warnings: resolved.warnings,
        })
    }

    /// Metadata snapshot as of the last open or refresh.
    pub fn info(&self) -> &SlideMetadata {
        &self.metadata
    }

    /// Warnings raised while deriving the current metadata.
    pub fn calibration_warnings(&self) -> &[CalibrationWarning] {
        &self.warnings
    }

    /// Re-derive metadata from the backend. Warnings are raised again.
    pub fn refresh(&mut self) -> Result<&SlideMetadata, MetadataError> {
        let resolved = SlideMetadata::from_backend(
            self.backend.file_path(),
            self.backend.geometry(),
            self.backend.properties(),
        )?;
        self.metadata = resolved.value;
        self.warnings = resolved.warnings;
        Ok(&self.metadata)
    }

    /// Edit the backend's properties, then refresh.
    pub fn update_properties<F>(&mut self, edit: F) -> Result<&SlideMetadata, MetadataError>
    where
        F: FnOnce(&mut SlideProperties),
    {
        edit(self.backend.properties_mut());
        self.refresh()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Direct backend access. Call [`WsiReader::refresh`] after changing
    /// properties.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    // -------------------------------------------------------------------------
    // Resolver delegation
    // -------------------------------------------------------------------------

    pub fn relative_level_scales(
        &self,
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<LevelScales, ResolutionError> {
        resolution::relative_level_scales(&self.metadata, resolution.into(), units)
    }

    pub fn find_optimal_level_and_downsample(
        &self,
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<LevelSelection, ResolutionError> {
        resolution::find_optimal_level_and_downsample(&self.metadata, resolution.into(), units)
    }

    pub fn find_read_rect_params(
        &self,
        location: (i64, i64),
        size: (u32, u32),
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<ReadPlan, ResolutionError> {
        resolution::find_read_rect_params(&self.metadata, location, size, resolution.into(), units)
    }

    pub fn find_read_bounds_params(
        &self,
        bounds: (i64, i64, i64, i64),
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<ReadPlan, ResolutionError> {
        resolution::find_read_bounds_params(&self.metadata, bounds, resolution.into(), units)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Read exactly `size` pixels at `resolution`, starting at the baseline
    /// pixel `location`.
    pub fn read_rect(
        &self,
        location: (i64, i64),
        size: (u32, u32),
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<PixelArray, ReadError> {
        let plan = self.find_read_rect_params(location, size, resolution, units)?;
        self.execute(&plan)
    }

    /// Read the baseline region `(left, top, right, bottom)` at `resolution`.
    ///
    /// The output size is the region's size at the read level, rounded, times
    /// the residual scale.
    pub fn read_bounds(
        &self,
        bounds: (i64, i64, i64, i64),
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<PixelArray, ReadError> {
        let plan = self.find_read_bounds_params(bounds, resolution, units)?;
        self.execute(&plan)
    }

    /// The whole slide at `resolution`.
    pub fn slide_thumbnail(
        &self,
        resolution: impl Into<Resolution>,
        units: Units,
    ) -> Result<PixelArray, ReadError> {
        let (width, height) = self.metadata.slide_dimensions;
        self.read_bounds((0, 0, width as i64, height as i64), resolution, units)
    }

    /// The whole slide at 1.25x, or at the coarsest level when the objective
    /// power is unknown.
    pub fn get_thumbnail(&self) -> Result<PixelArray, ReadError> {
        match self.metadata.objective_power {
            Some(_) => self.slide_thumbnail(THUMBNAIL_POWER, Units::Power),
            None => {
                let coarsest = self.metadata.level_count.saturating_sub(1);
                self.slide_thumbnail(coarsest as f64, Units::Level)
            }
        }
    }

    /// Decode the planned window and resize it to the output size.
    fn execute(&self, plan: &ReadPlan) -> Result<PixelArray, ReadError> {
        debug!(
            level = plan.read_level,
            x = plan.level_location.0,
            y = plan.level_location.1,
            width = plan.level_read_size.0,
            height = plan.level_read_size.1,
            "decoding region"
        );
        let decoded = self.backend.decode(
            plan.read_level,
            plan.level_location,
            plan.level_read_size,
        )?;
        let (width, height) = plan.output_size;
        Ok(PixelArray::new(resize_rgb(&decoded, width, height)))
    }
}

// =============================================================================
// Tests
// =============================================================================
