//! Backend trait for format-agnostic pixel access.
//!
//! A backend owns an open slide file and answers two kinds of questions:
//! what the pyramid looks like ([`PyramidGeometry`], [`SlideProperties`]) and
//! what the pixels of a level-frame window are ([`SlideBackend::decode`]).
//! Scale negotiation lives above this layer, in the region reader.

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::error::{BackendError, FormatError};
use crate::format::{detect_format, SlideFormat};
use crate::io::FileRangeReader;

use super::jp2_slide::Jp2Slide;
use super::metadata::{PyramidGeometry, SlideProperties};
use super::tiff_slide::TiffSlide;

/// White, used for every pixel outside the stored image.
pub const BACKGROUND: image::Rgb<u8> = image::Rgb([255, 255, 255]);

// =============================================================================
// SlideBackend Trait
// =============================================================================

/// Format-specific binding behind the region reader.
pub trait SlideBackend {
    fn format(&self) -> SlideFormat;

    fn file_path(&self) -> &Path;

    /// Stored level sizes and downsamples, level 0 first.
    fn geometry(&self) -> &PyramidGeometry;

    fn properties(&self) -> &SlideProperties;

    /// Mutable access to the raw properties.
    ///
    /// Metadata derived from them goes stale until the reader is refreshed.
    fn properties_mut(&mut self) -> &mut SlideProperties;

    /// Decode a window of one stored level.
    ///
    /// `location` is in the level's own pixel frame and may be negative or
    /// extend past the edge; those pixels are white. The result is exactly
    /// `size`.
    fn decode(
        &self,
        level: usize,
        location: (i64, i64),
        size: (u32, u32),
    ) -> Result<RgbImage, BackendError>;

    /// Whole-slide overview. Decodes the coarsest level unless overridden.
    fn thumbnail(&self) -> Result<RgbImage, BackendError> {
        let geometry = self.geometry();
        let level = geometry
            .level_count()
            .checked_sub(1)
            .ok_or(BackendError::LevelOutOfRange {
                level: 0,
                level_count: 0,
            })?;
        self.decode(level, (0, 0), geometry.level_dimensions[level])
    }
}

/// Check a level index against a geometry.
pub(crate) fn check_level(geometry: &PyramidGeometry, level: usize) -> Result<(), BackendError> {
    if level < geometry.level_count() {
        Ok(())
    } else {
        Err(BackendError::LevelOutOfRange {
            level,
            level_count: geometry.level_count(),
        })
    }
}

/// Intersection of `[start, start + len)` with `[0, extent)`, as
/// `(first, last_exclusive)`; `None` if empty.
pub(crate) fn clip_span(start: i64, len: u32, extent: u32) -> Option<(i64, i64)> {
    let first = start.max(0);
    let last = (start + len as i64).min(extent as i64);
    (first < last).then_some((first, last))
}

// =============================================================================
// AnySlide
// =============================================================================

/// Any backend this crate can open from a path.
#[derive(Debug)]
pub enum AnySlide {
    Tiff(TiffSlide<FileRangeReader>),
    Jp2(Jp2Slide),
}

/// Detect the format of `path` and open the matching backend.
pub fn open_slide(path: impl AsRef<Path>) -> Result<AnySlide, FormatError> {
    let path = path.as_ref();
    let reader = FileRangeReader::open(path)?;
    let format = detect_format(&reader)?;
    debug!(path = %path.display(), format = format.name(), "opening slide");

    match format {
        SlideFormat::AperioSvs | SlideFormat::GenericTiff => {
            Ok(AnySlide::Tiff(TiffSlide::open(reader, path, format)?))
        }
        SlideFormat::Jpeg2000 => Ok(AnySlide::Jp2(Jp2Slide::open(reader, path)?)),
    }
}

macro_rules! dispatch {
    ($self:expr, $slide:ident => $body:expr) => {
        match $self {
            AnySlide::Tiff($slide) => $body,
            AnySlide::Jp2($slide) => $body,
        }
    };
}

impl SlideBackend for AnySlide {
    fn format(&self) -> SlideFormat {
        dispatch!(self, s => s.format())
    }

    fn file_path(&self) -> &Path {
        dispatch!(self, s => s.file_path())
    }

    fn geometry(&self) -> &PyramidGeometry {
        dispatch!(self, s => s.geometry())
    }

    fn properties(&self) -> &SlideProperties {
        dispatch!(self, s => s.properties())
    }

    fn properties_mut(&mut self) -> &mut SlideProperties {
        dispatch!(self, s => s.properties_mut())
    }

    fn decode(
        &self,
        level: usize,
        location: (i64, i64),
        size: (u32, u32),
    ) -> Result<RgbImage, BackendError> {
        dispatch!(self, s => s.decode(level, location, size))
    }

    fn thumbnail(&self) -> Result<RgbImage, BackendError> {
        dispatch!(self, s => s.thumbnail())
    }
}
