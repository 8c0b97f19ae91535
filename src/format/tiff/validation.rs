//! Checks that a parsed TIFF pyramid is one we can decode.
//!
//! # Supported Subset
//!
//! - **Organization**: tiled levels only
//! - **Compression**: JPEG only
//! - **Structure**: every level carries tile offsets and byte counts
//!
//! Files outside this subset are rejected when the slide is opened rather
//! than on the first read.

use tracing::debug;

use crate::error::TiffError;

use super::parser::Ifd;
use super::pyramid::{PyramidLevel, TiffPyramid};
use super::tags::Compression;

/// Validate a whole pyramid.
///
/// A file with no tiled level fails with `StripOrganization` when it stores
/// its image in strips, `NoPyramidLevels` otherwise.
pub fn validate_pyramid(pyramid: &TiffPyramid) -> Result<(), TiffError> {
    if pyramid.levels.is_empty() {
        let stripped = pyramid.other_ifds.iter().any(|(_, ifd)| is_strip_only(ifd));
        return Err(if stripped {
            TiffError::StripOrganization
        } else {
            TiffError::NoPyramidLevels
        });
    }

    for level in &pyramid.levels {
        validate_level(level)?;
    }

    debug!(levels = pyramid.levels.len(), "TIFF pyramid validated");
    Ok(())
}

/// Validate a single pyramid level.
pub fn validate_level(level: &PyramidLevel) -> Result<(), TiffError> {
    check_compression(level.compression)?;

    if level.tile_offsets_entry.is_none() {
        return Err(TiffError::MissingTag("TileOffsets"));
    }
    if level.tile_byte_counts_entry.is_none() {
        return Err(TiffError::MissingTag("TileByteCounts"));
    }

    if level.tile_width == 0 || level.tile_height == 0 {
        return Err(TiffError::InvalidTagValue {
            tag: "TileWidth/TileLength",
            message: "Tile dimensions cannot be zero".to_string(),
        });
    }

    Ok(())
}

/// Accept JPEG, reject every other compression code with its name.
pub fn check_compression(value: u16) -> Result<(), TiffError> {
    match Compression::from_u16(value) {
        Some(compression) if compression.is_supported() => Ok(()),
        Some(compression) => Err(TiffError::UnsupportedCompression(
            compression.name().to_string(),
        )),
        None => Err(TiffError::UnsupportedCompression(format!(
            "Unknown ({})",
            value
        ))),
    }
}

fn is_strip_only(ifd: &Ifd) -> bool {
    ifd.is_stripped() && !ifd.is_tiled()
}

// =============================================================================
// Tests
// =============================================================================
