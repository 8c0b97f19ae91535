//! TIFF-family backend: Aperio SVS and generic tiled pyramidal TIFF.
//!
//! # Supported Files
//!
//! - Tiled organization (strip-only files are rejected at open)
//! - JPEG compression, with or without shared JPEGTables
//! - TIFF or BigTIFF, either byte order
//!
//! Decoding reads every tile the requested window touches, merges the
//! level's JPEGTables into abbreviated tile streams, and pastes the decoded
//! tiles onto a white canvas.

use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use tracing::{debug, trace};

use crate::error::{BackendError, TiffError};
use crate::format::jpeg::{decode_rgb, prepare_tile_jpeg};
use crate::format::svs::SvsMetadata;
use crate::format::tiff::{
    resolution_unit_name, validate_pyramid, PyramidLevel, TiffPyramid, TiffTag, TileData,
    ValueReader,
};
use crate::format::SlideFormat;
use crate::io::RangeReader;

use super::backend::{check_level, clip_span, SlideBackend, BACKGROUND};
use super::metadata::{keys, PyramidGeometry, SlideProperties};

// =============================================================================
// TiffSlide
// =============================================================================

/// An open SVS or pyramidal TIFF slide.
#[derive(Debug)]
pub struct TiffSlide<R> {
    reader: R,
    file_path: PathBuf,
    format: SlideFormat,
    pyramid: TiffPyramid,

    /// Tile offset tables, one per pyramid level
    tiles: Vec<TileData>,

    geometry: PyramidGeometry,
    properties: SlideProperties,
}

impl<R: RangeReader> TiffSlide<R> {
    /// Parse the pyramid, validate it and load every level's tile tables.
    ///
    /// # Errors
    ///
    /// Fails if the file is not a valid TIFF, uses strips or a compression
    /// other than JPEG, or has no tiled pyramid level.
    pub fn open(
        reader: R,
        file_path: impl AsRef<Path>,
        format: SlideFormat,
    ) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::parse(&reader)?;
        validate_pyramid(&pyramid)?;

        let tiles = pyramid
            .levels
            .iter()
            .map(|level| TileData::load(&reader, level, &pyramid.header))
            .collect::<Result<Vec<_>, _>>()?;

        let geometry = PyramidGeometry::new(
            pyramid.levels.iter().map(|l| (l.width, l.height)).collect(),
            pyramid.levels.iter().map(|l| l.downsample).collect(),
        );

        let properties = read_properties(&reader, &pyramid, format)?;

        debug!(
            file = reader.identifier(),
            format = format.name(),
            levels = pyramid.levels.len(),
            properties = properties.len(),
            "opened TIFF slide"
        );

        Ok(TiffSlide {
            reader,
            file_path: file_path.as_ref().to_path_buf(),
            format,
            pyramid,
            tiles,
            geometry,
            properties,
        })
    }

    /// The parsed pyramid structure.
    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    /// Read and decode one tile. Returns `None` for sparse (empty) tiles.
    fn read_tile(
        &self,
        level: &PyramidLevel,
        tiles: &TileData,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<Option<RgbImage>, BackendError> {
        let index = level
            .tile_index(tile_x, tile_y)
            .ok_or_else(|| BackendError::Decode {
                message: format!("tile ({tile_x}, {tile_y}) outside the tile grid"),
            })?;

        let (offset, byte_count) =
            tiles
                .get_tile_location(index)
                .ok_or_else(|| BackendError::Decode {
                    message: format!("no offset for tile {index}"),
                })?;
        if byte_count == 0 {
            return Ok(None);
        }

        trace!(level = level.level_index, tile_x, tile_y, offset, byte_count, "reading tile");
        let data = self.reader.read_exact_at(offset, byte_count as usize)?;
        let jpeg = prepare_tile_jpeg(tiles.jpeg_tables.as_deref(), &data);
        decode_rgb(&jpeg).map(Some)
    }
}

impl<R: RangeReader> SlideBackend for TiffSlide<R> {
    fn format(&self) -> SlideFormat {
        self.format
    }

    fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }

    fn properties(&self) -> &SlideProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut SlideProperties {
        &mut self.properties
    }

    fn decode(
        &self,
        level: usize,
        location: (i64, i64),
        size: (u32, u32),
    ) -> Result<RgbImage, BackendError> {
        check_level(&self.geometry, level)?;
        let pyramid_level = &self.pyramid.levels[level];
        let tiles = &self.tiles[level];

        let mut canvas = RgbImage::from_pixel(size.0, size.1, BACKGROUND);

        let (Some((x0, x1)), Some((y0, y1))) = (
            clip_span(location.0, size.0, pyramid_level.width),
            clip_span(location.1, size.1, pyramid_level.height),
        ) else {
            return Ok(canvas);
        };

        let tw = pyramid_level.tile_width as i64;
        let th = pyramid_level.tile_height as i64;

        for tile_y in (y0 / th)..=((y1 - 1) / th) {
            for tile_x in (x0 / tw)..=((x1 - 1) / tw) {
                let (tile_x, tile_y) = (tile_x as u32, tile_y as u32);
                let Some(tile) = self.read_tile(pyramid_level, tiles, tile_x, tile_y)? else {
                    continue;
                };

                // Edge tiles are stored padded; drop what lies past the image
                let (w, h) = pyramid_level
                    .tile_dimensions(tile_x, tile_y)
                    .unwrap_or((0, 0));
                let visible = imageops::crop_imm(&tile, 0, 0, w, h).to_image();

                imageops::replace(
                    &mut canvas,
                    &visible,
                    tile_x as i64 * tw - location.0,
                    tile_y as i64 * th - location.1,
                );
            }
        }

        Ok(canvas)
    }
}

// =============================================================================
// Properties
// =============================================================================

/// Collect `tiff.*`, `aperio.*` and canonical `wsi.*` properties from the
/// level-0 IFD.
fn read_properties<R: RangeReader>(
    reader: &R,
    pyramid: &TiffPyramid,
    format: SlideFormat,
) -> Result<SlideProperties, TiffError> {
    let mut properties = SlideProperties::new();
    properties.insert(keys::VENDOR, format.vendor());

    let Some(base) = pyramid.base_level() else {
        return Ok(properties);
    };
    let ifd = &base.ifd;
    let values = ValueReader::new(reader, &pyramid.header);

    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::XResolution) {
        properties.insert(keys::TIFF_X_RESOLUTION, values.read_rational(entry)?);
    }
    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::YResolution) {
        properties.insert(keys::TIFF_Y_RESOLUTION, values.read_rational(entry)?);
    }
    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ResolutionUnit) {
        properties.insert(
            keys::TIFF_RESOLUTION_UNIT,
            resolution_unit_name(values.read_u32(entry)?),
        );
    }

    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        let description = values.read_string(entry)?;

        if format == SlideFormat::AperioSvs {
            let svs = SvsMetadata::parse(&description);
            for (key, value) in svs.prefixed_properties() {
                properties.insert(key, value);
            }
            if let Some(mpp) = svs.mpp {
                properties.insert(keys::MPP_X, mpp);
                properties.insert(keys::MPP_Y, mpp);
            }
            if let Some(power) = svs.magnification {
                properties.insert(keys::OBJECTIVE_POWER, power);
            }
        }

        properties.insert(keys::TIFF_IMAGE_DESCRIPTION, description);
    }

    Ok(properties)
}

// =============================================================================
// Tests
// =============================================================================
