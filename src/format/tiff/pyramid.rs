//! Pyramid level identification.
//!
//! A slide TIFF holds more IFDs than pyramid levels: SVS files add a
//! stripped thumbnail, a label and a macro image. Levels are the tiled
//! IFDs whose dimensions shrink consistently from the largest one.
//!
//! # Identification Heuristics
//!
//! 1. The IFD is tiled and carries TileOffsets/TileByteCounts
//! 2. The largest tiled image is level 0
//! 3. Every further level is strictly smaller than the previous one on both
//!    axes, and its two axes agree on a single downsample factor (this
//!    drops tiled macro images with a different aspect ratio)

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs followed along the chain
const MAX_IFDS: usize = 100;

/// Relative disagreement allowed between a level's actual size and the size
/// its mean downsample predicts
const AXIS_TOLERANCE: f64 = 0.02;

// =============================================================================
// PyramidLevel
// =============================================================================

/// A single level in the image pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// 0 = highest resolution
    pub level_index: usize,

    /// Position of the IFD in the file's IFD chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub tile_count: u32,

    /// Mean of the per-axis size ratios against level 0
    pub downsample: f64,

    /// Raw compression code (7 = JPEG)
    pub compression: u16,

    pub ifd: Ifd,

    pub tile_offsets_entry: Option<IfdEntry>,
    pub tile_byte_counts_entry: Option<IfdEntry>,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Returns `None` if the IFD lacks tile or image dimensions.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order)?;
        let tile_height = ifd.tile_height(byte_order)?;
        let width = ifd.image_width(byte_order)?;
        let height = ifd.image_height(byte_order)?;

        if tile_width == 0 || tile_height == 0 || width == 0 || height == 0 {
            return None;
        }

        // Compression defaults to none per TIFF 6.0
        let compression = ifd.compression(byte_order).unwrap_or(1);

        let tiles_x = width.div_ceil(tile_width);
        let tiles_y = height.div_ceil(tile_height);

        let tile_offsets_entry = ifd.get_entry_by_tag(TiffTag::TileOffsets).cloned();
        let tile_byte_counts_entry = ifd.get_entry_by_tag(TiffTag::TileByteCounts).cloned();
        let jpeg_tables_entry = ifd.get_entry_by_tag(TiffTag::JpegTables).cloned();

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x,
            tiles_y,
            tile_count: tiles_x * tiles_y,
            downsample: 1.0,
            compression,
            ifd,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry,
        })
    }

    pub fn has_tile_data(&self) -> bool {
        self.tile_offsets_entry.is_some() && self.tile_byte_counts_entry.is_some()
    }

    /// Row-major tile index, `None` outside the tile grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    /// Pixel size of a tile clipped to the image. Edge tiles may be smaller.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        let w = (self.width - tile_x * self.tile_width).min(self.tile_width);
        let h = (self.height - tile_y * self.tile_height).min(self.tile_height);
        Some((w, h))
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// A parsed TIFF image pyramid, level 0 first.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    pub levels: Vec<PyramidLevel>,

    /// IFDs that are not pyramid levels (thumbnail, label, macro)
    pub other_ifds: Vec<(usize, Ifd)>,
}

impl TiffPyramid {
    /// Read every IFD of the file and identify the pyramid levels.
    pub fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header)?;
        Ok(Self::build_pyramid(header, ifds))
    }

    fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut visited = Vec::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if offset >= reader.size() || visited.contains(&offset) {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            visited.push(offset);

            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size())?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    fn build_pyramid(header: TiffHeader, ifds: Vec<Ifd>) -> Self {
        let byte_order = header.byte_order;

        let mut candidates: Vec<PyramidLevel> = Vec::new();
        let mut other_ifds: Vec<(usize, Ifd)> = Vec::new();

        for (ifd_index, ifd) in ifds.into_iter().enumerate() {
            match PyramidLevel::from_ifd(ifd.clone(), ifd_index, byte_order) {
                Some(level) if level.has_tile_data() => candidates.push(level),
                _ => other_ifds.push((ifd_index, ifd)),
            }
        }

        // Largest first; ties keep file order
        candidates.sort_by(|a, b| {
            let area_a = (a.width as u64) * (a.height as u64);
            let area_b = (b.width as u64) * (b.height as u64);
            area_b.cmp(&area_a)
        });

        let (levels, rejected) = Self::filter_pyramid_levels(candidates);
        other_ifds.extend(rejected.into_iter().map(|l| (l.ifd_index, l.ifd)));

        debug!(
            levels = levels.len(),
            other_ifds = other_ifds.len(),
            "identified TIFF pyramid"
        );

        TiffPyramid {
            header,
            levels,
            other_ifds,
        }
    }

    /// Keep the candidates that form a consistent pyramid below the largest.
    fn filter_pyramid_levels(
        candidates: Vec<PyramidLevel>,
    ) -> (Vec<PyramidLevel>, Vec<PyramidLevel>) {
        let mut levels: Vec<PyramidLevel> = Vec::new();
        let mut rejected = Vec::new();

        for mut level in candidates {
            let Some(base) = levels.first() else {
                levels.push(level);
                continue;
            };

            let downsample_x = base.width as f64 / level.width as f64;
            let downsample_y = base.height as f64 / level.height as f64;
            let downsample = (downsample_x + downsample_y) / 2.0;

            let previous = &levels[levels.len() - 1];
            let shrinks = level.width < previous.width && level.height < previous.height;

            if shrinks
                && Self::is_consistent_axis(base.width, level.width, downsample)
                && Self::is_consistent_axis(base.height, level.height, downsample)
            {
                level.level_index = levels.len();
                level.downsample = downsample;
                levels.push(level);
            } else {
                rejected.push(level);
            }
        }

        (levels, rejected)
    }

    /// Whether `actual` is what `base / downsample` predicts, within rounding.
    fn is_consistent_axis(base: u32, actual: u32, downsample: f64) -> bool {
        let expected = base as f64 / downsample;
        let slack = (actual as f64 * AXIS_TOLERANCE).max(1.0);
        (expected - actual as f64).abs() <= slack
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    pub fn base_level(&self) -> Option<&PyramidLevel> {
        self.levels.first()
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.base_level().map(|l| (l.width, l.height))
    }
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Tile offset tables and shared JPEG tables of one level.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    pub fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let value_reader = ValueReader::new(reader, header);

        let offsets = match level.tile_offsets_entry {
            Some(ref entry) => value_reader.read_u64_array(entry)?,
            None => return Err(TiffError::MissingTag("TileOffsets")),
        };

        let byte_counts = match level.tile_byte_counts_entry {
            Some(ref entry) => value_reader.read_u64_array(entry)?,
            None => return Err(TiffError::MissingTag("TileByteCounts")),
        };

        if offsets.len() < level.tile_count as usize || byte_counts.len() < offsets.len() {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "level {} needs {} tiles, found {} offsets and {} byte counts",
                    level.level_index,
                    level.tile_count,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match level.jpeg_tables_entry {
            Some(ref entry) => Some(value_reader.read_bytes(entry)?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// `(offset, byte_count)` of a tile.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
