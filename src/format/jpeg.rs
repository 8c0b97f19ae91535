//! JPEG stream handling for tiled slides.
//!
//! # Abbreviated JPEG Streams
//!
//! SVS and many pyramidal TIFFs store tiles as abbreviated JPEG streams:
//! the quantization (DQT) and Huffman (DHT) tables are written once in the
//! `JPEGTables` tag and left out of every tile. Before decoding, the tables
//! are spliced into the tile:
//!
//! ```text
//! tables:  SOI  DQT DHT ...  EOI
//! tile:    SOI  SOS <scan>   EOI
//! merged:  SOI  DQT DHT ...  SOS <scan> EOI
//! ```

use std::io::Cursor;

use bytes::{Bytes, BytesMut};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageReader, RgbImage};

use crate::error::BackendError;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Default quality for JPEG files written by this crate.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

// =============================================================================
// JPEG Stream Analysis
// =============================================================================

/// Whether `data` reaches its SOS marker without any DQT or DHT segment.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return false;
        }
        if marker == SOS {
            return true;
        }

        // Skip the segment body when it has a length field
        if pos + 3 < data.len() && marker[1] != 0x00 && marker[1] != 0xD8 && marker[1] != 0xD9 {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        } else {
            pos += 2;
        }
    }

    false
}

/// Whether `data` starts with SOI and carries a DQT segment.
pub fn is_complete_stream(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }
    data[2..].windows(2).any(|w| w == DQT)
}

// =============================================================================
// JPEG Tables Merging
// =============================================================================

/// Splice `JPEGTables` into an abbreviated tile stream.
///
/// The EOI of the tables and the SOI of the tile are dropped, so the result
/// has exactly one of each.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.len() >= 2 && tables[tables.len() - 2..] == EOI {
        tables.len() - 2
    } else {
        tables.len()
    };

    let tile_start = if tile_data.len() >= 2 && tile_data[0..2] == SOI {
        2
    } else {
        0
    };

    let mut result = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&tile_data[tile_start..]);
    result.freeze()
}

/// Make a tile stream decodable, merging tables only when the tile needs them.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    if is_complete_stream(tile_data) {
        return Bytes::copy_from_slice(tile_data);
    }

    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}

// =============================================================================
// Decode / Encode
// =============================================================================

/// Decode a complete JPEG stream into 8-bit RGB.
///
/// Grayscale and CMYK sources are converted.
pub fn decode_rgb(data: &[u8]) -> Result<RgbImage, BackendError> {
    let reader = ImageReader::with_format(Cursor::new(data), image::ImageFormat::Jpeg);
    let img = reader.decode().map_err(|e| BackendError::Decode {
        message: e.to_string(),
    })?;
    Ok(img.into_rgb8())
}

/// Encode an RGB image as a baseline JPEG.
pub fn encode_rgb(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(output)
}

// =============================================================================
// Tests
// =============================================================================
