//! Format detection for slide files.
//!
//! Detection looks at magic bytes first, then at vendor markers:
//!
//! - **JPEG 2000**: JP2 signature box or a raw J2K codestream (SOC + SIZ)
//! - **Aperio SVS**: TIFF whose first ImageDescription starts with "Aperio"
//! - **Generic Pyramidal TIFF**: any other TIFF or BigTIFF

use tracing::debug;

use crate::error::FormatError;
use crate::io::RangeReader;

use super::jp2::{is_j2k_codestream, is_jp2_signature, JP2_SIGNATURE_LEN};
use super::svs::is_aperio_description;
use super::tiff::{
    ByteOrder, Ifd, TiffHeader, TiffTag, ValueReader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE,
};

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlideFormat {
    /// Aperio SVS (TIFF with abbreviated JPEG tiles)
    AperioSvs,

    /// Generic tiled pyramidal TIFF or BigTIFF
    GenericTiff,

    /// JP2 file or raw J2K codestream
    Jpeg2000,
}

impl SlideFormat {
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
            SlideFormat::Jpeg2000 => "JPEG 2000",
        }
    }

    /// Value of the `wsi.vendor` property for slides of this format.
    pub const fn vendor(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "aperio",
            SlideFormat::GenericTiff => "generic-tiff",
            SlideFormat::Jpeg2000 => "omnyx",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Bytes needed to tell every supported container apart.
const MIN_HEADER_BYTES: usize = BIGTIFF_HEADER_SIZE;

/// Detect the format of a slide file.
pub fn detect_format<R: RangeReader>(reader: &R) -> Result<SlideFormat, FormatError> {
    if reader.size() < TIFF_HEADER_SIZE as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: "File too small to be a slide".to_string(),
        });
    }

    let probe_len = (JP2_SIGNATURE_LEN.max(MIN_HEADER_BYTES) as u64).min(reader.size()) as usize;
    let probe = reader.read_exact_at(0, probe_len)?;

    let format = if is_jp2_signature(&probe) || is_j2k_codestream(&probe) {
        SlideFormat::Jpeg2000
    } else if is_tiff_header(&probe) {
        let header = TiffHeader::parse(&probe, reader.size())?;
        detect_tiff_flavor(reader, &header)?
    } else {
        return Err(FormatError::UnsupportedFormat {
            reason: format!(
                "{} is neither a TIFF nor a JPEG 2000 file",
                reader.identifier()
            ),
        });
    };

    debug!(file = reader.identifier(), format = format.name(), "detected slide format");
    Ok(format)
}

/// Tell SVS from generic TIFF by the first IFD's ImageDescription.
fn detect_tiff_flavor<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
) -> Result<SlideFormat, FormatError> {
    let count_bytes = reader.read_exact_at(header.first_ifd_offset, header.ifd_count_size())?;
    let entry_count = if header.is_bigtiff {
        header.byte_order.read_u64(&count_bytes)
    } else {
        header.byte_order.read_u16(&count_bytes) as u64
    };

    let ifd_size = Ifd::calculate_size(entry_count, header);
    let ifd_bytes = reader.read_exact_at(header.first_ifd_offset, ifd_size)?;
    let ifd = Ifd::parse(&ifd_bytes, header)?;

    if let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) {
        let description = ValueReader::new(reader, header).read_string(entry)?;
        if is_aperio_description(&description) {
            return Ok(SlideFormat::AperioSvs);
        }
    }

    Ok(SlideFormat::GenericTiff)
}

/// Quick check for TIFF or BigTIFF magic and version.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    let version = byte_order.read_u16(&bytes[2..4]);
    version == 42 || version == 43
}

// =============================================================================
// Tests
// =============================================================================
