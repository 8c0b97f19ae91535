//! JPEG 2000 container and codestream header parsing.
//!
//! Only the headers are parsed here; pixel decoding goes through OpenJPEG.
//!
//! # JP2 boxes
//!
//! ```text
//! LBox (u32 BE) | TBox (4 CC) | [XLBox (u64 BE) when LBox == 1] | payload
//! ```
//!
//! The file opens with the 12-byte signature box, and the codestream lives
//! in the `jp2c` box. A raw `.j2k` file is the codestream alone.
//!
//! # Codestream main header
//!
//! ```text
//! SOC FF4F
//! SIZ FF51  image and tile geometry, components
//! COD FF52  coding style, including the number of decomposition levels
//! COM FF64  free text (Omnyx writes "AppMag = 40|MPP = 0.25" here)
//! ...
//! SOT FF90  first tile-part; the main header ends here
//! ```

use tracing::debug;

use crate::error::Jp2Error;
use crate::io::RangeReader;

// =============================================================================
// Constants
// =============================================================================

/// The fixed JP2 signature box.
pub const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
];

pub const JP2_SIGNATURE_LEN: usize = JP2_SIGNATURE.len();

const BOX_JP2C: [u8; 4] = *b"jp2c";

const MARKER_SOC: u16 = 0xFF4F;
const MARKER_SIZ: u16 = 0xFF51;
const MARKER_COD: u16 = 0xFF52;
const MARKER_COM: u16 = 0xFF64;
const MARKER_SOT: u16 = 0xFF90;
const MARKER_SOD: u16 = 0xFF93;
const MARKER_EOC: u16 = 0xFFD9;

/// Upper bound on boxes and marker segments walked before giving up
const MAX_SEGMENTS: usize = 1024;

/// Rcom value for Latin-1 text comments
const COM_LATIN: u16 = 1;

// =============================================================================
// Detection helpers
// =============================================================================

pub fn is_jp2_signature(bytes: &[u8]) -> bool {
    bytes.len() >= JP2_SIGNATURE_LEN && bytes[..JP2_SIGNATURE_LEN] == JP2_SIGNATURE
}

/// SOC immediately followed by SIZ.
pub fn is_j2k_codestream(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[0..4] == [0xFF, 0x4F, 0xFF, 0x51]
}

// =============================================================================
// Jp2Header
// =============================================================================

/// Geometry and comments from a JPEG 2000 main header.
#[derive(Debug, Clone, PartialEq)]
pub struct Jp2Header {
    /// File offset of the SOC marker
    pub codestream_offset: u64,

    /// Xsiz/Ysiz: reference grid extent
    pub grid_width: u32,
    pub grid_height: u32,

    /// XOsiz/YOsiz: image origin on the reference grid
    pub x_offset: u32,
    pub y_offset: u32,

    pub tile_width: u32,
    pub tile_height: u32,

    pub components: u16,

    /// Number of wavelet decompositions (COD SPcod)
    pub decomposition_levels: u8,

    /// Latin-1 COM segments, in file order
    pub comments: Vec<String>,
}

impl Jp2Header {
    /// Parse the container (if any) and the codestream main header.
    pub fn parse<R: RangeReader>(reader: &R) -> Result<Self, Jp2Error> {
        let probe_len = (JP2_SIGNATURE_LEN as u64).min(reader.size()) as usize;
        let probe = reader.read_exact_at(0, probe_len)?;

        let codestream_offset = if is_j2k_codestream(&probe) {
            0
        } else if is_jp2_signature(&probe) {
            find_codestream(reader)?
        } else {
            return Err(Jp2Error::InvalidSignature);
        };

        let header = parse_main_header(reader, codestream_offset)?;
        debug!(
            file = reader.identifier(),
            width = header.width(),
            height = header.height(),
            levels = header.level_count(),
            "parsed JPEG 2000 header"
        );
        Ok(header)
    }

    pub fn width(&self) -> u32 {
        self.grid_width - self.x_offset
    }

    pub fn height(&self) -> u32 {
        self.grid_height - self.y_offset
    }

    /// Resolution levels reachable by discarding decompositions.
    pub fn level_count(&self) -> usize {
        self.decomposition_levels as usize + 1
    }

    /// Image size after discarding `level` decompositions.
    pub fn level_dimensions(&self, level: usize) -> (u32, u32) {
        let scale = 1u64 << level.min(31);
        (
            (self.width() as u64).div_ceil(scale) as u32,
            (self.height() as u64).div_ceil(scale) as u32,
        )
    }

    /// All comments joined with `|`, for key/value parsing.
    pub fn comment_text(&self) -> Option<String> {
        if self.comments.is_empty() {
            None
        } else {
            Some(self.comments.join("|"))
        }
    }
}

/// Walk top-level boxes until `jp2c`, returning the codestream offset.
fn find_codestream<R: RangeReader>(reader: &R) -> Result<u64, Jp2Error> {
    let size = reader.size();
    let mut offset = 0u64;

    for _ in 0..MAX_SEGMENTS {
        if offset + 8 > size {
            break;
        }
        let head = reader.read_exact_at(offset, 8)?;
        let lbox = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as u64;
        let tbox = [head[4], head[5], head[6], head[7]];

        let (header_len, box_len) = match lbox {
            0 => (8, size - offset),
            1 => {
                if offset + 16 > size {
                    return Err(malformed_box(offset, "truncated XLBox"));
                }
                let xl = reader.read_exact_at(offset + 8, 8)?;
                let xlbox = u64::from_be_bytes([
                    xl[0], xl[1], xl[2], xl[3], xl[4], xl[5], xl[6], xl[7],
                ]);
                (16, xlbox)
            }
            len => (8, len),
        };

        if box_len < header_len || offset + box_len > size {
            return Err(malformed_box(
                offset,
                &format!("box length {box_len} does not fit the file"),
            ));
        }

        if tbox == BOX_JP2C {
            return Ok(offset + header_len);
        }
        offset += box_len;
    }

    Err(Jp2Error::MissingCodestream)
}

fn malformed_box(offset: u64, message: &str) -> Jp2Error {
    Jp2Error::MalformedBox {
        offset,
        message: message.to_string(),
    }
}

/// Parse marker segments from SOC up to the first SOT.
fn parse_main_header<R: RangeReader>(reader: &R, start: u64) -> Result<Jp2Header, Jp2Error> {
    let soc = reader.read_exact_at(start, 2)?;
    if u16::from_be_bytes([soc[0], soc[1]]) != MARKER_SOC {
        return Err(Jp2Error::MissingMarker("SOC"));
    }

    let mut siz: Option<SizSegment> = None;
    let mut decomposition_levels: Option<u8> = None;
    let mut comments = Vec::new();

    let mut offset = start + 2;
    for _ in 0..MAX_SEGMENTS {
        if offset + 2 > reader.size() {
            break;
        }
        let marker_bytes = reader.read_exact_at(offset, 2)?;
        let marker = u16::from_be_bytes([marker_bytes[0], marker_bytes[1]]);
        if matches!(marker, MARKER_SOT | MARKER_SOD | MARKER_EOC) {
            break;
        }

        let len_bytes = reader.read_exact_at(offset + 2, 2)?;
        let length = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if length < 2 {
            return Err(Jp2Error::MalformedMarker {
                marker: marker_name(marker),
                message: format!("segment length {length} is below the minimum of 2"),
            });
        }
        let payload = reader.read_exact_at(offset + 4, length - 2)?;

        match marker {
            MARKER_SIZ => siz = Some(SizSegment::parse(&payload)?),
            MARKER_COD => {
                // Scod, progression order, layers (2), MCT, then decompositions
                let levels = *payload.get(5).ok_or_else(|| Jp2Error::MalformedMarker {
                    marker: "COD",
                    message: format!("{} byte segment is too short", payload.len()),
                })?;
                decomposition_levels = Some(levels);
            }
            MARKER_COM if payload.len() >= 2 => {
                let registration = u16::from_be_bytes([payload[0], payload[1]]);
                if registration == COM_LATIN {
                    comments.push(
                        String::from_utf8_lossy(&payload[2..])
                            .trim_end_matches('\0')
                            .to_string(),
                    );
                }
            }
            _ => {}
        }

        offset += 2 + length as u64;
    }

    let siz = siz.ok_or(Jp2Error::MissingMarker("SIZ"))?;
    let decomposition_levels = decomposition_levels.ok_or(Jp2Error::MissingMarker("COD"))?;

    Ok(Jp2Header {
        codestream_offset: start,
        grid_width: siz.grid_width,
        grid_height: siz.grid_height,
        x_offset: siz.x_offset,
        y_offset: siz.y_offset,
        tile_width: siz.tile_width,
        tile_height: siz.tile_height,
        components: siz.components,
        decomposition_levels,
        comments,
    })
}

fn marker_name(marker: u16) -> &'static str {
    match marker {
        MARKER_SIZ => "SIZ",
        MARKER_COD => "COD",
        MARKER_COM => "COM",
        _ => "unknown",
    }
}

struct SizSegment {
    grid_width: u32,
    grid_height: u32,
    x_offset: u32,
    y_offset: u32,
    tile_width: u32,
    tile_height: u32,
    components: u16,
}

impl SizSegment {
    /// Rsiz(2) Xsiz Ysiz XOsiz YOsiz XTsiz YTsiz XTOsiz YTOsiz (4 each) Csiz(2)
    const FIXED_LEN: usize = 36;

    fn parse(payload: &[u8]) -> Result<Self, Jp2Error> {
        if payload.len() < Self::FIXED_LEN {
            return Err(Jp2Error::MalformedMarker {
                marker: "SIZ",
                message: format!("{} byte segment is too short", payload.len()),
            });
        }
        let u32_at = |pos: usize| {
            u32::from_be_bytes([
                payload[pos],
                payload[pos + 1],
                payload[pos + 2],
                payload[pos + 3],
            ])
        };

        let siz = SizSegment {
            grid_width: u32_at(2),
            grid_height: u32_at(6),
            x_offset: u32_at(10),
            y_offset: u32_at(14),
            tile_width: u32_at(18),
            tile_height: u32_at(22),
            components: u16::from_be_bytes([payload[34], payload[35]]),
        };

        if siz.grid_width <= siz.x_offset || siz.grid_height <= siz.y_offset {
            return Err(Jp2Error::MalformedMarker {
                marker: "SIZ",
                message: format!(
                    "empty image: grid {}x{} with origin ({}, {})",
                    siz.grid_width, siz.grid_height, siz.x_offset, siz.y_offset
                ),
            });
        }
        if siz.components == 0 {
            return Err(Jp2Error::MalformedMarker {
                marker: "SIZ",
                message: "no components".to_string(),
            });
        }

        Ok(siz)
    }
}

// =============================================================================
// Test helpers
// =============================================================================

/// Build a complete single-tile codestream with 3 components.
///
/// Every packet is empty, so OpenJPEG decodes the image as flat mid-gray
/// (128) at any resolution level.
#[cfg(test)]
pub(crate) fn build_test_codestream(
    width: u32,
    height: u32,
    decomposition_levels: u8,
    comment: Option<&str>,
) -> Vec<u8> {
    const MARKER_QCD: u16 = 0xFF5C;

    let mut out = Vec::new();
    out.extend_from_slice(&MARKER_SOC.to_be_bytes());

    // SIZ with 3 components
    let components = 3u16;
    out.extend_from_slice(&MARKER_SIZ.to_be_bytes());
    out.extend_from_slice(&(38 + 3 * components).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    for value in [width, height, 0, 0, width, height, 0, 0] {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(&components.to_be_bytes());
    for _ in 0..components {
        out.extend_from_slice(&[7, 1, 1]);
    }

    // COD: Scod, LRCP, 1 layer, no MCT, levels, 64x64 blocks, 5-3
    out.extend_from_slice(&MARKER_COD.to_be_bytes());
    out.extend_from_slice(&12u16.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 1, 0, decomposition_levels, 4, 4, 0, 1]);

    // QCD: 2 guard bits, no quantization, one exponent per subband
    let subbands = 1 + 3 * decomposition_levels as u16;
    out.extend_from_slice(&MARKER_QCD.to_be_bytes());
    out.extend_from_slice(&(3 + subbands).to_be_bytes());
    out.push(0x40);
    out.extend(std::iter::repeat(10u8 << 3).take(subbands as usize));

    if let Some(text) = comment {
        out.extend_from_slice(&MARKER_COM.to_be_bytes());
        out.extend_from_slice(&((4 + text.len()) as u16).to_be_bytes());
        out.extend_from_slice(&COM_LATIN.to_be_bytes());
        out.extend_from_slice(text.as_bytes());
    }

    // One tile-part: one empty packet (a single zero byte) per resolution
    // and component
    let packets = (decomposition_levels as usize + 1) * components as usize;
    out.extend_from_slice(&MARKER_SOT.to_be_bytes());
    out.extend_from_slice(&10u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&((12 + 2 + packets) as u32).to_be_bytes());
    out.extend_from_slice(&[0, 1]);
    out.extend_from_slice(&MARKER_SOD.to_be_bytes());
    out.resize(out.len() + packets, 0);
    out.extend_from_slice(&MARKER_EOC.to_be_bytes());
    out
}

/// Wrap a codestream in signature, `ftyp` and `jp2c` boxes.
#[cfg(test)]
pub(crate) fn wrap_test_jp2(codestream: &[u8]) -> Vec<u8> {
    let mut out = JP2_SIGNATURE.to_vec();

    let ftyp_payload = b"jp2 \x00\x00\x00\x00jp2 ";
    out.extend_from_slice(&((8 + ftyp_payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"ftyp");
    out.extend_from_slice(ftyp_payload);

    out.extend_from_slice(&((8 + codestream.len()) as u32).to_be_bytes());
    out.extend_from_slice(&BOX_JP2C);
    out.extend_from_slice(codestream);
    out
}

// =============================================================================
// Tests
// =============================================================================
