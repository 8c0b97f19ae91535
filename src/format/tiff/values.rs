//! TIFF tag value reading.
//!
//! Values live either inline in the IFD entry or at an offset in the file.
//! Arrays such as TileOffsets are fetched with a single range read.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values through a [`RangeReader`] in the file's byte order.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Raw bytes of an entry's value, inline or fetched from its offset.
    pub fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let len = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("value of {size} bytes is too large"),
            })?;
            Ok(self.reader.read_exact_at(offset, len)?)
        }
    }

    /// A single SHORT or LONG value.
    pub fn read_u32(&self, entry: &IfdEntry) -> Result<u32, TiffError> {
        if let Some(value) = entry.inline_u32(self.header.byte_order) {
            return Ok(value);
        }
        let values = self.read_u64_array(entry)?;
        match values.as_slice() {
            [value] => u32::try_from(*value).map_err(|_| TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("{value} does not fit in 32 bits"),
            }),
            _ => Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected count 1, got {}", entry.count),
            }),
        }
    }

    /// An array of SHORT, LONG or LONG8 values widened to u64.
    ///
    /// This is the read used for TileOffsets and TileByteCounts.
    pub fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if !matches!(
            field_type,
            FieldType::Short | FieldType::Long | FieldType::Long8
        ) {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Short, Long, or Long8, got {:?}", field_type),
            });
        }

        let count = entry.count as usize;
        if count == 0 {
            return Ok(Vec::new());
        }

        let bytes = self.read_bytes(entry)?;
        Ok(parse_u64_array(
            &bytes,
            count,
            field_type,
            self.header.byte_order,
        ))
    }

    /// A single RATIONAL value as `numerator / denominator`.
    pub fn read_rational(&self, entry: &IfdEntry) -> Result<f64, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        match field_type {
            FieldType::Rational => {
                let bytes = self.read_bytes(entry)?;
                let numerator = self.header.byte_order.read_u32(&bytes[0..4]);
                let denominator = self.header.byte_order.read_u32(&bytes[4..8]);
                if denominator == 0 {
                    return Err(TiffError::InvalidTagValue {
                        tag: "rational",
                        message: "zero denominator".to_string(),
                    });
                }
                Ok(numerator as f64 / denominator as f64)
            }
            // Some writers store resolutions as plain integers
            FieldType::Short | FieldType::Long => Ok(self.read_u32(entry)? as f64),
            other => Err(TiffError::InvalidTagValue {
                tag: "rational",
                message: format!("expected Rational, got {:?}", other),
            }),
        }
    }

    /// An ASCII value with its NUL terminator stripped.
    pub fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if field_type != FieldType::Ascii {
            return Err(TiffError::InvalidTagValue {
                tag: "unknown",
                message: format!("expected Ascii type for string, got {:?}", field_type),
            });
        }

        let bytes = self.read_bytes(entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

// =============================================================================
// Parsing from bytes
// =============================================================================

/// Parse an array of integers from raw bytes, widening to u64.
///
/// Truncated input yields a shorter array; non-integer types yield nothing.
pub fn parse_u64_array(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Vec<u64> {
    let width = match field_type {
        FieldType::Short => 2,
        FieldType::Long => 4,
        FieldType::Long8 => 8,
        _ => return Vec::new(),
    };

    bytes
        .chunks_exact(width)
        .take(count)
        .map(|chunk| match width {
            2 => byte_order.read_u16(chunk) as u64,
            4 => byte_order.read_u32(chunk) as u64,
            _ => byte_order.read_u64(chunk),
        })
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
