//! TIFF and BigTIFF parsing for pyramidal slides.
//!
//! # Key Concepts
//!
//! - **Byte order**: II (little-endian) or MM (big-endian), declared in the
//!   header and applied to every multi-byte value.
//!
//! - **Classic TIFF vs BigTIFF**: 32-bit versus 64-bit offsets. Both are
//!   handled transparently.
//!
//! - **IFD**: one per stored image. Slides chain pyramid levels, a
//!   thumbnail, a label and a macro image.
//!
//! - **Inline vs offset values**: values that fit in the entry's
//!   value/offset field are stored there, larger ones elsewhere in the file.

mod parser;
mod pyramid;
mod tags;
mod validation;
mod values;

pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{resolution_unit_name, Compression, FieldType, TiffTag};
pub use validation::{check_compression, validate_level, validate_pyramid};
pub use values::{parse_u64_array, ValueReader};
