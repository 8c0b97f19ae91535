//! Native parsers for slide file formats.
//!
//! Use [`detect::detect_format`] to identify a slide file. Supported:
//!
//! - **Aperio SVS**: TIFF with "Aperio" in the first ImageDescription
//! - **Generic Pyramidal TIFF**: tiled, JPEG-compressed TIFF or BigTIFF
//! - **JPEG 2000**: JP2 or raw J2K codestream (Omnyx style)

pub mod detect;
pub mod jp2;
pub mod jpeg;
pub mod svs;
pub mod tiff;

pub use detect::{detect_format, is_tiff_header, SlideFormat};
pub use svs::SvsMetadata;
