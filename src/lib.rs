//! # wsi-reader
//!
//! Resolution-aware region reading for pyramidal Whole Slide Images.
//!
//! Callers ask for a region in one of four unit systems (pyramid `level`,
//! microns-per-pixel `mpp`, objective `power`, or a `baseline` multiplier)
//! and get back an 8-bit RGB array of exactly the planned size, whatever
//! levels the file actually stores.
//!
//! ## Features
//!
//! - **Format support**: native parsers for Aperio SVS, tiled pyramidal
//!   TIFF/BigTIFF and JPEG 2000 (JP2/J2K)
//! - **Calibration recovery**: mpp from TIFF resolution tags, objective power
//!   inferred from mpp, with structured warnings
//! - **Exact output sizes**: level selection plus post-decode resize
//! - **Tile export**: JPEG tiles with a CSV index
//!
//! ## Architecture
//!
//! - [`io`] - synchronous range readers over files and memory
//! - [`mod@format`] - TIFF, SVS, JPEG and JPEG 2000 parsing, format detection
//! - [`slide`] - backends and the slide metadata model
//! - [`resolution`] - scale negotiation and read planning
//! - [`region`] - the region reader
//! - [`export`] - tiled export
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_reader::{Units, WsiReader};
//!
//! let reader = WsiReader::open("slide.svs").unwrap();
//! println!("{:?}", reader.info().level_dimensions);
//!
//! // 512x512 pixels at 0.5 microns per pixel
//! let region = reader.read_rect((1000, 1000), (512, 512), 0.5, Units::Mpp).unwrap();
//! assert_eq!(region.shape(), (512, 512, 3));
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod io;
pub mod region;
pub mod resolution;
pub mod slide;

// Re-export commonly used types
pub use config::{Cli, Command, Mode};
pub use error::{
    BackendError, ExportError, FormatError, IoError, Jp2Error, MetadataError, ReadError,
    ResolutionError, TiffError,
};
pub use export::{save_tiles, ExportSummary, TileRecord};
pub use format::{detect_format, SlideFormat};
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use region::{PixelArray, WsiReader};
pub use resolution::{
    LevelScales, LevelSelection, ReadPlan, Resolution, ResolutionWarning, Scale, Units,
};
pub use slide::{
    open_slide, AnySlide, CalibrationWarning, Jp2Slide, PyramidGeometry, SlideBackend,
    SlideMetadata, SlideProperties, TiffSlide,
};
