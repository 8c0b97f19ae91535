//! Slide abstraction layer.
//!
//! Backends sit between the format parsers and the region reader:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              WsiReader                  │
//! │  (scale negotiation, resize, padding)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          SlideBackend Trait             │
//! │  (geometry, properties, level decode)   │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   TiffSlide     │    │      Jp2Slide       │
//! │ (SVS, TIFF)     │    │  (JP2, J2K)         │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! [`SlideMetadata`] is the validated snapshot the reader derives from a
//! backend's geometry and properties.

mod backend;
mod jp2_slide;
pub mod metadata;
mod tiff_slide;

pub use backend::{open_slide, AnySlide, SlideBackend, BACKGROUND};
pub use jp2_slide::Jp2Slide;
pub use metadata::{
    keys, CalibrationWarning, PyramidGeometry, Resolved, SlideMetadata, SlideProperties,
};
pub use tiff_slide::TiffSlide;
