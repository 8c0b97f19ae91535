//! Region extraction at arbitrary resolutions.

mod pixels;
mod reader;

pub use pixels::PixelArray;
pub use reader::{WsiReader, THUMBNAIL_POWER};
