//! Owned RGB pixel buffers returned by region reads.

use std::path::Path;

use image::{imageops, RgbImage};

use crate::error::ExportError;
use crate::format::jpeg::{encode_rgb, DEFAULT_JPEG_QUALITY};

/// An 8-bit RGB image, rows top to bottom, channels interleaved.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    image: RgbImage,
}

impl PixelArray {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.image.height() as usize, self.image.width() as usize, 3)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Interleaved RGB bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        (x < self.width() && y < self.height()).then(|| self.image.get_pixel(x, y).0)
    }

    pub fn as_image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Resample to `(width, height)`.
    pub fn resized(&self, width: u32, height: u32) -> PixelArray {
        PixelArray::new(resize_rgb(&self.image, width, height))
    }

    /// Mean squared error over all channels; `None` if shapes differ.
    pub fn mse(&self, other: &PixelArray) -> Option<f64> {
        if self.shape() != other.shape() {
            return None;
        }
        let count = self.as_raw().len().max(1) as f64;
        let sum: f64 = self
            .as_raw()
            .iter()
            .zip(other.as_raw())
            .map(|(&a, &b)| {
                let d = a as f64 - b as f64;
                d * d
            })
            .sum();
        Some(sum / count)
    }

    /// Write as a JPEG file.
    pub fn save_jpeg(&self, path: &Path) -> Result<(), ExportError> {
        let bytes = encode_rgb(&self.image, DEFAULT_JPEG_QUALITY).map_err(|e| {
            ExportError::Encode {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        std::fs::write(path, bytes).map_err(|e| ExportError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl From<RgbImage> for PixelArray {
    fn from(image: RgbImage) -> Self {
        PixelArray::new(image)
    }
}

/// Resize with a filter suited to the direction: Triangle when shrinking,
/// CatmullRom when enlarging. Returns the input unchanged if sizes match.
pub(crate) fn resize_rgb(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    let enlarging = width > image.width() || height > image.height();
    let filter = if enlarging {
        imageops::FilterType::CatmullRom
    } else {
        imageops::FilterType::Triangle
    };
    imageops::resize(image, width, height, filter)
}
