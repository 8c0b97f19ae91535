//! JPEG 2000 backend (JP2 container or raw J2K codestream).
//!
//! Pyramid levels are the codestream's wavelet resolution levels: level `L`
//! discards `L` decompositions, so its downsample is `2^L` and its size is
//! the baseline size divided by `2^L`, rounded up. Levels that would no
//! longer shrink are dropped.
//!
//! Omnyx scanners write Aperio-style `key = value` pairs into the COM
//! segment; `AppMag` and `MPP` become the canonical calibration properties.

use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use jpeg2k::format::{j2k_detect_format_from_extension, J2KFormat};
use jpeg2k::{DecodeArea, DecodeParameters, Image, ImageFormat};
use tracing::{debug, trace};

use crate::error::{BackendError, Jp2Error};
use crate::format::jp2::Jp2Header;
use crate::format::svs::SvsMetadata;
use crate::format::SlideFormat;
use crate::io::RangeReader;

use super::backend::{check_level, clip_span, SlideBackend, BACKGROUND};
use super::metadata::{keys, PyramidGeometry, SlideProperties};

/// Property prefix for key/value pairs found in the codestream comment.
pub const JP2_PREFIX: &str = "jp2.";

/// Where OpenJPEG reads the file from.
///
/// OpenJPEG picks its codec from the file extension, so a file whose
/// extension disagrees with its content is handed over as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeSource {
    Path,
    Bytes,
}

impl DecodeSource {
    fn for_file(header: &Jp2Header, file_path: &Path) -> Self {
        let raw_codestream = header.codestream_offset == 0;
        match (j2k_detect_format_from_extension(file_path.extension()), raw_codestream) {
            (Ok(J2KFormat::J2K), true) | (Ok(J2KFormat::JP2), false) => DecodeSource::Path,
            _ => DecodeSource::Bytes,
        }
    }
}

/// An open JPEG 2000 slide.
#[derive(Debug)]
pub struct Jp2Slide {
    file_path: PathBuf,
    source: DecodeSource,
    header: Jp2Header,
    geometry: PyramidGeometry,
    properties: SlideProperties,
}

impl Jp2Slide {
    /// Parse the header through `reader`. Pixels are later decoded from
    /// `file_path`.
    pub fn open<R: RangeReader>(reader: R, file_path: impl AsRef<Path>) -> Result<Self, Jp2Error> {
        let header = Jp2Header::parse(&reader)?;
        let slide = Self::from_header(header, file_path);
        debug!(
            file = reader.identifier(),
            levels = slide.geometry.level_count(),
            "opened JPEG 2000 slide"
        );
        Ok(slide)
    }

    /// Build the backend from an already parsed header.
    pub fn from_header(header: Jp2Header, file_path: impl AsRef<Path>) -> Self {
        let geometry = level_geometry(&header);
        let properties = header_properties(&header);
        let source = DecodeSource::for_file(&header, file_path.as_ref());
        Jp2Slide {
            file_path: file_path.as_ref().to_path_buf(),
            source,
            header,
            geometry,
            properties,
        }
    }

    pub fn header(&self) -> &Jp2Header {
        &self.header
    }

    /// Decode a clipped window of one resolution level through OpenJPEG.
    ///
    /// `x0..x1`, `y0..y1` are level-frame coordinates inside the level.
    fn decode_window(
        &self,
        level: usize,
        xs: (i64, i64),
        ys: (i64, i64),
    ) -> Result<RgbImage, Jp2Error> {
        let (gx0, gy0, gx1, gy1) = grid_area(&self.header, level, xs, ys);
        trace!(level, gx0, gy0, gx1, gy1, "decoding JPEG 2000 window");

        let params = DecodeParameters::new()
            .reduce(level as u32)
            .decode_area(Some(DecodeArea::new(gx0, gy0, gx1, gy1)));
        let image = self.load(params)?;
        let pixels = image
            .get_pixels(None)
            .map_err(|e| Jp2Error::Decode(e.to_string()))?;

        to_rgb(pixels.width, pixels.height, pixels.format, pixels.data)
    }

    fn load(&self, params: DecodeParameters) -> Result<Image, Jp2Error> {
        let image = match self.source {
            DecodeSource::Path => Image::from_file_with(&self.file_path, params),
            DecodeSource::Bytes => {
                let bytes = std::fs::read(&self.file_path)
                    .map_err(|e| Jp2Error::Decode(format!("{}: {e}", self.file_path.display())))?;
                Image::from_bytes_with(&bytes, params)
            }
        };
        image.map_err(|e| Jp2Error::Decode(e.to_string()))
    }
}

impl SlideBackend for Jp2Slide {
    fn format(&self) -> SlideFormat {
        SlideFormat::Jpeg2000
    }

    fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }

    fn properties(&self) -> &SlideProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut SlideProperties {
        &mut self.properties
    }

    fn decode(
        &self,
        level: usize,
        location: (i64, i64),
        size: (u32, u32),
    ) -> Result<RgbImage, BackendError> {
        check_level(&self.geometry, level)?;
        let (width, height) = self.geometry.level_dimensions[level];

        let mut canvas = RgbImage::from_pixel(size.0, size.1, BACKGROUND);
        let (Some(xs), Some(ys)) = (
            clip_span(location.0, size.0, width),
            clip_span(location.1, size.1, height),
        ) else {
            return Ok(canvas);
        };

        let window = self.decode_window(level, xs, ys)?;
        imageops::replace(&mut canvas, &window, xs.0 - location.0, ys.0 - location.1);
        Ok(canvas)
    }
}

// =============================================================================
// Geometry and properties
// =============================================================================

fn level_geometry(header: &Jp2Header) -> PyramidGeometry {
    let mut dimensions: Vec<(u32, u32)> = Vec::with_capacity(header.level_count());
    for level in 0..header.level_count() {
        let dims = header.level_dimensions(level);
        if let Some(&(pw, ph)) = dimensions.last() {
            if dims.0 >= pw || dims.1 >= ph {
                break;
            }
        }
        dimensions.push(dims);
    }

    let downsamples = (0..dimensions.len())
        .map(|level| (1u64 << level) as f64)
        .collect();
    PyramidGeometry::new(dimensions, downsamples)
}

fn header_properties(header: &Jp2Header) -> SlideProperties {
    let mut properties = SlideProperties::new();
    properties.insert(keys::VENDOR, SlideFormat::Jpeg2000.vendor());
    properties.insert("jp2.components", header.components);
    properties.insert("jp2.decomposition-levels", header.decomposition_levels);

    if let Some(comment) = header.comment_text() {
        let parsed = SvsMetadata::parse(&comment);
        for (key, value) in &parsed.properties {
            properties.insert(format!("{JP2_PREFIX}{key}"), value);
        }
        if let Some(mpp) = parsed.mpp {
            properties.insert(keys::MPP_X, mpp);
            properties.insert(keys::MPP_Y, mpp);
        }
        if let Some(power) = parsed.magnification {
            properties.insert(keys::OBJECTIVE_POWER, power);
        }
        properties.insert("jp2.comment", comment);
    }

    properties
}

/// Reference-grid rectangle `(x0, y0, x1, y1)` covering a level-frame
/// window. OpenJPEG takes decode areas on the full-resolution grid even
/// when decompositions are discarded.
fn grid_area(
    header: &Jp2Header,
    level: usize,
    (x0, x1): (i64, i64),
    (y0, y1): (i64, i64),
) -> (u32, u32, u32, u32) {
    let scale = 1i64 << level;
    let to_grid = |v: i64, extent: u32, origin: u32| {
        ((v * scale).clamp(0, extent as i64) + origin as i64) as u32
    };
    (
        to_grid(x0, header.width(), header.x_offset),
        to_grid(y0, header.height(), header.y_offset),
        to_grid(x1, header.width(), header.x_offset),
        to_grid(y1, header.height(), header.y_offset),
    )
}

/// Convert OpenJPEG output to 8-bit RGB.
fn to_rgb(
    width: u32,
    height: u32,
    format: ImageFormat,
    data: Vec<u8>,
) -> Result<RgbImage, Jp2Error> {
    let rgb: Vec<u8> = match format {
        ImageFormat::Rgb8 => data,
        ImageFormat::Rgba8 => data
            .chunks_exact(4)
            .flat_map(|p| [p[0], p[1], p[2]])
            .collect(),
        ImageFormat::L8 => data.iter().flat_map(|&l| [l, l, l]).collect(),
        ImageFormat::La8 => data.chunks_exact(2).flat_map(|p| [p[0]; 3]).collect(),
    };

    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        Jp2Error::Decode(format!(
            "decoded buffer does not match {width}x{height} RGB"
        ))
    })
}
