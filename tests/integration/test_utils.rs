//! Test utilities for integration tests.
//!
//! Builders for synthetic pyramidal TIFF/SVS files with real JPEG tiles,
//! and an in-memory backend with smooth, predictable pixels.

use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use wsi_reader::error::BackendError;
use wsi_reader::slide::{keys, PyramidGeometry, SlideBackend, SlideProperties, BACKGROUND};
use wsi_reader::SlideFormat;

// =============================================================================
// Pixel pattern
// =============================================================================

/// Smooth color field over a `width` x `height` baseline.
pub fn pattern(bx: f64, by: f64, width: u32, height: u32) -> Rgb<u8> {
    let r = (bx / width as f64 * 255.0).clamp(0.0, 255.0) as u8;
    let g = (by / height as f64 * 255.0).clamp(0.0, 255.0) as u8;
    Rgb([r, g, 96])
}

/// Render a window of a level whose downsample is `(dsx, dsy)`.
pub fn render_level_window(
    base: (u32, u32),
    downsample: (f64, f64),
    level_size: (u32, u32),
    location: (i64, i64),
    size: (u32, u32),
) -> RgbImage {
    RgbImage::from_fn(size.0, size.1, |x, y| {
        let lx = location.0 + x as i64;
        let ly = location.1 + y as i64;
        if lx < 0 || ly < 0 || lx >= level_size.0 as i64 || ly >= level_size.1 as i64 {
            BACKGROUND
        } else {
            pattern(
                (lx as f64 + 0.5) * downsample.0,
                (ly as f64 + 0.5) * downsample.1,
                base.0,
                base.1,
            )
        }
    })
}

// =============================================================================
// Test JPEG Creation
// =============================================================================

/// Encode an RGB image as a complete JPEG stream.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(img).unwrap();
    buf
}

/// Split a complete JPEG into a tables-only stream and an abbreviated
/// stream without DQT/DHT segments.
pub fn split_jpeg_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut image = vec![0xFF, 0xD8];

    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            image.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + len];
        if marker == 0xDB || marker == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            image.extend_from_slice(segment);
        }
        pos += 2 + len;
    }

    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, image)
}

// =============================================================================
// TIFF File Builder
// =============================================================================

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;
const TYPE_UNDEFINED: u16 = 7;
const TYPE_LONG8: u16 = 16;

/// One IFD entry with its raw value bytes (already in file byte order).
struct Entry {
    tag: u16,
    field_type: u16,
    count: u64,
    payload: Vec<u8>,
}

/// Builder for tiled, JPEG-compressed pyramidal TIFF files.
pub struct SlideTiffBuilder {
    big_endian: bool,
    bigtiff: bool,
    tile_size: u32,
    levels: Vec<(u32, u32)>,
    description: Option<String>,
    resolution: Option<(f64, u16)>,
    shared_tables: bool,
    label: bool,
    compression: u16,
    quality: u8,
}

impl SlideTiffBuilder {
    /// Levels are given largest first.
    pub fn new(levels: &[(u32, u32)]) -> Self {
        Self {
            big_endian: false,
            bigtiff: false,
            tile_size: 64,
            levels: levels.to_vec(),
            description: None,
            resolution: None,
            shared_tables: false,
            label: false,
            compression: 7,
            quality: 95,
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn bigtiff(mut self) -> Self {
        self.bigtiff = true;
        self
    }

    pub fn tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Pixels per unit, with TIFF ResolutionUnit (2 = inch, 3 = centimeter).
    pub fn resolution(mut self, pixels_per_unit: f64, unit: u16) -> Self {
        self.resolution = Some((pixels_per_unit, unit));
        self
    }

    /// Store DQT/DHT once per level in JPEGTables.
    pub fn shared_tables(mut self) -> Self {
        self.shared_tables = true;
        self
    }

    /// Append a small stripped label image after the pyramid.
    pub fn with_label(mut self) -> Self {
        self.label = true;
        self
    }

    pub fn compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if self.big_endian {
            out.extend_from_slice(b"MM");
        } else {
            out.extend_from_slice(b"II");
        }
        if self.bigtiff {
            out.extend(self.u16(43));
            out.extend(self.u16(8));
            out.extend(self.u16(0));
            out.extend(self.u64(0));
        } else {
            out.extend(self.u16(42));
            out.extend(self.u32(0));
        }
        let mut next_pointer_at = if self.bigtiff { 8 } else { 4 };

        let base = self.levels[0];
        for (index, &(width, height)) in self.levels.iter().enumerate() {
            let entries = self.level_entries(&mut out, index, base, (width, height));
            next_pointer_at = self.write_ifd(&mut out, entries, next_pointer_at);
        }

        if self.label {
            let entries = self.label_entries(&mut out);
            self.write_ifd(&mut out, entries, next_pointer_at);
        }

        out
    }

    /// Build one writable file in `dir`.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }

    fn level_entries(
        &self,
        out: &mut Vec<u8>,
        index: usize,
        base: (u32, u32),
        (width, height): (u32, u32),
    ) -> Vec<Entry> {
        let ts = self.tile_size;
        let tiles_x = width.div_ceil(ts);
        let tiles_y = height.div_ceil(ts);
        let downsample = (base.0 as f64 / width as f64, base.1 as f64 / height as f64);

        let mut tables = None;
        let mut offsets = Vec::new();
        let mut counts = Vec::new();
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let img = render_level_window(
                    base,
                    downsample,
                    (width, height),
                    ((tx * ts) as i64, (ty * ts) as i64),
                    (ts, ts),
                );
                let mut jpeg = encode_jpeg(&img, self.quality);
                if self.shared_tables {
                    let (t, abbreviated) = split_jpeg_tables(&jpeg);
                    tables.get_or_insert(t);
                    jpeg = abbreviated;
                }
                offsets.push(out.len() as u64);
                counts.push(jpeg.len() as u64);
                out.extend_from_slice(&jpeg);
            }
        }

        let mut entries = vec![
            self.long_entry(256, width),
            self.long_entry(257, height),
            Entry {
                tag: 258,
                field_type: TYPE_SHORT,
                count: 3,
                payload: [8u16; 3].iter().flat_map(|&v| self.u16(v)).collect(),
            },
            self.short_entry(259, self.compression),
            self.short_entry(262, 6),
            self.short_entry(277, 3),
            self.long_entry(322, ts),
            self.long_entry(323, ts),
            self.offsets_entry(324, &offsets),
            self.offsets_entry(325, &counts),
        ];

        if index == 0 {
            if let Some(description) = &self.description {
                let mut bytes = description.as_bytes().to_vec();
                bytes.push(0);
                entries.push(Entry {
                    tag: 270,
                    field_type: TYPE_ASCII,
                    count: bytes.len() as u64,
                    payload: bytes,
                });
            }
            if let Some((ppu, unit)) = self.resolution {
                entries.push(self.rational_entry(282, ppu));
                entries.push(self.rational_entry(283, ppu));
                entries.push(self.short_entry(296, unit));
            }
        }

        if let Some(tables) = tables {
            entries.push(Entry {
                tag: 347,
                field_type: TYPE_UNDEFINED,
                count: tables.len() as u64,
                payload: tables,
            });
        }

        entries
    }

    fn label_entries(&self, out: &mut Vec<u8>) -> Vec<Entry> {
        let (width, height) = (40u32, 30u32);
        let strip = vec![200u8; (width * height * 3) as usize];
        let offset = out.len() as u64;
        out.extend_from_slice(&strip);

        vec![
            self.long_entry(256, width),
            self.long_entry(257, height),
            self.short_entry(259, 1),
            self.long_entry(273, offset as u32),
            self.long_entry(278, height),
            self.long_entry(279, strip.len() as u32),
        ]
    }

    /// Append out-of-line payloads, then the IFD itself; patch the previous
    /// next-IFD pointer. Returns the position of this IFD's next pointer.
    fn write_ifd(&self, out: &mut Vec<u8>, mut entries: Vec<Entry>, prev_pointer: usize) -> usize {
        entries.sort_by_key(|e| e.tag);
        let inline = if self.bigtiff { 8 } else { 4 };

        let mut value_fields = Vec::new();
        for entry in &entries {
            if entry.payload.len() <= inline {
                let mut field = entry.payload.clone();
                field.resize(inline, 0);
                value_fields.push(field);
            } else {
                if out.len() % 2 == 1 {
                    out.push(0);
                }
                let offset = out.len() as u64;
                out.extend_from_slice(&entry.payload);
                value_fields.push(if self.bigtiff {
                    self.u64(offset)
                } else {
                    self.u32(offset as u32)
                });
            }
        }

        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_offset = out.len() as u64;
        if self.bigtiff {
            out[prev_pointer..prev_pointer + 8].copy_from_slice(&self.u64(ifd_offset));
            out.extend(self.u64(entries.len() as u64));
        } else {
            out[prev_pointer..prev_pointer + 4].copy_from_slice(&self.u32(ifd_offset as u32));
            out.extend(self.u16(entries.len() as u16));
        }

        for (entry, field) in entries.iter().zip(value_fields) {
            out.extend(self.u16(entry.tag));
            out.extend(self.u16(entry.field_type));
            if self.bigtiff {
                out.extend(self.u64(entry.count));
            } else {
                out.extend(self.u32(entry.count as u32));
            }
            out.extend(field);
        }

        let pointer_at = out.len();
        if self.bigtiff {
            out.extend(self.u64(0));
        } else {
            out.extend(self.u32(0));
        }
        pointer_at
    }

    fn short_entry(&self, tag: u16, value: u16) -> Entry {
        Entry {
            tag,
            field_type: TYPE_SHORT,
            count: 1,
            payload: self.u16(value),
        }
    }

    fn long_entry(&self, tag: u16, value: u32) -> Entry {
        Entry {
            tag,
            field_type: TYPE_LONG,
            count: 1,
            payload: self.u32(value),
        }
    }

    fn rational_entry(&self, tag: u16, value: f64) -> Entry {
        let mut payload = self.u32((value * 100.0).round() as u32);
        payload.extend(self.u32(100));
        Entry {
            tag,
            field_type: TYPE_RATIONAL,
            count: 1,
            payload,
        }
    }

    fn offsets_entry(&self, tag: u16, values: &[u64]) -> Entry {
        if self.bigtiff {
            Entry {
                tag,
                field_type: TYPE_LONG8,
                count: values.len() as u64,
                payload: values.iter().flat_map(|&v| self.u64(v)).collect(),
            }
        } else {
            Entry {
                tag,
                field_type: TYPE_LONG,
                count: values.len() as u64,
                payload: values.iter().flat_map(|&v| self.u32(v as u32)).collect(),
            }
        }
    }

    fn u16(&self, v: u16) -> Vec<u8> {
        if self.big_endian {
            v.to_be_bytes().to_vec()
        } else {
            v.to_le_bytes().to_vec()
        }
    }

    fn u32(&self, v: u32) -> Vec<u8> {
        if self.big_endian {
            v.to_be_bytes().to_vec()
        } else {
            v.to_le_bytes().to_vec()
        }
    }

    fn u64(&self, v: u64) -> Vec<u8> {
        if self.big_endian {
            v.to_be_bytes().to_vec()
        } else {
            v.to_le_bytes().to_vec()
        }
    }
}

/// Aperio-style description with the given magnification and mpp.
pub fn aperio_description(width: u32, height: u32, app_mag: f64, mpp: f64) -> String {
    format!(
        "Aperio Image Library v12.0.5\r\n{width}x{height} [0,0 {width}x{height}] (64x64) JPEG/RGB Q=95|AppMag = {app_mag}|MPP = {mpp}|ScanScope ID = SS0000"
    )
}

// =============================================================================
// JPEG 2000 Creation
// =============================================================================

/// Complete single-tile J2K codestream with 3 components, lossless 5-3
/// wavelet and `levels` decompositions.
///
/// Every packet is empty, so the image decodes as flat mid-gray (128).
/// `comment` goes into a Latin-1 COM segment.
pub fn j2k_codestream(width: u32, height: u32, levels: u8, comment: Option<&str>) -> Vec<u8> {
    let mut out = vec![0xFF, 0x4F];

    // SIZ: Rsiz, grid, origin, tile size, tile origin, 3 x 8-bit unsigned
    out.extend_from_slice(&[0xFF, 0x51]);
    out.extend_from_slice(&47u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    for value in [width, height, 0, 0, width, height, 0, 0] {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(&3u16.to_be_bytes());
    for _ in 0..3 {
        out.extend_from_slice(&[7, 1, 1]);
    }

    // COD: LRCP, 1 layer, no MCT, 64x64 code blocks, 5-3
    out.extend_from_slice(&[0xFF, 0x52]);
    out.extend_from_slice(&12u16.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 1, 0, levels, 4, 4, 0, 1]);

    // QCD: no quantization, 2 guard bits
    let subbands = 1 + 3 * levels as usize;
    out.extend_from_slice(&[0xFF, 0x5C]);
    out.extend_from_slice(&((3 + subbands) as u16).to_be_bytes());
    out.push(0x40);
    out.extend(std::iter::repeat(0x50u8).take(subbands));

    if let Some(text) = comment {
        out.extend_from_slice(&[0xFF, 0x64]);
        out.extend_from_slice(&((4 + text.len()) as u16).to_be_bytes());
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(text.as_bytes());
    }

    // SOT + SOD, then one empty packet per resolution and component
    let packets = (levels as usize + 1) * 3;
    out.extend_from_slice(&[0xFF, 0x90]);
    out.extend_from_slice(&10u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&((14 + packets) as u32).to_be_bytes());
    out.extend_from_slice(&[0, 1, 0xFF, 0x93]);
    out.resize(out.len() + packets, 0);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Wrap a codestream in JP2 signature, `ftyp` and `jp2c` boxes.
pub fn wrap_jp2(codestream: &[u8]) -> Vec<u8> {
    let mut out = vec![
        0x00, 0x00, 0x00, 0x0C, 0x6A, 0x50, 0x20, 0x20, 0x0D, 0x0A, 0x87, 0x0A,
    ];
    out.extend_from_slice(&20u32.to_be_bytes());
    out.extend_from_slice(b"ftypjp2 \x00\x00\x00\x00jp2 ");
    out.extend_from_slice(&((8 + codestream.len()) as u32).to_be_bytes());
    out.extend_from_slice(b"jp2c");
    out.extend_from_slice(codestream);
    out
}

// =============================================================================
// Synthetic backend
// =============================================================================

/// In-memory backend whose pixels follow [`pattern`].
#[derive(Debug, Clone)]
pub struct SyntheticSlide {
    path: PathBuf,
    geometry: PyramidGeometry,
    properties: SlideProperties,
}

impl SyntheticSlide {
    /// Power-of-two pyramid of `levels` levels over `base`.
    pub fn new(base: (u32, u32), levels: usize) -> Self {
        let dimensions = (0..levels)
            .map(|l| (base.0 >> l, base.1 >> l))
            .collect();
        Self {
            path: PathBuf::from("synthetic.svs"),
            geometry: PyramidGeometry::from_dimensions(dimensions),
            properties: SlideProperties::new(),
        }
    }

    /// Add `wsi.mpp-*` and `wsi.objective-power`.
    pub fn calibrated(mut self, mpp: f64, power: f64) -> Self {
        self.properties.insert(keys::MPP_X, mpp);
        self.properties.insert(keys::MPP_Y, mpp);
        self.properties.insert(keys::OBJECTIVE_POWER, power);
        self
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key, value);
        self
    }
}

impl SlideBackend for SyntheticSlide {
    fn format(&self) -> SlideFormat {
        SlideFormat::AperioSvs
    }

    fn file_path(&self) -> &Path {
        &self.path
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
        let level_size = *self
            .geometry
            .level_dimensions
            .get(level)
            .ok_or(BackendError::LevelOutOfRange {
                level,
                level_count: self.geometry.level_count(),
            })?;
        let base = self.geometry.level_dimensions[0];
        let ds = self.geometry.level_downsamples[level];
        Ok(render_level_window(base, (ds, ds), level_size, location, size))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Levels of the standard test slide: downsamples 1, 4 and 16.
pub const SVS_LEVELS: [(u32, u32); 3] = [(1024, 768), (256, 192), (64, 48)];

/// Aperio slide over [`SVS_LEVELS`] with shared JPEG tables.
pub fn svs_builder(app_mag: f64, mpp: f64) -> SlideTiffBuilder {
    let (width, height) = SVS_LEVELS[0];
    SlideTiffBuilder::new(&SVS_LEVELS)
        .tile_size(128)
        .shared_tables()
        .description(&aperio_description(width, height, app_mag, mpp))
}
