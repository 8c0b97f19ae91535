//! Region reads against synthetic SVS and JPEG 2000 files on disk.
//!
//! Tests verify:
//! - Output shapes match the request in every unit system
//! - Level selection picks the coarsest sufficient level
//! - Reads at different resolutions show the same content
//! - Upsampling beyond the baseline is flagged
//! - JPEG 2000 windows decode at full and reduced resolution

use tempfile::TempDir;

use wsi_reader::slide::{keys, SlideBackend};
use wsi_reader::{
    PixelArray, ReadError, Resolution, ResolutionError, ResolutionWarning, Units, WsiReader,
};

use super::test_utils::{j2k_codestream, svs_builder, SyntheticSlide};

/// 20x slide at 0.5 mpp; levels at 0.5, 2.0 and 8.0 mpp.
fn open_slide() -> (TempDir, WsiReader<wsi_reader::AnySlide>) {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 0.5).write_to(dir.path(), "region.svs");
    let reader = WsiReader::open(&path).unwrap();
    (dir, reader)
}

// =============================================================================
// Output shapes
// =============================================================================

#[test]
fn test_read_rect_shape_at_every_level() {
    let (_dir, reader) = open_slide();
    for level in 0..3 {
        let region = reader
            .read_rect((0, 0), (256, 256), level as f64, Units::Level)
            .unwrap();
        assert_eq!(region.shape(), (256, 256, 3));
    }
}

#[test]
fn test_read_rect_shape_in_every_unit() {
    let (_dir, reader) = open_slide();
    for (resolution, units) in [
        (0.8, Units::Mpp),
        (3.0, Units::Mpp),
        (7.5, Units::Power),
        (0.3, Units::Baseline),
        (1.5, Units::Level),
    ] {
        let region = reader
            .read_rect((128, 64), (200, 150), resolution, units)
            .unwrap();
        assert_eq!(region.shape(), (150, 200, 3), "{resolution} {units}");
    }
}

#[test]
fn test_read_bounds_shapes() {
    let (_dir, reader) = open_slide();
    let bounds = (0, 0, 1000, 700);

    let full = reader.read_bounds(bounds, 0.0, Units::Level).unwrap();
    assert_eq!(full.shape(), (700, 1000, 3));

    // Level 1 stores 1000x700 baseline pixels as 250x175
    let level1 = reader.read_bounds(bounds, 1.0, Units::Level).unwrap();
    assert_eq!(level1.shape(), (175, 250, 3));

    let half = reader.read_bounds(bounds, 10.0, Units::Power).unwrap();
    assert_eq!(half.shape(), (350, 500, 3));
}

#[test]
fn test_invalid_bounds_rejected() {
    let (_dir, reader) = open_slide();
    assert!(matches!(
        reader.read_bounds((100, 100, 50, 200), 0.0, Units::Level),
        Err(ReadError::Resolution(ResolutionError::InvalidBounds { .. }))
    ));
    assert!(matches!(
        reader.read_rect((0, 0), (0, 10), 0.0, Units::Level),
        Err(ReadError::Resolution(ResolutionError::InvalidBounds { .. }))
    ));
}

#[test]
fn test_level_out_of_range_rejected() {
    let (_dir, reader) = open_slide();
    assert!(matches!(
        reader.read_rect((0, 0), (10, 10), 3.0, Units::Level),
        Err(ReadError::Resolution(
            ResolutionError::LevelOutOfRange { .. }
        ))
    ));
}

// =============================================================================
// Level selection
// =============================================================================

#[test]
fn test_exact_level_read_matches_backend() {
    let (_dir, reader) = open_slide();

    let plan = reader
        .find_read_rect_params((400, 300), (64, 64), 2.0, Units::Mpp)
        .unwrap();
    assert_eq!(plan.read_level, 1);
    assert_eq!(plan.level_location, (100, 75));
    assert_eq!(plan.level_read_size, (64, 64));
    assert!(plan.warning.is_none());

    let region = reader.read_rect((400, 300), (64, 64), 2.0, Units::Mpp).unwrap();
    let direct = PixelArray::new(reader.backend().decode(1, (100, 75), (64, 64)).unwrap());
    assert!(region.mse(&direct).unwrap() < 1.0);
}

#[test]
fn test_intermediate_resolution_reads_finer_level() {
    let (_dir, reader) = open_slide();

    // 4 mpp falls between levels 1 (2 mpp) and 2 (8 mpp)
    let selection = reader
        .find_optimal_level_and_downsample(4.0, Units::Mpp)
        .unwrap();
    assert_eq!(selection.read_level, 1);
    assert!((selection.post_read_scale.x - 0.5).abs() < 1e-9);
    assert!(selection.warning.is_none());
}

#[test]
fn test_upsampling_is_flagged() {
    let (_dir, reader) = open_slide();

    let plan = reader
        .find_read_rect_params((0, 0), (100, 100), 40.0, Units::Power)
        .unwrap();
    assert_eq!(plan.read_level, 0);
    assert_eq!(plan.level_read_size, (50, 50));
    match plan.warning {
        Some(ResolutionWarning::Interpolation {
            requested,
            available,
            ..
        }) => {
            assert_eq!(requested, (40.0, 40.0));
            assert_eq!(available, (20.0, 20.0));
        }
        None => panic!("expected an interpolation warning"),
    }

    let region = reader.read_rect((0, 0), (100, 100), 40.0, Units::Power).unwrap();
    assert_eq!(region.shape(), (100, 100, 3));
}

// =============================================================================
// Content
// =============================================================================

#[test]
fn test_cross_level_consistency() {
    let (_dir, reader) = open_slide();
    let bounds = (256, 128, 768, 640);

    let reads: Vec<PixelArray> = [20.0, 10.0, 5.0, 1.25]
        .into_iter()
        .map(|power| reader.read_bounds(bounds, power, Units::Power).unwrap())
        .collect();

    let (h, w, _) = reads[3].shape();
    assert_eq!((h, w), (32, 32));
    for region in &reads {
        let resized = region.resized(w as u32, h as u32);
        let mse = resized.mse(&reads[3]).unwrap();
        assert!(mse < 30.0, "mse {mse}");
    }
}

#[test]
fn test_regions_past_the_edge_are_padded_white() {
    let (_dir, reader) = open_slide();
    let region = reader
        .read_rect((960, 700), (128, 128), 0.0, Units::Level)
        .unwrap();

    assert_eq!(region.shape(), (128, 128, 3));
    assert_eq!(region.pixel(100, 100), Some([255, 255, 255]));
    assert_ne!(region.pixel(10, 10), Some([255, 255, 255]));
}

// =============================================================================
// Thumbnails
// =============================================================================

#[test]
fn test_thumbnail_at_default_power() {
    let (_dir, reader) = open_slide();

    // 1.25x of a 20x slide is 1/16 of baseline, exactly level 2
    let thumbnail = reader.get_thumbnail().unwrap();
    assert_eq!(thumbnail.shape(), (48, 64, 3));

    let explicit = reader.slide_thumbnail(1.25, Units::Power).unwrap();
    assert_eq!(thumbnail, explicit);
}

#[test]
fn test_slide_thumbnail_in_mpp() {
    let (_dir, reader) = open_slide();
    let thumbnail = reader.slide_thumbnail(4.0, Units::Mpp).unwrap();
    assert_eq!(thumbnail.shape(), (96, 128, 3));
}

// =============================================================================
// Per-axis resolutions
// =============================================================================

#[test]
fn test_per_axis_resolution() {
    let slide = SyntheticSlide::new((4096, 4096), 5)
        .calibrated(0.25, 40.0)
        .with_property(keys::VENDOR, "synthetic");
    let reader = WsiReader::from_backend(slide).unwrap();
    assert_eq!(reader.info().vendor.as_deref(), Some("synthetic"));

    let resolution = Resolution::PerAxis(0.5, 1.0);
    let plan = reader
        .find_read_rect_params((0, 0), (100, 50), resolution, Units::Mpp)
        .unwrap();
    assert_eq!(plan.read_level, 1);
    assert!((plan.post_read_scale.x - 1.0).abs() < 1e-9);
    assert!((plan.post_read_scale.y - 0.5).abs() < 1e-9);
    assert_eq!(plan.level_read_size, (100, 100));

    let region = reader
        .read_rect((0, 0), (100, 50), resolution, Units::Mpp)
        .unwrap();
    assert_eq!(region.shape(), (50, 100, 3));
}

// =============================================================================
// JPEG 2000
// =============================================================================

const GRAY: [u8; 3] = [128, 128, 128];
const WHITE: [u8; 3] = [255, 255, 255];

/// 512x384 flat gray J2K at 20x / 0.5 mpp with 2 decompositions.
fn open_j2k() -> (TempDir, WsiReader<wsi_reader::AnySlide>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gray.j2k");
    std::fs::write(&path, j2k_codestream(512, 384, 2, Some("AppMag = 20|MPP = 0.5"))).unwrap();
    let reader = WsiReader::open(&path).unwrap();
    (dir, reader)
}

#[test]
fn test_jpeg2000_read_rect_at_baseline() {
    let (_dir, reader) = open_j2k();
    assert_eq!(
        reader.info().level_dimensions,
        vec![(512, 384), (256, 192), (128, 96)]
    );

    let region = reader.read_rect((480, 352), (64, 64), 20.0, Units::Power).unwrap();
    assert_eq!(region.shape(), (64, 64, 3));
    assert_eq!(region.pixel(0, 0), Some(GRAY));
    assert_eq!(region.pixel(31, 31), Some(GRAY));
    assert_eq!(region.pixel(32, 10), Some(WHITE));
    assert_eq!(region.pixel(10, 32), Some(WHITE));
}

#[test]
fn test_jpeg2000_read_rect_at_reduced_level() {
    let (_dir, reader) = open_j2k();

    // 5x of a 20x slide is exactly the second decomposition
    let plan = reader
        .find_read_rect_params((400, 0), (40, 20), 5.0, Units::Power)
        .unwrap();
    assert_eq!(plan.read_level, 2);
    assert_eq!(plan.level_location, (100, 0));
    assert_eq!(plan.level_read_size, (40, 20));
    assert!(plan.warning.is_none());

    // Level 2 is 128 wide: 28 columns of image, then padding
    let region = reader.read_rect((400, 0), (40, 20), 5.0, Units::Power).unwrap();
    assert_eq!(region.shape(), (20, 40, 3));
    assert_eq!(region.pixel(27, 19), Some(GRAY));
    assert_eq!(region.pixel(28, 0), Some(WHITE));

    let level1 = reader.read_rect((0, 0), (256, 192), 1.0, Units::Level).unwrap();
    assert_eq!(level1.shape(), (192, 256, 3));
    assert_eq!(level1.pixel(255, 191), Some(GRAY));
}

#[test]
fn test_jpeg2000_thumbnail() {
    let (_dir, reader) = open_j2k();

    // 1.25x of 20x is 1/16: read the coarsest level (1/4) and shrink
    let thumbnail = reader.get_thumbnail().unwrap();
    assert_eq!(thumbnail.shape(), (24, 32, 3));
    assert_eq!(thumbnail.pixel(16, 12), Some(GRAY));
}
