//! Slide metadata derived from real files.
//!
//! Tests verify:
//! - Aperio AppMag/MPP become objective power and mpp
//! - TIFF resolution tags stand in for a missing mpp
//! - Objective power is inferred from mpp when absent
//! - Uncalibrated slides still open, with warnings
//! - JPEG 2000 headers carry geometry and comment metadata

use wsi_reader::slide::{keys, SlideBackend};
use wsi_reader::{
    CalibrationWarning, ReadError, ResolutionError, SlideFormat, Units, WsiReader,
};

use super::test_utils::{j2k_codestream, svs_builder, wrap_jp2, SlideTiffBuilder, SVS_LEVELS};

// =============================================================================
// Aperio
// =============================================================================

#[test]
fn test_aperio_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 0.5).write_to(dir.path(), "calibrated.svs");
    let reader = WsiReader::open(&path).unwrap();

    let info = reader.info();
    assert_eq!(info.file_path, path);
    assert_eq!(info.slide_dimensions, (1024, 768));
    assert_eq!(info.level_count, 3);
    assert_eq!(info.level_dimensions, SVS_LEVELS.to_vec());
    assert_eq!(info.level_downsamples, vec![1.0, 4.0, 16.0]);
    assert_eq!(info.mpp, Some((0.5, 0.5)));
    assert_eq!(info.objective_power, Some(20.0));
    assert_eq!(info.vendor.as_deref(), Some("aperio"));
    assert!(reader.calibration_warnings().is_empty());
}

#[test]
fn test_as_dict() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(40.0, 0.25).write_to(dir.path(), "dict.svs");
    let reader = WsiReader::open(&path).unwrap();

    let dict = reader.info().as_dict();
    for key in [
        "file_path",
        "slide_dimensions",
        "level_count",
        "level_dimensions",
        "level_downsamples",
        "mpp",
        "objective_power",
        "vendor",
    ] {
        assert!(dict.contains_key(key), "missing {key}");
    }
    assert_eq!(dict["slide_dimensions"], serde_json::json!([1024, 768]));
    assert_eq!(dict["objective_power"], serde_json::json!(40.0));
    assert_eq!(dict["mpp"], serde_json::json!([0.25, 0.25]));
}

#[test]
fn test_mpp_out_of_range_is_kept_with_warning() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 25.0).write_to(dir.path(), "coarse.svs");
    let reader = WsiReader::open(&path).unwrap();

    assert_eq!(reader.info().mpp, Some((25.0, 25.0)));
    assert_eq!(
        reader.calibration_warnings(),
        &[CalibrationWarning::MppOutOfRange { mpp: (25.0, 25.0) }]
    );
}

// =============================================================================
// TIFF resolution fallback
// =============================================================================

#[test]
fn test_mpp_from_resolution_in_centimeters() {
    let dir = tempfile::tempdir().unwrap();
    // 20000 pixels per centimeter is 0.5 microns per pixel
    let path = SlideTiffBuilder::new(&SVS_LEVELS)
        .tile_size(128)
        .resolution(20000.0, 3)
        .write_to(dir.path(), "cm.tif");
    let reader = WsiReader::open(&path).unwrap();

    let (x, y) = reader.info().mpp.unwrap();
    assert!((x - 0.5).abs() < 1e-9 && (y - 0.5).abs() < 1e-9);
    assert_eq!(reader.info().objective_power, Some(20.0));
    assert!(matches!(
        reader.calibration_warnings(),
        [
            CalibrationWarning::MppFromTiffResolution { .. },
            CalibrationWarning::ObjectivePowerInferred { objective_power }
        ] if *objective_power == 20.0
    ));
    assert_eq!(
        reader.backend().properties().get(keys::TIFF_RESOLUTION_UNIT),
        Some("centimeter")
    );
}

#[test]
fn test_mpp_from_resolution_in_inches() {
    let dir = tempfile::tempdir().unwrap();
    // 101600 pixels per inch is 0.25 microns per pixel
    let path = SlideTiffBuilder::new(&SVS_LEVELS)
        .tile_size(128)
        .resolution(101600.0, 2)
        .write_to(dir.path(), "inch.tif");
    let reader = WsiReader::open(&path).unwrap();

    let (x, _) = reader.info().mpp.unwrap();
    assert!((x - 0.25).abs() < 1e-9);
    assert_eq!(reader.info().objective_power, Some(40.0));
}

// =============================================================================
// Uncalibrated slides
// =============================================================================

#[test]
fn test_uncalibrated_slide() {
    let dir = tempfile::tempdir().unwrap();
    let path = SlideTiffBuilder::new(&SVS_LEVELS)
        .tile_size(128)
        .write_to(dir.path(), "bare.tif");
    let reader = WsiReader::open(&path).unwrap();

    assert_eq!(reader.info().mpp, None);
    assert_eq!(reader.info().objective_power, None);
    assert_eq!(
        reader.calibration_warnings(),
        &[
            CalibrationWarning::MppUndetermined,
            CalibrationWarning::ObjectivePowerUndetermined
        ]
    );

    assert!(matches!(
        reader.read_rect((0, 0), (16, 16), 10.0, Units::Power),
        Err(ReadError::Resolution(ResolutionError::MissingCalibration { .. }))
    ));
    assert!(matches!(
        reader.read_rect((0, 0), (16, 16), 1.0, Units::Mpp),
        Err(ReadError::Resolution(ResolutionError::MissingCalibration { .. }))
    ));

    // Level and baseline units need no calibration
    assert!(reader.read_rect((0, 0), (16, 16), 0.5, Units::Baseline).is_ok());

    // Thumbnail falls back to the coarsest level
    assert_eq!(reader.get_thumbnail().unwrap().shape(), (48, 64, 3));
}

#[test]
fn test_update_properties_recalibrates() {
    let dir = tempfile::tempdir().unwrap();
    let path = SlideTiffBuilder::new(&SVS_LEVELS)
        .tile_size(128)
        .write_to(dir.path(), "patched.tif");
    let mut reader = WsiReader::open(&path).unwrap();
    assert_eq!(reader.info().objective_power, None);

    reader
        .update_properties(|props| {
            props.insert(keys::MPP_X, 1.0);
            props.insert(keys::MPP_Y, 1.0);
        })
        .unwrap();
    assert_eq!(reader.info().mpp, Some((1.0, 1.0)));
    assert_eq!(reader.info().objective_power, Some(10.0));

    // 1.25x of a 10x slide is 1/8 of baseline
    assert_eq!(reader.get_thumbnail().unwrap().shape(), (96, 128, 3));
}

// =============================================================================
// JPEG 2000
// =============================================================================

#[test]
fn test_jp2_header_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("omnyx.jp2");
    let codestream = j2k_codestream(4000, 3000, 3, Some("AppMag = 40|MPP = 0.25"));
    std::fs::write(&path, wrap_jp2(&codestream)).unwrap();

    let reader = WsiReader::open(&path).unwrap();
    assert_eq!(reader.backend().format(), SlideFormat::Jpeg2000);

    let info = reader.info();
    assert_eq!(info.slide_dimensions, (4000, 3000));
    assert_eq!(
        info.level_dimensions,
        vec![(4000, 3000), (2000, 1500), (1000, 750), (500, 375)]
    );
    assert_eq!(info.level_downsamples, vec![1.0, 2.0, 4.0, 8.0]);
    assert_eq!(info.mpp, Some((0.25, 0.25)));
    assert_eq!(info.objective_power, Some(40.0));
    assert_eq!(info.vendor.as_deref(), Some("omnyx"));
}

#[test]
fn test_raw_codestream_without_comment() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plain.j2k");
    std::fs::write(&path, j2k_codestream(1000, 800, 2, None)).unwrap();

    let reader = WsiReader::open(&path).unwrap();
    assert_eq!(reader.info().level_count, 3);
    assert_eq!(reader.info().objective_power, None);
}
