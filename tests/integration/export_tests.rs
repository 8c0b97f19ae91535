//! Tiled export.
//!
//! Tests verify:
//! - Tile grid, names and CSV index at a reduced objective power
//! - Edge tiles are cut at the slide border
//! - Output paths that collide with the slide file are refused
//! - Slides without objective power are refused

use std::fs;

use wsi_reader::export::{save_tiles, INDEX_FILE_NAME, THUMBNAIL_FILE_NAME};
use wsi_reader::{ExportError, ReadError, ResolutionError, WsiReader};

use super::test_utils::{svs_builder, SlideTiffBuilder, SVS_LEVELS};

#[test]
fn test_save_tiles_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 0.5).write_to(dir.path(), "export.svs");
    let reader = WsiReader::open(&path).unwrap();
    let out = dir.path().join("tiles");

    // 200px tiles at 10x cover 400 baseline pixels each: 3 columns, 2 rows
    let summary = save_tiles(&reader, &out, 10.0, 200).unwrap();
    assert_eq!(summary.directory, out.join("export.svs"));
    assert_eq!(summary.tiles.len(), 6);

    let names: Vec<&str> = summary.tiles.iter().map(|t| t.tile_name.as_str()).collect();
    assert_eq!(
        names,
        [
            "Tile_10_0_0.jpg",
            "Tile_10_200_0.jpg",
            "Tile_10_400_0.jpg",
            "Tile_10_0_200.jpg",
            "Tile_10_200_200.jpg",
            "Tile_10_400_200.jpg",
        ]
    );
    for name in &names {
        assert!(summary.directory.join(name).is_file(), "missing {name}");
    }
    assert!(summary.directory.join(THUMBNAIL_FILE_NAME).is_file());

    let last = &summary.tiles[5];
    assert_eq!(
        (last.iter, last.x_start, last.y_start, last.x_end, last.y_end),
        (5, 800, 400, 1024, 768)
    );
}

#[test]
fn test_edge_tiles_are_cut() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 0.5).write_to(dir.path(), "edge.svs");
    let reader = WsiReader::open(&path).unwrap();

    let summary = save_tiles(&reader, &dir.path().join("tiles"), 10.0, 200).unwrap();

    let full = image::open(summary.directory.join("Tile_10_0_0.jpg")).unwrap();
    assert_eq!((full.width(), full.height()), (200, 200));

    // 224x368 baseline pixels at half resolution
    let corner = image::open(summary.directory.join("Tile_10_400_200.jpg")).unwrap();
    assert_eq!((corner.width(), corner.height()), (112, 184));
}

#[test]
fn test_index_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 0.5).write_to(dir.path(), "index.svs");
    let reader = WsiReader::open(&path).unwrap();

    let summary = save_tiles(&reader, &dir.path().join("tiles"), 20.0, 512).unwrap();
    assert_eq!(summary.tiles.len(), 4);

    let csv = fs::read_to_string(summary.directory.join(INDEX_FILE_NAME)).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(
        lines,
        [
            "iter,tile_name,x_start,y_start,x_end,y_end",
            "0,Tile_20_0_0.jpg,0,0,512,512",
            "1,Tile_20_512_0.jpg,512,0,1024,512",
            "2,Tile_20_0_512.jpg,0,512,512,768",
            "3,Tile_20_512_512.jpg,512,512,1024,768",
        ]
    );
}

#[test]
fn test_output_next_to_slide_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = svs_builder(20.0, 0.5).write_to(dir.path(), "here.svs");
    let reader = WsiReader::open(&path).unwrap();

    // The per-slide directory would be the slide file itself
    let result = save_tiles(&reader, dir.path(), 20.0, 512);
    assert!(matches!(result, Err(ExportError::Write { .. })));
    assert!(path.is_file());
}

#[test]
fn test_uncalibrated_slide_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = SlideTiffBuilder::new(&SVS_LEVELS)
        .tile_size(128)
        .write_to(dir.path(), "bare.tif");
    let reader = WsiReader::open(&path).unwrap();

    let result = save_tiles(&reader, &dir.path().join("out"), 20.0, 256);
    assert!(matches!(
        result,
        Err(ExportError::Read(ReadError::Resolution(
            ResolutionError::MissingCalibration { .. }
        )))
    ));
    assert!(!dir.path().join("out").exists());
}
