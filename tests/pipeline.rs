use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma, Rgb, RgbImage};

use orthoblend::pipeline::{self, PipelineConfig};
use orthoblend::OrthoError;

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "orthoblend_{name}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_world_file(dir: &Path, name: &str, translate_x: f64, translate_y: f64) {
    let values = [1.0, 0.0, 0.0, -1.0, translate_x, translate_y];
    let lines: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    fs::write(dir.join(name), lines.join("\n")).unwrap();
}

fn write_solid_tile(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
        .save(dir.join(name))
        .unwrap();
}

fn flat_config() -> PipelineConfig {
    // direct weighted blending with binary weight masks keeps the
    // expected pixel values exact up to int16 truncation
    PipelineConfig {
        num_bands: 0,
        feather_radius: 0.0,
        overlap_margin: 2.0,
        use_voronoi: true,
        debug: false,
    }
}

#[test]
fn adjacent_tiles_blend_side_by_side() {
    let dir = temp_dir("adjacent");
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "a.tif", 10, 10, 100);
    write_world_file(&dir, "b.tfw", 10.0, 0.0);
    write_solid_tile(&dir, "b.tif", 10, 10, 200);

    let output = dir.join("out.png");
    pipeline::run(&dir, &output, &flat_config()).unwrap();

    // ownership masks were persisted next to the rasters
    assert!(dir.join("a_voronoi_mask.tif").exists());
    assert!(dir.join("b_voronoi_mask.tif").exists());

    let composite = image::open(&output).unwrap().to_rgb8();
    assert_eq!(composite.dimensions(), (20, 10));
    for y in 0..10 {
        for x in 0..10 {
            let left = composite.get_pixel(x, y)[0] as i32;
            let right = composite.get_pixel(x + 10, y)[0] as i32;
            assert!((left - 100).abs() <= 1, "({x}, {y}): {left}");
            assert!((right - 200).abs() <= 1, "({x}, {y}): {right}");
        }
    }
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn overlapping_tiles_average_at_the_frontier() {
    let dir = temp_dir("overlap");
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "a.tif", 10, 10, 100);
    write_world_file(&dir, "b.tfw", 6.0, 0.0);
    write_solid_tile(&dir, "b.tif", 10, 10, 200);

    // identical weight and blend masks make the seam a plain weighted
    // average
    let config = PipelineConfig {
        use_voronoi: false,
        ..flat_config()
    };
    let output = dir.join("out.png");
    pipeline::run(&dir, &output, &config).unwrap();

    let composite = image::open(&output).unwrap().to_rgb8();
    assert_eq!(composite.dimensions(), (16, 10));

    let single_a = composite.get_pixel(2, 5)[0] as i32;
    let single_b = composite.get_pixel(14, 5)[0] as i32;
    let shared = composite.get_pixel(8, 5)[0] as i32;
    assert!((single_a - 100).abs() <= 1, "got {single_a}");
    assert!((single_b - 200).abs() <= 1, "got {single_b}");
    assert!((shared - 150).abs() <= 1, "got {shared}");
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn invalidated_corner_is_taken_over_by_the_neighbour() {
    let dir = temp_dir("validity");
    write_world_file(&dir, "Ort_a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "Ort_a.tif", 10, 10, 100);
    write_world_file(&dir, "Ort_b.tfw", 6.0, 0.0);
    write_solid_tile(&dir, "Ort_b.tif", 10, 10, 200);

    // white marks invalid: cut a 3x3 corner out of tile a inside the
    // region tile b also covers
    let mut validity = GrayImage::from_pixel(10, 10, Luma([0]));
    for y in 0..3 {
        for x in 7..10 {
            validity.put_pixel(x, y, Luma([255]));
        }
    }
    validity.save(dir.join("PC_a.tif")).unwrap();

    let config = PipelineConfig {
        overlap_margin: 0.0,
        ..flat_config()
    };
    let output = dir.join("out.png");
    pipeline::run(&dir, &output, &config).unwrap();

    let composite = image::open(&output).unwrap().to_rgb8();
    // the invalidated corner shows the neighbour
    for y in 0..3 {
        for x in 7..10 {
            let value = composite.get_pixel(x, y)[0] as i32;
            assert!((value - 200).abs() <= 1, "({x}, {y}): {value}");
        }
    }
    // sole-ownership regions keep their own tile
    let value = composite.get_pixel(2, 5)[0] as i32;
    assert!((value - 100).abs() <= 1, "got {value}");
    let value = composite.get_pixel(14, 5)[0] as i32;
    assert!((value - 200).abs() <= 1, "got {value}");
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn debug_mode_emits_per_tile_masks() {
    let dir = temp_dir("debug");
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "a.tif", 10, 10, 100);
    write_world_file(&dir, "b.tfw", 10.0, 0.0);
    write_solid_tile(&dir, "b.tif", 10, 10, 200);

    let config = PipelineConfig {
        debug: true,
        ..flat_config()
    };
    let output = dir.join("out.png");
    pipeline::run(&dir, &output, &config).unwrap();

    for name in [
        "out_a_weight.png",
        "out_a_blend.png",
        "out_b_weight.png",
        "out_b_blend.png",
        "out_coverage.png",
    ] {
        assert!(dir.join(name).exists(), "missing {name}");
    }
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn multiband_blending_keeps_single_owner_regions_intact() {
    let dir = temp_dir("multiband");
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "a.tif", 16, 16, 100);
    write_world_file(&dir, "b.tfw", 16.0, 0.0);
    write_solid_tile(&dir, "b.tif", 16, 16, 200);

    let config = PipelineConfig {
        num_bands: 2,
        ..flat_config()
    };
    let output = dir.join("out.png");
    pipeline::run(&dir, &output, &config).unwrap();

    let composite = image::open(&output).unwrap().to_rgb8();
    assert_eq!(composite.dimensions(), (32, 16));
    // away from the seam each tile survives the pyramid round trip
    for y in 4..12 {
        let left = composite.get_pixel(4, y)[0] as i32;
        let right = composite.get_pixel(28, y)[0] as i32;
        assert!((left - 100).abs() <= 3, "y={y}: {left}");
        assert!((right - 200).abs() <= 3, "y={y}: {right}");
    }
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn magenta_holes_do_not_bleed_into_their_surroundings() {
    let dir = temp_dir("inpaint");
    // a magenta hole marks unusable pixels in tile a
    let mut raster = RgbImage::from_pixel(16, 16, Rgb([100, 100, 100]));
    for y in 6..10 {
        for x in 6..10 {
            raster.put_pixel(x, y, Rgb([255, 0, 255]));
        }
    }
    raster.save(dir.join("a.tif")).unwrap();
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_world_file(&dir, "b.tfw", 16.0, 0.0);
    write_solid_tile(&dir, "b.tif", 16, 16, 100);

    // the hole is replaced by the tile's mean colour before the pyramid
    // sees it, so no magenta energy leaks across the hole boundary
    let config = PipelineConfig {
        num_bands: 2,
        use_voronoi: false,
        ..flat_config()
    };
    let output = dir.join("out.png");
    pipeline::run(&dir, &output, &config).unwrap();

    let composite = image::open(&output).unwrap().to_rgb8();
    for (x, y) in [(5, 5), (5, 8), (10, 10), (8, 10)] {
        let pixel = composite.get_pixel(x, y);
        for c in 0..3 {
            let value = pixel[c] as i32;
            assert!((value - 100).abs() <= 3, "({x}, {y})[{c}]: {value}");
        }
    }
    // the hole itself is uncovered and reads as black
    assert_eq!(composite.get_pixel(8, 8), &Rgb([0, 0, 0]));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn a_single_bad_world_file_fails_the_whole_run() {
    let dir = temp_dir("rotation");
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "a.tif", 10, 10, 100);
    // a rotated tile poisons the dataset
    let values = [1.0, 1e-6, 0.0, -1.0, 10.0, 0.0];
    let lines: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    fs::write(dir.join("b.tfw"), lines.join("\n")).unwrap();
    write_solid_tile(&dir, "b.tif", 10, 10, 200);

    let output = dir.join("out.png");
    let result = pipeline::run(&dir, &output, &flat_config());
    assert!(matches!(result, Err(OrthoError::UnsupportedGeometry { .. })));
    assert!(!output.exists());
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn fewer_than_two_tiles_is_an_invalid_canvas() {
    let dir = temp_dir("single");
    write_world_file(&dir, "a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "a.tif", 10, 10, 100);

    let result = pipeline::run(&dir, &dir.join("out.png"), &flat_config());
    assert!(matches!(result, Err(OrthoError::CanvasInvalid(_))));
    fs::remove_dir_all(&dir).ok();
}

#[test]
fn fully_invalid_tile_aborts_with_an_empty_mask() {
    let dir = temp_dir("empty_mask");
    write_world_file(&dir, "Ort_a.tfw", 0.0, 0.0);
    write_solid_tile(&dir, "Ort_a.tif", 10, 10, 100);
    write_world_file(&dir, "b.tfw", 10.0, 0.0);
    write_solid_tile(&dir, "b.tif", 10, 10, 200);

    // everything white: the whole tile is invalid
    GrayImage::from_pixel(10, 10, Luma([255]))
        .save(dir.join("PC_a.tif"))
        .unwrap();

    let result = pipeline::run(&dir, &dir.join("out.png"), &flat_config());
    assert!(matches!(result, Err(OrthoError::EmptyMask { .. })));
    fs::remove_dir_all(&dir).ok();
}
