//! The deterministic blending sequence: resolve metadata, generate
//! ownership masks, feed every tile through the blender, emit the
//! composite.

use std::path::Path;

use image::GrayImage;

use crate::blend::{DualMaskBlender, Rect};
use crate::error::{OrthoError, Result};
use crate::imageops;
use crate::mask::{coverage, voronoi};
use crate::tiles::{Tile, TileSet};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of pyramid bands used by the blender.
    pub num_bands: u32,
    /// Feather distance in pixels for validity-mask weight ramps.
    pub feather_radius: f64,
    /// Half-width in pixels of the ownership seam band.
    pub overlap_margin: f64,
    /// Blend with sharp ownership masks; without them the weight mask
    /// doubles as the blend mask.
    pub use_voronoi: bool,
    /// Write the per-tile weight and blend masks next to the output.
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_bands: 14,
            feather_radius: 512.0,
            overlap_margin: 20.0,
            use_voronoi: true,
            debug: false,
        }
    }
}

/// Blend every tile found under `input_dir` into a composite written to
/// `output_path`.
///
/// Tiles are processed strictly one at a time; each raster and mask is
/// released before the next tile is loaded, so peak memory stays at the
/// canvas pyramids plus a single tile.
pub fn run(input_dir: &Path, output_path: &Path, config: &PipelineConfig) -> Result<()> {
    let mut tiles = TileSet::resolve(input_dir)?;

    if tiles.tiles().len() < 2 {
        return Err(OrthoError::CanvasInvalid(format!(
            "need at least two tiles to blend, found {}",
            tiles.tiles().len()
        )));
    }
    let (canvas_width, canvas_height) = tiles.canvas_size();
    if canvas_width == 0 || canvas_height == 0 {
        return Err(OrthoError::CanvasInvalid(format!(
            "derived canvas is {canvas_width}x{canvas_height}"
        )));
    }

    let canvas_area = canvas_width as u64 * canvas_height as u64;
    let estimated_mib = config.num_bands.max(1) as u64 * canvas_area * 6 / (1024 * 1024);
    log::info!(
        "blending {} tiles onto {}x{} (pyramids ~{} MiB)",
        tiles.tiles().len(),
        canvas_width,
        canvas_height,
        estimated_mib
    );

    if config.use_voronoi {
        voronoi::generate(tiles.tiles_mut(), config.overlap_margin)?;
    }

    let mut blender = DualMaskBlender::<f32>::new(config.num_bands)?;
    blender.prepare(Rect::new(0, 0, canvas_width as i64, canvas_height as i64))?;

    for tile in tiles.tiles() {
        log::info!("feeding tile {}", tile.name);

        let mut raster = image::open(&tile.image_path)
            .map_err(|source| OrthoError::MissingInput {
                path: tile.image_path.clone(),
                source,
            })?
            .to_rgb8();

        let validity = load_validity_mask(tile)?;
        let weight_mask = coverage::feathered(validity.as_ref(), &raster, config.feather_radius);
        if weight_mask.pixels().all(|p| p[0] == 0) {
            return Err(OrthoError::EmptyMask {
                name: tile.name.clone(),
            });
        }

        let blend_mask = match &tile.voronoi_mask_path {
            Some(path) if config.use_voronoi => {
                let loaded = image::open(path)
                    .map_err(|source| OrthoError::MissingInput {
                        path: path.clone(),
                        source,
                    })?
                    .to_luma8();
                if loaded.dimensions() != (tile.width, tile.height) {
                    return Err(OrthoError::MaskShapeMismatch {
                        context: tile.name.clone(),
                        mask_width: loaded.width(),
                        mask_height: loaded.height(),
                        width: tile.width,
                        height: tile.height,
                    });
                }
                coverage::sharp(&loaded)
            }
            _ => weight_mask.clone(),
        };

        if config.debug {
            write_debug_masks(output_path, tile, &weight_mask, &blend_mask)?;
        }

        // pyramids bleed across zero-mask regions; a plausible local
        // colour there keeps the Laplacian energy low
        if let Some(mean) = imageops::mean_color(&raster, &blend_mask) {
            imageops::fill_masked(&mut raster, &blend_mask, mean);
        }

        let samples = imageops::rgb_to_i16(&raster);
        drop(raster);
        blender.feed(&samples, &weight_mask, &blend_mask, (tile.x, tile.y))?;
    }

    let (blended, coverage) = blender.blend()?;
    let composite = imageops::i16_to_rgb(&blended);
    composite
        .save(output_path)
        .map_err(|source| OrthoError::IoWriteFailure {
            path: output_path.to_path_buf(),
            source,
        })?;
    log::info!("wrote composite to {:?}", output_path);

    if config.debug {
        let path = debug_path(output_path, "coverage");
        coverage
            .save(&path)
            .map_err(|source| OrthoError::IoWriteFailure { path, source })?;
    }

    Ok(())
}

fn load_validity_mask(tile: &Tile) -> Result<Option<GrayImage>> {
    let Some(path) = &tile.validity_mask_path else {
        return Ok(None);
    };
    let mask = image::open(path)
        .map_err(|source| OrthoError::MissingInput {
            path: path.clone(),
            source,
        })?
        .to_luma8();
    if mask.dimensions() != (tile.width, tile.height) {
        return Err(OrthoError::MaskShapeMismatch {
            context: tile.name.clone(),
            mask_width: mask.width(),
            mask_height: mask.height(),
            width: tile.width,
            height: tile.height,
        });
    }
    Ok(Some(mask))
}

fn write_debug_masks(
    output_path: &Path,
    tile: &Tile,
    weight_mask: &GrayImage,
    blend_mask: &GrayImage,
) -> Result<()> {
    let stem = Path::new(&tile.name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("tile")
        .to_string();
    for (mask, kind) in [(weight_mask, "weight"), (blend_mask, "blend")] {
        let path = debug_path(output_path, &format!("{stem}_{kind}"));
        mask.save(&path)
            .map_err(|source| OrthoError::IoWriteFailure { path, source })?;
    }
    Ok(())
}

fn debug_path(output_path: &Path, suffix: &str) -> std::path::PathBuf {
    let stem = output_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("composite");
    output_path.with_file_name(format!("{stem}_{suffix}.png"))
}
