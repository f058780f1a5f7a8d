//! Per-tile ownership masks from tile-center distances.
//!
//! Ownership is not a raw Voronoi partition: within a seam band of width
//! `2 * overlap_margin` straddling each Voronoi frontier, neighbouring
//! tiles share ownership linearly, so masks of adjacent tiles sum to 255
//! across the band.

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};

use crate::error::{OrthoError, Result};
use crate::mask::{INVALID_THRESHOLD, MASK_MAX, MASK_MIN};
use crate::tiles::Tile;

/// Generate one ownership mask per tile, persist each one next to its
/// raster as `<base>_voronoi_mask.tif` and record the path in the tile.
pub fn generate(tiles: &mut [Tile], overlap_margin: f64) -> Result<()> {
    if overlap_margin < 0.0 {
        return Err(OrthoError::InvalidGeometry(format!(
            "overlap margin must be non-negative, got {overlap_margin}"
        )));
    }
    if tiles.is_empty() {
        return Err(OrthoError::InvalidGeometry(
            "cannot generate ownership masks for an empty tile set".into(),
        ));
    }

    let validity = load_validity_masks(tiles)?;
    let snapshot = tiles.to_vec();

    for (index, tile) in snapshot.iter().enumerate() {
        log::debug!("generating ownership mask for {}", tile.name);
        let mask = ownership_mask(index, &snapshot, &validity, overlap_margin);

        let path = mask_output_path(&tile.image_path);
        mask.save(&path).map_err(|source| OrthoError::IoWriteFailure {
            path: path.clone(),
            source,
        })?;
        tiles[index].voronoi_mask_path = Some(path);
    }

    Ok(())
}

/// The ownership mask of one tile against the whole set.
///
/// For every pixel of the tile, the distance from the pixel to each
/// covering valid tile's center decides ownership: the closest tile owns
/// the pixel outside the seam band, and inside the band ownership ramps
/// linearly with the signed distance to the Voronoi frontier.
pub fn ownership_mask(
    index: usize,
    tiles: &[Tile],
    validity: &[Option<GrayImage>],
    overlap_margin: f64,
) -> GrayImage {
    let tile = &tiles[index];
    GrayImage::from_fn(tile.width, tile.height, |u, v| {
        if !is_valid(&validity[index], u, v) {
            return Luma([MASK_MIN]);
        }

        let x = tile.x + u as i64;
        let y = tile.y + v as i64;

        let mut nearest = f64::INFINITY;
        let mut second = f64::INFINITY;
        let mut owner = index;
        for (candidate, other) in tiles.iter().enumerate() {
            if !other.contains(x, y) {
                continue;
            }
            let (lu, lv) = ((x - other.x) as u32, (y - other.y) as u32);
            if !is_valid(&validity[candidate], lu, lv) {
                continue;
            }
            let (cx, cy) = other.center();
            let distance = (x as f64 - cx).hypot(y as f64 - cy);
            if distance < nearest {
                second = nearest;
                nearest = distance;
                owner = candidate;
            } else if distance < second {
                second = distance;
            }
        }

        // signed distance to the Voronoi frontier: positive inside the
        // owner's cell, negative outside
        let frontier = (second - nearest) / 2.0;
        let offset = if owner == index { frontier } else { -frontier };

        let value = if offset >= overlap_margin {
            MASK_MAX
        } else if offset < -overlap_margin {
            MASK_MIN
        } else {
            (255.0 * (offset + overlap_margin) / (2.0 * overlap_margin)).round() as u8
        };
        Luma([value])
    })
}

/// Load every tile's validity mask; tiles without one are valid
/// everywhere.
pub fn load_validity_masks(tiles: &[Tile]) -> Result<Vec<Option<GrayImage>>> {
    let mut masks = Vec::with_capacity(tiles.len());
    for tile in tiles {
        let Some(path) = &tile.validity_mask_path else {
            masks.push(None);
            continue;
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
        masks.push(Some(mask));
    }
    Ok(masks)
}

fn is_valid(mask: &Option<GrayImage>, u: u32, v: u32) -> bool {
    match mask {
        Some(mask) => mask.get_pixel(u, v)[0] < INVALID_THRESHOLD,
        None => true,
    }
}

fn mask_output_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("tile");
    image_path.with_file_name(format!("{stem}_voronoi_mask.tif"))
}
