//! World-file metadata resolution: tile placement and canvas derivation.

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use regex::Regex;

use crate::error::{OrthoError, Result};

const REFERENCE_WORLD_FILE: &str = "Orthophotomosaic.tfw";
const CANVAS_METADATA_FILE: &str = "MTDOrtho.xml";
const RASTER_EXTENSIONS: [&str; 4] = ["tif", "tiff", "TIF", "TIFF"];

/// The six affine coefficients of an ESRI world file, in file order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldFileRecord {
    pub scale_x: f64,
    pub rotation_y: f64,
    pub rotation_x: f64,
    pub scale_y: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl WorldFileRecord {
    /// Parse exactly six whitespace-separated decimal numbers.
    pub fn parse(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| OrthoError::metadata(path, format!("unreadable world file: {e}")))?;

        let mut values = [0f64; 6];
        let mut tokens = text.split_whitespace();
        for (index, slot) in values.iter_mut().enumerate() {
            let token = tokens
                .next()
                .ok_or_else(|| OrthoError::metadata(path, format!("expected 6 values, found {index}")))?;
            *slot = token
                .parse()
                .map_err(|_| OrthoError::metadata(path, format!("invalid numeric value: {token}")))?;
        }

        Ok(Self {
            scale_x: values[0],
            rotation_y: values[1],
            rotation_x: values[2],
            scale_y: values[3],
            translate_x: values[4],
            translate_y: values[5],
        })
    }

    fn ensure_axis_aligned(&self, path: &Path) -> Result<()> {
        if self.rotation_x != 0.0 || self.rotation_y != 0.0 {
            return Err(OrthoError::geometry(path, "nonzero rotation term"));
        }
        if self.scale_x.abs() <= 0.0 || self.scale_y.abs() <= 0.0 {
            return Err(OrthoError::geometry(path, "zero pixel scale"));
        }
        Ok(())
    }

    /// Canvas pixel coordinates of the record origin for the given scale.
    fn pixel_origin(&self, pixel_width: f64, pixel_height: f64) -> (i64, i64) {
        // world Y grows northward, image Y grows downward
        let x = (self.translate_x / pixel_width).round() as i64;
        let y = (-self.translate_y / pixel_height).round() as i64;
        (x, y)
    }
}

/// One input raster with its rectangular placement on the canvas.
#[derive(Debug, Clone)]
pub struct Tile {
    pub name: String,
    pub image_path: PathBuf,
    pub validity_mask_path: Option<PathBuf>,
    pub voronoi_mask_path: Option<PathBuf>,
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Tile {
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x
            && x < self.x + self.width as i64
            && y >= self.y
            && y < self.y + self.height as i64
    }
}

/// All tiles of one dataset with the derived canvas.
#[derive(Debug)]
pub struct TileSet {
    tiles: Vec<Tile>,
    canvas_width: u32,
    canvas_height: u32,
    pixel_width: f64,
    pixel_height: f64,
}

impl TileSet {
    /// Scan a directory of world files, place every raster on the canvas
    /// and derive the canvas size.
    ///
    /// When both the reference world file and the canvas metadata file are
    /// present, tiles are shifted by the reference pixel origin and the
    /// canvas size is taken from the metadata. Otherwise the tight
    /// bounding box of all tiles becomes the canvas.
    pub fn resolve(directory: &Path) -> Result<TileSet> {
        let entries = fs::read_dir(directory)
            .map_err(|e| OrthoError::metadata(directory, format!("unreadable directory: {e}")))?;
        let world_files: Vec<PathBuf> = entries
            .filter_map(|entry| Some(entry.ok()?.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("tfw"))
            })
            .sorted()
            .collect();
        if world_files.is_empty() {
            return Err(OrthoError::metadata(directory, "no world files found"));
        }

        let mut pixel_width = 0.0;
        let mut pixel_height = 0.0;

        // referenced mode needs both the reference world file and the
        // declared canvas dimensions
        let reference_path = directory.join(REFERENCE_WORLD_FILE);
        let metadata_path = directory.join(CANVAS_METADATA_FILE);
        let mut reference = None;
        if reference_path.exists() && metadata_path.exists() {
            let record = WorldFileRecord::parse(&reference_path)?;
            record.ensure_axis_aligned(&reference_path)?;
            let canvas = parse_canvas_metadata(&metadata_path)?;
            pixel_width = record.scale_x.abs();
            pixel_height = record.scale_y.abs();
            reference = Some((record, canvas));
        }

        let mut tiles = Vec::new();
        for world_file in &world_files {
            if world_file.file_name().is_some_and(|n| n == REFERENCE_WORLD_FILE) {
                continue;
            }

            let record = WorldFileRecord::parse(world_file)?;
            record.ensure_axis_aligned(world_file)?;

            if pixel_width == 0.0 && pixel_height == 0.0 {
                pixel_width = record.scale_x.abs();
                pixel_height = record.scale_y.abs();
            } else if record.scale_x.abs() != pixel_width || record.scale_y.abs() != pixel_height {
                return Err(OrthoError::resolution(
                    world_file,
                    format!(
                        "pixel scale {}x{} differs from {}x{}",
                        record.scale_x.abs(),
                        record.scale_y.abs(),
                        pixel_width,
                        pixel_height
                    ),
                ));
            }

            let Some(image_path) = resolve_raster_path(world_file) else {
                // a reference world file need not have its own raster
                log::debug!("skipping {:?}: no matching raster", world_file);
                continue;
            };

            let (width, height) = image::image_dimensions(&image_path)
                .map_err(|source| OrthoError::MissingInput {
                    path: image_path.clone(),
                    source,
                })?;

            let name = image_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let (x, y) = record.pixel_origin(pixel_width, pixel_height);

            tiles.push(Tile {
                validity_mask_path: resolve_validity_mask_path(&image_path),
                voronoi_mask_path: None,
                name,
                image_path,
                x,
                y,
                width,
                height,
            });
        }

        if tiles.is_empty() {
            return Err(OrthoError::CanvasInvalid(
                "no world file has a matching raster".into(),
            ));
        }

        let (canvas_width, canvas_height) = match reference {
            Some((record, canvas)) => {
                let (ref_x, ref_y) = record.pixel_origin(pixel_width, pixel_height);
                for tile in &mut tiles {
                    tile.x -= ref_x;
                    tile.y -= ref_y;
                }
                canvas
            }
            None => {
                let min_x = tiles.iter().map(|t| t.x).min().unwrap_or(0);
                let min_y = tiles.iter().map(|t| t.y).min().unwrap_or(0);
                let mut width = 0;
                let mut height = 0;
                for tile in &mut tiles {
                    tile.x -= min_x;
                    tile.y -= min_y;
                    width = width.max(tile.x + tile.width as i64);
                    height = height.max(tile.y + tile.height as i64);
                }
                (width as u32, height as u32)
            }
        };

        log::info!(
            "resolved {} tiles onto a {}x{} canvas",
            tiles.len(),
            canvas_width,
            canvas_height
        );

        Ok(TileSet {
            tiles,
            canvas_width,
            canvas_height,
            pixel_width,
            pixel_height,
        })
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        (self.canvas_width, self.canvas_height)
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        (self.pixel_width, self.pixel_height)
    }
}

/// Probe the usual raster extensions next to a world file.
fn resolve_raster_path(world_file: &Path) -> Option<PathBuf> {
    let base = world_file.file_stem()?.to_str()?;
    RASTER_EXTENSIONS
        .iter()
        .map(|ext| world_file.with_file_name(format!("{base}.{ext}")))
        .find(|candidate| candidate.exists())
}

/// A raster named `Ort_*` may have a preauthored validity mask `PC_*`.
fn resolve_validity_mask_path(image_path: &Path) -> Option<PathBuf> {
    let file_name = image_path.file_name()?.to_str()?;
    let rest = file_name.strip_prefix("Ort_")?;
    let candidate = image_path.with_file_name(format!("PC_{rest}"));
    candidate.exists().then_some(candidate)
}

/// Extract the declared `W H` canvas dimensions from the sidecar XML.
fn parse_canvas_metadata(path: &Path) -> Result<(u32, u32)> {
    let text = fs::read_to_string(path)
        .map_err(|e| OrthoError::metadata(path, format!("unreadable metadata file: {e}")))?;

    let pattern = Regex::new(r"<NombrePixels>\s*(\d+)\s+(\d+)\s*</NombrePixels>").unwrap();
    let captures = pattern
        .captures(&text)
        .ok_or_else(|| OrthoError::metadata(path, "NombrePixels element not found"))?;

    let width: u32 = captures[1]
        .parse()
        .map_err(|_| OrthoError::metadata(path, "invalid pixel dimensions"))?;
    let height: u32 = captures[2]
        .parse()
        .map_err(|_| OrthoError::metadata(path, "invalid pixel dimensions"))?;
    if width == 0 || height == 0 {
        return Err(OrthoError::metadata(path, "invalid pixel dimensions"));
    }
    Ok((width, height))
}
