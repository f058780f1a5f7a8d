//! Batch orthomosaic blending: georeferenced raster tiles in, one seamless
//! composite out.
//!
//! The pipeline resolves world-file metadata into canvas placements,
//! generates per-tile Voronoi ownership masks constrained by authored
//! validity masks, and feeds every tile through a multi-band blender that
//! takes two masks per tile: a smooth weight mask for pyramid
//! normalization and a sharp blend mask for pixel contribution.

pub mod blend;
pub mod error;
pub mod imageops;
pub mod mask;
pub mod pipeline;
pub mod tiles;

pub use blend::{DualMaskBlender, Rect};
pub use error::{OrthoError, Result};
pub use pipeline::PipelineConfig;
pub use tiles::{Tile, TileSet, WorldFileRecord};
