//! Per-tile 8-bit coverage masks from authored validity masks or the
//! raster's magenta fill, optionally feathered by distance to invalid
//! pixels and to the tile borders.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::euclidean_squared_distance_transform;

use crate::mask::{INVALID_THRESHOLD, MASK_MAX, MASK_MIN};

/// Rasters without an authored mask mark unusable pixels with pure magenta.
const FALLBACK_INVALID_COLOR: [u8; 3] = [255, 0, 255];

/// Coverage for a generated ownership mask: the seam gradient is
/// preserved verbatim.
pub fn sharp(loaded: &GrayImage) -> GrayImage {
    loaded.clone()
}

/// Coverage for an authored validity mask (black = valid, white =
/// invalid), or from the raster's magenta fill when no mask exists.
///
/// The binary mask ramps from 0 at invalid pixels and tile borders up to
/// 255 over `feather_radius` pixels. A radius of at most one yields the
/// plain binary mask. Originally invalid pixels stay at 0.
pub fn feathered(loaded: Option<&GrayImage>, raster: &RgbImage, feather_radius: f64) -> GrayImage {
    let binary = match loaded {
        Some(mask) => binarize(mask),
        None => magenta_fallback(raster),
    };

    if feather_radius <= 1.0 {
        return binary;
    }

    let (width, height) = binary.dimensions();

    // distance to the nearest invalid pixel
    let invalid = GrayImage::from_fn(width, height, |x, y| {
        if binary.get_pixel(x, y)[0] == MASK_MIN {
            Luma([MASK_MAX])
        } else {
            Luma([MASK_MIN])
        }
    });
    let from_invalid = euclidean_squared_distance_transform(&invalid);

    // distance to the nearest tile border pixel
    let border = GrayImage::from_fn(width, height, |x, y| {
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            Luma([MASK_MAX])
        } else {
            Luma([MASK_MIN])
        }
    });
    let from_border = euclidean_squared_distance_transform(&border);

    GrayImage::from_fn(width, height, |x, y| {
        if binary.get_pixel(x, y)[0] == MASK_MIN {
            return Luma([MASK_MIN]);
        }
        let distance = from_invalid.get_pixel(x, y)[0]
            .min(from_border.get_pixel(x, y)[0])
            .sqrt();
        let ramp = (distance / feather_radius).min(1.0);
        Luma([(ramp * 255.0).round() as u8])
    })
}

fn binarize(mask: &GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y)[0] < INVALID_THRESHOLD {
            Luma([MASK_MAX])
        } else {
            Luma([MASK_MIN])
        }
    })
}

fn magenta_fallback(raster: &RgbImage) -> GrayImage {
    let (width, height) = raster.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if raster.get_pixel(x, y).0 == FALLBACK_INVALID_COLOR {
            Luma([MASK_MIN])
        } else {
            Luma([MASK_MAX])
        }
    })
}
