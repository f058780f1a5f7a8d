//! Multi-band blending with separate weight and blend masks.
//!
//! A conventional multi-band blender drives both the Laplacian
//! accumulation and the normalization denominator from a single mask,
//! which forces a choice between ghosting (wide masks) and banding (sharp
//! masks). Here the two concerns are split: a smooth weight mask
//! accumulates the denominator while a sharp blend mask modulates pixel
//! contribution, so radiometric transitions stay smooth without double
//! imaging at the seams.

pub mod pyramid;

use image::{GrayImage, Luma};
use ndarray::{s, Array2, Array3};

use crate::error::{OrthoError, Result};
use crate::imageops;
use crate::mask::{MASK_MAX, MASK_MIN};

const WEIGHT_EPS: f32 = 1e-5;
const MAX_BANDS: u32 = 50;

/// An axis-aligned pixel region in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    fn right(&self) -> i64 {
        self.x + self.width
    }

    fn bottom(&self) -> i64 {
        self.y + self.height
    }
}

/// Working type for band-weight accumulation.
///
/// `f32` keeps weights as fractions of one; `i16` keeps the mask byte
/// plus a one offset at nonzero bytes so accumulated denominators never
/// reach zero, with blend modulation done as a fixed-point shift.
pub trait BandWeight: Copy + Default + 'static {
    fn from_mask_byte(byte: u8) -> Self;
    fn accumulate(accumulated: Self, weight: Self) -> Self;
    /// Modulate one Laplacian sample by a blend weight.
    fn modulate(sample: i16, weight: Self) -> i16;
    /// Divide an accumulated sample by an accumulated weight.
    fn normalize(sample: i16, weight: Self) -> i16;
    /// Whether an accumulated weight marks the pixel as covered.
    fn covers(self) -> bool;
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl BandWeight for f32 {
    fn from_mask_byte(byte: u8) -> Self {
        byte as f32 / 255.0
    }

    fn accumulate(accumulated: Self, weight: Self) -> Self {
        accumulated + weight
    }

    fn modulate(sample: i16, weight: Self) -> i16 {
        (sample as f32 * weight) as i16
    }

    fn normalize(sample: i16, weight: Self) -> i16 {
        (sample as f32 / (weight + WEIGHT_EPS)) as i16
    }

    fn covers(self) -> bool {
        self > WEIGHT_EPS
    }

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

impl BandWeight for i16 {
    fn from_mask_byte(byte: u8) -> Self {
        byte as i16 + (byte != 0) as i16
    }

    fn accumulate(accumulated: Self, weight: Self) -> Self {
        accumulated.saturating_add(weight)
    }

    fn modulate(sample: i16, weight: Self) -> i16 {
        ((sample as i32 * weight as i32) >> 8) as i16
    }

    fn normalize(sample: i16, weight: Self) -> i16 {
        (((sample as i32) << 8) / (weight as i32 + 1)) as i16
    }

    fn covers(self) -> bool {
        self > 0
    }

    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as i16
    }
}

/// Incremental multi-band compositor over a fixed canvas region.
///
/// `prepare` allocates the canvas pyramids, `feed` accumulates one tile
/// at a time, and `blend` consumes the blender and yields the composite
/// together with its coverage mask.
pub struct DualMaskBlender<W: BandWeight = f32> {
    requested_bands: u32,
    bands: u32,
    roi: Rect,
    roi_final: Rect,
    laplace: Vec<Array3<i16>>,
    weights: Vec<Array2<W>>,
    fed: usize,
}

impl<W: BandWeight> DualMaskBlender<W> {
    pub fn new(num_bands: u32) -> Result<Self> {
        if num_bands > MAX_BANDS {
            return Err(OrthoError::InvalidGeometry(format!(
                "number of bands must be at most {MAX_BANDS}, got {num_bands}"
            )));
        }
        Ok(Self {
            requested_bands: num_bands,
            bands: 0,
            roi: Rect::new(0, 0, 0, 0),
            roi_final: Rect::new(0, 0, 0, 0),
            laplace: Vec::new(),
            weights: Vec::new(),
            fed: 0,
        })
    }

    /// Number of pyramid bands actually in use after `prepare`.
    pub fn bands(&self) -> u32 {
        self.bands
    }

    /// Allocate zeroed canvas pyramids for the given destination region.
    pub fn prepare(&mut self, roi: Rect) -> Result<()> {
        if roi.width <= 0 || roi.height <= 0 {
            return Err(OrthoError::CanvasInvalid(format!(
                "blend target must have a positive size, got {}x{}",
                roi.width, roi.height
            )));
        }

        // bands beyond the canvas extent carry no information
        let max_len = roi.width.max(roi.height) as f64;
        self.bands = self.requested_bands.min(max_len.log2().ceil() as u32);

        // pad so every level halves exactly
        let step = 1i64 << self.bands;
        let mut padded = roi;
        padded.width += (step - padded.width % step) % step;
        padded.height += (step - padded.height % step) % step;
        self.roi_final = roi;
        self.roi = padded;

        self.laplace.clear();
        self.weights.clear();
        self.fed = 0;

        let (mut height, mut width) = (padded.height as usize, padded.width as usize);
        self.laplace.push(Array3::zeros((height, width, 3)));
        self.weights.push(Array2::from_elem((height, width), W::default()));
        for _ in 0..self.bands {
            height = (height + 1) / 2;
            width = (width + 1) / 2;
            self.laplace.push(Array3::zeros((height, width, 3)));
            self.weights.push(Array2::from_elem((height, width), W::default()));
        }
        Ok(())
    }

    /// Accumulate one tile.
    ///
    /// The blend mask modulates the tile's Laplacian contribution; the
    /// weight mask accumulates the normalization denominator. Passing the
    /// same mask twice reduces to conventional multi-band blending.
    pub fn feed(
        &mut self,
        image: &Array3<i16>,
        weight_mask: &GrayImage,
        blend_mask: &GrayImage,
        top_left: (i64, i64),
    ) -> Result<()> {
        if self.laplace.is_empty() {
            return Err(OrthoError::InvalidGeometry(
                "feed called before prepare".into(),
            ));
        }
        let (height, width, channels) = image.dim();
        if channels != 3 {
            return Err(OrthoError::InvalidGeometry(format!(
                "expected a three-channel image, got {channels} channels"
            )));
        }
        for (mask, what) in [(weight_mask, "weight mask"), (blend_mask, "blend mask")] {
            if mask.dimensions() != (width as u32, height as u32) {
                return Err(OrthoError::MaskShapeMismatch {
                    context: format!("the fed image ({what})"),
                    mask_width: mask.width(),
                    mask_height: mask.height(),
                    width: width as u32,
                    height: height as u32,
                });
            }
        }

        let (tile_x, tile_y) = top_left;

        // support region: the tile plus a gap of blur reach, clipped to
        // the canvas and snapped to the pyramid grid
        let gap = 3 * (1i64 << self.bands);
        let mut left = self.roi.x.max(tile_x - gap);
        let mut top = self.roi.y.max(tile_y - gap);
        let mut right = self.roi.right().min(tile_x + width as i64 + gap);
        let mut bottom = self.roi.bottom().min(tile_y + height as i64 + gap);
        if right <= left || bottom <= top {
            return Err(OrthoError::IncompatibleLevel(format!(
                "tile at ({tile_x}, {tile_y}) has no support inside the blend target"
            )));
        }

        left = self.roi.x + (((left - self.roi.x) >> self.bands) << self.bands);
        top = self.roi.y + (((top - self.roi.y) >> self.bands) << self.bands);
        let step = 1i64 << self.bands;
        let mut region_width = right - left;
        let mut region_height = bottom - top;
        region_width += (step - region_width % step) % step;
        region_height += (step - region_height % step) % step;
        right = left + region_width;
        bottom = top + region_height;
        let shift_x = (right - self.roi.right()).max(0);
        let shift_y = (bottom - self.roi.bottom()).max(0);
        left -= shift_x;
        right -= shift_x;
        top -= shift_y;
        bottom -= shift_y;

        // tile offset inside the support region
        let pad_top = tile_y - top;
        let pad_left = tile_x - left;

        let padded = imageops::reflect_pad(
            image,
            pad_top,
            pad_left,
            region_height as usize,
            region_width as usize,
        );
        let laplacian = pyramid::build_laplacian(padded, self.bands);

        let weight_pyr = mask_pyramid::<W>(
            weight_mask,
            region_height as usize,
            region_width as usize,
            pad_top,
            pad_left,
            self.bands,
        );
        let blend_pyr = mask_pyramid::<W>(
            blend_mask,
            region_height as usize,
            region_width as usize,
            pad_top,
            pad_left,
            self.bands,
        );

        let mut x0 = (left - self.roi.x) as usize;
        let mut y0 = (top - self.roi.y) as usize;
        let mut x1 = (right - self.roi.x) as usize;
        let mut y1 = (bottom - self.roi.y) as usize;
        for level in 0..=self.bands as usize {
            let source = &laplacian[level];
            let weight = &weight_pyr[level];
            let blend = &blend_pyr[level];
            let mut laplace_dst = self.laplace[level].slice_mut(s![y0..y1, x0..x1, ..]);
            let mut weight_dst = self.weights[level].slice_mut(s![y0..y1, x0..x1]);

            for y in 0..(y1 - y0) {
                for x in 0..(x1 - x0) {
                    let blend_weight = blend[[y, x]];
                    for c in 0..3 {
                        let contribution = W::modulate(source[[y, x, c]], blend_weight);
                        laplace_dst[[y, x, c]] = laplace_dst[[y, x, c]].saturating_add(contribution);
                    }
                    weight_dst[[y, x]] = W::accumulate(weight_dst[[y, x]], weight[[y, x]]);
                }
            }

            x0 /= 2;
            y0 /= 2;
            x1 /= 2;
            y1 /= 2;
        }

        self.fed += 1;
        Ok(())
    }

    /// Normalize, collapse and crop the accumulated pyramids.
    ///
    /// Returns the int16 composite over the originally requested region
    /// and a mask that is 255 exactly where some weight mask covered the
    /// pixel. The pyramids are released.
    pub fn blend(mut self) -> Result<(Array3<i16>, GrayImage)> {
        if self.laplace.is_empty() {
            return Err(OrthoError::InvalidGeometry(
                "blend called before prepare".into(),
            ));
        }
        if self.fed == 0 {
            return Err(OrthoError::BlenderEmpty);
        }

        for level in 0..self.laplace.len() {
            let weights = &self.weights[level];
            let band = &mut self.laplace[level];
            let (height, width, _) = band.dim();
            for y in 0..height {
                for x in 0..width {
                    let weight = weights[[y, x]];
                    for c in 0..3 {
                        band[[y, x, c]] = W::normalize(band[[y, x, c]], weight);
                    }
                }
            }
        }

        let full = pyramid::collapse_laplacian(std::mem::take(&mut self.laplace));

        let out_width = self.roi_final.width as usize;
        let out_height = self.roi_final.height as usize;
        let mut composite = full.slice(s![0..out_height, 0..out_width, ..]).to_owned();

        let base_weights = self.weights.swap_remove(0);
        let coverage = GrayImage::from_fn(out_width as u32, out_height as u32, |x, y| {
            if base_weights[[y as usize, x as usize]].covers() {
                Luma([MASK_MAX])
            } else {
                Luma([MASK_MIN])
            }
        });

        for y in 0..out_height {
            for x in 0..out_width {
                if coverage.get_pixel(x as u32, y as u32)[0] == MASK_MIN {
                    for c in 0..3 {
                        composite[[y, x, c]] = 0;
                    }
                }
            }
        }

        Ok((composite, coverage))
    }
}

/// Zero-pad a mask into its support region and build its Gaussian
/// pyramid in the working weight type.
fn mask_pyramid<W: BandWeight>(
    mask: &GrayImage,
    region_height: usize,
    region_width: usize,
    top: i64,
    left: i64,
    bands: u32,
) -> Vec<Array2<W>> {
    let mut base = Array2::from_elem((region_height, region_width), W::default());
    let (mask_width, mask_height) = mask.dimensions();
    let y_start = top.max(0);
    let y_end = (top + mask_height as i64).min(region_height as i64);
    let x_start = left.max(0);
    let x_end = (left + mask_width as i64).min(region_width as i64);
    for y in y_start..y_end {
        for x in x_start..x_end {
            let byte = mask.get_pixel((x - left) as u32, (y - top) as u32)[0];
            base[[y as usize, x as usize]] = W::from_mask_byte(byte);
        }
    }

    let mut pyr = vec![base];
    for level in 0..bands as usize {
        let plane = pyr[level].mapv(W::to_f32);
        pyr.push(pyramid::pyr_down_plane(&plane).mapv(W::from_f32));
    }
    pyr
}
