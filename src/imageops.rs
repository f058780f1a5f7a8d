use image::{GrayImage, Rgb, RgbImage};
use ndarray::Array3;

/// Convert an 8-bit RGB raster into a signed 16-bit channel array laid out
/// as (height, width, channel).
pub fn rgb_to_i16(image: &RgbImage) -> Array3<i16> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((height as usize, width as usize, 3), |(y, x, c)| {
        image.get_pixel(x as _, y as _)[c] as i16
    })
}

/// Clamp a signed 16-bit channel array back into an 8-bit RGB raster.
pub fn i16_to_rgb(array: &Array3<i16>) -> RgbImage {
    let (height, width, _) = array.dim();
    RgbImage::from_fn(width as _, height as _, |x, y| {
        let (x, y) = (x as usize, y as usize);
        Rgb([
            array[[y, x, 0]].clamp(0, 255) as u8,
            array[[y, x, 1]].clamp(0, 255) as u8,
            array[[y, x, 2]].clamp(0, 255) as u8,
        ])
    })
}

/// Embed `src` into an `out_height` x `out_width` region with its top-left
/// at `(left, top)`, filling the rest by reflecting across the source
/// edges. Negative offsets crop instead of pad.
pub fn reflect_pad(
    src: &Array3<i16>,
    top: i64,
    left: i64,
    out_height: usize,
    out_width: usize,
) -> Array3<i16> {
    let (height, width, channels) = src.dim();
    Array3::from_shape_fn((out_height, out_width, channels), |(y, x, c)| {
        let sy = reflect_edge(y as i64 - top, height as i64);
        let sx = reflect_edge(x as i64 - left, width as i64);
        src[[sy, sx, c]]
    })
}

/// Fold an out-of-range index back into `0..len`, reflecting across the
/// edges with the edge sample repeated (`dcba|abcd|dcba`).
pub fn reflect_edge(mut index: i64, len: i64) -> usize {
    loop {
        if index < 0 {
            index = -index - 1;
        } else if index >= len {
            index = 2 * len - 1 - index;
        } else {
            return index as usize;
        }
    }
}

/// Mean colour of the raster over pixels where the mask is nonzero, or
/// `None` when the mask has no nonzero pixels.
pub fn mean_color(image: &RgbImage, mask: &GrayImage) -> Option<[f64; 3]> {
    let mut sum = [0f64; 3];
    let mut count = 0u64;
    for (x, y, pixel) in image.enumerate_pixels() {
        if mask.get_pixel(x, y)[0] == 0 {
            continue;
        }
        for (channel, total) in sum.iter_mut().enumerate() {
            *total += pixel[channel] as f64;
        }
        count += 1;
    }
    (count > 0).then(|| sum.map(|total| total / count as f64))
}

/// Paint every pixel where the mask is zero with the given colour.
pub fn fill_masked(image: &mut RgbImage, mask: &GrayImage, color: [f64; 3]) {
    let fill = Rgb(color.map(|channel| channel.round().clamp(0.0, 255.0) as u8));
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        if mask.get_pixel(x, y)[0] == 0 {
            *pixel = fill;
        }
    }
}
