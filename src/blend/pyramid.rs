//! Gaussian and Laplacian pyramid primitives.
//!
//! All operations use the separable 5-tap binomial kernel (1, 4, 6, 4, 1)
//! with reflected borders. Level sizes shrink as `(n + 1) / 2`, so the
//! pyramid stays well formed for odd extents.

use ndarray::{Array2, Array3};

const KERNEL: [i32; 5] = [1, 4, 6, 4, 1];

/// Fold an out-of-range index back into `0..len` without repeating the
/// edge sample (`dcb|abcd|cba`).
fn reflect_101(index: i64, len: i64) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut folded = index.rem_euclid(period);
    if folded >= len {
        folded = period - folded;
    }
    folded as usize
}

/// Blur and decimate a three-channel int16 image by two.
pub fn pyr_down(src: &Array3<i16>) -> Array3<i16> {
    let (height, width, channels) = src.dim();
    let (out_height, out_width) = ((height + 1) / 2, (width + 1) / 2);

    let mut rows = Array3::<i32>::zeros((height, out_width, channels));
    for y in 0..height {
        for ox in 0..out_width {
            for c in 0..channels {
                let mut acc = 0i32;
                for (tap, &weight) in KERNEL.iter().enumerate() {
                    let x = reflect_101(2 * ox as i64 + tap as i64 - 2, width as i64);
                    acc += weight * src[[y, x, c]] as i32;
                }
                rows[[y, ox, c]] = acc;
            }
        }
    }

    let mut out = Array3::<i16>::zeros((out_height, out_width, channels));
    for oy in 0..out_height {
        for ox in 0..out_width {
            for c in 0..channels {
                let mut acc = 0i32;
                for (tap, &weight) in KERNEL.iter().enumerate() {
                    let y = reflect_101(2 * oy as i64 + tap as i64 - 2, height as i64);
                    acc += weight * rows[[y, ox, c]];
                }
                out[[oy, ox, c]] = ((acc + 128) >> 8) as i16;
            }
        }
    }
    out
}

/// Blur and decimate a single-channel float plane by two.
pub fn pyr_down_plane(src: &Array2<f32>) -> Array2<f32> {
    let (height, width) = src.dim();
    let (out_height, out_width) = ((height + 1) / 2, (width + 1) / 2);

    let mut rows = Array2::<f32>::zeros((height, out_width));
    for y in 0..height {
        for ox in 0..out_width {
            let mut acc = 0f32;
            for (tap, &weight) in KERNEL.iter().enumerate() {
                let x = reflect_101(2 * ox as i64 + tap as i64 - 2, width as i64);
                acc += weight as f32 * src[[y, x]];
            }
            rows[[y, ox]] = acc / 16.0;
        }
    }

    let mut out = Array2::<f32>::zeros((out_height, out_width));
    for oy in 0..out_height {
        for ox in 0..out_width {
            let mut acc = 0f32;
            for (tap, &weight) in KERNEL.iter().enumerate() {
                let y = reflect_101(2 * oy as i64 + tap as i64 - 2, height as i64);
                acc += weight as f32 * rows[[y, ox]];
            }
            out[[oy, ox]] = acc / 16.0;
        }
    }
    out
}

/// Upsample a three-channel int16 image to the requested size.
pub fn pyr_up(src: &Array3<i16>, out_height: usize, out_width: usize) -> Array3<i16> {
    let (height, width, channels) = src.dim();

    // per axis: even samples take (1, 6, 1) / 8, odd samples (4, 4) / 8
    let mut rows = Array3::<i32>::zeros((out_height, width, channels));
    for oy in 0..out_height {
        let t = (oy / 2) as i64;
        for x in 0..width {
            for c in 0..channels {
                let sample = |i: i64| src[[reflect_101(i, height as i64), x, c]] as i32;
                rows[[oy, x, c]] = if oy % 2 == 0 {
                    sample(t - 1) + 6 * sample(t) + sample(t + 1)
                } else {
                    4 * (sample(t) + sample(t + 1))
                };
            }
        }
    }

    let mut out = Array3::<i16>::zeros((out_height, out_width, channels));
    for oy in 0..out_height {
        for ox in 0..out_width {
            let t = (ox / 2) as i64;
            for c in 0..channels {
                let sample = |i: i64| rows[[oy, reflect_101(i, width as i64), c]];
                let acc = if ox % 2 == 0 {
                    sample(t - 1) + 6 * sample(t) + sample(t + 1)
                } else {
                    4 * (sample(t) + sample(t + 1))
                };
                out[[oy, ox, c]] = ((acc + 32) >> 6) as i16;
            }
        }
    }
    out
}

/// Decompose an image into `levels + 1` Laplacian bands; the last entry
/// is the residual Gaussian top.
pub fn build_laplacian(image: Array3<i16>, levels: u32) -> Vec<Array3<i16>> {
    let levels = levels as usize;
    let mut gauss = vec![image];
    for level in 0..levels {
        let next = pyr_down(&gauss[level]);
        gauss.push(next);
    }

    let mut pyr = Vec::with_capacity(levels + 1);
    for level in 0..levels {
        let (height, width, _) = gauss[level].dim();
        let up = pyr_up(&gauss[level + 1], height, width);
        let mut band = gauss[level].clone();
        band.zip_mut_with(&up, |b, &u| *b = b.saturating_sub(u));
        pyr.push(band);
    }
    pyr.push(gauss.swap_remove(levels));
    pyr
}

/// Collapse a Laplacian pyramid back into its base image.
pub fn collapse_laplacian(mut pyr: Vec<Array3<i16>>) -> Array3<i16> {
    while pyr.len() > 1 {
        let Some(top) = pyr.pop() else { break };
        let last = pyr.len() - 1;
        let (height, width, _) = pyr[last].dim();
        let up = pyr_up(&top, height, width);
        pyr[last].zip_mut_with(&up, |d, &u| *d = d.saturating_add(u));
    }
    pyr.pop().unwrap_or_else(|| Array3::zeros((0, 0, 3)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(height: usize, width: usize, value: i16) -> Array3<i16> {
        Array3::from_elem((height, width, 3), value)
    }

    #[test]
    fn reflect_101_skips_the_edge_sample() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(0, 1), 0);
        assert_eq!(reflect_101(3, 1), 0);
    }

    #[test]
    fn pyr_down_halves_with_round_up() {
        assert_eq!(pyr_down(&flat(10, 8, 0)).dim(), (5, 4, 3));
        assert_eq!(pyr_down(&flat(7, 5, 0)).dim(), (4, 3, 3));
    }

    #[test]
    fn pyramids_preserve_flat_images_exactly() {
        let down = pyr_down(&flat(8, 8, 77));
        assert!(down.iter().all(|&v| v == 77));

        let up = pyr_up(&flat(4, 4, -33), 8, 8);
        assert!(up.iter().all(|&v| v == -33));

        let plane = pyr_down_plane(&Array2::from_elem((8, 8), 0.25f32));
        assert!(plane.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }

    #[test]
    fn flat_laplacian_has_energy_only_in_the_top() {
        let pyr = build_laplacian(flat(16, 16, 120), 3);
        assert_eq!(pyr.len(), 4);
        for band in &pyr[..3] {
            assert!(band.iter().all(|&v| v == 0));
        }
        assert!(pyr[3].iter().all(|&v| v == 120));
    }

    #[test]
    fn collapse_inverts_build_for_flat_images() {
        let pyr = build_laplacian(flat(16, 12, 45), 2);
        let restored = collapse_laplacian(pyr);
        assert_eq!(restored.dim(), (16, 12, 3));
        assert!(restored.iter().all(|&v| v == 45));
    }

    #[test]
    fn collapse_reconstructs_gradients_within_rounding() {
        let src = Array3::from_shape_fn((16, 16, 3), |(y, x, c)| (4 * x + 2 * y + c) as i16);
        let restored = collapse_laplacian(build_laplacian(src.clone(), 3));
        for (restored, original) in restored.iter().zip(src.iter()) {
            assert!(
                (restored - original).abs() <= 2,
                "{restored} vs {original}"
            );
        }
    }
}
