use std::ops::{AddAssign, Mul, Range};

use ndarray::Array3;

use crate::shared::raster_image::RasterImage;

/// Largest accepted radius, the full range a configured `u32` radius can
/// take. `255 * (2r + 1)^2` stays inside `u128` up to here.
pub const MAX_RADIUS: usize = u32::MAX as usize;

/// Storage for one horizontal window sum, `255 * (2r + 1)` at most.
trait RowSum: Copy + Default {
    fn from_sum(sum: u64) -> Self;
    fn widen(self) -> u128;
}

impl RowSum for u32 {
    fn from_sum(sum: u64) -> Self {
        sum as u32
    }

    fn widen(self) -> u128 {
        self as u128
    }
}

impl RowSum for u64 {
    fn from_sum(sum: u64) -> Self {
        sum
    }

    fn widen(self) -> u128 {
        self as u128
    }
}

/// Whether horizontal sums at `radius` fit in a `u32`.
fn row_sums_fit_u32(radius: usize) -> bool {
    255u64 * (2 * radius as u64 + 1) <= u32::MAX as u64
}

/// Clamp a possibly out-of-range coordinate to `[0, len)` (edge replication).
fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64 - 1) as usize
}

/// Sum of `sample(clamp(i))` for `i` in `[center - radius, center + radius]`.
///
/// Out-of-range positions are counted in closed form against the edge
/// samples, so the cost is bounded by `len` rather than by `radius`.
fn clamped_window_sum<T, F>(sample: F, len: usize, center: usize, radius: usize) -> T
where
    T: Copy + From<u64> + AddAssign + Mul<Output = T>,
    F: Fn(usize) -> T,
{
    let span = 2 * radius as u64 + 1;
    if len == 1 {
        return sample(0) * T::from(span);
    }

    let lo = center as i64 - radius as i64;
    let hi = center as i64 + radius as i64;
    let last = len as i64 - 1;

    let mut sum = T::from(0u64);
    let left = (hi.min(0) - lo + 1).max(0) as u64;
    if left > 0 {
        sum += sample(0) * T::from(left);
    }
    let right = (hi - lo.max(last) + 1).max(0) as u64;
    if right > 0 {
        sum += sample(last as usize) * T::from(right);
    }
    for i in lo.max(1)..=hi.min(last - 1) {
        sum += sample(i as usize);
    }
    sum
}

/// Box-blurs the output rows in `rows` and returns them as a packed buffer
/// of `rows.len() * image.row_len()` bytes.
///
/// Each output sample is the truncated mean of the `(2r + 1)^2` clamped
/// window around it. Works in two exact integer passes (horizontal window
/// sums, then vertical sums of those), sliding the window one step at a
/// time. Depends only on source pixels, never on how rows are banded.
pub fn blur_rows(image: &RasterImage, radius: usize, rows: Range<usize>) -> Vec<u8> {
    if row_sums_fit_u32(radius) {
        blur_rows_with::<u32>(image, radius, rows)
    } else {
        blur_rows_with::<u64>(image, radius, rows)
    }
}

fn blur_rows_with<S: RowSum>(image: &RasterImage, radius: usize, rows: Range<usize>) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let channels = image.channels() as usize;
    if rows.is_empty() || width == 0 {
        return Vec::new();
    }

    let src = image.as_ndarray();
    let r = radius as i64;

    // Source rows any output row in the band can reach.
    let first_src = rows.start.saturating_sub(radius);
    let last_src = (rows.end - 1).saturating_add(radius).min(height - 1);

    // Horizontal pass: row_sums[[sy - first_src, x, c]]
    let mut row_sums =
        Array3::<S>::from_elem((last_src - first_src + 1, width, channels), S::default());
    for sy in first_src..=last_src {
        for c in 0..channels {
            let sample = |x: usize| src[[sy, x, c]] as u64;
            let mut acc: u64 = clamped_window_sum(sample, width, 0, radius);
            for x in 0..width {
                row_sums[[sy - first_src, x, c]] = S::from_sum(acc);
                let leaving = clamp_index(x as i64 - r, width);
                let entering = clamp_index(x as i64 + r + 1, width);
                acc = acc - sample(leaving) + sample(entering);
            }
        }
    }

    // Vertical pass over the band, sliding down one row at a time.
    let span = 2 * radius as u128 + 1;
    let count = span * span;
    let mut out = vec![0u8; rows.len() * width * channels];
    for x in 0..width {
        for c in 0..channels {
            let sample = |sy: usize| row_sums[[sy - first_src, x, c]].widen();
            let mut acc: u128 = clamped_window_sum(sample, height, rows.start, radius);
            for (i, y) in rows.clone().enumerate() {
                out[(i * width + x) * channels + c] = (acc / count) as u8;
                let leaving = clamp_index(y as i64 - r, height);
                let entering = clamp_index(y as i64 + r + 1, height);
                if y + 1 < rows.end {
                    acc = acc - sample(leaving) + sample(entering);
                }
            }
        }
    }

    out
}

/// Direct window average for a single pixel. Reference for tests.
#[cfg(test)]
pub fn box_mean_at(image: &RasterImage, x: usize, y: usize, radius: usize) -> Vec<u8> {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let channels = image.channels() as usize;
    let r = radius as i64;
    let mut sums = vec![0u64; channels];
    let mut n = 0u64;
    for dy in -r..=r {
        for dx in -r..=r {
            let sx = clamp_index(x as i64 + dx, width);
            let sy = clamp_index(y as i64 + dy, height);
            for (c, sum) in sums.iter_mut().enumerate() {
                *sum += image.data()[(sy * width + sx) * channels + c] as u64;
            }
            n += 1;
        }
    }
    sums.into_iter().map(|s| (s / n) as u8).collect()
}
