use std::ops::Range;

/// Splits `height` rows into contiguous bands, one per worker.
///
/// Every band gets `height / bands` rows and the last band absorbs the
/// remainder. The band count is clamped to `[1, height]` so no band is
/// empty. Together the bands cover `0..height` exactly once, in order.
pub fn partition_rows(height: usize, bands: usize) -> Vec<Range<usize>> {
    if height == 0 {
        return Vec::new();
    }
    let bands = bands.clamp(1, height);
    let band_height = height / bands;

    (0..bands)
        .map(|i| {
            let start = i * band_height;
            let end = if i == bands - 1 {
                height
            } else {
                start + band_height
            };
            start..end
        })
        .collect()
}
