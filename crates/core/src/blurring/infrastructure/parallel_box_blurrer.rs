use std::ops::Range;
use std::sync::Arc;

use crate::blurring::domain::image_blurrer::{BlurError, ImageBlurrer};
use crate::shared::raster_image::RasterImage;

use super::band_partition::partition_rows;
use super::band_pool::BandPool;
use super::box_kernel::{self, MAX_RADIUS};

/// Box blur with edge-clamped sampling, split into row bands that run on a
/// shared [`BandPool`].
///
/// Each band writes only its own output rows, so bands never contend. Output
/// is bit-identical for any band count.
pub struct ParallelBoxBlurrer {
    pool: Arc<BandPool>,
    band_count: Option<usize>,
}

impl ParallelBoxBlurrer {
    pub fn new(pool: Arc<BandPool>) -> Self {
        Self {
            pool,
            band_count: None,
        }
    }

    /// Overrides the number of bands (defaults to the pool size).
    pub fn with_band_count(mut self, bands: usize) -> Self {
        self.band_count = Some(bands.max(1));
        self
    }

    fn bands(&self) -> usize {
        self.band_count.unwrap_or_else(|| self.pool.size())
    }
}

pub fn validate_radius(radius: i64) -> Result<usize, BlurError> {
    if radius < 1 || radius > MAX_RADIUS as i64 {
        return Err(BlurError::InvalidRadius {
            radius,
            max: MAX_RADIUS as i64,
        });
    }
    Ok(radius as usize)
}

impl ImageBlurrer for ParallelBoxBlurrer {
    fn blur(&self, image: RasterImage, radius: i64) -> Result<RasterImage, BlurError> {
        let radius = validate_radius(radius)?;
        let (width, height, channels) = (image.width(), image.height(), image.channels());
        if width == 0 || height == 0 {
            return Ok(image);
        }

        let bands = partition_rows(height as usize, self.bands());
        log::debug!(
            "Blurring {width}x{height} image, radius {radius}, {} bands",
            bands.len()
        );

        let source = Arc::new(image);
        let kernel_source = Arc::clone(&source);
        let band_rows = self
            .pool
            .map_bands(
                bands,
                Arc::new(move |rows: Range<usize>| {
                    box_kernel::blur_rows(&kernel_source, radius, rows)
                }),
            )
            .map_err(|e| BlurError::Engine(e.to_string()))?;

        let mut data = Vec::with_capacity(source.data().len());
        for rows in band_rows {
            data.extend_from_slice(&rows);
        }
        if data.len() != source.data().len() {
            return Err(BlurError::Engine(format!(
                "assembled {} bytes, expected {}",
                data.len(),
                source.data().len()
            )));
        }

        Ok(RasterImage::new(data, width, height, channels))
    }
}
