use std::sync::Arc;

use crate::blurring::domain::image_blurrer::ImageBlurrer;

use super::band_pool::{available_parallelism, BandPool};
use super::parallel_box_blurrer::ParallelBoxBlurrer;

/// Creates the box blurrer backed by a fresh band pool.
///
/// `workers` of `None` sizes the pool to the machine's available
/// parallelism. Logs the chosen size.
pub fn create_blurrer(workers: Option<usize>) -> std::io::Result<Arc<dyn ImageBlurrer>> {
    let size = workers.unwrap_or_else(available_parallelism).max(1);
    let pool = Arc::new(BandPool::new(size)?);
    log::info!("Using CPU box blur with {size} band workers");
    Ok(Arc::new(ParallelBoxBlurrer::new(pool)))
}
