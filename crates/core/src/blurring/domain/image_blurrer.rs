use thiserror::Error;

use crate::shared::raster_image::RasterImage;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BlurError {
    #[error("blur radius must be between 1 and {max}, got {radius}")]
    InvalidRadius { radius: i64, max: i64 },
    #[error("blur engine failed: {0}")]
    Engine(String),
}

/// Domain interface for whole-image spatial blurs.
///
/// Takes ownership of the source image and returns a new image of identical
/// dimensions; the source is never written to. On error no partial output
/// is returned.
pub trait ImageBlurrer: Send + Sync {
    fn blur(&self, image: RasterImage, radius: i64) -> Result<RasterImage, BlurError>;
}
