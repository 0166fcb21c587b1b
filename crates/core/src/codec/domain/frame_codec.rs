use thiserror::Error;

use crate::shared::raster_image::RasterImage;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid image data: {0}")]
    InvalidImageData(String),
    #[error("cannot encode image with {0} channels")]
    UnsupportedChannels(u8),
    #[error("encoding failed: {0}")]
    Encode(String),
}

/// Converts between a [`RasterImage`] and a single-image container held in memory.
///
/// `decode(encode(img))` must reproduce `img` pixel-for-pixel.
pub trait FrameCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, CodecError>;

    fn encode(&self, image: &RasterImage) -> Result<Vec<u8>, CodecError>;
}
