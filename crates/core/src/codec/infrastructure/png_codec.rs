use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};

use crate::codec::domain::frame_codec::{CodecError, FrameCodec};
use crate::shared::raster_image::RasterImage;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Lossless PNG codec backed by the `image` crate.
///
/// Decoding normalises every PNG color type to 8-bit RGB, or RGBA when the
/// source carries an alpha channel.
pub struct PngCodec;

impl PngCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PngCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RasterImage, CodecError> {
        if !bytes.starts_with(&PNG_SIGNATURE) {
            return Err(CodecError::InvalidImageData(
                "missing PNG signature".into(),
            ));
        }

        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
            .map_err(|e| CodecError::InvalidImageData(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        let (data, channels) = if decoded.color().has_alpha() {
            (decoded.to_rgba8().into_raw(), 4)
        } else {
            (decoded.to_rgb8().into_raw(), 3)
        };
        RasterImage::try_new(data, width, height, channels)
            .map_err(|e| CodecError::InvalidImageData(e.to_string()))
    }

    fn encode(&self, image: &RasterImage) -> Result<Vec<u8>, CodecError> {
        let color = match image.channels() {
            3 => ExtendedColorType::Rgb8,
            4 => ExtendedColorType::Rgba8,
            other => return Err(CodecError::UnsupportedChannels(other)),
        };

        let mut out = Vec::new();
        PngEncoder::new(&mut out)
            .write_image(image.data(), image.width(), image.height(), color)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(out)
    }
}
