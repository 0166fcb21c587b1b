use ndarray::ArrayView3;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RasterImageError {
    #[error("unsupported channel count {0}, expected 3 (RGB) or 4 (RGBA)")]
    UnsupportedChannels(u8),
    #[error("pixel buffer holds {actual} bytes, expected {expected} for {width}x{height}x{channels}")]
    BufferLength {
        width: u32,
        height: u32,
        channels: u8,
        expected: usize,
        actual: usize,
    },
}

/// A decoded raster image: contiguous 8-bit samples in row-major order,
/// origin top-left.
///
/// Owned by exactly one stage at a time (codec, engine, codec). The blur
/// engine borrows it read-only and produces a fresh image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl RasterImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// Checked constructor for buffers arriving from outside the crate.
    pub fn try_new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Self, RasterImageError> {
        if channels != 3 && channels != 4 {
            return Err(RasterImageError::UnsupportedChannels(channels));
        }
        let expected = (width as usize) * (height as usize) * (channels as usize);
        if data.len() != expected {
            return Err(RasterImageError::BufferLength {
                width,
                height,
                channels,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self::new(data, width, height, channels))
    }

    /// Image of the given size with every pixel set to `pixel`.
    pub fn filled(width: u32, height: u32, pixel: &[u8]) -> Self {
        let count = (width as usize) * (height as usize);
        let data = pixel.repeat(count);
        Self::new(data, width, height, pixel.len() as u8)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// Bytes in one row of pixels.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Samples of the pixel at column `x`, row `y`.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let c = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * c;
        &self.data[start..start + c]
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("RasterImage data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}
