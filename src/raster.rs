//! Dense row-major pixel buffers handed between pipeline stages.

use log::debug;
use std::path::Path;

use crate::error::Error;

/// Row-major intensity buffer with one or more 8-bit channels per pixel.
///
/// The buffer length always equals `width * height * channels`.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl RasterImage {
    /// Wrap a pixel buffer, checking it against the declared geometry.
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, Error> {
        if channels == 0 || data.len() != width * height * channels {
            return Err(Error::InvalidDimensions { width, height });
        }
        Ok(RasterImage {
            width,
            height,
            channels,
            data,
        })
    }

    /// Single-channel (grayscale) image.
    pub fn gray(width: usize, height: usize, data: Vec<u8>) -> Result<Self, Error> {
        Self::new(width, height, 1, data)
    }

    /// Decode an image file and reduce it to grayscale.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let image = image::open(path)?;
        Ok(Self::from(image))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Intensity of the first channel at `(x, y)`.
    pub(crate) fn at(&self, x: usize, y: usize) -> u8 {
        self.data[(x + y * self.width) * self.channels]
    }

    /// Build a grayscale image of the same size from a per-pixel function.
    pub(crate) fn map_gray<F>(&self, f: F) -> RasterImage
    where
        F: Fn(usize, usize) -> u8,
    {
        let mut data = Vec::with_capacity(self.width * self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                data.push(f(x, y));
            }
        }
        RasterImage {
            width: self.width,
            height: self.height,
            channels: 1,
            data,
        }
    }

    /// Reduce to a single luminance channel.
    ///
    /// Uses integer Rec.601 weights for color input; any alpha channel is
    /// ignored. Grayscale input is returned unchanged.
    pub fn to_luma(self) -> Result<Self, Error> {
        let data = match self.channels {
            1 => return Ok(self),
            2 => self.data.chunks_exact(2).map(|px| px[0]).collect(),
            3 | 4 => self
                .data
                .chunks_exact(self.channels)
                .map(|px| luma(px[0], px[1], px[2]))
                .collect(),
            n => return Err(Error::UnsupportedChannels(n)),
        };
        debug!(
            "reduced {}x{} image from {} channels to luma",
            self.width, self.height, self.channels
        );
        Self::gray(self.width, self.height, data)
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

impl From<image::DynamicImage> for RasterImage {
    fn from(image: image::DynamicImage) -> Self {
        let luma = image.to_luma8();
        RasterImage {
            width: luma.width() as usize,
            height: luma.height() as usize,
            channels: 1,
            data: luma.into_raw(),
        }
    }
}
