//! Packing of dithered pixels into the printer's raster byte layout.
//!
//! Bytes are emitted column by column. Each column is cut into 8-row slices
//! starting from the bottom of the image; within a slice the lowest pixel
//! lands in the most significant bit and the highest pixel in the least
//! significant bit. When the height is not a multiple of 8 the last slice of
//! each column runs past the top row and the missing rows are padded with 0
//! (no ink) in the low bits.
//!
//! ```text
//! column x, height 10:
//!   byte 0 = [y9 y8 y7 y6 y5 y4 y3 y2]   (MSB .. LSB)
//!   byte 1 = [y1 y0  0  0  0  0  0  0]
//! ```

use crate::{error::Error, pipeline::THRESHOLD, raster::RasterImage};

/// A 1-bit bitmap in column-major raster layout.
///
/// Holds exactly `width * ceil(height / 8)` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBitmap {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl PackedBitmap {
    /// Wrap already packed bytes, checking the length against the geometry.
    pub fn from_bytes(width: usize, height: usize, data: Vec<u8>) -> Result<Self, Error> {
        let expected = packed_len(width, height);
        if data.len() != expected {
            return Err(Error::BitmapSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(PackedBitmap {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Bytes per column, which is one printer raster row.
    pub fn column_bytes(&self) -> usize {
        bytes_for(self.height)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Number of bytes needed to hold `dots` bits.
pub fn bytes_for(dots: usize) -> usize {
    (dots + 7) / 8
}

/// Packed length of a `width` x `height` bitmap.
pub fn packed_len(width: usize, height: usize) -> usize {
    width * bytes_for(height)
}

/// Pack a dithered image. A pixel is an ink bit when its intensity is below 128.
pub fn pack(dithered: &RasterImage) -> Result<PackedBitmap, Error> {
    let width = dithered.width();
    let height = dithered.height();
    if dithered.channels() != 1 || dithered.data().len() != width * height {
        return Err(Error::BitmapSizeMismatch {
            expected: width * height,
            actual: dithered.data().len(),
        });
    }

    let mut data = Vec::with_capacity(packed_len(width, height));
    for x in 0..width {
        let mut y = height as isize;
        while y > 0 {
            let mut byte: u8 = 0;
            for _ in 0..8 {
                y -= 1;
                byte <<= 1;
                if y >= 0 && dithered.at(x, y as usize) < THRESHOLD {
                    byte |= 1;
                }
            }
            data.push(byte);
        }
    }
    PackedBitmap::from_bytes(width, height, data)
}
