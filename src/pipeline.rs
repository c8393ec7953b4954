//! Image transform pipeline.
//!
//! Converts a source image into a dithered 1-bit bitmap sized to the print
//! head. Stages always run in the same order:
//!
//! ```text
//! luma -> resize -> [blur] -> [edges] -> dither -> pack
//! ```
//!
//! Reordering the optional stages changes the output. Every stage except
//! [`dither`] returns a fresh [`RasterImage`]; the stages read the first
//! channel of their input.

use log::debug;

use crate::{
    bitmap::{pack, PackedBitmap},
    error::Error,
    raster::RasterImage,
};

/// Intensity below which a pixel becomes an ink dot.
pub const THRESHOLD: u8 = 128;

const BOX: [[i32; 3]; 3] = [[1, 1, 1], [1, 1, 1], [1, 1, 1]];
const SOBEL_X: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
const SOBEL_Y: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];

/// Optional pipeline stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformOptions {
    pub blur: bool,
    pub edges: bool,
}

impl TransformOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blur(self, blur: bool) -> Self {
        TransformOptions { blur, ..self }
    }

    pub fn edges(self, edges: bool) -> Self {
        TransformOptions { edges, ..self }
    }
}

/// Run the full pipeline and pack the result.
///
/// The output height is `target_dot_height`; the width keeps the source
/// aspect ratio.
pub fn transform(
    source: RasterImage,
    target_dot_height: usize,
    options: TransformOptions,
) -> Result<PackedBitmap, Error> {
    let gray = source.to_luma()?;
    let (width, height) = target_dimensions(gray.width(), gray.height(), target_dot_height)?;
    debug!(
        "transform {}x{} -> {}x{} {:?}",
        gray.width(),
        gray.height(),
        width,
        height,
        options
    );

    let mut image = resize(&gray, width, height)?;
    if options.blur {
        image = blur(&image);
    }
    if options.edges {
        image = edges(&image);
    }
    dither(&mut image);
    pack(&image)
}

/// Compute the aspect-preserving target size for a given dot height.
///
/// The width is rounded half away from zero.
pub fn target_dimensions(
    source_width: usize,
    source_height: usize,
    target_dot_height: usize,
) -> Result<(usize, usize), Error> {
    if source_width == 0 || source_height == 0 || target_dot_height == 0 {
        return Err(Error::InvalidDimensions {
            width: source_width,
            height: source_height,
        });
    }
    let width = (2 * target_dot_height * source_width + source_height) / (2 * source_height);
    if width == 0 {
        return Err(Error::InvalidDimensions {
            width,
            height: target_dot_height,
        });
    }
    Ok((width, target_dot_height))
}

/// Bilinear resample to `width` x `height`.
///
/// Destination corners map exactly onto source corners and every sample
/// index is clamped to the source bounds.
pub fn resize(source: &RasterImage, width: usize, height: usize) -> Result<RasterImage, Error> {
    if source.width() == 0 || source.height() == 0 || width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }

    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        let sy = source_coord(y, source.height(), height);
        let y0 = (sy.floor() as usize).min(source.height() - 1);
        let y1 = (y0 + 1).min(source.height() - 1);
        let fy = sy - y0 as f64;

        for x in 0..width {
            let sx = source_coord(x, source.width(), width);
            let x0 = (sx.floor() as usize).min(source.width() - 1);
            let x1 = (x0 + 1).min(source.width() - 1);
            let fx = sx - x0 as f64;

            let top = source.at(x0, y0) as f64 * (1.0 - fx) + source.at(x1, y0) as f64 * fx;
            let bottom = source.at(x0, y1) as f64 * (1.0 - fx) + source.at(x1, y1) as f64 * fx;
            let value = top * (1.0 - fy) + bottom * fy;
            data.push(value.round().max(0.0).min(255.0) as u8);
        }
    }
    RasterImage::gray(width, height, data)
}

fn source_coord(dst: usize, src_len: usize, dst_len: usize) -> f64 {
    if dst_len == 1 {
        0.0
    } else {
        dst as f64 * (src_len - 1) as f64 / (dst_len - 1) as f64
    }
}

/// 3x3 box average with clamped borders.
pub fn blur(image: &RasterImage) -> RasterImage {
    image.map_gray(|x, y| ((convolve(image, x, y, &BOX) + 4) / 9) as u8)
}

/// Sobel gradient magnitude `min(255, |gx| + |gy|)` with clamped borders.
pub fn edges(image: &RasterImage) -> RasterImage {
    image.map_gray(|x, y| {
        let gx = convolve(image, x, y, &SOBEL_X);
        let gy = convolve(image, x, y, &SOBEL_Y);
        (gx.abs() + gy.abs()).min(255) as u8
    })
}

/// Error-diffusion dither, in place.
///
/// Pixels are visited in raster order. Each one becomes 0 (ink) when its
/// accumulated value is below [`THRESHOLD`], 255 otherwise, and the
/// quantization error is split evenly between the right and lower
/// neighbours. On the last column or row the whole error goes to the
/// remaining neighbour, so total intensity is conserved up to the final
/// pixel's residue.
pub fn dither(image: &mut RasterImage) {
    let width = image.width();
    let height = image.height();
    let channels = image.channels();
    let mut acc: Vec<i32> = (0..width * height)
        .map(|i| image.data()[i * channels] as i32)
        .collect();
    let data = image.data_mut();

    for y in 0..height {
        for x in 0..width {
            let i = x + y * width;
            let value = acc[i];
            let out = if value < THRESHOLD as i32 { 0 } else { 255 };
            let error = value - out;

            match (x + 1 < width, y + 1 < height) {
                (true, true) => {
                    acc[i + 1] += error / 2;
                    acc[i + width] += error - error / 2;
                }
                (true, false) => acc[i + 1] += error,
                (false, true) => acc[i + width] += error,
                (false, false) => {}
            }

            for c in 0..channels {
                data[i * channels + c] = out as u8;
            }
        }
    }
}

fn convolve(image: &RasterImage, x: usize, y: usize, kernel: &[[i32; 3]; 3]) -> i32 {
    let max_x = image.width() as isize - 1;
    let max_y = image.height() as isize - 1;
    let mut sum = 0;
    for (ky, row) in kernel.iter().enumerate() {
        for (kx, weight) in row.iter().enumerate() {
            let sx = (x as isize + kx as isize - 1).max(0).min(max_x) as usize;
            let sy = (y as isize + ky as isize - 1).max(0).min(max_y) as usize;
            sum += weight * image.at(sx, sy) as i32;
        }
    }
    sum
}
