//! Raster Thermal Printer Driver
//!
//! This crate drives small USB receipt printers that accept raster bitmaps
//! over a single bulk OUT endpoint. It converts arbitrary images into the
//! printer's packed 1-bit format and sequences the control commands around
//! them.
//!
//! # Example
//!
//! ```rust,no_run
//! use thermal_raster::{Config, Printer, RasterImage, TransformOptions};
//! use thermal_raster::{DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
//!
//! let config = Config::new(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID).heat(10, 140, 4);
//! let printer = Printer::new(config).unwrap();
//! printer.start().unwrap();
//! printer.print("Hello, world!\n").unwrap();
//!
//! let image = RasterImage::open("photo.png").unwrap();
//! printer.print_image(image, TransformOptions::new().blur(true)).unwrap();
//! printer.close().unwrap();
//! ```

mod bitmap;
mod command;
mod error;
mod pipeline;
mod printer;
mod raster;
mod transport;

pub use crate::{
    bitmap::{pack, PackedBitmap},
    command::{Command, FontMode, HeatConfig},
    error::Error,
    pipeline::{
        blur, dither, edges, resize, target_dimensions, transform, TransformOptions, THRESHOLD,
    },
    printer::{Config, Printer, State, MAX_BITMAP_ROWS},
    raster::RasterImage,
    transport::{Transport, UsbDevice, UsbTransport},
};

/// USB vendor id of the reference printer.
pub const DEFAULT_VENDOR_ID: u16 = 0x28E9;

/// USB product id of the reference printer.
pub const DEFAULT_PRODUCT_ID: u16 = 0x0289;

/// Print-head width in dots for 58 mm printers.
///
/// Images are scaled so that their height matches this value; each image
/// column then becomes one raster row of 48 bytes.
pub const DEFAULT_DOT_HEIGHT: usize = 384;
