//! Error types for thermal printer operations.
//!
//! This module defines all possible errors that can occur during device
//! discovery, image conversion and command transfer.

use crate::printer::State;
use thiserror::Error;

/// Main error type for thermal printer operations.
///
/// Device-level failures are fatal to the session, image and bitmap
/// failures only abort the current print job.
#[derive(Error, Debug)]
pub enum Error {
    /// USB communication error.
    ///
    /// Wraps underlying rusb errors raised while setting up the device:
    /// context creation, configuration selection or interface claim.
    #[error(transparent)]
    UsbError(#[from] rusb::Error),

    /// Enumerating attached devices failed.
    #[error("Can't read device list, permission issue ?")]
    DeviceListNotReadable,

    /// No attached device matches the vendor and product identifiers,
    /// including the case where no devices are attached at all.
    #[error("No device found for {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Device is missing endpoint")]
    MissingEndpoint,

    /// The first endpoint of the claimed interface is not a host-to-device endpoint.
    #[error("First endpoint {address:#04x} is not an OUT endpoint")]
    EndpointMismatch { address: u8 },

    /// A bulk write failed (stall, timeout, disconnect).
    ///
    /// The driver never retries: the printer may already have executed
    /// part of the command.
    #[error("Bulk transfer failed: {0}")]
    Transfer(#[source] rusb::Error),

    #[error("Bulk transfer incomplete: wrote {written} of {expected} bytes")]
    IncompleteTransfer { written: usize, expected: usize },

    #[error("Invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Unsupported channel count {0}")]
    UnsupportedChannels(usize),

    /// Packed buffer length disagrees with the declared width and height.
    #[error("Bitmap size does not match: expected {expected} bytes, got {actual}")]
    BitmapSizeMismatch { expected: usize, actual: usize },

    #[error("Bitmap block too large: {byte_width} bytes per row, {rows} rows")]
    BitmapTooLarge { byte_width: usize, rows: usize },

    #[error("Character {0:?} can not be encoded in a single byte")]
    UnencodableText(char),

    /// A command was issued before the handshake it depends on.
    #[error("Command {command} is not allowed in state {state:?}")]
    InvalidState { command: &'static str, state: State },

    #[error("Printer session lock is poisoned")]
    SessionPoisoned,

    #[error(transparent)]
    Image(#[from] image::ImageError),
}
