//! USB transport.
//!
//! The printer exposes a single bulk OUT endpoint on interface 0 of
//! configuration 1. [`UsbDevice`] is a discovered but unopened device,
//! [`UsbTransport`] owns the claimed interface until it is closed or dropped.

use log::{debug, info, warn};
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, UsbContext};
use std::time::Duration;

use crate::error::Error;

const CONFIGURATION: u8 = 1;
const INTERFACE: u8 = 0;

/// Ordered byte sink for printer commands.
///
/// Each call to `write` is one complete transfer. Implementations must not
/// return until the transfer has settled.
pub trait Transport {
    fn write(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Release device resources. Must be safe to call more than once.
    fn close(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
struct Endpoint {
    config: u8,
    iface: u8,
    setting: u8,
    address: u8,
}

/// A device matching the requested identifiers, not yet claimed.
pub struct UsbDevice {
    context: Context,
    device: Device<Context>,
    device_desc: DeviceDescriptor,
}

impl UsbDevice {
    /// Find an attached device by vendor and product id.
    ///
    /// When `serial` is given only a device reporting that serial number
    /// matches. Otherwise the first device in enumeration order wins.
    pub fn discover(vendor_id: u16, product_id: u16, serial: Option<&str>) -> Result<Self, Error> {
        let context = Context::new()?;
        let devices = match context.devices() {
            Ok(devices) => devices,
            Err(err) => {
                debug!("Failed to read device list: {:?}", err);
                return Err(Error::DeviceListNotReadable);
            }
        };

        let mut candidates = Vec::new();
        for device in devices.iter() {
            let device_desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(err) => {
                    debug!("{:?}", err);
                    continue;
                }
            };

            if device_desc.vendor_id() != vendor_id || device_desc.product_id() != product_id {
                continue;
            }
            if let Some(serial) = serial {
                if !Self::serial_matches(&device, &device_desc, serial) {
                    continue;
                }
            }

            debug!(
                "Matched device on bus {} address {}",
                device.bus_number(),
                device.address()
            );
            candidates.push((device, device_desc));
        }

        let (device, device_desc) = first_match(candidates, vendor_id, product_id)?;
        Ok(UsbDevice {
            context,
            device,
            device_desc,
        })
    }

    fn serial_matches(device: &Device<Context>, device_desc: &DeviceDescriptor, serial: &str) -> bool {
        let handle = match device.open() {
            Ok(handle) => handle,
            Err(err) => {
                debug!("Failed to open device: {:?}", err);
                return false;
            }
        };
        let timeout = Duration::from_secs(1);
        let languages = match handle.read_languages(timeout) {
            Ok(languages) => languages,
            Err(err) => {
                debug!("Failed to read languages: {:?}", err);
                return false;
            }
        };
        match languages.first() {
            Some(language) => {
                match handle.read_serial_number_string(*language, device_desc, timeout) {
                    Ok(s) => s == serial,
                    Err(err) => {
                        debug!("Failed to read serial number string: {:?}", err);
                        false
                    }
                }
            }
            None => false,
        }
    }

    /// Open the device, select configuration 1 and claim interface 0.
    ///
    /// The first endpoint of the interface must be an OUT endpoint; no
    /// other endpoint is considered.
    pub fn open(self, timeout: Duration) -> Result<UsbTransport, Error> {
        let endpoint = self.first_endpoint()?;
        let mut handle = self.device.open()?;

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Auto detach of kernel driver unavailable: {:?}", err);
        }
        handle.set_active_configuration(endpoint.config)?;
        handle.claim_interface(endpoint.iface)?;
        if let Err(err) = handle.set_alternate_setting(endpoint.iface, endpoint.setting) {
            handle.release_interface(endpoint.iface).ok();
            return Err(Error::UsbError(err));
        }
        info!(
            "Claimed interface {} endpoint {:#04x} on {:04x}:{:04x}",
            endpoint.iface,
            endpoint.address,
            self.device_desc.vendor_id(),
            self.device_desc.product_id()
        );

        Ok(UsbTransport {
            _context: self.context,
            handle: Some(handle),
            endpoint,
            timeout,
        })
    }

    fn first_endpoint(&self) -> Result<Endpoint, Error> {
        for n in 0..self.device_desc.num_configurations() {
            let config_desc = match self.device.config_descriptor(n) {
                Ok(c) => c,
                Err(_) => continue,
            };
            if config_desc.number() != CONFIGURATION {
                continue;
            }
            for interface in config_desc.interfaces() {
                if interface.number() != INTERFACE {
                    continue;
                }
                let interface_desc = match interface.descriptors().next() {
                    Some(d) => d,
                    None => return Err(Error::MissingEndpoint),
                };
                let endpoint_desc = match interface_desc.endpoint_descriptors().next() {
                    Some(e) => e,
                    None => return Err(Error::MissingEndpoint),
                };
                debug!("{:?}", endpoint_desc);
                if endpoint_desc.direction() != Direction::Out {
                    return Err(Error::EndpointMismatch {
                        address: endpoint_desc.address(),
                    });
                }
                return Ok(Endpoint {
                    config: config_desc.number(),
                    iface: interface_desc.interface_number(),
                    setting: interface_desc.setting_number(),
                    address: endpoint_desc.address(),
                });
            }
        }
        Err(Error::MissingEndpoint)
    }
}

/// Pick the first candidate in enumeration order.
///
/// An empty device list and a list without a matching device both end up
/// here with no candidates and report `DeviceNotFound`.
fn first_match<D>(candidates: Vec<D>, vendor_id: u16, product_id: u16) -> Result<D, Error> {
    if candidates.len() > 1 {
        warn!(
            "{} devices match {:04x}:{:04x}, using the first one",
            candidates.len(),
            vendor_id,
            product_id
        );
    }
    candidates
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound {
            vendor_id,
            product_id,
        })
}

/// An opened device with its interface claimed.
///
/// The interface is released on [`Transport::close`] or when the transport
/// is dropped, whichever comes first.
pub struct UsbTransport {
    _context: Context,
    handle: Option<DeviceHandle<Context>>,
    endpoint: Endpoint,
    timeout: Duration,
}

impl Transport for UsbTransport {
    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let handle = match self.handle.as_ref() {
            Some(handle) => handle,
            None => return Err(Error::Transfer(rusb::Error::NoDevice)),
        };
        match handle.write_bulk(self.endpoint.address, buf, self.timeout) {
            Ok(n) if n == buf.len() => Ok(()),
            Ok(n) => {
                debug!(
                    "write error: bytes wrote {} != bytes supplied {}, possibly timeout ?",
                    n,
                    buf.len()
                );
                Err(Error::IncompleteTransfer {
                    written: n,
                    expected: buf.len(),
                })
            }
            Err(e) => Err(Error::Transfer(e)),
        }
    }

    fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(err) = handle.release_interface(self.endpoint.iface) {
                warn!("Error releasing interface {}: {}", self.endpoint.iface, err);
            }
            debug!("Closed device");
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}
