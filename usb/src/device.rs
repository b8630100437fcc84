// This file wraps the libusb handle of the sniffer into the handful of primitives the bring-up
// sequence and the capture loop need. Nothing in here retries, every call is bounded by the
// transport timeout and hands back whatever libusb told us.
use crate::error::ConnectError;
use log::{debug, info, warn};
use rusb::{Context, DeviceHandle, Direction, LogLevel, Recipient, RequestType, UsbContext};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// The primitive operations the sniffer is driven through.
pub trait SnifferTransport {
    fn read_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>, rusb::Error>;

    fn write_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<(), rusb::Error>;

    fn read_bulk(&mut self, endpoint: u8, buffer: &mut [u8]) -> Result<usize, rusb::Error>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;
    fn set_active_configuration(&mut self, configuration: u8) -> Result<(), rusb::Error>;
}

pub struct SnifferUSB<T: UsbContext> {
    handle: DeviceHandle<T>,
    claimed: Option<u8>,
    timeout: Duration,
}

impl SnifferUSB<Context> {
    /// Creates a fresh libusb context and opens the first device matching the ids.
    pub fn open(vendor_id: u16, product_id: u16) -> Result<Self, ConnectError> {
        let mut context = Context::new()?;
        context.set_log_level(LogLevel::Warning);
        Self::open_with_context(&context, vendor_id, product_id)
    }
}

impl<T: UsbContext> SnifferUSB<T> {
    pub fn open_with_context(
        context: &T,
        vendor_id: u16,
        product_id: u16,
    ) -> Result<Self, ConnectError> {
        let handle = context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or(ConnectError::DeviceNotFound {
                vendor_id,
                product_id,
            })?;

        info!(
            "Opened USB device {:04X}:{:04X} ({:?})",
            vendor_id,
            product_id,
            handle.device()
        );

        Ok(Self {
            handle,
            claimed: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<T: UsbContext> SnifferTransport for SnifferUSB<T> {
    fn read_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>, rusb::Error> {
        let mut buf = vec![0; length];
        let response_length = self.handle.read_control(
            rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device),
            request,
            value,
            index,
            &mut buf,
            self.timeout,
        )?;
        buf.truncate(response_length);
        Ok(buf)
    }

    fn write_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<(), rusb::Error> {
        self.handle.write_control(
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device),
            request,
            value,
            index,
            data,
            self.timeout,
        )?;

        Ok(())
    }

    fn read_bulk(&mut self, endpoint: u8, buffer: &mut [u8]) -> Result<usize, rusb::Error> {
        self.handle.read_bulk(endpoint, buffer, self.timeout)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        // Not every platform can detach kernel drivers, the claim itself decides if we're good.
        if let Err(e) = self.handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }

        self.handle.claim_interface(interface)?;
        self.claimed = Some(interface);
        Ok(())
    }

    fn set_active_configuration(&mut self, configuration: u8) -> Result<(), rusb::Error> {
        self.handle.set_active_configuration(configuration)
    }
}

impl<T: UsbContext> Drop for SnifferUSB<T> {
    fn drop(&mut self) {
        if let Some(interface) = self.claimed.take() {
            if let Err(e) = self.handle.release_interface(interface) {
                warn!("Unable to release interface {}: {}", interface, e);
            }
        }
        debug!("Closing USB device {:?}", self.handle.device());
    }
}
