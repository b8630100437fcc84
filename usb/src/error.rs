use crate::bringup::{BringUpStep, ChannelByte, PowerReadback};

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No sniffer device {vendor_id:04X}:{product_id:04X} was found")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum BringUpError {
    #[error("Unable to read the device identity: {0}")]
    IdentityReadError(#[source] rusb::Error),

    #[error("Unable to claim interface {interface}: {source}")]
    ClaimFailed { interface: u8, source: rusb::Error },

    #[error("Power level {requested} not confirmed after {polls} poll(s), last read back: {last}")]
    PowerNotConfirmed {
        requested: u8,
        polls: u32,
        last: PowerReadback,
    },

    #[error("Vendor initialisation request rejected: {0}")]
    VendorInitError(#[source] rusb::Error),

    #[error("Unable to write the {byte} byte of channel {channel}: {source}")]
    ChannelWriteError {
        channel: u16,
        byte: ChannelByte,
        source: rusb::Error,
    },

    #[error("Unable to start capture: {0}")]
    StartCaptureError(#[source] rusb::Error),
}

impl BringUpError {
    /// The step the sequencer was in when it gave up.
    pub fn step(&self) -> BringUpStep {
        match self {
            BringUpError::IdentityReadError(_) => BringUpStep::Identify,
            BringUpError::ClaimFailed { .. } => BringUpStep::Claim,
            BringUpError::PowerNotConfirmed { .. } => BringUpStep::PowerSet,
            BringUpError::VendorInitError(_) => BringUpStep::VendorInit,
            BringUpError::ChannelWriteError { .. } => BringUpStep::ChannelSet,
            BringUpError::StartCaptureError(_) => BringUpStep::StartCapture,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("Header claims {claimed} bytes follow, but {actual} arrived")]
    LengthMismatch { claimed: u16, actual: usize },
}
