use crate::commands::Command;
use crate::device::SnifferTransport;
use crate::error::BringUpError;
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, info, warn};
use std::fmt::{Display, Formatter};
use strum::Display as StrumDisplay;

pub const IDENTITY_LENGTH: usize = 32;
pub const DEFAULT_POWER: u8 = 0x04;
pub const DEFAULT_POWER_RETRIES: u32 = 10;

// Channels 37, 38 and 39 are the BLE advertising channels.
pub const DEFAULT_CHANNEL: u16 = 37;

/// The steps of the bring-up sequence, in the order they're executed.
#[derive(Copy, Clone, Debug, PartialEq, Eq, StrumDisplay)]
pub enum BringUpStep {
    Identify,
    Claim,
    PowerSet,
    VendorInit,
    ChannelSet,
    StartCapture,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelByte {
    Low,
    High,
}

impl ChannelByte {
    pub fn index(&self) -> u16 {
        match self {
            ChannelByte::Low => 0,
            ChannelByte::High => 1,
        }
    }
}

/// What the last power poll produced, kept so a failed confirmation can say why.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PowerReadback {
    NotPolled,
    Empty,
    Value(u8),
    Transfer(rusb::Error),
}

impl Display for PowerReadback {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerReadback::NotPolled => write!(f, "nothing (no polls allowed)"),
            PowerReadback::Empty => write!(f, "an empty response"),
            PowerReadback::Value(value) => write!(f, "{:#04x}", value),
            PowerReadback::Transfer(error) => write!(f, "transfer error ({})", error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpConfig {
    pub power: u8,
    pub power_retries: u32,
    pub channel: u16,
    pub interface: u8,
    pub configuration: u8,
}

impl Default for BringUpConfig {
    fn default() -> Self {
        Self {
            power: DEFAULT_POWER,
            power_retries: DEFAULT_POWER_RETRIES,
            channel: DEFAULT_CHANNEL,
            interface: 0,
            configuration: 1,
        }
    }
}

/// A device which made it through bring-up, and is now streaming frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capturing {
    pub identity: Vec<u8>,
    pub power: u8,
    pub power_polls: u32,
    pub channel: u16,
}

// These only need the transport primitives, so anything implementing SnifferTransport gets them.
pub trait SnifferCommands: SnifferTransport {
    fn get_identity(&mut self) -> Result<Vec<u8>, rusb::Error> {
        let identity =
            self.read_control(Command::GetIdentity.request(), 0, 0, IDENTITY_LENGTH)?;
        if !identity.is_empty() {
            info!("IDENT: {:02X?}", identity);
        }
        Ok(identity)
    }

    /// Writes the power level, then polls it back up to `retries` times. Returns the number
    /// of polls it took to see the requested value.
    fn set_power(&mut self, power: u8, retries: u32) -> Result<u32, BringUpError> {
        // The result of the write isn't trusted either way, the read back decides.
        if let Err(e) = self.write_control(Command::SetPower.request(), 0, power as u16, &[]) {
            warn!("Power write returned {}, waiting for the read back anyway", e);
        }

        let mut last = PowerReadback::NotPolled;
        let mut polls = 0;
        while polls < retries {
            polls += 1;
            match self.read_control(Command::GetPower.request(), 0, 0, 1) {
                Ok(data) => match data.first() {
                    Some(&value) if value == power => {
                        debug!("Power {:#04x} confirmed on poll {}", power, polls);
                        return Ok(polls);
                    }
                    Some(&value) => last = PowerReadback::Value(value),
                    None => last = PowerReadback::Empty,
                },
                Err(e) => {
                    last = PowerReadback::Transfer(e);
                    break;
                }
            }
        }

        Err(BringUpError::PowerNotConfirmed {
            requested: power,
            polls,
            last,
        })
    }

    fn vendor_init(&mut self) -> Result<(), rusb::Error> {
        self.write_control(Command::VendorInit.request(), 0, 0, &[])
    }

    fn set_channel(&mut self, channel: u16) -> Result<(), BringUpError> {
        let mut bytes = [0; 2];
        LittleEndian::write_u16(&mut bytes, channel);

        for (byte, value) in [(ChannelByte::Low, bytes[0]), (ChannelByte::High, bytes[1])] {
            self.write_control(Command::SetChannel.request(), 0, byte.index(), &[value])
                .map_err(|source| BringUpError::ChannelWriteError {
                    channel,
                    byte,
                    source,
                })?;
        }
        Ok(())
    }

    fn start_capture(&mut self) -> Result<(), rusb::Error> {
        self.write_control(Command::StartCapture.request(), 0, 0, &[])
    }

    fn stop_capture(&mut self) -> Result<(), rusb::Error> {
        self.write_control(Command::StopCapture.request(), 0, 0, &[])
    }

    /// Runs the full initialisation sequence. Every step runs once, in order, and the
    /// first fatal failure ends it.
    fn bring_up(&mut self, config: &BringUpConfig) -> Result<Capturing, BringUpError> {
        debug!("{}: Reading device identity", BringUpStep::Identify);
        let identity = self
            .get_identity()
            .map_err(BringUpError::IdentityReadError)?;

        debug!("{}: Claiming interface {}", BringUpStep::Claim, config.interface);
        self.claim_interface(config.interface)
            .map_err(|source| BringUpError::ClaimFailed {
                interface: config.interface,
                source,
            })?;

        // Some platforms already have the right configuration active and refuse to set it again.
        if let Err(e) = self.set_active_configuration(config.configuration) {
            warn!(
                "Unable to set configuration {}, continuing: {}",
                config.configuration, e
            );
        }

        debug!("{}: Setting power to {:#04x}", BringUpStep::PowerSet, config.power);
        let power_polls = self.set_power(config.power, config.power_retries)?;

        debug!("{}: Sending vendor initialisation", BringUpStep::VendorInit);
        self.vendor_init().map_err(BringUpError::VendorInitError)?;

        debug!("{}: Tuning to channel {}", BringUpStep::ChannelSet, config.channel);
        self.set_channel(config.channel)?;

        debug!("{}: Starting capture", BringUpStep::StartCapture);
        self.start_capture()
            .map_err(BringUpError::StartCaptureError)?;

        info!(
            "Sniffer capturing on channel {} (power {:#04x})",
            config.channel, config.power
        );

        Ok(Capturing {
            identity,
            power: config.power,
            power_polls,
            channel: config.channel,
        })
    }
}

impl<T: SnifferTransport + ?Sized> SnifferCommands for T {}
