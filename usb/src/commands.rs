use strum::{Display, EnumIter};

/// Vendor requests understood by the sniffer firmware.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display, EnumIter)]
pub enum Command {
    GetIdentity,
    SetPower,
    GetPower,
    VendorInit,
    StartCapture,
    StopCapture,
    SetChannel,
}

impl Command {
    pub fn request(&self) -> u8 {
        match self {
            Command::GetIdentity => 0xC0,
            Command::SetPower => 0xC5,
            Command::GetPower => 0xC6,
            // Nobody seems to know what this one does, but the dongle won't take a channel without it.
            Command::VendorInit => 0xC9,
            Command::StartCapture => 0xD0,
            Command::StopCapture => 0xD1,
            Command::SetChannel => 0xD2,
        }
    }
}
