pub use rusb;
pub mod bringup;
pub mod commands;
pub mod device;
pub mod error;
pub mod frame;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub const VID_TI: u16 = 0x0451;
pub const PID_CC2540_SNIFFER: u16 = 0x16B3;
