use anyhow::{bail, Context, Result};
use ccsniff_usb::bringup::{BringUpConfig, DEFAULT_POWER, DEFAULT_POWER_RETRIES};
use ccsniff_usb::frame::{Framing, CAPTURE_ENDPOINT, FRAMING_OVERHEAD, MAX_CHUNK_SIZE};
use ccsniff_usb::{PID_CC2540_SNIFFER, VID_TI};
use log::error;
use serde::{Deserialize, Serialize};
use std::fs::{create_dir_all, File};
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::capture::CaptureSettings;
use crate::sink::LINKTYPE_BLUETOOTH_LE_LL;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
    pub configuration: u8,

    pub power: u8,
    pub power_retries: u32,
    pub timeout_ms: u64,

    pub endpoint: u8,
    pub chunk_size: usize,
    pub strict_framing: bool,

    pub link_type: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vendor_id: VID_TI,
            product_id: PID_CC2540_SNIFFER,
            interface: 0,
            configuration: 1,
            power: DEFAULT_POWER,
            power_retries: DEFAULT_POWER_RETRIES,
            timeout_ms: 1000,
            endpoint: CAPTURE_ENDPOINT,
            chunk_size: MAX_CHUNK_SIZE,
            strict_framing: false,
            link_type: LINKTYPE_BLUETOOTH_LE_LL,
        }
    }
}

impl Settings {
    /// Reads the settings, and writes them straight back so the file always lists every option.
    pub fn load(path: &Path) -> Result<Settings> {
        let settings = Settings::read(path)?;
        if let Err(e) = settings.write(path) {
            error!("Couldn't save settings to {}: {}", path.to_string_lossy(), e);
        }
        Ok(settings)
    }

    pub fn read(path: &Path) -> Result<Settings> {
        let settings: Settings = match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse sniffer settings file at {}",
                path.to_string_lossy()
            ))?,
            Err(error) if error.kind() == ErrorKind::NotFound => Settings::default(),
            Err(error) => {
                return Err(error).context(format!(
                    "Could not open sniffer settings file for reading at {}",
                    path.to_string_lossy()
                ))
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if let Err(e) = create_dir_all(parent) {
                if e.kind() != ErrorKind::AlreadyExists {
                    return Err(e).context(format!(
                        "Could not create settings directory at {}",
                        parent.to_string_lossy()
                    ));
                }
            }
        }
        let writer = File::create(path).context(format!(
            "Could not open sniffer settings file for writing at {}",
            path.to_string_lossy()
        ))?;
        serde_json::to_writer_pretty(writer, self).context(format!(
            "Could not write to sniffer settings file at {}",
            path.to_string_lossy()
        ))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.chunk_size <= FRAMING_OVERHEAD || self.chunk_size > MAX_CHUNK_SIZE {
            bail!(
                "chunk_size must be between {} and {}, got {}",
                FRAMING_OVERHEAD + 1,
                MAX_CHUNK_SIZE,
                self.chunk_size
            );
        }
        if self.timeout_ms == 0 {
            bail!("timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn bring_up(&self, channel: u16) -> BringUpConfig {
        BringUpConfig {
            power: self.power,
            power_retries: self.power_retries,
            channel,
            interface: self.interface,
            configuration: self.configuration,
        }
    }

    pub fn capture(&self) -> CaptureSettings {
        CaptureSettings {
            endpoint: self.endpoint,
            chunk_size: self.chunk_size,
            framing: if self.strict_framing {
                Framing::Strict
            } else {
                Framing::Permissive
            },
        }
    }
}
