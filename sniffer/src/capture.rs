use crate::shutdown::Shutdown;
use crate::sink::{CaptureRecord, CaptureSink, SinkError};
use ccsniff_usb::device::SnifferTransport;
use ccsniff_usb::frame::{Framing, CAPTURE_ENDPOINT, MAX_CHUNK_SIZE};
use ccsniff_usb::rusb;
use log::{debug, info, trace, warn};
use std::fmt::{Display, Formatter};
use std::io::Write;
use std::time::{Duration, Instant};

const STATS_INTERVAL: Duration = Duration::from_secs(10);

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("The sniffer has gone away")]
    DeviceLost,

    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub endpoint: u8,
    pub chunk_size: usize,
    pub framing: Framing,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            endpoint: CAPTURE_ENDPOINT,
            chunk_size: MAX_CHUNK_SIZE,
            framing: Framing::Permissive,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStats {
    pub reads: u64,
    pub records: u64,
    pub bytes: u64,
    pub discarded: u64,
    pub rejected: u64,
    pub timeouts: u64,
    pub transfer_errors: u64,
}

impl Display for CaptureStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Reads: {} | Records: {} ({} bytes) | Discarded: {} | Rejected: {} | Timeouts: {} | Errors: {}",
            self.reads,
            self.records,
            self.bytes,
            self.discarded,
            self.rejected,
            self.timeouts,
            self.transfer_errors
        )
    }
}

/// What a single iteration of the loop did with its bulk read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Recorded(usize),
    Discarded,
    Rejected,
    Timeout,
    TransferError,
}

pub struct CaptureLoop<'a, T: SnifferTransport + ?Sized, W: Write> {
    transport: &'a mut T,
    sink: &'a mut CaptureSink<W>,
    settings: CaptureSettings,
    buffer: Vec<u8>,
    stats: CaptureStats,
}

impl<'a, T: SnifferTransport + ?Sized, W: Write> CaptureLoop<'a, T, W> {
    pub fn new(
        transport: &'a mut T,
        sink: &'a mut CaptureSink<W>,
        settings: CaptureSettings,
    ) -> Self {
        let chunk_size = settings.chunk_size.clamp(1, MAX_CHUNK_SIZE);
        Self {
            transport,
            sink,
            settings,
            buffer: vec![0; chunk_size],
            stats: CaptureStats::default(),
        }
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Performs one bulk read, and records whatever frame it carried. Only a lost device or
    /// a broken sink come back as errors, everything else is counted and skipped.
    pub fn step(&mut self) -> Result<Outcome, CaptureError> {
        let length = match self.transport.read_bulk(self.settings.endpoint, &mut self.buffer) {
            Ok(length) => length,
            Err(rusb::Error::Timeout) => {
                self.stats.timeouts += 1;
                return Ok(Outcome::Timeout);
            }
            Err(rusb::Error::NoDevice) => return Err(CaptureError::DeviceLost),
            Err(e) => {
                self.stats.transfer_errors += 1;
                warn!("Bulk read failed, skipping: {}", e);
                return Ok(Outcome::TransferError);
            }
        };

        self.stats.reads += 1;
        let chunk = &self.buffer[..length];
        trace!("Bulk read {} bytes: {:02X?}", length, chunk);

        let payload = match self.settings.framing.payload(chunk) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.stats.discarded += 1;
                return Ok(Outcome::Discarded);
            }
            Err(e) => {
                self.stats.rejected += 1;
                debug!("Dropping chunk: {}", e);
                return Ok(Outcome::Rejected);
            }
        };

        let record = CaptureRecord::now(payload);
        self.sink.write_record(&record)?;

        self.stats.records += 1;
        self.stats.bytes += payload.len() as u64;
        Ok(Outcome::Recorded(payload.len()))
    }

    /// Loops until shutdown is triggered, checking for it once per bulk read.
    pub fn run(&mut self, shutdown: &Shutdown) -> Result<(), CaptureError> {
        let mut last_stats = Instant::now();

        while !shutdown.is_triggered() {
            if let Outcome::Recorded(length) = self.step()? {
                trace!("Recorded a {} byte frame", length);
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                info!("[Capture] {}", self.stats);
                last_stats = Instant::now();
            }
        }

        debug!("Shutdown requested, leaving capture loop");
        Ok(())
    }
}
