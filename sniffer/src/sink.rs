use log::debug;
use pcap_file::pcap::{PcapHeader, PcapPacket, PcapWriter};
use pcap_file::DataLink;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bluetooth Low Energy link layer, which is what the dongle hands us once the framing is gone.
pub const LINKTYPE_BLUETOOTH_LE_LL: u32 = 251;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Unable to create capture file {}: {source}", .path.display())]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to write to capture file: {0}")]
    Pcap(#[from] pcap_file::PcapError),
}

/// A single frame, as it will appear in the capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRecord<'a> {
    pub timestamp: Duration,
    pub original_length: u32,
    pub payload: &'a [u8],
}

impl<'a> CaptureRecord<'a> {
    /// Stamps the payload with the current wall clock time.
    pub fn now(payload: &'a [u8]) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Self {
            timestamp,
            original_length: payload.len() as u32,
            payload,
        }
    }
}

pub struct CaptureSink<W: Write> {
    writer: PcapWriter<W>,
    records: u64,
}

impl CaptureSink<File> {
    pub fn create(path: &Path, snaplen: u32, link_type: u32) -> Result<Self, SinkError> {
        let file = File::create(path).map_err(|source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Writing capture to {}", path.display());
        Self::new(file, snaplen, link_type)
    }
}

impl<W: Write> CaptureSink<W> {
    /// Writes the global header straight away, so even an empty capture is a valid file. The
    /// writer isn't wrapped in any buffering, each record lands in `writer` as soon as it's
    /// written.
    pub fn new(writer: W, snaplen: u32, link_type: u32) -> Result<Self, SinkError> {
        let header = PcapHeader {
            snaplen,
            datalink: DataLink::from(link_type),
            ..Default::default()
        };

        let writer = PcapWriter::with_header(writer, header)?;
        Ok(Self { writer, records: 0 })
    }

    /// Appends one record. Given an unbuffered writer, a crash can only ever cost the record
    /// being written.
    pub fn write_record(&mut self, record: &CaptureRecord) -> Result<(), SinkError> {
        let packet = PcapPacket::new(record.timestamp, record.original_length, record.payload);
        self.writer.write_packet(&packet)?;
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer.into_writer()
    }
}
