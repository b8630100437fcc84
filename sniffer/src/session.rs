use crate::capture::{CaptureError, CaptureLoop, CaptureSettings, CaptureStats};
use crate::shutdown::Shutdown;
use crate::sink::{CaptureSink, SinkError};
use ccsniff_usb::bringup::{BringUpConfig, Capturing, SnifferCommands};
use ccsniff_usb::device::SnifferTransport;
use ccsniff_usb::error::{BringUpError, ConnectError};
use log::{debug, info, warn};
use std::io::Write;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Sniffer setup failed during {step}: {0}", step = .0.step())]
    BringUp(#[from] BringUpError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub device: Capturing,
    pub stats: CaptureStats,
}

/// Runs a complete capture: open the device, bring it up, then stream frames into the sink
/// until shutdown. The device is opened, used and released on the calling thread, and the
/// sink is only created once the device is capturing. Capture is stopped again on the way
/// out, unless the device is gone.
pub fn run<T, W, O, S>(
    open: O,
    create_sink: S,
    bring_up: &BringUpConfig,
    capture: CaptureSettings,
    shutdown: &Shutdown,
) -> Result<SessionReport, SessionError>
where
    T: SnifferTransport,
    W: Write,
    O: FnOnce() -> Result<T, ConnectError>,
    S: FnOnce() -> Result<CaptureSink<W>, SinkError>,
{
    let mut transport = open()?;
    let device = transport.bring_up(bring_up)?;

    // The device is streaming from here on, so it has to be told to stop however we leave.
    let mut sink = match create_sink() {
        Ok(sink) => sink,
        Err(e) => {
            stop_capture(&mut transport);
            return Err(e.into());
        }
    };

    let mut capture_loop = CaptureLoop::new(&mut transport, &mut sink, capture);
    let result = capture_loop.run(shutdown);
    let stats = capture_loop.stats();
    info!("Capture finished. {}", stats);
    debug!("{} record(s) in the capture file", sink.records());

    if !matches!(result, Err(CaptureError::DeviceLost)) {
        stop_capture(&mut transport);
    }
    result?;

    Ok(SessionReport { device, stats })
}

fn stop_capture<T: SnifferTransport>(transport: &mut T) {
    if let Err(e) = transport.stop_capture() {
        warn!("Unable to stop capture cleanly: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::LINKTYPE_BLUETOOTH_LE_LL;
    use ccsniff_usb::rusb;
    use ccsniff_usb::testing::{ScriptedSniffer, Transfer};
    use ccsniff_usb::{PID_CC2540_SNIFFER, VID_TI};
    use pcap_file::pcap::PcapReader;
    use std::cell::{Cell, RefCell};
    use std::io::Cursor;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    // Hands the sniffer out to the session, while keeping a view of what it was asked to do.
    struct Borrowed<'a>(&'a mut ScriptedSniffer);

    impl SnifferTransport for Borrowed<'_> {
        fn read_control(
            &mut self,
            request: u8,
            value: u16,
            index: u16,
            length: usize,
        ) -> Result<Vec<u8>, rusb::Error> {
            self.0.read_control(request, value, index, length)
        }

        fn write_control(
            &mut self,
            request: u8,
            value: u16,
            index: u16,
            data: &[u8],
        ) -> Result<(), rusb::Error> {
            self.0.write_control(request, value, index, data)
        }

        fn read_bulk(&mut self, endpoint: u8, buffer: &mut [u8]) -> Result<usize, rusb::Error> {
            self.0.read_bulk(endpoint, buffer)
        }

        fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
            self.0.claim_interface(interface)
        }

        fn set_active_configuration(&mut self, configuration: u8) -> Result<(), rusb::Error> {
            self.0.set_active_configuration(configuration)
        }
    }

    fn framed(payload_length: usize) -> Vec<u8> {
        let length = payload_length + 10;
        let mut chunk = vec![0x5A; length];
        chunk[0] = 0x00;
        chunk[1] = (length - 3) as u8;
        chunk[2] = 0x00;
        chunk
    }

    fn packets(buffer: &SharedBuffer) -> Vec<Vec<u8>> {
        let data = buffer.0.borrow().clone();
        let mut reader = PcapReader::new(Cursor::new(data)).unwrap();
        let mut packets = vec![];
        while let Some(packet) = reader.next_packet() {
            packets.push(packet.unwrap().data.into_owned());
        }
        packets
    }

    #[test]
    fn first_bulk_read_becomes_the_first_record() {
        let shutdown = Shutdown::new();
        let mut sniffer = ScriptedSniffer::cooperative()
            .with_bulk([Ok(framed(40))])
            .stop_when_drained(shutdown.flag());
        let buffer = SharedBuffer::default();

        let report = run(
            || Ok(Borrowed(&mut sniffer)),
            || CaptureSink::new(buffer.clone(), 1024, LINKTYPE_BLUETOOTH_LE_LL),
            &BringUpConfig::default(),
            CaptureSettings::default(),
            &shutdown,
        )
        .unwrap();

        assert_eq!(report.device.identity.len(), 32);
        assert_eq!(report.device.power_polls, 1);
        assert_eq!(report.device.channel, 37);
        assert_eq!(report.stats.records, 1);

        let packets = packets(&buffer);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 40);

        // Capture gets stopped on the way out.
        assert_eq!(
            sniffer.transfers().last(),
            Some(&Transfer::WriteControl {
                request: 0xD1,
                value: 0,
                index: 0,
                data: vec![],
            })
        );
    }

    #[test]
    fn missing_device_goes_no_further() {
        let shutdown = Shutdown::new();
        let sink_created = Cell::new(false);

        let result = run::<ScriptedSniffer, Vec<u8>, _, _>(
            || {
                Err(ConnectError::DeviceNotFound {
                    vendor_id: VID_TI,
                    product_id: PID_CC2540_SNIFFER,
                })
            },
            || {
                sink_created.set(true);
                CaptureSink::new(Vec::new(), 1024, LINKTYPE_BLUETOOTH_LE_LL)
            },
            &BringUpConfig::default(),
            CaptureSettings::default(),
            &shutdown,
        );

        let error = result.unwrap_err();
        assert!(matches!(
            error,
            SessionError::Connect(ConnectError::DeviceNotFound { .. })
        ));
        assert_eq!(error.to_string(), "No sniffer device 0451:16B3 was found");
        assert!(!sink_created.get());
    }

    #[test]
    fn unconfirmed_power_never_starts_capture() {
        let shutdown = Shutdown::new();
        let mut sniffer = ScriptedSniffer::cooperative()
            .with_power_stuck_at(0)
            .with_bulk([Ok(framed(40))]);
        let sink_created = Cell::new(false);

        let result = run(
            || Ok(Borrowed(&mut sniffer)),
            || {
                sink_created.set(true);
                CaptureSink::new(Vec::new(), 1024, LINKTYPE_BLUETOOTH_LE_LL)
            },
            &BringUpConfig::default(),
            CaptureSettings::default(),
            &shutdown,
        );

        let error = result.unwrap_err();
        assert!(matches!(
            error,
            SessionError::BringUp(BringUpError::PowerNotConfirmed { polls: 10, .. })
        ));
        assert!(error.to_string().starts_with("Sniffer setup failed during PowerSet"));
        assert!(!sink_created.get());
        assert!(!sniffer
            .transfers()
            .iter()
            .any(|t| matches!(t, Transfer::ReadBulk { .. })));
    }

    #[test]
    fn failed_sink_still_stops_capture() {
        let shutdown = Shutdown::new();
        let mut sniffer = ScriptedSniffer::cooperative().with_bulk([Ok(framed(40))]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pcap");

        let result = run(
            || Ok(Borrowed(&mut sniffer)),
            || CaptureSink::create(&path, 1024, LINKTYPE_BLUETOOTH_LE_LL),
            &BringUpConfig::default(),
            CaptureSettings::default(),
            &shutdown,
        );

        assert!(matches!(
            result,
            Err(SessionError::Sink(SinkError::Create { .. }))
        ));
        assert!(!sniffer
            .transfers()
            .iter()
            .any(|t| matches!(t, Transfer::ReadBulk { .. })));
        assert!(matches!(
            sniffer.transfers().last(),
            Some(Transfer::WriteControl { request: 0xD1, .. })
        ));
    }

    #[test]
    fn lost_device_skips_stop_capture() {
        let shutdown = Shutdown::new();
        let mut sniffer = ScriptedSniffer::cooperative()
            .with_bulk([Ok(framed(12)), Err(rusb::Error::NoDevice)]);
        let buffer = SharedBuffer::default();

        let result = run(
            || Ok(Borrowed(&mut sniffer)),
            || CaptureSink::new(buffer.clone(), 1024, LINKTYPE_BLUETOOTH_LE_LL),
            &BringUpConfig::default(),
            CaptureSettings::default(),
            &shutdown,
        );

        assert!(matches!(
            result,
            Err(SessionError::Capture(CaptureError::DeviceLost))
        ));
        assert_eq!(packets(&buffer).len(), 1);
        assert!(matches!(
            sniffer.transfers().last(),
            Some(Transfer::ReadBulk { .. })
        ));
    }
}
