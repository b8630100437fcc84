//! An in-memory sniffer which answers from a script and records every transfer it was asked
//! to perform. Used by the tests here, and by the capture tests through the `testing` feature.
use crate::bringup::IDENTITY_LENGTH;
use crate::commands::Command;
use crate::device::SnifferTransport;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer {
    ReadControl {
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    },
    WriteControl {
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
    },
    ReadBulk {
        endpoint: u8,
    },
    Claim(u8),
    SetConfiguration(u8),
}

pub struct ScriptedSniffer {
    identity: Result<Vec<u8>, rusb::Error>,
    claim: Result<(), rusb::Error>,
    configuration: Result<(), rusb::Error>,

    power: Option<u8>,
    stuck_power: Option<u8>,
    power_readbacks: VecDeque<Result<u8, rusb::Error>>,

    write_failures: HashMap<(u8, u16), rusb::Error>,

    bulk: VecDeque<Result<Vec<u8>, rusb::Error>>,
    drained: Option<Arc<AtomicBool>>,

    transfers: Vec<Transfer>,
}

impl ScriptedSniffer {
    /// A device which accepts every request and reports back whatever power it was given.
    pub fn cooperative() -> Self {
        Self {
            identity: Ok((0..IDENTITY_LENGTH as u8).collect()),
            claim: Ok(()),
            configuration: Ok(()),
            power: None,
            stuck_power: None,
            power_readbacks: VecDeque::new(),
            write_failures: HashMap::new(),
            bulk: VecDeque::new(),
            drained: None,
            transfers: vec![],
        }
    }

    pub fn with_identity(mut self, identity: Result<Vec<u8>, rusb::Error>) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_claim(mut self, claim: Result<(), rusb::Error>) -> Self {
        self.claim = claim;
        self
    }

    pub fn with_configuration(mut self, configuration: Result<(), rusb::Error>) -> Self {
        self.configuration = configuration;
        self
    }

    /// Answers the next power polls from this list, before falling back to normal behaviour.
    pub fn with_power_readbacks<I>(mut self, readbacks: I) -> Self
    where
        I: IntoIterator<Item = Result<u8, rusb::Error>>,
    {
        self.power_readbacks.extend(readbacks);
        self
    }

    /// Every power poll reports this value, no matter what was written.
    pub fn with_power_stuck_at(mut self, power: u8) -> Self {
        self.stuck_power = Some(power);
        self
    }

    pub fn failing_write(mut self, request: u8, index: u16, error: rusb::Error) -> Self {
        self.write_failures.insert((request, index), error);
        self
    }

    pub fn with_bulk<I>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<Vec<u8>, rusb::Error>>,
    {
        self.bulk.extend(chunks);
        self
    }

    /// Flips the flag once the bulk script has been read to the end.
    pub fn stop_when_drained(mut self, flag: Arc<AtomicBool>) -> Self {
        self.drained = Some(flag);
        self
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }
}

impl SnifferTransport for ScriptedSniffer {
    fn read_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>, rusb::Error> {
        self.transfers.push(Transfer::ReadControl {
            request,
            value,
            index,
            length,
        });

        if request == Command::GetIdentity.request() {
            let mut identity = self.identity.clone()?;
            identity.truncate(length);
            return Ok(identity);
        }

        if request == Command::GetPower.request() {
            if let Some(readback) = self.power_readbacks.pop_front() {
                return readback.map(|value| vec![value]);
            }
            return Ok(self.stuck_power.or(self.power).into_iter().collect());
        }

        Err(rusb::Error::NotSupported)
    }

    fn write_control(
        &mut self,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
    ) -> Result<(), rusb::Error> {
        self.transfers.push(Transfer::WriteControl {
            request,
            value,
            index,
            data: data.to_vec(),
        });

        if let Some(error) = self.write_failures.get(&(request, index)) {
            return Err(*error);
        }

        if request == Command::SetPower.request() {
            self.power = Some(index as u8);
        }
        Ok(())
    }

    fn read_bulk(&mut self, endpoint: u8, buffer: &mut [u8]) -> Result<usize, rusb::Error> {
        self.transfers.push(Transfer::ReadBulk { endpoint });

        let next = self.bulk.pop_front();
        if self.bulk.is_empty() {
            if let Some(flag) = &self.drained {
                flag.store(true, Ordering::Relaxed);
            }
        }

        match next {
            Some(Ok(chunk)) => {
                let length = chunk.len().min(buffer.len());
                buffer[..length].copy_from_slice(&chunk[..length]);
                Ok(length)
            }
            Some(Err(error)) => Err(error),
            None => Err(rusb::Error::Timeout),
        }
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.transfers.push(Transfer::Claim(interface));
        self.claim
    }

    fn set_active_configuration(&mut self, configuration: u8) -> Result<(), rusb::Error> {
        self.transfers.push(Transfer::SetConfiguration(configuration));
        self.configuration
    }
}
