// Every bulk read from the sniffer carries a single radio frame wrapped like so:
//
//   0      info byte
//   1..3   packet length (LE), counting everything after these three bytes
//   3..7   device timestamp (LE)
//   7      frame length
//   8..    frame payload
//   -2     RSSI
//   -1     FCS / LQI status
use crate::error::FrameError;
use byteorder::{ByteOrder, LittleEndian};

pub const CAPTURE_ENDPOINT: u8 = 0x83;
pub const MAX_CHUNK_SIZE: usize = 1024;

pub const HEADER_LENGTH: usize = 8;
pub const TRAILER_LENGTH: usize = 2;
pub const FRAMING_OVERHEAD: usize = HEADER_LENGTH + TRAILER_LENGTH;

const LENGTH_FIELD_END: usize = 3;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Framing {
    /// Strip fixed offsets, trust nothing the header says.
    #[default]
    Permissive,

    /// As permissive, but drop chunks whose packet length field doesn't match the transfer.
    Strict,
}

impl Framing {
    /// Pulls the payload out of a chunk. `Ok(None)` means the chunk was too short to carry one.
    pub fn payload<'a>(&self, chunk: &'a [u8]) -> Result<Option<&'a [u8]>, FrameError> {
        if chunk.len() <= FRAMING_OVERHEAD {
            return Ok(None);
        }

        if *self == Framing::Strict {
            let claimed = LittleEndian::read_u16(&chunk[1..LENGTH_FIELD_END]);
            let actual = chunk.len() - LENGTH_FIELD_END;
            if claimed as usize != actual {
                return Err(FrameError::LengthMismatch { claimed, actual });
            }
        }

        Ok(Some(&chunk[HEADER_LENGTH..chunk.len() - TRAILER_LENGTH]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(length: usize) -> Vec<u8> {
        let mut chunk: Vec<u8> = (0..length).map(|i| i as u8).collect();
        if length >= LENGTH_FIELD_END {
            LittleEndian::write_u16(&mut chunk[1..3], (length - 3) as u16);
        }
        chunk
    }

    #[test]
    fn short_chunks_carry_nothing() {
        for length in 0..=FRAMING_OVERHEAD {
            assert_eq!(Framing::Permissive.payload(&chunk(length)), Ok(None));
            assert_eq!(Framing::Strict.payload(&chunk(length)), Ok(None));
        }
    }

    #[test]
    fn payload_is_between_header_and_trailer() {
        let data = chunk(50);
        let payload = Framing::Permissive.payload(&data).unwrap().unwrap();

        assert_eq!(payload.len(), 40);
        assert_eq!(payload, &data[8..48]);
    }

    #[test]
    fn payload_length_over_the_whole_range() {
        for length in FRAMING_OVERHEAD + 1..=MAX_CHUNK_SIZE {
            let data = chunk(length);
            let payload = Framing::Permissive.payload(&data).unwrap().unwrap();
            assert_eq!(payload.len(), length - FRAMING_OVERHEAD);
        }
    }

    #[test]
    fn permissive_ignores_the_length_field() {
        let mut data = chunk(20);
        data[1] = 0xFF;
        data[2] = 0xFF;
        assert_eq!(Framing::Permissive.payload(&data).unwrap().unwrap().len(), 10);
    }

    #[test]
    fn strict_checks_the_length_field() {
        let data = chunk(20);
        assert!(Framing::Strict.payload(&data).unwrap().is_some());

        let mut bad = data.clone();
        bad[1] = 0x01;
        bad[2] = 0x00;
        assert_eq!(
            Framing::Strict.payload(&bad),
            Err(FrameError::LengthMismatch {
                claimed: 1,
                actual: 17
            })
        );
    }
}
