//! SeedLink v3 frames.
//!
//! Every frame is an 8-byte header followed by a 512-byte miniSEED record.
//! Data frames carry `SL` and a 6-digit hex sequence number; INFO responses
//! are carried in `SLINFO` frames whose last header byte is `*` while more
//! frames follow.

use crate::error::{ProtocolError, Result};
use crate::mseed::{self, MseedRecord};
use crate::sequence::SequenceNumber;

pub const SIGNATURE: &[u8; 2] = b"SL";
pub const INFO_SIGNATURE: &[u8; 6] = b"SLINFO";
pub const HEADER_LEN: usize = 8;
pub const PAYLOAD_LEN: usize = 512;
pub const FRAME_LEN: usize = 520;

/// Zero-copy frame, borrows payload from the input buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawFrame<'a> {
    Data {
        sequence: SequenceNumber,
        payload: &'a [u8],
    },
    Info {
        /// `true` when further INFO frames belong to the same response.
        more: bool,
        payload: &'a [u8],
    },
}

impl<'a> RawFrame<'a> {
    pub fn payload(&self) -> &'a [u8] {
        match self {
            Self::Data { payload, .. } | Self::Info { payload, .. } => payload,
        }
    }

    pub fn sequence(&self) -> Option<SequenceNumber> {
        match self {
            Self::Data { sequence, .. } => Some(*sequence),
            Self::Info { .. } => None,
        }
    }

    /// Decode the payload as a miniSEED record.
    pub fn decode(&self) -> Result<MseedRecord> {
        mseed::decode(self.payload())
    }
}

/// Parse a frame from exactly 520 bytes.
pub fn parse(data: &[u8]) -> Result<RawFrame<'_>> {
    if data.len() < FRAME_LEN {
        return Err(ProtocolError::FrameTooShort {
            expected: FRAME_LEN,
            actual: data.len(),
        });
    }

    if &data[0..2] != SIGNATURE.as_slice() {
        return Err(ProtocolError::InvalidSignature {
            expected: "SL",
            actual: [data[0], data[1]],
        });
    }

    let payload = &data[HEADER_LEN..FRAME_LEN];

    if &data[0..6] == INFO_SIGNATURE.as_slice() {
        return Ok(RawFrame::Info {
            more: data[7] == b'*',
            payload,
        });
    }

    let hex_str = std::str::from_utf8(&data[2..8])
        .map_err(|_| ProtocolError::InvalidSequence("sequence bytes are not valid UTF-8".into()))?;
    let sequence = SequenceNumber::from_hex(hex_str)?;

    Ok(RawFrame::Data { sequence, payload })
}

/// Write a data frame from sequence number and payload.
pub fn write(sequence: SequenceNumber, payload: &[u8]) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.extend_from_slice(SIGNATURE);
    frame.extend_from_slice(sequence.to_hex().as_bytes());
    push_payload(frame, payload)
}

/// Write an INFO frame.
pub fn write_info(more: bool, payload: &[u8]) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(FRAME_LEN);
    frame.extend_from_slice(INFO_SIGNATURE);
    frame.push(b' ');
    frame.push(if more { b'*' } else { b' ' });
    push_payload(frame, payload)
}

fn push_payload(mut frame: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() != PAYLOAD_LEN {
        return Err(ProtocolError::PayloadLengthMismatch {
            expected: PAYLOAD_LEN,
            actual: payload.len(),
        });
    }
    frame.extend_from_slice(payload);
    debug_assert_eq!(frame.len(), FRAME_LEN);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_data_frame() {
        let payload = [0xAA_u8; PAYLOAD_LEN];
        let frame = write(SequenceNumber::new(26), &payload).unwrap();
        assert_eq!(&frame[0..8], b"SL00001A");

        let raw = parse(&frame).unwrap();
        assert_eq!(raw.sequence(), Some(SequenceNumber::new(26)));
        assert_eq!(raw.payload(), &payload[..]);
    }

    #[test]
    fn parse_info_frames() {
        let payload = [0u8; PAYLOAD_LEN];
        let frame = write_info(true, &payload).unwrap();
        assert_eq!(&frame[0..8], b"SLINFO *");
        assert_eq!(
            parse(&frame).unwrap(),
            RawFrame::Info {
                more: true,
                payload: &payload[..],
            }
        );

        let last = write_info(false, &payload).unwrap();
        assert!(matches!(
            parse(&last).unwrap(),
            RawFrame::Info { more: false, .. }
        ));
    }

    #[test]
    fn parse_wrong_signature() {
        let mut frame = write(SequenceNumber::new(1), &[0u8; PAYLOAD_LEN]).unwrap();
        frame[0] = b'X';
        assert!(matches!(
            parse(&frame).unwrap_err(),
            ProtocolError::InvalidSignature { .. }
        ));
    }

    #[test]
    fn parse_too_short() {
        assert!(matches!(
            parse(b"SL00001A").unwrap_err(),
            ProtocolError::FrameTooShort { .. }
        ));
    }

    #[test]
    fn write_wrong_payload_size() {
        assert!(matches!(
            write(SequenceNumber::new(0), &[0u8; 100]).unwrap_err(),
            ProtocolError::PayloadLengthMismatch { .. }
        ));
    }
}
