use crate::error::{ProtocolError, Result};

/// SeedLink v3 packet sequence number (24 bits on the wire).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    /// Maximum sequence value for v3 (6 hex digits).
    pub const MAX: u64 = 0xFF_FFFF;

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    /// The sequence number following this one, wrapping at [`Self::MAX`].
    pub fn next(self) -> Self {
        if self.0 >= Self::MAX {
            Self(0)
        } else {
            Self(self.0 + 1)
        }
    }

    /// Parse v3 hex representation (6 hex digits, e.g. "00001A").
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 6 {
            return Err(ProtocolError::InvalidSequence(format!(
                "hex sequence must be 6 chars, got {} ({hex:?})",
                hex.len()
            )));
        }
        let value = u64::from_str_radix(hex, 16)
            .map_err(|_| ProtocolError::InvalidSequence(format!("invalid hex: {hex:?}")))?;
        Ok(Self(value))
    }

    /// Serialize to v3 hex (6 uppercase hex digits).
    pub fn to_hex(self) -> String {
        format!("{:06X}", self.0)
    }

    /// Parse the decimal form used in persisted connection state.
    pub fn from_decimal(s: &str) -> Result<Self> {
        let value: u64 = s
            .parse()
            .map_err(|_| ProtocolError::InvalidSequence(format!("invalid decimal: {s:?}")))?;
        if value > Self::MAX {
            return Err(ProtocolError::InvalidSequence(format!(
                "sequence {value} exceeds {}",
                Self::MAX
            )));
        }
        Ok(Self(value))
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
