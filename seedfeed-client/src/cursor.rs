//! Resumable connection state.
//!
//! The state is the last sequence number received per station. It is
//! serialized as text, one station per line:
//!
//! ```text
//! # seedfeed connection state
//! AM R0A1B 41231
//! GE WLF 7
//! ```

use std::collections::BTreeMap;

use seedfeed_protocol::SequenceNumber;

use crate::error::{ClientError, Result};
use crate::state::StationKey;

const HEADER: &str = "# seedfeed connection state";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    sequences: BTreeMap<StationKey, SequenceNumber>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: StationKey, sequence: SequenceNumber) {
        self.sequences.insert(key, sequence);
    }

    /// Last acknowledged sequence for a station.
    pub fn get(&self, network: &str, station: &str) -> Option<SequenceNumber> {
        self.sequences
            .get(&StationKey::new(network, station))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StationKey, &SequenceNumber)> {
        self.sequences.iter()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Parse the text form. Any malformed line rejects the whole blob.
    pub fn parse(text: &str) -> Result<Self> {
        let mut sequences = BTreeMap::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invalid = |reason: String| ClientError::InvalidConnectionState {
                line: idx + 1,
                reason,
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [network, station, seq] = fields.as_slice() else {
                return Err(invalid(format!(
                    "expected 'NET STA SEQ', got {} fields",
                    fields.len()
                )));
            };
            let sequence =
                SequenceNumber::from_decimal(seq).map_err(|e| invalid(e.to_string()))?;
            sequences.insert(StationKey::new(*network, *station), sequence);
        }
        Ok(Self { sequences })
    }

    pub fn to_text(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for (key, seq) in &self.sequences {
            out.push_str(&format!("{} {} {}\n", key.network, key.station, seq.value()));
        }
        out
    }
}
