use std::time::Duration;

use seedfeed_protocol::{MseedRecord, RawFrame, SequenceNumber};

/// Client connection state machine.
///
/// Transitions: `Disconnected` → `Connected` → `Configured` → `Streaming` → `Disconnected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Not connected to any server.
    Disconnected,
    /// TCP connected and HELLO exchanged; ready for INFO, STATION and SELECT.
    Connected,
    /// At least one STATION configured; ready for DATA and END.
    Configured,
    /// Binary frame streaming active after END.
    Streaming,
}

impl ClientState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connected => "Connected",
            Self::Configured => "Configured",
            Self::Streaming => "Streaming",
        }
    }
}

/// Configuration for [`SeedLinkClient`](crate::SeedLinkClient) connections.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Timeout for the initial TCP connection. Default: 10 seconds.
    pub connect_timeout: Duration,
    /// Timeout for individual reads (lines and frames). Default: 120 seconds.
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
        }
    }
}

/// Information about the connected SeedLink server, parsed from HELLO.
#[derive(Clone, Debug)]
pub struct ServerInfo {
    /// Server software name (e.g., `"SeedLink"`).
    pub software: String,
    /// Server version string (e.g., `"v3.1"`).
    pub version: String,
    /// Server organization line.
    pub organization: String,
}

/// Network + station identifier used as a key for sequence tracking.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StationKey {
    /// FDSN network code (e.g., `"AM"`).
    pub network: String,
    /// Station code (e.g., `"R0A1B"`).
    pub station: String,
}

impl StationKey {
    pub fn new(network: impl Into<String>, station: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
        }
    }
}

impl std::fmt::Display for StationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.network, self.station)
    }
}

/// A data frame with its 512-byte miniSEED payload copied to the heap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnedFrame {
    pub sequence: SequenceNumber,
    pub payload: Vec<u8>,
}

impl OwnedFrame {
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decode the payload as a miniSEED record.
    pub fn decode(&self) -> seedfeed_protocol::Result<MseedRecord> {
        seedfeed_protocol::mseed::decode(&self.payload)
    }

    /// Station named in the record header, read without decoding the record.
    pub(crate) fn station_key(&self) -> Option<StationKey> {
        let p = self.payload.get(..20)?;
        let station = std::str::from_utf8(&p[8..13]).ok()?.trim();
        let network = std::str::from_utf8(&p[18..20]).ok()?.trim();
        (!station.is_empty() && !network.is_empty()).then(|| StationKey::new(network, station))
    }
}

impl<'a> TryFrom<RawFrame<'a>> for OwnedFrame {
    type Error = RawFrame<'a>;

    /// Only data frames carry a sequence number; INFO frames are handed back.
    fn try_from(raw: RawFrame<'a>) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawFrame::Data { sequence, payload } => Ok(Self {
                sequence,
                payload: payload.to_vec(),
            }),
            info => Err(info),
        }
    }
}
