use std::collections::HashMap;

use seedfeed_protocol::catalog::{self, CatalogStation};
use seedfeed_protocol::{Command, InfoLevel, RawFrame, Response, SequenceNumber, mseed};
use tracing::{debug, info, trace};

use crate::connection::{self, Connection, Incoming};
use crate::cursor::ConnectionState;
use crate::error::{ClientError, Result};
use crate::state::{ClientConfig, ClientState, OwnedFrame, ServerInfo, StationKey};

/// Async SeedLink v3 client.
///
/// Implements the protocol state machine:
/// `Connected` → `Configured` → `Streaming` → `Disconnected`.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> seedfeed_client::Result<()> {
/// use seedfeed_client::SeedLinkClient;
///
/// let mut client = SeedLinkClient::connect("localhost:18000").await?;
/// let catalog = client.catalog().await?;
/// client.station("R0A1B", "AM").await?;
/// client.select("--SHZ").await?;
/// client.data().await?;
/// client.end_stream().await?;
///
/// while let Some(frame) = client.next_frame().await? {
///     println!("seq={}, len={}", frame.sequence(), frame.payload().len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct SeedLinkClient {
    connection: Connection,
    state: ClientState,
    server_info: ServerInfo,
    sequences: HashMap<StationKey, SequenceNumber>,
}

impl SeedLinkClient {
    /// Connect to a SeedLink server with default configuration.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_config(addr, ClientConfig::default()).await
    }

    /// Connect with a custom [`ClientConfig`].
    ///
    /// Performs TCP connect and the HELLO exchange. On success the client is
    /// in [`ClientState::Connected`].
    pub async fn connect_with_config(addr: &str, config: ClientConfig) -> Result<Self> {
        info!(addr, "connecting");
        let mut connection =
            Connection::connect(addr, config.connect_timeout, config.read_timeout).await?;

        connection.send_command(&Command::Hello).await?;

        let line1 = connection.read_line().await?;
        let line2 = connection.read_line().await?;
        let Response::Hello {
            software,
            version,
            organization,
        } = Response::parse_hello(&line1, &line2)?
        else {
            return Err(ClientError::UnexpectedResponse(
                "expected HELLO response".into(),
            ));
        };

        info!(%software, %version, %organization, "connected");

        Ok(Self {
            connection,
            state: ClientState::Connected,
            server_info: ServerInfo {
                software,
                version,
                organization,
            },
            sequences: HashMap::new(),
        })
    }

    // -- Accessors --

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    // -- Discovery (Connected|Configured) --

    /// Request server information and return the concatenated XML text.
    pub async fn info(&mut self, level: InfoLevel) -> Result<String> {
        self.require_state_in(&[ClientState::Connected, ClientState::Configured], "info")?;

        debug!(%level, "INFO");
        self.connection.send_command(&Command::Info { level }).await?;

        let mut xml = String::new();
        loop {
            let buf = match self.connection.read_frame_or_line().await? {
                Incoming::Frame(buf) => buf,
                Incoming::Line(line) => {
                    return match Response::parse_line(&line)? {
                        Response::Error { description } => Err(ClientError::ServerError(
                            format!("INFO {level}: {description}"),
                        )),
                        _ => Err(ClientError::UnexpectedResponse(format!(
                            "expected INFO frames, got: {line:?}"
                        ))),
                    };
                }
            };

            let RawFrame::Info { more, payload } = connection::parse_frame(&buf)? else {
                return Err(ClientError::UnexpectedResponse(
                    "data frame during INFO response".into(),
                ));
            };
            xml.push_str(&mseed::ascii_text(payload)?);
            if !more {
                break;
            }
        }
        trace!(bytes = xml.len(), "INFO response complete");
        Ok(xml)
    }

    /// Fetch the server's stream catalog (`INFO STREAMS`).
    pub async fn catalog(&mut self) -> Result<Vec<CatalogStation>> {
        let xml = self.info(InfoLevel::Streams).await?;
        let stations = catalog::parse_streams_xml(&xml)?;
        debug!(stations = stations.len(), "catalog received");
        Ok(stations)
    }

    // -- Configuration (Connected|Configured → Configured) --

    /// Start configuring a station subscription.
    ///
    /// Server must reply OK; returns [`ClientError::ServerError`] on ERROR.
    pub async fn station(&mut self, station: &str, network: &str) -> Result<()> {
        self.require_state_in(
            &[ClientState::Connected, ClientState::Configured],
            "station",
        )?;

        debug!(station, network, "STATION");
        let cmd = Command::Station {
            station: station.to_owned(),
            network: network.to_owned(),
        };
        self.connection.send_command(&cmd).await?;
        self.read_ok_response("STATION").await?;

        self.state = ClientState::Configured;
        Ok(())
    }

    /// Select channels within the current station, e.g. `"--SHZ"` or `"00BHZ"`.
    pub async fn select(&mut self, pattern: &str) -> Result<()> {
        self.require_state_in(&[ClientState::Configured], "select")?;

        debug!(pattern, "SELECT");
        let cmd = Command::Select {
            pattern: pattern.to_owned(),
        };
        self.connection.send_command(&cmd).await?;
        self.read_ok_response("SELECT").await
    }

    /// Arm the current station with DATA, starting from the server's next packet.
    pub async fn data(&mut self) -> Result<()> {
        self.require_state_in(&[ClientState::Configured], "data")?;

        debug!("DATA");
        self.connection
            .send_command(&Command::Data { sequence: None })
            .await?;
        self.read_ok_response("DATA").await
    }

    /// Arm the current station with DATA, resuming at `sequence`.
    pub async fn data_from(&mut self, sequence: SequenceNumber) -> Result<()> {
        self.require_state_in(&[ClientState::Configured], "data_from")?;

        debug!(%sequence, "DATA (resume)");
        self.connection
            .send_command(&Command::Data {
                sequence: Some(sequence),
            })
            .await?;
        self.read_ok_response("DATA").await
    }

    // -- Streaming (Configured → Streaming) --

    /// Send END to start streaming. There is no text reply.
    pub async fn end_stream(&mut self) -> Result<()> {
        self.require_state_in(&[ClientState::Configured], "end_stream")?;

        self.connection.send_command(&Command::End).await?;
        self.state = ClientState::Streaming;
        Ok(())
    }

    /// Read the next data frame.
    ///
    /// Returns `Ok(None)` on clean EOF, after which the client is
    /// `Disconnected`. INFO frames arriving mid-stream are skipped.
    pub async fn next_frame(&mut self) -> Result<Option<OwnedFrame>> {
        self.require_state_in(&[ClientState::Streaming], "next_frame")?;

        loop {
            let buf = match self.connection.read_frame().await {
                Ok(buf) => buf,
                Err(ClientError::Disconnected) => {
                    self.state = ClientState::Disconnected;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            match OwnedFrame::try_from(connection::parse_frame(&buf)?) {
                Ok(frame) => {
                    trace!(sequence = %frame.sequence(), "frame received");
                    self.track_sequence(&frame);
                    return Ok(Some(frame));
                }
                Err(_) => trace!("skipping INFO frame while streaming"),
            }
        }
    }

    /// Send BYE and close the connection. Can be called in any state.
    pub async fn bye(&mut self) -> Result<()> {
        if self.state == ClientState::Disconnected {
            return Ok(());
        }
        self.connection.send_command(&Command::Bye).await?;
        self.connection.shutdown().await.ok();
        self.state = ClientState::Disconnected;
        Ok(())
    }

    // -- State (no I/O) --

    /// Last received sequence number for a network/station pair.
    pub fn last_sequence(&self, network: &str, station: &str) -> Option<SequenceNumber> {
        self.sequences
            .get(&StationKey::new(network, station))
            .copied()
    }

    /// Resumable state: the sequences received so far, layered over `base`
    /// so stations that sent nothing this session keep their old cursor.
    pub fn connection_state(&self, base: Option<&ConnectionState>) -> ConnectionState {
        let mut state = base.cloned().unwrap_or_default();
        for (key, seq) in &self.sequences {
            state.insert(key.clone(), *seq);
        }
        state
    }

    // -- Private helpers --

    fn require_state_in(&self, allowed: &[ClientState], _method: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            let expected: &'static str = match allowed {
                [ClientState::Connected, ClientState::Configured] => "Connected|Configured",
                [ClientState::Configured] => "Configured",
                [ClientState::Streaming] => "Streaming",
                _ => "valid state",
            };
            Err(ClientError::InvalidState {
                expected,
                actual: self.state.as_str(),
            })
        }
    }

    async fn read_ok_response(&mut self, command_name: &str) -> Result<()> {
        let line = self.connection.read_line().await?;
        match Response::parse_line(&line)? {
            Response::Ok => Ok(()),
            Response::Error { description } => Err(ClientError::ServerError(format!(
                "{command_name}: {description}"
            ))),
            _ => Err(ClientError::UnexpectedResponse(format!(
                "expected OK for {command_name}, got: {line:?}"
            ))),
        }
    }

    fn track_sequence(&mut self, frame: &OwnedFrame) {
        if let Some(key) = frame.station_key() {
            self.sequences.insert(key, frame.sequence());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockConfig, MockServer, data_frame};
    use chrono::{TimeZone, Utc};
    use seedfeed_protocol::catalog::CatalogStream;
    use seedfeed_protocol::{MseedRecord, Samples};

    fn record(network: &str, station: &str) -> MseedRecord {
        MseedRecord::new()
            .with_nslc(network, station, "", "SHZ")
            .with_start_time(mseed::nano_time(
                Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            ))
            .with_sample_rate(10.0)
            .with_samples(Samples::Int(vec![1, 2, 3]))
    }

    fn catalog_fixture() -> Vec<CatalogStation> {
        vec![CatalogStation {
            network: "AM".into(),
            name: "STA1".into(),
            streams: vec![CatalogStream {
                seedname: "SHZ".into(),
                location: String::new(),
                type_code: "D".into(),
            }],
        }]
    }

    #[tokio::test]
    async fn hello_exchange() {
        let server = MockServer::start(MockConfig::default()).await;

        let client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();

        assert_eq!(client.server_info().software, "SeedLink");
        assert_eq!(client.server_info().organization, "Mock Server");
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[tokio::test]
    async fn station_data_end_flow() {
        let frames = vec![
            data_frame(1, &record("AM", "STA1")),
            data_frame(2, &record("AM", "STA1")),
        ];
        let server = MockServer::start(MockConfig::with_frames(frames)).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();

        client.station("STA1", "AM").await.unwrap();
        assert_eq!(client.state(), ClientState::Configured);
        client.select("--SHZ").await.unwrap();
        client.data().await.unwrap();
        client.end_stream().await.unwrap();
        assert_eq!(client.state(), ClientState::Streaming);

        let f1 = client.next_frame().await.unwrap().unwrap();
        assert_eq!(f1.sequence(), SequenceNumber::new(1));
        let rec = f1.decode().unwrap();
        assert_eq!(rec.station, "STA1");
        assert_eq!(rec.samples, Samples::Int(vec![1, 2, 3]));

        let f2 = client.next_frame().await.unwrap().unwrap();
        assert_eq!(f2.sequence(), SequenceNumber::new(2));
        assert_eq!(client.last_sequence("AM", "STA1"), Some(SequenceNumber::new(2)));

        assert_eq!(
            server.commands(),
            vec!["HELLO", "STATION STA1 AM", "SELECT --SHZ", "DATA", "END"]
        );
    }

    #[tokio::test]
    async fn eof_after_stream_returns_none() {
        let mut config = MockConfig::with_frames(vec![data_frame(5, &record("AM", "STA1"))]);
        config.close_after_stream = true;
        let server = MockServer::start(config).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        client.station("STA1", "AM").await.unwrap();
        client.data().await.unwrap();
        client.end_stream().await.unwrap();

        assert!(client.next_frame().await.unwrap().is_some());
        assert!(client.next_frame().await.unwrap().is_none());
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[tokio::test]
    async fn catalog_over_info_frames() {
        let mut config = MockConfig::default();
        config.catalog = catalog_fixture();
        let server = MockServer::start(config).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        assert_eq!(client.catalog().await.unwrap(), catalog_fixture());
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[tokio::test]
    async fn large_catalog_spans_frames() {
        let mut config = MockConfig::default();
        config.catalog = (0..40)
            .map(|i| CatalogStation {
                network: "AM".into(),
                name: format!("S{i:03}"),
                streams: catalog_fixture().remove(0).streams,
            })
            .collect();
        let expected = config.catalog.clone();
        let server = MockServer::start(config).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        assert_eq!(client.catalog().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn catalog_error_reply() {
        let mut config = MockConfig::default();
        config.info_unavailable = true;
        let server = MockServer::start(config).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        assert!(matches!(
            client.catalog().await,
            Err(ClientError::ServerError(_))
        ));
    }

    #[tokio::test]
    async fn rejected_station_is_server_error() {
        let mut config = MockConfig::default();
        config.rejected_stations = vec!["NOPE".into()];
        let server = MockServer::start(config).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        let err = client.station("NOPE", "AM").await.unwrap_err();
        assert!(matches!(err, ClientError::ServerError(ref m) if m.starts_with("STATION")));
        assert_eq!(client.state(), ClientState::Connected);
    }

    #[tokio::test]
    async fn data_from_sends_hex_sequence() {
        let server = MockServer::start(MockConfig::default()).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        client.station("STA1", "AM").await.unwrap();
        client.data_from(SequenceNumber::new(0x1B)).await.unwrap();

        assert_eq!(server.commands().last().unwrap(), "DATA 00001B");
    }

    #[tokio::test]
    async fn state_guards() {
        let server = MockServer::start(MockConfig::default()).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        assert!(matches!(
            client.next_frame().await,
            Err(ClientError::InvalidState { .. })
        ));
        assert!(matches!(
            client.data().await,
            Err(ClientError::InvalidState { .. })
        ));
        assert!(matches!(
            client.end_stream().await,
            Err(ClientError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn connection_state_layers_over_recovered() {
        let frames = vec![data_frame(9, &record("AM", "STA1"))];
        let server = MockServer::start(MockConfig::with_frames(frames)).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        client.station("STA1", "AM").await.unwrap();
        client.data().await.unwrap();
        client.end_stream().await.unwrap();
        client.next_frame().await.unwrap().unwrap();

        let mut recovered = ConnectionState::new();
        recovered.insert(StationKey::new("AM", "STA1"), SequenceNumber::new(3));
        recovered.insert(StationKey::new("AM", "QUIET"), SequenceNumber::new(44));

        let state = client.connection_state(Some(&recovered));
        assert_eq!(state.get("AM", "STA1"), Some(SequenceNumber::new(9)));
        assert_eq!(state.get("AM", "QUIET"), Some(SequenceNumber::new(44)));
    }

    #[tokio::test]
    async fn bye_disconnects() {
        let server = MockServer::start(MockConfig::default()).await;

        let mut client = SeedLinkClient::connect(&server.addr().to_string())
            .await
            .unwrap();
        client.bye().await.unwrap();
        assert_eq!(client.state(), ClientState::Disconnected);
        client.bye().await.unwrap();
    }
}
