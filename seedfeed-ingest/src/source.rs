use std::future::Future;

use seedfeed_client::{ClientConfig, ClientError, ConnectionState, SeedLinkClient};
use seedfeed_protocol::{CatalogStation, mseed};
use tracing::{debug, info, warn};

use crate::packet::WaveformPacket;
use crate::selector::SelectedStreamSet;

/// Upstream waveform source as seen by the producer.
pub trait StreamSource: Send {
    /// The server's station and channel catalog.
    fn catalog(
        &mut self,
    ) -> impl Future<Output = Result<Vec<CatalogStation>, ClientError>> + Send;

    /// Subscribe to `selection` and start streaming. Stations with a cursor
    /// in `resume` continue after it.
    fn subscribe(
        &mut self,
        selection: &SelectedStreamSet,
        resume: Option<&ConnectionState>,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;

    /// Next waveform packet; `Ok(None)` once the server closes the stream.
    fn next_packet(
        &mut self,
    ) -> impl Future<Output = Result<Option<WaveformPacket>, ClientError>> + Send;

    /// Cursor to persist, layered over `base`.
    fn connection_state(&self, base: Option<&ConnectionState>) -> ConnectionState;

    fn close(&mut self) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// [`StreamSource`] backed by a SeedLink v3 connection.
pub struct SeedLinkSource {
    client: SeedLinkClient,
}

impl SeedLinkSource {
    pub async fn connect(addr: &str, config: ClientConfig) -> Result<Self, ClientError> {
        info!(addr, "connecting to SeedLink server");
        let client = SeedLinkClient::connect_with_config(addr, config).await?;
        let server = client.server_info();
        info!(
            software = %server.software,
            version = %server.version,
            organization = %server.organization,
            "connected"
        );
        Ok(Self { client })
    }
}

impl StreamSource for SeedLinkSource {
    async fn catalog(&mut self) -> Result<Vec<CatalogStation>, ClientError> {
        self.client.catalog().await
    }

    async fn subscribe(
        &mut self,
        selection: &SelectedStreamSet,
        resume: Option<&ConnectionState>,
    ) -> Result<(), ClientError> {
        let mut accepted = 0usize;

        for ((network, station), keys) in selection.by_station() {
            match self.client.station(&station, &network).await {
                Ok(()) => {}
                Err(ClientError::ServerError(reason)) => {
                    warn!(%network, %station, %reason, "station rejected by server");
                    continue;
                }
                Err(e) => return Err(e),
            }

            for key in &keys {
                match self.client.select(&key.selector()).await {
                    Ok(()) => {}
                    Err(ClientError::ServerError(reason)) => {
                        warn!(stream = %key, %reason, "channel selection rejected by server");
                    }
                    Err(e) => return Err(e),
                }
            }

            match resume.and_then(|state| state.get(&network, &station)) {
                Some(last) => {
                    debug!(%network, %station, last = %last, "resuming station");
                    self.client.data_from(last.next()).await?;
                }
                None => self.client.data().await?,
            }
            accepted += 1;
        }

        if accepted == 0 {
            return Err(ClientError::ServerError(
                "no station subscription was accepted".into(),
            ));
        }

        self.client.end_stream().await?;
        info!(stations = accepted, streams = selection.len(), "streaming started");
        Ok(())
    }

    async fn next_packet(&mut self) -> Result<Option<WaveformPacket>, ClientError> {
        loop {
            let Some(frame) = self.client.next_frame().await? else {
                return Ok(None);
            };

            let record = match frame.decode() {
                Ok(record) => record,
                Err(e) if mseed::is_ascii(&e) => {
                    debug!(sequence = %frame.sequence(), "text record, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(sequence = %frame.sequence(), error = %e, "undecodable record, skipping");
                    continue;
                }
            };

            match WaveformPacket::from_record(&record) {
                Some(packet) => return Ok(Some(packet)),
                None => debug!(
                    network = %record.network,
                    station = %record.station,
                    channel = %record.channel,
                    "record carries no waveform, skipping"
                ),
            }
        }
    }

    fn connection_state(&self, base: Option<&ConnectionState>) -> ConnectionState {
        self.client.connection_state(base)
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        self.client.bye().await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::StreamKey;
    use chrono::{TimeZone, Utc};
    use seedfeed_client::StationKey;
    use seedfeed_client::mock::{MockConfig, MockServer, data_frame, text_frame};
    use seedfeed_protocol::catalog::CatalogStream;
    use seedfeed_protocol::{MseedRecord, Samples, SequenceNumber};

    fn record(station: &str, channel: &str, samples: Samples) -> MseedRecord {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        MseedRecord::new()
            .with_nslc("AM", station, "", channel)
            .with_start_time(mseed::nano_time(start))
            .with_sample_rate(100.0)
            .with_samples(samples)
    }

    fn selection(keys: &[StreamKey]) -> SelectedStreamSet {
        let mut set = SelectedStreamSet::default();
        for key in keys {
            set.insert(key.clone());
        }
        set
    }

    async fn connect(server: &MockServer) -> SeedLinkSource {
        SeedLinkSource::connect(&server.addr().to_string(), ClientConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn subscribe_sends_sorted_station_blocks() {
        let server = MockServer::start(MockConfig::default()).await;
        let mut source = connect(&server).await;

        let set = selection(&[
            StreamKey::new("AM", "STB", "00", "EHZ"),
            StreamKey::new("AM", "STA", "", "SHZ"),
            StreamKey::new("AM", "STA", "", "SHN"),
        ]);
        source.subscribe(&set, None).await.unwrap();

        assert_eq!(
            server.commands(),
            vec![
                "HELLO",
                "STATION STA AM",
                "SELECT --SHN",
                "SELECT --SHZ",
                "DATA",
                "STATION STB AM",
                "SELECT 00EHZ",
                "DATA",
                "END",
            ]
        );
    }

    #[tokio::test]
    async fn subscribe_resumes_after_saved_sequence() {
        let server = MockServer::start(MockConfig::default()).await;
        let mut source = connect(&server).await;

        let mut resume = ConnectionState::new();
        resume.insert(StationKey::new("AM", "STA"), SequenceNumber::new(0x1A));
        let set = selection(&[StreamKey::new("AM", "STA", "", "SHZ")]);
        source.subscribe(&set, Some(&resume)).await.unwrap();

        assert!(server.commands().contains(&"DATA 00001B".to_owned()));
    }

    #[tokio::test]
    async fn rejected_station_is_skipped() {
        let config = MockConfig {
            rejected_stations: vec!["BAD".into()],
            ..MockConfig::default()
        };
        let server = MockServer::start(config).await;
        let mut source = connect(&server).await;

        let set = selection(&[
            StreamKey::new("AM", "BAD", "", "SHZ"),
            StreamKey::new("AM", "GOOD", "", "SHZ"),
        ]);
        source.subscribe(&set, None).await.unwrap();

        let commands = server.commands();
        assert!(commands.contains(&"STATION GOOD AM".to_owned()));
        assert_eq!(commands.iter().filter(|c| *c == "SELECT --SHZ").count(), 1);
        assert_eq!(commands.iter().filter(|c| *c == "DATA").count(), 1);
        assert_eq!(commands.last().map(String::as_str), Some("END"));
    }

    #[tokio::test]
    async fn all_stations_rejected_is_an_error() {
        let config = MockConfig {
            rejected_stations: vec!["BAD".into()],
            ..MockConfig::default()
        };
        let server = MockServer::start(config).await;
        let mut source = connect(&server).await;

        let set = selection(&[StreamKey::new("AM", "BAD", "", "SHZ")]);
        let err = source.subscribe(&set, None).await.unwrap_err();
        assert!(matches!(err, ClientError::ServerError(_)));
        assert!(!server.commands().contains(&"END".to_owned()));
    }

    #[tokio::test]
    async fn next_packet_skips_text_records() {
        let frames = vec![
            text_frame(1, &record("STA", "LOG", Samples::Int(vec![])), "boot"),
            data_frame(2, &record("STA", "SHZ", Samples::Int(vec![4, 5, 6]))),
            data_frame(3, &record("STA", "SHZ", Samples::Int(vec![]))),
        ];
        let mut config = MockConfig::with_frames(frames);
        config.close_after_stream = true;
        config.catalog = vec![CatalogStation {
            network: "AM".into(),
            name: "STA".into(),
            streams: vec![CatalogStream {
                seedname: "SHZ".into(),
                location: String::new(),
                type_code: "D".into(),
            }],
        }];
        let server = MockServer::start(config).await;
        let mut source = connect(&server).await;

        assert_eq!(source.catalog().await.unwrap().len(), 1);
        let set = selection(&[StreamKey::new("AM", "STA", "", "SHZ")]);
        source.subscribe(&set, None).await.unwrap();

        let packet = source.next_packet().await.unwrap().unwrap();
        assert_eq!(packet.key, StreamKey::new("AM", "STA", "", "SHZ"));
        assert_eq!(packet.samples, vec![4.0, 5.0, 6.0]);

        assert_eq!(source.next_packet().await.unwrap(), None);

        let state = source.connection_state(None);
        assert_eq!(state.get("AM", "STA"), Some(SequenceNumber::new(3)));
        source.close().await.unwrap();
    }
}
