use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use seedfeed_client::ConnectionState;
use tracing::{debug, error, info, warn};

use crate::config::FeedConfig;
use crate::error::{ConfigError, IngestError};
use crate::packet::WaveformPacket;
use crate::queue::{EnqueueError, PacketSender};
use crate::resample::Resampler;
use crate::selector::{self, SelectedStreamSet};
use crate::shutdown::ShutdownHandle;
use crate::source::StreamSource;
use crate::staleness::{StalenessTracker, Transition};
use crate::state_store;

const COMPONENT: &str = "producer";

#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// `[network, station, channel, location]` regexes.
    pub patterns: Vec<[String; 4]>,
    /// Where connection state is recovered from and saved to. `None` turns
    /// recovery off.
    pub state_file: Option<PathBuf>,
    pub enqueue_timeout: Duration,
    pub max_latency: Option<Duration>,
    pub resample_rate: Option<f64>,
}

impl ProducerSettings {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            patterns: config.seedlink.streams.clone(),
            state_file: config
                .seedlink
                .recover
                .then(|| config.seedlink.state_file.clone()),
            enqueue_timeout: config.pipeline.enqueue_timeout(),
            max_latency: config.pipeline.max_latency(),
            resample_rate: config.pipeline.resample_rate(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProducerStats {
    pub received: u64,
    pub enqueued: u64,
    pub unselected: u64,
    pub stale: u64,
    pub queue_full: u64,
    pub resample_failed: u64,
}

/// Network side of the pipeline: select, subscribe, admit packets, enqueue.
pub struct Producer<S> {
    source: S,
    settings: ProducerSettings,
    queue: PacketSender,
    shutdown: ShutdownHandle,
    selection: SelectedStreamSet,
    staleness: StalenessTracker,
    resampler: Option<Resampler>,
    recovered: Option<ConnectionState>,
    /// Set when the session failed on the SeedLink side.
    connection_failed: bool,
    stats: ProducerStats,
}

impl<S: StreamSource> Producer<S> {
    pub fn new(
        source: S,
        settings: ProducerSettings,
        queue: PacketSender,
        shutdown: ShutdownHandle,
    ) -> Result<Self, IngestError> {
        let resampler = settings
            .resample_rate
            .map(Resampler::new)
            .transpose()
            .map_err(|e| ConfigError::Invalid(format!("resample rate: {e}")))?;
        Ok(Self {
            source,
            staleness: StalenessTracker::new(settings.max_latency),
            settings,
            queue,
            shutdown,
            selection: SelectedStreamSet::default(),
            resampler,
            recovered: None,
            connection_failed: false,
            stats: ProducerStats::default(),
        })
    }

    pub fn stats(&self) -> ProducerStats {
        self.stats
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run until shutdown or a fatal error, then close the connection and
    /// persist the connection state. The state is kept as it was when the
    /// SeedLink session itself failed.
    pub async fn run(&mut self) {
        if let Err(e) = self.start().await {
            self.connection_failed = true;
            self.shutdown.force(COMPONENT, e);
        } else {
            self.stream().await;
        }
        self.finish().await;
    }

    async fn start(&mut self) -> Result<(), IngestError> {
        if let Some(path) = &self.settings.state_file {
            self.recovered = state_store::recover(path).await;
        }

        self.selection = selector::select_streams(&mut self.source, &self.settings.patterns).await;
        if self.selection.is_empty() {
            return Err(IngestError::NothingSelected);
        }
        info!(streams = self.selection.len(), "stream selection complete");

        self.source
            .subscribe(&self.selection, self.recovered.as_ref())
            .await?;
        Ok(())
    }

    async fn stream(&mut self) {
        while !self.shutdown.is_triggered() {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.triggered() => break,
                next = self.source.next_packet() => next,
            };

            let packet = match next {
                Ok(Some(packet)) => packet,
                Ok(None) => {
                    self.connection_failed = true;
                    self.shutdown.force(COMPONENT, IngestError::ConnectionClosed);
                    break;
                }
                Err(e) => {
                    self.connection_failed = true;
                    self.shutdown.force(COMPONENT, IngestError::Client(e));
                    break;
                }
            };

            if let Err(e) = self.admit(packet).await {
                self.shutdown.force(COMPONENT, e);
                break;
            }
        }
    }

    /// Admission for one packet. Only a closed queue is an error; every
    /// other rejection drops the packet.
    async fn admit(&mut self, packet: WaveformPacket) -> Result<(), IngestError> {
        self.stats.received += 1;

        if !self.selection.contains(&packet.key) {
            warn!(stream = %packet.key, "skipping unselected stream");
            self.stats.unselected += 1;
            return Ok(());
        }

        let observation = self.staleness.observe(&packet, Utc::now());
        if observation.stale {
            if observation.transition == Transition::Unchanged {
                debug!(stream = %packet.key, "dropping stale packet");
            }
            self.stats.stale += 1;
            return Ok(());
        }

        let packet = match self.resampler.as_mut() {
            Some(resampler) => match resampler.apply(&packet) {
                Ok(resampled) => resampled,
                Err(e) => {
                    warn!(stream = %packet.key, error = %e, "can't resample, forwarding original");
                    self.stats.resample_failed += 1;
                    packet
                }
            },
            None => packet,
        };

        match self.queue.enqueue(packet, self.settings.enqueue_timeout).await {
            Ok(()) => {
                self.stats.enqueued += 1;
                Ok(())
            }
            Err(EnqueueError::Full(packet)) => {
                error!(stream = %packet.key, "queue is full, dropping packet");
                self.stats.queue_full += 1;
                Ok(())
            }
            Err(EnqueueError::Closed(_)) => Err(IngestError::QueueClosed),
        }
    }

    async fn finish(&mut self) {
        if let Err(e) = self.source.close().await {
            debug!(error = %e, "error closing SeedLink connection");
        }

        if let Some(path) = &self.settings.state_file {
            if self.connection_failed {
                warn!(
                    path = %path.display(),
                    "connection failed, keeping previous connection state"
                );
            } else {
                let state = self.source.connection_state(self.recovered.as_ref());
                state_store::save(path, &state).await;
            }
        }

        info!(
            received = self.stats.received,
            enqueued = self.stats.enqueued,
            dropped = self.stats.unselected + self.stats.stale + self.stats.queue_full,
            "producer stopped"
        );
    }
}
