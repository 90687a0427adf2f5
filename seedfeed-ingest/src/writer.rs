use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::FeedConfig;
use crate::error::{IngestError, StorageError};
use crate::influx::PointSink;
use crate::packet::{PointRecord, WaveformPacket};
use crate::queue::{Dequeued, PacketReceiver};
use crate::shutdown::ShutdownHandle;

const COMPONENT: &str = "writer";

#[derive(Debug, Clone)]
pub struct WriterSettings {
    pub measurement: Arc<str>,
    /// Networks to write; empty writes all.
    pub network_filter: Vec<String>,
    pub dequeue_timeout: Duration,
    /// Upper bound on the drain after a graceful stop.
    pub drain_timeout: Duration,
}

impl WriterSettings {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            measurement: Arc::from(config.influxdb.measurement.as_str()),
            network_filter: config.influxdb.network_filter.clone(),
            dequeue_timeout: config.pipeline.dequeue_timeout(),
            drain_timeout: config.pipeline.drain_timeout(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriterStats {
    pub packets: u64,
    pub points: u64,
    pub filtered: u64,
    pub empty: u64,
}

/// Consumer side of the pipeline: queue to storage.
pub struct StorageWriter<K> {
    queue: PacketReceiver,
    sink: K,
    settings: WriterSettings,
    shutdown: ShutdownHandle,
    stats: WriterStats,
}

impl<K: PointSink> StorageWriter<K> {
    pub fn new(
        queue: PacketReceiver,
        sink: K,
        settings: WriterSettings,
        shutdown: ShutdownHandle,
    ) -> Self {
        Self {
            queue,
            sink,
            settings,
            shutdown,
            stats: WriterStats::default(),
        }
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Write packets until shutdown. A failed write is fatal.
    pub async fn run(&mut self) {
        info!("storage writer started");

        while !self.shutdown.is_triggered() {
            match self.queue.dequeue(self.settings.dequeue_timeout).await {
                Dequeued::Packet(packet) => {
                    if let Err(e) = self.write_packet(packet).await {
                        self.shutdown.force(COMPONENT, IngestError::from(e));
                        break;
                    }
                }
                Dequeued::Idle => continue,
                Dequeued::Closed => {
                    if !self.shutdown.is_triggered() {
                        self.shutdown.force(COMPONENT, IngestError::QueueClosed);
                    }
                    break;
                }
            }
        }

        if !self.shutdown.is_fatal() {
            self.drain().await;
        }

        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "failed to close storage backend");
        }
        info!(
            packets = self.stats.packets,
            points = self.stats.points,
            "storage writer stopped"
        );
    }

    /// Write what the producer already queued. Stops once the producer is
    /// gone, nothing arrives within one dequeue timeout or the drain timeout
    /// runs out.
    async fn drain(&mut self) {
        let mut drained = 0u64;
        let deadline = Instant::now() + self.settings.drain_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(
                    drained,
                    left = self.queue.len(),
                    "drain timeout reached, dropping queued packets"
                );
                return;
            }
            let timeout = self.settings.dequeue_timeout.min(remaining);
            let Dequeued::Packet(packet) = self.queue.dequeue(timeout).await else {
                break;
            };
            if let Err(e) = self.write_packet(packet).await {
                self.shutdown.force(COMPONENT, IngestError::from(e));
                return;
            }
            drained += 1;
        }
        if drained > 0 {
            info!(packets = drained, "drained queue");
        }
    }

    async fn write_packet(&mut self, packet: WaveformPacket) -> Result<(), StorageError> {
        if !self.settings.network_filter.is_empty()
            && !self.settings.network_filter.contains(&packet.key.network)
        {
            debug!(stream = %packet.key, "network not in write filter, skipping");
            self.stats.filtered += 1;
            return Ok(());
        }

        let points = to_points(&packet, &self.settings.measurement);
        if points.is_empty() {
            warn!(stream = %packet.key, "no valid data to write");
            self.stats.empty += 1;
            return Ok(());
        }

        self.sink.write(&points).await?;
        self.stats.packets += 1;
        self.stats.points += points.len() as u64;
        info!(stream = %packet.key, samples = points.len(), "wrote samples");
        Ok(())
    }
}

/// One point per finite sample.
pub fn to_points(packet: &WaveformPacket, measurement: &Arc<str>) -> Vec<PointRecord> {
    let tags = Arc::new(packet.key.clone());
    packet
        .samples
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &value)| PointRecord {
            timestamp: packet.sample_time(i),
            tags: Arc::clone(&tags),
            measurement: Arc::clone(measurement),
            value,
        })
        .collect()
}
