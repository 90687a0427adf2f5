use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use seedfeed_protocol::{MseedRecord, mseed};

/// Identifies one logical channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub network: String,
    pub station: String,
    /// May be empty.
    pub location: String,
    pub channel: String,
}

impl StreamKey {
    pub fn new(
        network: impl Into<String>,
        station: impl Into<String>,
        location: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            network: network.into(),
            station: station.into(),
            location: location.into(),
            channel: channel.into(),
        }
    }

    /// SeedLink `SELECT` selector for this stream: `LLCCC`, with `--` for an
    /// empty location.
    pub fn selector(&self) -> String {
        if self.location.is_empty() {
            format!("--{}", self.channel)
        } else {
            format!("{}{}", self.location, self.channel)
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// One decoded record's worth of samples for a single stream.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformPacket {
    pub key: StreamKey,
    pub start: DateTime<Utc>,
    /// Seconds between samples.
    pub delta: f64,
    pub samples: Vec<f64>,
}

impl WaveformPacket {
    pub fn new(key: StreamKey, start: DateTime<Utc>, delta: f64, samples: Vec<f64>) -> Self {
        Self {
            key,
            start,
            delta,
            samples,
        }
    }

    /// Build from a decoded record. Empty records, records without a usable
    /// sample rate and records with an impossible start date yield `None`.
    pub fn from_record(record: &MseedRecord) -> Option<Self> {
        let rate = record.sample_rate;
        if !rate.is_finite() || rate <= 0.0 || record.samples.is_empty() {
            return None;
        }
        Some(Self {
            key: StreamKey::new(
                &record.network,
                &record.station,
                &record.location,
                &record.channel,
            ),
            start: mseed::start_time(record)?,
            delta: 1.0 / rate,
            samples: mseed::samples_f64(&record.samples),
        })
    }

    pub fn sample_rate(&self) -> f64 {
        1.0 / self.delta
    }

    /// Timestamp of sample `i`, rounded to the nanosecond.
    pub fn sample_time(&self, i: usize) -> DateTime<Utc> {
        self.start + Duration::nanoseconds((i as f64 * self.delta * 1e9).round() as i64)
    }

    /// Timestamp of the last sample.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.sample_time(self.samples.len().saturating_sub(1))
    }
}

/// One sample bound for storage.
#[derive(Clone, Debug, PartialEq)]
pub struct PointRecord {
    pub timestamp: DateTime<Utc>,
    pub tags: Arc<StreamKey>,
    pub measurement: Arc<str>,
    pub value: f64,
}

impl PointRecord {
    /// Tag set in key order.
    pub fn tag_pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("channel", &self.tags.channel),
            ("location", &self.tags.location),
            ("network", &self.tags.network),
            ("station", &self.tags.station),
        ]
    }
}
