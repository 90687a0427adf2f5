//! InfluxDB v2 storage backend.

use std::fmt::Write as _;
use std::future::Future;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use crate::config::InfluxConfig;
use crate::error::StorageError;
use crate::packet::PointRecord;

/// Destination of the writer's points. One `write` per packet.
pub trait PointSink: Send {
    fn write(
        &mut self,
        points: &[PointRecord],
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Render points as InfluxDB line protocol, one line per point, nanosecond
/// timestamps. Empty tag values are left out. Points whose timestamp does
/// not fit in `i64` nanoseconds are skipped.
pub fn encode_line_protocol(points: &[PointRecord]) -> String {
    let mut out = String::with_capacity(points.len() * 96);
    for point in points {
        let Some(ts) = point.timestamp.timestamp_nanos_opt() else {
            continue;
        };
        escape_into(&mut out, &point.measurement, &[',', ' ']);
        for (key, value) in point.tag_pairs() {
            if value.is_empty() {
                continue;
            }
            out.push(',');
            out.push_str(key);
            out.push('=');
            escape_into(&mut out, value, &[',', '=', ' ']);
        }
        let _ = writeln!(out, " value={} {ts}", point.value);
    }
    out
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

pub struct InfluxSink {
    client: Client,
    write_url: Url,
}

impl InfluxSink {
    pub fn new(config: &InfluxConfig) -> Result<Self, StorageError> {
        let write_url = Url::parse_with_params(
            &format!("{}/api/v2/write", config.url.trim_end_matches('/')),
            &[
                ("org", config.org.as_str()),
                ("bucket", config.bucket.as_str()),
                ("precision", "ns"),
            ],
        )
        .map_err(|e| {
            StorageError::InvalidConfig(format!("influxdb.url {:?}: {e}", config.url))
        })?;

        let mut headers = HeaderMap::new();
        let token = HeaderValue::from_str(&format!("Token {}", config.token)).map_err(|_| {
            StorageError::InvalidConfig("influxdb.token is not a valid header value".into())
        })?;
        headers.insert(AUTHORIZATION, token);
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .build()?;

        info!(
            url = %config.url,
            org = %config.org,
            bucket = %config.bucket,
            "InfluxDB writer ready"
        );
        Ok(Self { client, write_url })
    }
}

impl PointSink for InfluxSink {
    async fn write(&mut self, points: &[PointRecord]) -> Result<(), StorageError> {
        let body = encode_line_protocol(points);
        let response = self
            .client
            .post(self.write_url.clone())
            .body(body)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Rejected { status, body })
            }
        }
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        debug!("InfluxDB writer closed");
        Ok(())
    }
}

/// Logs points instead of writing them.
#[derive(Debug, Default)]
pub struct DryRunSink {
    writes: u64,
    points: u64,
}

impl DryRunSink {
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn points(&self) -> u64 {
        self.points
    }
}

impl PointSink for DryRunSink {
    async fn write(&mut self, points: &[PointRecord]) -> Result<(), StorageError> {
        self.writes += 1;
        self.points += points.len() as u64;
        if let Some(first) = points.first() {
            debug!(
                line = %encode_line_protocol(std::slice::from_ref(first)).trim_end(),
                points = points.len(),
                "dry run, not writing"
            );
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        info!(writes = self.writes, points = self.points, "dry run finished");
        Ok(())
    }
}

/// The configured backend.
pub enum StorageBackend {
    Influx(InfluxSink),
    DryRun(DryRunSink),
}

impl StorageBackend {
    pub fn from_config(config: &InfluxConfig) -> Result<Self, StorageError> {
        if config.dry_run {
            info!("dry run enabled, points will not be written");
            Ok(Self::DryRun(DryRunSink::default()))
        } else {
            InfluxSink::new(config).map(Self::Influx)
        }
    }
}

impl PointSink for StorageBackend {
    async fn write(&mut self, points: &[PointRecord]) -> Result<(), StorageError> {
        match self {
            Self::Influx(sink) => sink.write(points).await,
            Self::DryRun(sink) => sink.write(points).await,
        }
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        match self {
            Self::Influx(sink) => sink.close().await,
            Self::DryRun(sink) => sink.close().await,
        }
    }
}
