//! Layered configuration.
//!
//! Values come from, in increasing priority:
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. environment variables prefixed `SEEDFEED_`, with `__` between nested
//!    keys (`SEEDFEED_INFLUXDB__TOKEN=...`, `SEEDFEED_PIPELINE__RESAMPLE_RATE=0`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "SEEDFEED_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub seedlink: SeedLinkConfig,
    pub influxdb: InfluxConfig,
    pub pipeline: PipelineConfig,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedLinkConfig {
    /// `host:port` of the SeedLink server.
    pub server: String,
    /// Stream patterns as `[network, station, channel, location]` regexes.
    pub streams: Vec<[String; 4]>,
    pub state_file: PathBuf,
    /// Resume from `state_file` at startup.
    pub recover: bool,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated on the data connection.
    pub network_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    pub measurement: String,
    /// Networks written to storage; empty writes every network.
    pub network_filter: Vec<String>,
    pub request_timeout_secs: u64,
    /// Build points but log them instead of writing.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub enqueue_timeout_ms: u64,
    pub dequeue_timeout_ms: u64,
    /// Longest the writer keeps draining the queue after a graceful stop.
    pub drain_timeout_secs: u64,
    /// Packets older than this are dropped; 0 disables the check.
    pub max_latency_secs: u64,
    /// Target sample rate in Hz; 0 disables resampling.
    pub resample_rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            seedlink: SeedLinkConfig::default(),
            influxdb: InfluxConfig::default(),
            pipeline: PipelineConfig::default(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl Default for SeedLinkConfig {
    fn default() -> Self {
        Self {
            server: "localhost:18000".into(),
            streams: vec![["AM".into(), ".*".into(), "SHZ".into(), ".*".into()]],
            state_file: PathBuf::from("statefile.sl"),
            recover: true,
            connect_timeout_secs: 10,
            network_timeout_secs: 120,
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".into(),
            token: String::new(),
            org: String::new(),
            bucket: "seedlinksmart".into(),
            measurement: "waveform".into(),
            network_filter: vec!["AM".into()],
            request_timeout_secs: 30,
            dry_run: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1_000_000,
            enqueue_timeout_ms: 15_000,
            dequeue_timeout_ms: 5_000,
            drain_timeout_secs: 30,
            max_latency_secs: 1_800,
            resample_rate: 10.0,
        }
    }
}

impl FeedConfig {
    /// The provider stack, before extraction.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(FeedConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate. An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path
            && !path.exists()
        {
            return Err(ConfigError::MissingFile(path.to_path_buf()));
        }
        Self::from_figment(Self::figment(path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.seedlink.server.trim().is_empty() {
            return invalid("seedlink.server must not be empty".into());
        }
        if self.seedlink.connect_timeout_secs == 0 || self.seedlink.network_timeout_secs == 0 {
            return invalid("seedlink timeouts must be positive".into());
        }
        if self.influxdb.measurement.trim().is_empty() {
            return invalid("influxdb.measurement must not be empty".into());
        }
        if !self.influxdb.dry_run && self.influxdb.bucket.trim().is_empty() {
            return invalid("influxdb.bucket must not be empty".into());
        }
        if self.influxdb.request_timeout_secs == 0 {
            return invalid("influxdb.request_timeout_secs must be positive".into());
        }
        if self.pipeline.queue_capacity == 0 {
            return invalid("pipeline.queue_capacity must be positive".into());
        }
        if self.pipeline.enqueue_timeout_ms == 0 || self.pipeline.dequeue_timeout_ms == 0 {
            return invalid("pipeline queue timeouts must be positive".into());
        }
        if !self.pipeline.resample_rate.is_finite() || self.pipeline.resample_rate < 0.0 {
            return invalid(format!(
                "pipeline.resample_rate must be >= 0, got {}",
                self.pipeline.resample_rate
            ));
        }
        Ok(())
    }
}

impl SeedLinkConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }
}

impl InfluxConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PipelineConfig {
    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn max_latency(&self) -> Option<Duration> {
        (self.max_latency_secs > 0).then(|| Duration::from_secs(self.max_latency_secs))
    }

    pub fn resample_rate(&self) -> Option<f64> {
        (self.resample_rate > 0.0).then_some(self.resample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = FeedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.seedlink.server, "localhost:18000");
        assert_eq!(config.influxdb.bucket, "seedlinksmart");
        assert_eq!(config.pipeline.queue_capacity, 1_000_000);
        assert_eq!(config.pipeline.max_latency(), Some(Duration::from_secs(1800)));
        assert_eq!(config.pipeline.resample_rate(), Some(10.0));
        assert_eq!(config.pipeline.drain_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn toml_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(FeedConfig::default())).merge(
            Toml::string(
                r#"
                log_format = "json"

                [seedlink]
                server = "rs.local:18000"
                streams = [["AM", "R.*", "EH.", ""], ["GE", ".*", "BHZ", ".*"]]
                recover = false

                [influxdb]
                network_filter = []
                dry_run = true

                [pipeline]
                max_latency_secs = 0
                resample_rate = 0.0
                drain_timeout_secs = 5
                "#,
            ),
        );
        let config = FeedConfig::from_figment(figment).unwrap();

        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.seedlink.server, "rs.local:18000");
        assert_eq!(config.seedlink.streams.len(), 2);
        assert_eq!(config.seedlink.streams[0][1], "R.*");
        assert!(!config.seedlink.recover);
        assert_eq!(config.seedlink.state_file, PathBuf::from("statefile.sl"));
        assert!(config.influxdb.network_filter.is_empty());
        assert!(config.influxdb.dry_run);
        assert_eq!(config.influxdb.measurement, "waveform");
        assert_eq!(config.pipeline.max_latency(), None);
        assert_eq!(config.pipeline.resample_rate(), None);
        assert_eq!(config.pipeline.drain_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[influxdb]\nbucket = \"quakes\"").unwrap();

        let config = FeedConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.influxdb.bucket, "quakes");
    }

    #[test]
    fn load_missing_file_fails() {
        let err = FeedConfig::load(Some(Path::new("/nonexistent/seedfeed.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFile(_)));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = FeedConfig::default();
        config.pipeline.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.pipeline.resample_rate = -1.0;
        assert!(config.validate().is_err());

        let mut config = FeedConfig::default();
        config.influxdb.measurement = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_type_is_load_error() {
        let figment = Figment::from(Serialized::defaults(FeedConfig::default()))
            .merge(Toml::string("[pipeline]\nqueue_capacity = \"lots\""));
        assert!(matches!(
            FeedConfig::from_figment(figment).unwrap_err(),
            ConfigError::Load(_)
        ));
    }
}
