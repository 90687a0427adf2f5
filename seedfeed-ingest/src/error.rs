use std::path::PathBuf;

use seedfeed_client::ClientError;

/// Failures of the InfluxDB write path.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// InfluxDB answered with something other than 204 No Content.
    #[error("write rejected with status {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    #[error("configuration file not found: {0}")]
    MissingFile(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that end the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("SeedLink error: {0}")]
    Client(#[from] ClientError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No stream matched any configured pattern.
    #[error("no streams selected")]
    NothingSelected,

    /// The server closed the data connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// The hand-off queue's other end went away.
    #[error("hand-off queue closed")]
    QueueClosed,

    /// A worker task panicked or was aborted.
    #[error("{component} task failed: {reason}")]
    TaskFailed {
        component: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, IngestError>;
