//! SeedLink to InfluxDB waveform ingestion.
//!
//! A producer task reads miniSEED records from a SeedLink server, keeps the
//! selected and fresh ones, optionally resamples them and hands them to a
//! writer task over a bounded queue. The writer turns each packet into
//! InfluxDB points and writes them in one request. Either task can stop the
//! whole pipeline through a shared [`ShutdownHandle`].

pub mod config;
pub mod error;
pub mod influx;
pub mod packet;
pub mod producer;
pub mod queue;
pub mod resample;
pub mod selector;
pub mod shutdown;
pub mod source;
pub mod staleness;
pub mod state_store;
pub mod supervisor;
pub mod writer;

pub use config::{FeedConfig, LogFormat};
pub use error::{ConfigError, IngestError, Result, StorageError};
pub use influx::{PointSink, StorageBackend};
pub use packet::{PointRecord, StreamKey, WaveformPacket};
pub use producer::{Producer, ProducerSettings};
pub use queue::{Dequeued, EnqueueError, PacketReceiver, PacketSender, handoff_queue};
pub use selector::{SelectedStreamSet, StreamPattern};
pub use shutdown::{ShutdownCause, ShutdownHandle};
pub use source::{SeedLinkSource, StreamSource};
pub use writer::{StorageWriter, WriterSettings};
