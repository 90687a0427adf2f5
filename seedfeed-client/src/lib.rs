//! Async SeedLink v3 client.
//!
//! Connects to a SeedLink server, reads its stream catalog, subscribes to
//! individual channels and receives miniSEED records in real time. The
//! per-station sequence numbers seen so far can be exported as a
//! [`ConnectionState`] and used to resume a later connection.

pub mod client;
mod connection;
pub mod cursor;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod state;

pub use client::SeedLinkClient;
pub use cursor::ConnectionState;
pub use error::{ClientError, Result};
pub use state::{ClientConfig, ClientState, OwnedFrame, ServerInfo, StationKey};
