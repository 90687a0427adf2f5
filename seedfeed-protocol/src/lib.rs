//! SeedLink v3 protocol types, commands, frame parsing and miniSEED decoding.
//!
//! This crate is the shared wire layer used by the client and by the
//! ingestion pipeline.

pub mod catalog;
pub mod command;
pub mod error;
pub mod frame;
pub mod mseed;
pub mod response;
pub mod sequence;

pub use catalog::{CatalogStation, CatalogStream};
pub use command::{Command, InfoLevel};
pub use error::{ProtocolError, Result};
pub use frame::RawFrame;
pub use mseed::{MseedRecord, Samples};
pub use response::Response;
pub use sequence::SequenceNumber;
