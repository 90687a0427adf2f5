//! miniSEED payloads of SeedLink frames.
//!
//! Waveform records are decoded and encoded by `miniseed-rs`. INFO replies
//! and log channels travel as ASCII-encoded v2 records, which that crate
//! reports as an unsupported encoding; their text is read from the header
//! fields here.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use miniseed_rs::{EncodingFormat, FormatVersion, MseedError, NanoTime};

pub use miniseed_rs::{MseedRecord, Samples};

use crate::error::{ProtocolError, Result};

/// Record length of SeedLink v3 payloads.
pub const RECORD_LEN: usize = 512;

/// SEED data encoding code for ASCII text.
const ASCII_ENCODING: u8 = 0;

// Offsets in a v2 record as laid out by `miniseed_rs::encode`: fixed header,
// then Blockette 1000 at 48, then data.
const NUM_SAMPLES: usize = 30;
const RATE_FACTORS: usize = 32;
const DATA_OFFSET: usize = 44;
const B1000_ENCODING: usize = 52;
const ASCII_DATA_START: usize = 56;

/// Text bytes one ASCII record can carry.
pub const ASCII_CAPACITY: usize = RECORD_LEN - ASCII_DATA_START;

pub fn decode(payload: &[u8]) -> Result<MseedRecord> {
    Ok(miniseed_rs::decode(payload)?)
}

pub fn encode(record: &MseedRecord) -> Result<Vec<u8>> {
    Ok(miniseed_rs::encode(record)?)
}

/// Whether a decode failure means the record holds text, not samples.
pub fn is_ascii(err: &ProtocolError) -> bool {
    matches!(
        err,
        ProtocolError::Miniseed(MseedError::UnsupportedEncoding(ASCII_ENCODING))
    )
}

/// Text of an ASCII-encoded record.
pub fn ascii_text(payload: &[u8]) -> Result<String> {
    match decode(payload) {
        Err(e) if is_ascii(&e) => {}
        Err(e) => return Err(e),
        Ok(record) => {
            return Err(ProtocolError::InvalidRecord(format!(
                "expected ASCII record, got {}",
                record.encoding
            )));
        }
    }

    let len = read_u16(payload, NUM_SAMPLES)?;
    let start = read_u16(payload, DATA_OFFSET)?;
    let text = payload.get(start..start + len).ok_or_else(|| {
        ProtocolError::InvalidRecord(format!(
            "{len} text bytes at offset {start} overrun the record"
        ))
    })?;
    Ok(String::from_utf8_lossy(text).into_owned())
}

/// Encode `text` as an ASCII record carrying the identity and start time
/// of `header`.
pub fn encode_ascii(header: &MseedRecord, text: &[u8]) -> Result<Vec<u8>> {
    if text.len() > ASCII_CAPACITY {
        return Err(ProtocolError::InvalidRecord(format!(
            "{} text bytes exceed the {ASCII_CAPACITY} a record holds",
            text.len()
        )));
    }
    let template = MseedRecord {
        format_version: FormatVersion::V2,
        encoding: EncodingFormat::Int32,
        samples: Samples::Int(Vec::new()),
        sample_rate: 1.0,
        timing_quality: None,
        record_length: RECORD_LEN as u32,
        ..header.clone()
    };
    let mut buf = encode(&template)?;

    buf[NUM_SAMPLES..NUM_SAMPLES + 2].copy_from_slice(&(text.len() as u16).to_be_bytes());
    // Text records have no sample rate.
    buf[RATE_FACTORS..RATE_FACTORS + 4].fill(0);
    buf[B1000_ENCODING] = ASCII_ENCODING;
    buf[ASCII_DATA_START..ASCII_DATA_START + text.len()].copy_from_slice(text);
    Ok(buf)
}

fn read_u16(payload: &[u8], at: usize) -> Result<usize> {
    match payload.get(at..at + 2) {
        Some(&[hi, lo]) => Ok(usize::from(u16::from_be_bytes([hi, lo]))),
        _ => Err(ProtocolError::InvalidRecord(format!(
            "record ends before header field at {at}"
        ))),
    }
}

/// Record start time in UTC. `None` for an impossible date.
pub fn start_time(record: &MseedRecord) -> Option<DateTime<Utc>> {
    let t = record.start_time;
    let date = NaiveDate::from_yo_opt(i32::from(t.year), u32::from(t.day))?;
    // chrono carries a leap second as second 59 with an extra second of nanos.
    let (second, nanos) = if t.second == 60 {
        (59, t.nanosecond + 1_000_000_000)
    } else {
        (u32::from(t.second), t.nanosecond)
    };
    let time = date.and_hms_nano_opt(u32::from(t.hour), u32::from(t.minute), second, nanos)?;
    Some(time.and_utc())
}

pub fn nano_time(t: DateTime<Utc>) -> NanoTime {
    NanoTime {
        year: u16::try_from(t.year()).unwrap_or_default(),
        day: t.ordinal() as u16,
        hour: t.hour() as u8,
        minute: t.minute() as u8,
        second: t.second() as u8,
        nanosecond: t.nanosecond().min(999_999_999),
    }
}

/// Samples widened to `f64`.
pub fn samples_f64(samples: &Samples) -> Vec<f64> {
    match samples {
        Samples::Int(v) => v.iter().map(|&s| f64::from(s)).collect(),
        Samples::Float(v) => v.iter().map(|&s| f64::from(s)).collect(),
        Samples::Double(v) => v.clone(),
    }
}
