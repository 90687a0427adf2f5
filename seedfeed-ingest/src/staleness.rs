use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::packet::{StreamKey, WaveformPacket};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// The stream just started being suppressed.
    Entered,
    /// The stream was suppressed and is fresh again.
    Recovered,
    Unchanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Drop the packet.
    pub stale: bool,
    pub transition: Transition,
}

/// Per-stream latency gate.
///
/// A stream starts out not suppressed. Transitions are logged once in each
/// direction; steady states are silent.
#[derive(Debug, Default)]
pub struct StalenessTracker {
    max_latency: Option<Duration>,
    suppressed: HashMap<StreamKey, bool>,
}

impl StalenessTracker {
    /// `None` disables the gate.
    pub fn new(max_latency: Option<Duration>) -> Self {
        Self {
            max_latency,
            suppressed: HashMap::new(),
        }
    }

    pub fn observe(&mut self, packet: &WaveformPacket, now: DateTime<Utc>) -> Observation {
        let Some(max) = self.max_latency else {
            return Observation {
                stale: false,
                transition: Transition::Unchanged,
            };
        };

        let latency = now.signed_duration_since(packet.end_time());
        // Packets stamped in the future count as fresh.
        let stale = latency.to_std().is_ok_and(|l| l > max);

        let suppressed = self.suppressed.entry(packet.key.clone()).or_insert(false);
        let transition = match (*suppressed, stale) {
            (false, true) => {
                info!(
                    stream = %packet.key,
                    latency_secs = latency.num_seconds(),
                    max_secs = max.as_secs(),
                    "latency too high, ignoring stream"
                );
                Transition::Entered
            }
            (true, false) => {
                info!(stream = %packet.key, "latency OK again");
                Transition::Recovered
            }
            _ => Transition::Unchanged,
        };
        *suppressed = stale;

        Observation { stale, transition }
    }

    pub fn is_suppressed(&self, key: &StreamKey) -> bool {
        self.suppressed.get(key).copied().unwrap_or(false)
    }
}
