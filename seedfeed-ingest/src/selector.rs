//! Stream selection against the server catalog.
//!
//! A pattern is four regular expressions matched against network, station,
//! channel and location, in that order. Each expression is anchored at the
//! start of the field, so `SH.` matches `SHZ` but not `ESHZ`.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use seedfeed_protocol::CatalogStation;
use tracing::{error, info, warn};

use crate::packet::StreamKey;
use crate::source::StreamSource;

/// Compiled `[network, station, channel, location]` pattern.
#[derive(Debug, Clone)]
pub struct StreamPattern {
    network: Regex,
    station: Regex,
    channel: Regex,
    location: Regex,
}

impl StreamPattern {
    pub fn compile(fields: &[String; 4]) -> Result<Self, regex::Error> {
        let anchored = |p: &str| Regex::new(&format!("^(?:{p})"));
        Ok(Self {
            network: anchored(&fields[0])?,
            station: anchored(&fields[1])?,
            channel: anchored(&fields[2])?,
            location: anchored(&fields[3])?,
        })
    }

    /// Every catalog stream this pattern matches.
    pub fn match_catalog(&self, catalog: &[CatalogStation]) -> Vec<StreamKey> {
        catalog
            .iter()
            .filter(|st| self.network.is_match(&st.network) && self.station.is_match(&st.name))
            .flat_map(|st| {
                st.streams
                    .iter()
                    .filter(|s| {
                        self.channel.is_match(&s.seedname) && self.location.is_match(&s.location)
                    })
                    .map(move |s| StreamKey::new(&st.network, &st.name, &s.location, &s.seedname))
            })
            .collect()
    }
}

/// Streams the producer subscribed to and admits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectedStreamSet {
    keys: HashSet<StreamKey>,
}

impl SelectedStreamSet {
    pub fn insert(&mut self, key: StreamKey) -> bool {
        self.keys.insert(key)
    }

    pub fn contains(&self, key: &StreamKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamKey> {
        self.keys.iter()
    }

    /// Keys grouped per `(network, station)`, both levels sorted.
    pub fn by_station(&self) -> BTreeMap<(String, String), Vec<StreamKey>> {
        let mut groups: BTreeMap<(String, String), Vec<StreamKey>> = BTreeMap::new();
        for key in &self.keys {
            groups
                .entry((key.network.clone(), key.station.clone()))
                .or_default()
                .push(key.clone());
        }
        for keys in groups.values_mut() {
            keys.sort();
        }
        groups
    }
}

impl FromIterator<StreamKey> for SelectedStreamSet {
    fn from_iter<I: IntoIterator<Item = StreamKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Resolve `patterns` against the source's catalog.
///
/// Bad patterns and catalog failures are logged and contribute nothing. The
/// catalog is fetched at most once when it succeeds.
pub async fn select_streams<S: StreamSource>(
    source: &mut S,
    patterns: &[[String; 4]],
) -> SelectedStreamSet {
    let mut selected = SelectedStreamSet::default();
    let mut catalog: Option<Vec<CatalogStation>> = None;

    for fields in patterns {
        let pattern = match StreamPattern::compile(fields) {
            Ok(p) => p,
            Err(e) => {
                error!(pattern = ?fields, error = %e, "invalid stream pattern, skipping");
                continue;
            }
        };

        if catalog.is_none() {
            match source.catalog().await {
                Ok(stations) => catalog = Some(stations),
                Err(e) => {
                    error!(pattern = ?fields, error = %e, "failed to fetch stream catalog");
                    continue;
                }
            }
        }
        let Some(stations) = catalog.as_deref() else {
            continue;
        };

        let matched = pattern.match_catalog(stations);
        if matched.is_empty() {
            warn!(pattern = ?fields, "pattern matched no streams");
        }
        for key in matched {
            info!(stream = %key, "selected stream");
            selected.insert(key);
        }
    }

    selected
}
