//! # Lookup facade
//!
//! `LookupSession` is the single public entry point: `lookup(query) -> LookupResult`. State that
//! would otherwise live in module globals (the shard cache, the staleness counter, the kind
//! filter) is grouped into this one struct instead, built with a config struct the same way a
//! builder configures a client elsewhere in this workspace. The result type is a tagged enum of
//! outcomes rather than a single success/failure split, since a lookup has several
//! distinguishable non-error endings (empty query, query too short, stale, no shard).

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

#[cfg(feature = "serde")]
use serde::Serialize;

use crate::manager::{normalize_query, shard_key, ShardManager};
use crate::matcher::{search, MatchOptions};
use crate::ranker::{rank, RankedMatch};
use crate::transport::{Flate2Gunzip, Gunzip, ShardTransport};
use crate::trie::Kind;

/// Construction options for a [`LookupSession`].
#[derive(Debug, Clone)]
pub struct LookupSessionConfig {
    pub max_results: usize,
    pub shard_prefix_len: usize,
    pub shard_base: String,
    pub shard_suffix: String,
    pub shard_root: String,
    /// Optional bound on the number of distinct shards kept in cache at once. `None` (the
    /// default) is unbounded; eviction is never required for correctness, only memory.
    pub max_cached_shards: Option<NonZeroUsize>,
}

impl Default for LookupSessionConfig {
    fn default() -> Self {
        Self {
            max_results: 80,
            shard_prefix_len: 3,
            shard_base: "street_trie".to_string(),
            shard_suffix: ".packed.gz".to_string(),
            shard_root: String::new(),
            max_cached_shards: None,
        }
    }
}

/// A single ranked, display-ready result item.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ResultItem {
    pub display: String,
    pub lon: f64,
    pub lat: f64,
    pub place_node_idx: u32,
    pub place_city_idx: u32,
    pub kind: Kind,
    pub population_bucket: u8,
    pub place_label: String,
    pub exact_match: bool,
}

/// The tagged outcome of a [`LookupSession::lookup`] call.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "status", rename_all = "lowercase"))]
pub enum LookupResult {
    /// The normalized street query is empty.
    Empty { min_length: usize },
    /// The normalized street query is shorter than `shardPrefixLen`.
    Short { min_length: usize },
    /// Superseded by a newer lookup before this one's fetch resolved.
    Stale { shard_key: String },
    /// No shard exists at this prefix (also covers any other shard-acquire failure).
    Missing { shard_key: String },
    /// Success.
    Ready {
        shard_key: String,
        loaded: bool,
        locations_count: usize,
        results: Vec<ResultItem>,
    },
}

pub struct LookupSession<T, G = Flate2Gunzip> {
    config: LookupSessionConfig,
    manager: ShardManager<T, G>,
    lookup_id: AtomicU64,
    allowed_kinds: RwLock<Option<HashSet<Kind>>>,
}

impl<T: ShardTransport> LookupSession<T, Flate2Gunzip> {
    /// Builds a session using the bundled `flate2`-backed gunzip collaborator.
    pub fn new(config: LookupSessionConfig, transport: T) -> Self {
        Self::with_gunzip(config, transport, Flate2Gunzip)
    }
}

impl<T: ShardTransport, G: Gunzip> LookupSession<T, G> {
    pub fn with_gunzip(config: LookupSessionConfig, transport: T, gunzip: G) -> Self {
        let manager = ShardManager::with_capacity(
            transport,
            gunzip,
            config.shard_root.clone(),
            config.shard_base.clone(),
            config.shard_suffix.clone(),
            config.max_cached_shards,
        );
        Self {
            config,
            manager,
            lookup_id: AtomicU64::new(0),
            allowed_kinds: RwLock::new(None),
        }
    }

    /// Restricts results to the given kinds, or clears the filter when `kinds` is `None`.
    pub fn set_allowed_kinds(&self, kinds: Option<impl IntoIterator<Item = Kind>>) {
        let mut guard = self.allowed_kinds.write().expect("allowed_kinds lock poisoned");
        *guard = kinds.map(|k| k.into_iter().collect());
    }

    /// Looks up `query`, returning a tagged result. A monotonically increasing `lookupId` is
    /// bumped on entry and re-checked after the shard fetch; if a newer lookup has started in
    /// the meantime, this call returns `Stale` without touching the shared cache or mutating
    /// any UI-visible state. This keeps a slow keystroke's response from clobbering a faster,
    /// more recent one's.
    pub async fn lookup(&self, query: &str) -> LookupResult {
        let my_id = self.lookup_id.fetch_add(1, Ordering::SeqCst) + 1;

        let (normalized_street, normalized_city) = normalize_query(query);
        if normalized_street.is_empty() {
            return LookupResult::Empty {
                min_length: self.config.shard_prefix_len,
            };
        }
        if normalized_street.chars().count() < self.config.shard_prefix_len {
            return LookupResult::Short {
                min_length: self.config.shard_prefix_len,
            };
        }

        let Some(key) = shard_key(&normalized_street, self.config.shard_prefix_len) else {
            return LookupResult::Empty {
                min_length: self.config.shard_prefix_len,
            };
        };

        let acquired = self.manager.get_or_fetch(&key).await;

        if self.lookup_id.load(Ordering::SeqCst) != my_id {
            return LookupResult::Stale { shard_key: key };
        }

        let (shard, loaded) = match acquired {
            Ok(pair) => pair,
            Err(_) => return LookupResult::Missing { shard_key: key },
        };

        let allowed_kinds = self.allowed_kinds.read().expect("allowed_kinds lock poisoned").clone();
        let options = MatchOptions {
            city_filter: normalized_city.as_deref(),
            allowed_kinds: allowed_kinds.as_ref(),
            max_results: self.config.max_results,
        };

        let raw_matches = search(&shard, &normalized_street, &options);
        let mut ranked = rank(raw_matches, &normalized_street);
        ranked.truncate(self.config.max_results);

        let results = ranked
            .into_iter()
            .map(|m: RankedMatch| {
                let place_node = shard.place_node_table.get(m.place_node_idx as usize).map(String::as_str);
                let place_city = shard.place_city_table.get(m.place_city_idx as usize).map(String::as_str);
                let place_label = place_label(place_node, place_city);
                ResultItem {
                    display: m.display,
                    lon: m.lon,
                    lat: m.lat,
                    place_node_idx: m.place_node_idx,
                    place_city_idx: m.place_city_idx,
                    kind: m.kind,
                    population_bucket: m.population_bucket,
                    place_label,
                    exact_match: m.exact_match,
                }
            })
            .collect();

        LookupResult::Ready {
            shard_key: key,
            loaded,
            locations_count: shard.locations_count,
            results,
        }
    }
}

fn place_label(place_node: Option<&str>, place_city: Option<&str>) -> String {
    let place_node = place_node.unwrap_or("");
    let place_city = place_city.unwrap_or("");
    match (place_node.is_empty(), place_city.is_empty()) {
        (false, false) => format!("{place_node}, {place_city}"),
        (false, true) => place_node.to_string(),
        (true, false) => place_city.to_string(),
        (true, true) => "Unknown city".to_string(),
    }
}
