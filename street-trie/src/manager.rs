//! # Shard manager
//!
//! Shard key derivation, the positive cache, in-flight fetch dedupe, and the gunzip glue. A
//! per-key lock table serializes concurrent fetches of the same shard so only one caller ever
//! hits the transport for a given key; everyone else waits on the lock and then observes the
//! now-populated cache. The lock guards an async fetch, so it's a `tokio::sync::Mutex` rather
//! than a `std::sync::Mutex`.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use lru::LruCache;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::normalize::normalize;
use crate::primitives::DecodeError;
use crate::shard::{self, Shard};
use crate::transport::{Gunzip, ShardTransport, TransportError};

#[derive(Debug, Error, Clone)]
pub enum ShardAcquireError {
    #[error("shard not found: {0}")]
    NotFound(#[from] TransportError),
    #[error("shard decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("gunzip failure: {0}")]
    Gunzip(#[from] crate::transport::GunzipError),
}

/// A keyed lock: each distinct `K` gets its own mutex, lazily created on first use.
struct LockTable<K>(DashMap<K, Arc<AsyncMutex<()>>>);

impl<K: std::hash::Hash + Eq + Clone> LockTable<K> {
    fn new() -> Self {
        Self(DashMap::new())
    }

    fn lock_for(&self, k: K) -> Arc<AsyncMutex<()>> {
        self.0.entry(k).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }
}

/// Derives the fixed-length shard key for a normalized query prefix. Returns `None` when the
/// normalized query is empty.
pub fn shard_key(normalized_query: &str, shard_prefix_len: usize) -> Option<String> {
    if normalized_query.is_empty() {
        return None;
    }
    let mut key: String = normalized_query
        .chars()
        .take(shard_prefix_len)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
        .collect();
    while key.chars().count() < shard_prefix_len {
        key.push('_');
    }
    Some(key)
}

pub struct ShardManager<T, G> {
    transport: T,
    gunzip: G,
    shard_root: String,
    shard_base: String,
    shard_suffix: String,
    cache: DashMap<String, Arc<Shard>>,
    locks: LockTable<String>,
    /// Optional LRU bound on the positive cache. Eviction is never required for correctness,
    /// only to cap memory; `None` means unbounded, and we skip the recency bookkeeping
    /// entirely rather than tracking it for nothing.
    capacity: Option<NonZeroUsize>,
    lru_order: Mutex<LruCache<String, ()>>,
}

impl<T: ShardTransport, G: Gunzip> ShardManager<T, G> {
    pub fn new(transport: T, gunzip: G, shard_root: String, shard_base: String, shard_suffix: String) -> Self {
        Self::with_capacity(transport, gunzip, shard_root, shard_base, shard_suffix, None)
    }

    /// Same as [`ShardManager::new`], but bounds the positive cache to at most `capacity`
    /// shards, evicting the least-recently-used entry once exceeded.
    pub fn with_capacity(
        transport: T,
        gunzip: G,
        shard_root: String,
        shard_base: String,
        shard_suffix: String,
        capacity: Option<NonZeroUsize>,
    ) -> Self {
        let order_capacity = capacity.unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is nonzero"));
        Self {
            transport,
            gunzip,
            shard_root,
            shard_base,
            shard_suffix,
            cache: DashMap::new(),
            locks: LockTable::new(),
            capacity,
            lru_order: Mutex::new(LruCache::new(order_capacity)),
        }
    }

    fn touch(&self, key: &str) {
        let Some(capacity) = self.capacity else { return };
        let mut order = self.lru_order.lock().expect("lru_order lock poisoned");
        order.put(key.to_string(), ());
        while order.len() > capacity.get() {
            if let Some((evicted, _)) = order.pop_lru() {
                self.cache.remove(&evicted);
            } else {
                break;
            }
        }
    }

    fn fetch_url(&self, key: &str) -> String {
        format!(
            "{}/{}.shard_{}{}",
            self.shard_root, self.shard_base, key, self.shard_suffix
        )
    }

    /// Gets the shard for `key`, fetching and decoding it on a cache miss. Returns
    /// `(shard, loaded)` where `loaded` is true iff this call triggered a new fetch.
    ///
    /// Concurrent callers for the same key serialize on a per-key lock; the first one
    /// through performs the fetch, the rest observe the now-populated cache and return
    /// immediately rather than duplicating the fetch.
    ///
    /// # Errors
    ///
    /// Returns [`ShardAcquireError`] if the transport can't find or fetch the shard, gunzip
    /// fails, or the fetched bytes fail to decode. None of these enter the positive cache, so
    /// the next lookup simply retries.
    pub async fn get_or_fetch(&self, key: &str) -> Result<(Arc<Shard>, bool), ShardAcquireError> {
        if let Some(shard) = self.cache.get(key) {
            self.touch(key);
            return Ok((shard.clone(), false));
        }

        let lock = self.locks.lock_for(key.to_string());
        let _guard = lock.lock().await;

        // Re-check: another caller may have populated the cache while we waited for the lock.
        if let Some(shard) = self.cache.get(key) {
            self.touch(key);
            return Ok((shard.clone(), false));
        }

        let url = self.fetch_url(key);
        let result = self.fetch_and_decode(&url).await;
        match result {
            Ok(shard) => {
                let shard = Arc::new(shard);
                // A concurrent populate can't happen under the lock, but would be a harmless
                // overwrite with the same value if it somehow did.
                self.cache.insert(key.to_string(), shard.clone());
                self.touch(key);
                Ok((shard, true))
            }
            Err(e) => {
                debug!(key, error = %e, "shard acquire failed; not entering the positive cache");
                Err(e)
            }
        }
    }

    async fn fetch_and_decode(&self, url: &str) -> Result<Shard, ShardAcquireError> {
        let bytes = self.transport.fetch(url).await?;
        let raw = if shard::is_gzip(&bytes) {
            self.gunzip.gunzip(&bytes)?
        } else {
            bytes
        };
        Ok(shard::decode(&raw)?)
    }
}

/// Splits a lookup query into its street-query and optional city-filter halves. A query may
/// contain a single comma: everything before it is the street query, everything after is the
/// city filter.
pub fn split_query(query: &str) -> (&str, Option<&str>) {
    match query.split_once(',') {
        Some((street, city)) => (street.trim(), Some(city.trim())),
        None => (query.trim(), None),
    }
}

/// Normalizes both halves of a query for matching/shard-key purposes.
pub fn normalize_query(query: &str) -> (String, Option<String>) {
    let (street, city) = split_query(query);
    (normalize(street), city.map(normalize))
}
