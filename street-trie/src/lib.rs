//! Offline geocoding shard lookup engine: the packed binary shard format (versions 3-12),
//! the decoder that turns a shard buffer into an in-memory LOUDS-encoded radix trie,
//! accent-and-punctuation-insensitive prefix matching with a best-partial-match fallback,
//! and the shard cache/staleness protocol that make concurrent keystrokes safe.
//!
//! No network service mediates a query: callers supply a [`transport::ShardTransport`] (and
//! optionally a [`transport::Gunzip`]) collaborator, and everything else — decoding, matching,
//! ranking, caching — runs locally.

pub mod manager;
pub mod matcher;
pub mod normalize;
pub mod primitives;
pub mod ranker;
pub mod session;
pub mod shard;
pub mod transport;
pub mod trie;

pub use manager::{split_query, ShardAcquireError};
pub use primitives::DecodeError;
pub use session::{LookupResult, LookupSession, LookupSessionConfig, ResultItem};
pub use shard::Shard;
pub use transport::{Flate2Gunzip, Gunzip, GunzipError, ShardTransport, TransportError};
pub use trie::{Kind, Location, Trie};
