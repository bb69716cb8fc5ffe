//! End-to-end exercise of `LookupSession::lookup` against an in-memory fake transport, covering
//! the Empty/Short/Missing/Ready outcomes and the staleness protocol (two rapid keystrokes
//! landing on the same shard, the second superseding the first before its fetch resolves).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use integer_encoding::VarInt;
use tokio::sync::Notify;

use street_trie::{LookupResult, LookupSession, LookupSessionConfig, ShardTransport, TransportError};

fn varint(value: u32) -> Vec<u8> {
    let mut out = [0u8; 10];
    let written = value.encode_var(&mut out);
    out[..written].to_vec()
}

/// Builds a version-9 shard with a single place node "Springfield", a root edge "main" whose
/// child holds one inline street value.
fn minimal_shard_bytes() -> Vec<u8> {
    let mut bytes = b"STRI".to_vec();
    bytes.push(9);
    bytes.extend_from_slice(&1000u32.to_le_bytes()[..3]); // scale

    bytes.extend(varint(1));
    bytes.extend(varint(0));
    bytes.extend(varint(11));
    bytes.extend_from_slice(b"Springfield");

    // place city table: 1 entry, empty string (so cityIdx=0 below is in range)
    bytes.extend(varint(1));
    bytes.extend(varint(0)); // prefixLen
    bytes.extend(varint(0)); // suffixLen

    bytes.extend(varint(2)); // node count

    bytes.extend(varint(3)); // LOUDS bit count
    bytes.push(0b0000_0001); // bits: [1, 0, 0]

    bytes.extend(varint(1)); // edge count
    bytes.extend(varint(4));
    bytes.extend_from_slice(b"main");

    bytes.extend(varint(0)); // root: 0 values
    bytes.extend(varint(1)); // child: 1 value
    bytes.extend_from_slice(&1000i32.to_le_bytes()[..3]);
    bytes.extend_from_slice(&2000i32.to_le_bytes()[..3]);
    bytes.extend(varint(0));
    bytes.extend(varint(0));

    bytes
}

struct FakeTransport {
    shards: HashMap<String, Vec<u8>>,
    gate: Option<Arc<Notify>>,
    fetches: Arc<AtomicUsize>,
}

#[async_trait]
impl ShardTransport for FakeTransport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.shards
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::NotFound { url: url.to_string() })
    }
}

fn config() -> LookupSessionConfig {
    LookupSessionConfig {
        shard_root: String::new(),
        ..LookupSessionConfig::default()
    }
}

#[tokio::test]
async fn empty_query_short_circuits() {
    let transport = FakeTransport {
        shards: HashMap::new(),
        gate: None,
        fetches: Arc::new(AtomicUsize::new(0)),
    };
    let session = LookupSession::new(config(), transport);
    let result = session.lookup("   ").await;
    assert!(matches!(result, LookupResult::Empty { .. }));
}

#[tokio::test]
async fn query_shorter_than_shard_prefix_is_short() {
    let transport = FakeTransport {
        shards: HashMap::new(),
        gate: None,
        fetches: Arc::new(AtomicUsize::new(0)),
    };
    let session = LookupSession::new(config(), transport);
    let result = session.lookup("ma").await;
    assert!(matches!(result, LookupResult::Short { .. }));
}

#[tokio::test]
async fn missing_shard_reports_missing() {
    let transport = FakeTransport {
        shards: HashMap::new(),
        gate: None,
        fetches: Arc::new(AtomicUsize::new(0)),
    };
    let session = LookupSession::new(config(), transport);
    let result = session.lookup("main street").await;
    assert!(matches!(result, LookupResult::Missing { shard_key } if shard_key == "mai"));
}

#[tokio::test]
async fn ready_lookup_returns_ranked_results_and_caches_the_shard() {
    let mut shards = HashMap::new();
    shards.insert("/street_trie.shard_mai.packed.gz".to_string(), minimal_shard_bytes());
    let fetches = Arc::new(AtomicUsize::new(0));
    let transport = FakeTransport {
        shards,
        gate: None,
        fetches: fetches.clone(),
    };
    let session = LookupSession::new(config(), transport);

    let first = session.lookup("main").await;
    let LookupResult::Ready {
        shard_key,
        loaded,
        locations_count,
        results,
    } = first
    else {
        panic!("expected Ready, got {first:?}");
    };
    assert_eq!(shard_key, "mai");
    assert!(loaded);
    assert_eq!(locations_count, 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].display, "main");
    assert_eq!(fetches.load(Ordering::SeqCst), 1);

    let second = session.lookup("main").await;
    let LookupResult::Ready { loaded, .. } = second else {
        panic!("expected Ready, got {second:?}");
    };
    assert!(!loaded, "second lookup should hit the positive cache");
    assert_eq!(fetches.load(Ordering::SeqCst), 1, "second lookup must not refetch");
}

/// Two rapid keystrokes on the same shard: the first lookup's fetch is still pending when the
/// second keystroke starts a new lookup, so the first must not clobber caller-visible state
/// with a stale response. Drives a single-threaded runtime so task scheduling is deterministic:
/// the in-flight fetch only yields at the `Notify`, so the second lookup is guaranteed to have
/// already bumped the shared lookup id by the time the first one resumes.
#[tokio::test]
async fn superseded_lookup_reports_stale() {
    let mut shards = HashMap::new();
    shards.insert("/street_trie.shard_mai.packed.gz".to_string(), minimal_shard_bytes());
    let gate = Arc::new(Notify::new());
    let transport = FakeTransport {
        shards,
        gate: Some(gate.clone()),
        fetches: Arc::new(AtomicUsize::new(0)),
    };
    let session = Arc::new(LookupSession::new(config(), transport));

    let first_session = session.clone();
    let first = tokio::spawn(async move { first_session.lookup("main").await });

    // Let the first lookup run until it blocks on the transport gate.
    tokio::task::yield_now().await;

    let second_session = session.clone();
    let second = tokio::spawn(async move { second_session.lookup("main").await });

    // Let the second lookup run up through its lookup-id bump, where it blocks behind the
    // first lookup's per-shard lock.
    tokio::task::yield_now().await;

    gate.notify_one();

    let first_result = first.await.unwrap();
    let second_result = second.await.unwrap();

    assert!(
        matches!(first_result, LookupResult::Stale { .. }),
        "expected Stale, got {first_result:?}"
    );
    assert!(
        matches!(second_result, LookupResult::Ready { .. }),
        "expected Ready, got {second_result:?}"
    );
}
