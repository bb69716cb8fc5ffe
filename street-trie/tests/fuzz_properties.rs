//! Fuzz-flavored property tests: build random tries with `rand` and assert the cap invariant
//! (P4), the kind-filter soundness invariant (P5), and that every resolved value's table
//! indices stay in range (the decode-totality invariant, P2, applied to hand-built tries rather
//! than byte-level decoding since there is no upstream fixture corpus to mutate).

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use street_trie::matcher::{search, MatchOptions};
use street_trie::trie::{Edge, Kind, Location, Trie, TrieNode, Value};
use street_trie::Shard;

const KINDS: &[Kind] = &[
    Kind::Street,
    Kind::Airport,
    Kind::TrainStation,
    Kind::BusStop,
    Kind::City,
    Kind::Other,
];

const ALPHABET: &[u8] = b"abcdefghij";

/// Builds a random trie of `node_count` nodes: each non-root node gets a single-character edge
/// from a random existing node (so the tree stays acyclic, matching the trie invariant that
/// edges always descend), and a random chance of holding 0-3 inline values.
fn random_shard(rng: &mut StdRng, node_count: usize, place_table_len: usize) -> Shard {
    let mut nodes = vec![TrieNode::default()];
    for i in 1..node_count {
        let parent = rng.random_range(0..i);
        let label = (ALPHABET[rng.random_range(0..ALPHABET.len())] as char).to_string();
        nodes[parent].edges.push(Edge { label, child: i });
        nodes.push(TrieNode::default());
    }

    let place_table_len_u32 = u32::try_from(place_table_len).expect("test table sizes fit in u32");
    for node in &mut nodes {
        let value_count = rng.random_range(0..=3);
        for _ in 0..value_count {
            let kind = KINDS[rng.random_range(0..KINDS.len())];
            node.values.push(Value::Inline(Location {
                lon: 0.0,
                lat: 0.0,
                place_node_idx: rng.random_range(0..place_table_len_u32),
                place_city_idx: rng.random_range(0..place_table_len_u32),
                kind,
                population_bucket: 0,
            }));
        }
    }

    Shard {
        place_node_table: (0..place_table_len).map(|i| format!("place-{i}")).collect(),
        place_city_table: (0..place_table_len).map(|i| format!("city-{i}")).collect(),
        trie: Trie { nodes },
        ..Shard::default()
    }
}

#[test]
fn p4_cap_holds_over_many_random_tries_and_queries() {
    let mut rng = StdRng::seed_from_u64(0xC0FF_EE42);
    for _ in 0..200 {
        let node_count = rng.random_range(1..60);
        let shard = random_shard(&mut rng, node_count, 5);
        let max_results = rng.random_range(1..20);
        let query_len = rng.random_range(0..3);
        let query: String = (0..query_len)
            .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
            .collect();

        let opts = MatchOptions {
            city_filter: None,
            allowed_kinds: None,
            max_results,
        };
        let results = search(&shard, &query, &opts);
        assert!(
            results.len() <= max_results,
            "query {query:?} over {node_count} nodes returned {} results, cap was {max_results}",
            results.len()
        );
    }
}

#[test]
fn p5_kind_filter_soundness_holds_over_many_random_tries() {
    let mut rng = StdRng::seed_from_u64(0x5EED_1234);
    for _ in 0..200 {
        let node_count = rng.random_range(1..40);
        let shard = random_shard(&mut rng, node_count, 4);
        let allowed: HashSet<Kind> = [KINDS[rng.random_range(0..KINDS.len())]].into_iter().collect();

        let opts = MatchOptions {
            city_filter: None,
            allowed_kinds: Some(&allowed),
            max_results: 80,
        };
        let results = search(&shard, "", &opts);
        for result in &results {
            assert!(
                allowed.contains(&result.location.kind),
                "result with kind {:?} escaped filter {:?}",
                result.location.kind,
                allowed
            );
        }
    }
}

#[test]
fn p2_resolved_values_index_in_range_over_many_random_tries() {
    let mut rng = StdRng::seed_from_u64(0xABCD_9876);
    for _ in 0..200 {
        let node_count = rng.random_range(1..50);
        let place_table_len = rng.random_range(1..8);
        let shard = random_shard(&mut rng, node_count, place_table_len);

        let opts = MatchOptions {
            city_filter: None,
            allowed_kinds: None,
            max_results: 10_000,
        };
        let results = search(&shard, "", &opts);
        for result in &results {
            assert!((result.location.place_node_idx as usize) < shard.place_node_table.len());
            assert!((result.location.place_city_idx as usize) < shard.place_city_table.len());
        }
    }
}
