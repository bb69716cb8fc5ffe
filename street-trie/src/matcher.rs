//! # Matcher
//!
//! Prefix-consuming traversal over a decoded [`Trie`], with a best-partial-match fallback and
//! kind/city filters. Implemented as an explicit stack rather than recursion, so a pathological
//! trie with deep or wide branching can't blow the call stack.

use std::collections::HashSet;

use crate::normalize::normalize;
use crate::shard::Shard;
use crate::trie::{Kind, Location, ROOT};

/// A single unranked match produced by the DFS, before ranking.
#[derive(Debug, Clone)]
pub struct RawMatch {
    pub display: String,
    pub location: Location,
}

/// Traversal state threaded through the explicit DFS stack.
struct Frame {
    node: usize,
    built: String,
    remaining: String,
    consumed: usize,
}

pub struct MatchOptions<'a> {
    pub city_filter: Option<&'a str>,
    pub allowed_kinds: Option<&'a HashSet<Kind>>,
    pub max_results: usize,
}

/// Runs the prefix-consuming DFS and returns up to `max_results` matches, applying the
/// best-partial-match fallback when the literal DFS finds nothing.
pub fn search(shard: &Shard, normalized_prefix: &str, options: &MatchOptions<'_>) -> Vec<RawMatch> {
    let mut results = Vec::new();
    let mut best = (ROOT, String::new(), 0usize);

    dfs(
        shard,
        normalized_prefix,
        options,
        &mut results,
        &mut best,
    );

    if results.is_empty() && best.2 > 0 {
        collect(shard, best.0, &best.1, options, &mut results);
    }

    results
}

/// The consuming part of the traversal: walks edges that match `remaining`, collecting at
/// nodes where the prefix has been fully consumed, and tracking the deepest partial match
/// seen along the way.
fn dfs(
    shard: &Shard,
    normalized_prefix: &str,
    options: &MatchOptions<'_>,
    results: &mut Vec<RawMatch>,
    best: &mut (usize, String, usize),
) {
    let mut stack = vec![Frame {
        node: ROOT,
        built: String::new(),
        remaining: normalized_prefix.to_string(),
        consumed: 0,
    }];

    while let Some(frame) = stack.pop() {
        if results.len() >= options.max_results {
            return;
        }

        if frame.consumed > best.2 {
            *best = (frame.node, frame.built.clone(), frame.consumed);
        }

        if frame.remaining.is_empty() {
            collect(shard, frame.node, &frame.built, options, results);
            continue;
        }

        let node = shard.trie.node(frame.node);
        // Push in reverse so the DFS still visits edges in file order (stack is LIFO).
        for edge in node.edges.iter().rev() {
            let normalized_label = normalize(&edge.label);
            let mut child_built = frame.built.clone();
            child_built.push_str(&edge.label);

            if normalized_label.is_empty() {
                stack.push(Frame {
                    node: edge.child,
                    built: child_built,
                    remaining: frame.remaining.clone(),
                    consumed: frame.consumed,
                });
            } else if let Some(rest) = frame.remaining.strip_prefix(normalized_label.as_str()) {
                stack.push(Frame {
                    node: edge.child,
                    built: child_built,
                    remaining: rest.to_string(),
                    consumed: frame.consumed + normalized_label.chars().count(),
                });
            } else if normalized_label.starts_with(frame.remaining.as_str()) {
                stack.push(Frame {
                    node: edge.child,
                    built: child_built,
                    remaining: String::new(),
                    consumed: frame.consumed + frame.remaining.chars().count(),
                });
            }
            // else: edge doesn't agree with the remaining prefix at all, skip it.
        }
    }
}

/// Pre-order enumerates values then descendants starting at `node`, stopping as soon as the
/// result cap is hit. Applies the kind/city filters at collection time.
fn collect(shard: &Shard, node: usize, built: &str, options: &MatchOptions<'_>, results: &mut Vec<RawMatch>) {
    let mut stack = vec![(node, built.to_string())];
    while let Some((node, built)) = stack.pop() {
        if results.len() >= options.max_results {
            return;
        }

        let trie_node = shard.trie.node(node);
        for value in &trie_node.values {
            if results.len() >= options.max_results {
                return;
            }
            let Some(location) = shard.resolve(value) else {
                continue;
            };
            if !passes_filters(shard, &location, options) {
                continue;
            }
            results.push(RawMatch {
                display: built.clone(),
                location,
            });
        }

        for edge in trie_node.edges.iter().rev() {
            let mut child_built = built.clone();
            child_built.push_str(&edge.label);
            stack.push((edge.child, child_built));
        }
    }
}

fn passes_filters(shard: &Shard, location: &Location, options: &MatchOptions<'_>) -> bool {
    if let Some(kinds) = options.allowed_kinds
        && !kinds.contains(&location.kind)
    {
        return false;
    }
    if let Some(filter) = options.city_filter
        && !filter.is_empty()
    {
        let place_node = shard
            .place_node_table
            .get(location.place_node_idx as usize)
            .map(String::as_str)
            .unwrap_or("");
        let place_city = shard
            .place_city_table
            .get(location.place_city_idx as usize)
            .map(String::as_str)
            .unwrap_or("");
        if !normalize(place_node).contains(filter) && !normalize(place_city).contains(filter) {
            return false;
        }
    }
    true
}
