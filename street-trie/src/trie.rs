//! # Trie
//!
//! An immutable radix trie decoded from a shard buffer. Nodes and edges are addressed by
//! index into flat `Vec`s, following the same arena-of-indices convention the rest of this
//! workspace uses for graph tiles (owned `Vec`s, no `Rc`/pointers).

use num_enum::{IntoPrimitive, TryFromPrimitive};
#[cfg(feature = "serde")]
use serde::Serialize;

/// Root node index; every trie has at least this one node.
pub const ROOT: usize = 0;

/// Four-bit categorical label attached to a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[repr(u8)]
pub enum Kind {
    Street = 0,
    Airport = 1,
    TrainStation = 2,
    BusStop = 3,
    FerryTerminal = 4,
    University = 5,
    Museum = 6,
    CivicBuilding = 7,
    Sight = 8,
    City = 9,
    Country = 10,
    Reserved11 = 11,
    Reserved12 = 12,
    Reserved13 = 13,
    Reserved14 = 14,
    Other = 15,
}

impl Default for Kind {
    fn default() -> Self {
        Kind::Street
    }
}

/// A single decoded location: a geographic point plus the indices of its containing
/// place-node and place-city table entries.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Location {
    pub lon: f64,
    pub lat: f64,
    pub place_node_idx: u32,
    pub place_city_idx: u32,
    pub kind: Kind,
    /// Log-bucketed population in thousands. Zero (and meaningless) before version 12.
    pub population_bucket: u8,
}

/// A trie value, before resolution: either an index into the shard's standalone locations
/// array (versions <= 5) or the location inlined directly at the node (versions >= 6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Indirect(u32),
    Inline(Location),
}

/// A single outgoing edge: the raw (original-cased) label text and the index of the child
/// node it leads to.
#[derive(Debug, Clone)]
pub struct Edge {
    pub label: String,
    pub child: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TrieNode {
    pub edges: Vec<Edge>,
    pub values: Vec<Value>,
}

/// An immutable radix trie. Node 0 is always the root.
#[derive(Debug, Clone, Default)]
pub struct Trie {
    pub nodes: Vec<TrieNode>,
}

impl Trie {
    pub fn node(&self, idx: usize) -> &TrieNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
