//! # Ranker
//!
//! Sorts matches by exactness, kind group, population, kind, and display text. Implemented
//! as a plain `sort_by` with a chain of tie-breaking keys, the same stable multi-criterion sort
//! idiom used anywhere ranking needs more than one comparison key.

use std::cmp::Ordering;

use crate::matcher::RawMatch;
use crate::trie::Kind;

/// A fully ranked, filter-applied result ready for the facade to hand back to the caller.
#[derive(Debug, Clone)]
pub struct RankedMatch {
    pub display: String,
    pub lon: f64,
    pub lat: f64,
    pub place_node_idx: u32,
    pub place_city_idx: u32,
    pub kind: Kind,
    pub population_bucket: u8,
    pub exact_match: bool,
}

/// Lower is "better" (sorts first). City (9) first, street (0) second, everything else last.
fn kind_group(kind: Kind) -> u8 {
    match kind {
        Kind::City => 0,
        Kind::Street => 1,
        _ => 2,
    }
}

/// Ranks `matches` against the normalized query `normalized_prefix`: exact matches first, then
/// by kind group, population (descending), kind (ascending), display length (ascending), then
/// locale-insensitive string order.
pub fn rank(matches: Vec<RawMatch>, normalized_prefix: &str) -> Vec<RankedMatch> {
    let mut ranked: Vec<RankedMatch> = matches
        .into_iter()
        .map(|m| {
            let crate::matcher::RawMatch { display, location } = m;
            let exact_match = crate::normalize::normalize(&display) == normalized_prefix;
            RankedMatch {
                display,
                lon: location.lon,
                lat: location.lat,
                place_node_idx: location.place_node_idx,
                place_city_idx: location.place_city_idx,
                kind: location.kind,
                population_bucket: location.population_bucket,
                exact_match,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        // 1. Exact matches before non-exact.
        b.exact_match
            .cmp(&a.exact_match)
            // 2. Lower kindGroup first.
            .then_with(|| kind_group(a.kind).cmp(&kind_group(b.kind)))
            // 3. Higher populationBucket first.
            .then_with(|| b.population_bucket.cmp(&a.population_bucket))
            // 4. Lower kind numeric value first.
            .then_with(|| u8::from(a.kind).cmp(&u8::from(b.kind)))
            // 5. Shorter display first.
            .then_with(|| a.display.chars().count().cmp(&b.display.chars().count()))
            // 6. Locale-insensitive string comparison.
            .then_with(|| locale_insensitive_cmp(&a.display, &b.display))
    });

    ranked
}

fn locale_insensitive_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}
