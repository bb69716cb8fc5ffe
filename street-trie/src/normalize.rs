//! # Normalizer
//!
//! The single canonical folding applied to both the query and every edge label before a
//! prefix comparison is attempted: NFKD decomposition, strip combining marks, lowercase,
//! then keep only letters and numbers.
//!
//! Uses `unicode-normalization` for NFKD and `unicode-categories` for the Mark-category strip,
//! rather than hand-rolling Unicode tables.

use unicode_categories::UnicodeCategories;
use unicode_normalization::UnicodeNormalization;

/// Folds `s` into the canonical matching form: NFKD, strip marks, lowercase, alnum-only.
///
/// Total and idempotent: `normalize(normalize(s)) == normalize(s)`. Returns the empty string
/// when `s` has no letters or digits (e.g. pure punctuation edge labels).
pub fn normalize(s: &str) -> String {
    s.nfkd()
        .filter(|c| !c.is_mark())
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_letter() || c.is_number())
        .collect()
}
