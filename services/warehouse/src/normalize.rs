//! Natural-key normalization.
//!
//! Every set difference and join between staging and the dimensions goes
//! through these functions, so a title or name compares the same way in the
//! dimension loader, the bridge loader and the fact loader.

/// Placeholder OMDb uses for absent attributes
pub const NOT_AVAILABLE: &str = "N/A";

/// Delimiter for multi-valued attributes (Genre, Director, Writer, Actors)
pub const MULTI_VALUE_DELIMITER: char = ',';

/// Cleaned display form stored in dimensions.
///
/// Trims, strips `.`, and collapses whitespace runs. Returns `None` for
/// empty input or the `N/A` placeholder.
pub fn clean_label(raw: &str) -> Option<String> {
    let without_dots = raw.replace('.', "");
    let cleaned = without_dots.split_whitespace().collect::<Vec<_>>().join(" ");

    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case(NOT_AVAILABLE) {
        None
    } else {
        Some(cleaned)
    }
}

/// Comparison key: the cleaned label, case-folded.
pub fn match_key(raw: &str) -> Option<String> {
    clean_label(raw).map(|label| label.to_lowercase())
}

/// Split a delimited multi-valued attribute into cleaned tokens.
///
/// Empty tokens are dropped; repeated tokens (by match key) keep their first
/// occurrence.
pub fn split_multi(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(MULTI_VALUE_DELIMITER)
        .filter_map(clean_label)
        .filter(|label| seen.insert(label.to_lowercase()))
        .collect()
}
