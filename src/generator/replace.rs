//! Token replacement over the original input
//!
//! Rewrites the input in a single pass, substituting every resolved token
//! spelling with its value. Patterns are matched leftmost-longest so a token
//! that is a prefix of a longer one can never clobber part of it.

use super::ReplacedTokens;
use aho_corasick::{AhoCorasick, MatchKind};
use tracing::debug;

/// Replace every resolved token spelling in `input` with its value
///
/// Tokens absent from the map are left verbatim. Pairs are ordered by pattern
/// length descending (ties lexicographic) for deterministic automaton
/// construction.
pub(crate) fn replace_tokens(replaced: &ReplacedTokens, input: &str) -> String {
    if replaced.is_empty() {
        return input.to_string();
    }

    let mut pairs: Vec<(&str, &str)> =
        replaced.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));

    let patterns: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
    let values: Vec<&str> = pairs.iter().map(|(_, v)| *v).collect();

    match AhoCorasick::builder().match_kind(MatchKind::LeftmostLongest).build(&patterns) {
        Ok(ac) => ac.replace_all(input, &values),
        Err(err) => {
            debug!(error = %err, "failed to build replacement automaton, returning input as is");
            input.to_string()
        }
    }
}
