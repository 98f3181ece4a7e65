//! Literal fast path: Aho-Corasick presence scan for all-literal keyword lists
//!
//! Most users configure plain words, not regex syntax. When the compiler
//! detects that every keyword is an ASCII literal it builds one automaton
//! and presence scans run in a single O(n) pass instead of repeated regex
//! executions. Overlapping iteration guarantees no occurring pattern is
//! shadowed by a neighbour ("ab" vs "b" style). Positional scans always use
//! the regex path so offsets come from one set of semantics.

use aho_corasick::AhoCorasick;
use std::collections::HashSet;

/// Accumulate pattern ids seen in `text` into `found`, stopping as soon as
/// all `total` keywords have been seen.
pub fn literal_presence_into(
    ac: &AhoCorasick,
    text: &str,
    total: usize,
    found: &mut HashSet<usize>,
) {
    for mat in ac.find_overlapping_iter(text) {
        found.insert(mat.pattern().as_usize());
        if found.len() >= total {
            return;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::compiler::compile_keywords;
    use crate::scanner::matcher::presence_scan;

    fn set_of(list: &[&str]) -> crate::scanner::compiler::CompiledSet {
        compile_keywords(&list.iter().map(|s| s.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn test_fast_path_matches_regex_path() {
        let text = "The Quick brown FOX jumps over the lazy dog";
        let literal_set = set_of(&["quick", "fox", "cat"]);
        assert!(literal_set.literal().is_some());
        let via_literal = presence_scan(&literal_set, text);

        // Force the regex path with a harmless non-literal variant.
        let regex_set = set_of(&["quick", "fox", "ca[t]"]);
        assert!(regex_set.literal().is_none());
        let via_regex = presence_scan(&regex_set, text);

        assert_eq!(via_literal, vec!["quick".to_string(), "fox".to_string()]);
        assert_eq!(via_regex.len(), via_literal.len());
    }

    #[test]
    fn test_overlapping_patterns_all_reported() {
        // "b" occurs inside "ab"; overlapping search must report both.
        let set = set_of(&["ab", "b"]);
        let words = presence_scan(&set, "ab");
        assert_eq!(words, vec!["ab".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_short_circuit_stops_at_full_set() {
        let set = set_of(&["aa"]);
        let ac = set.literal().unwrap();
        let mut found = HashSet::new();
        literal_presence_into(ac, &"aa".repeat(1000), 1, &mut found);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_ascii_case_insensitive() {
        let set = set_of(&["Alpha"]);
        let words = presence_scan(&set, "ALPHA alpha");
        assert_eq!(words, vec!["Alpha".to_string()]);
    }
}
