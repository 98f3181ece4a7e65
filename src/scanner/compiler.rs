//! Pattern compiler: user keyword strings → one combined matcher
//!
//! Every keyword the user configures is treated as a case-insensitive
//! regular expression. Invalid patterns are dropped, never fatal. The valid
//! remainder is OR-ed into a single combined regex, each keyword wrapped in
//! its own index-named capture group (`k0`, `k1`, ...) so a match can be
//! attributed back to the keyword that produced it.
//!
//! The combined build is the expensive step; callers memoize per distinct
//! keyword-list identity (see `WorkerAgent`) rather than rebuilding per chunk.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use regex::{Regex, RegexBuilder};

// =============================================================================
// Constants
// =============================================================================

/// Hard cap on the number of alternatives in the combined regex.
/// Keyword lists beyond this are truncated (user input is untrusted).
pub const MAX_KEYWORDS: usize = 256;

/// Compiled-program size limit for the combined regex, in bytes.
/// Adversarial patterns fail the build instead of exhausting memory.
const COMBINED_SIZE_LIMIT: usize = 1 << 22;

/// Characters that make a keyword a regex rather than a plain literal.
const META_CHARS: &[u8] = br"\.^$*+?()[]{}|";

// =============================================================================
// CompiledSet
// =============================================================================

/// Combined matcher built from the current valid keyword list.
///
/// Ephemeral: label assignment is positional and stable only within one
/// construction. Never persisted.
pub struct CompiledSet {
    /// Valid keywords, original casing as supplied by the user.
    keywords: Vec<String>,
    /// Combined case-insensitive regex, one named group per keyword.
    regex: Regex,
    /// Capture-group index of each keyword's `k<i>` label. User patterns may
    /// contain their own capture groups, so positional arithmetic is wrong;
    /// indices are resolved from the compiled regex's capture names.
    group_of: Vec<usize>,
    /// Byte length of the longest keyword pattern (drives chunk overlap).
    longest_len: usize,
    /// Aho-Corasick automaton when every keyword is a plain ASCII literal.
    literal: Option<AhoCorasick>,
}

impl CompiledSet {
    /// Valid keywords in label order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn longest_len(&self) -> usize {
        self.longest_len
    }

    /// Literal fast-path automaton, present iff all keywords are ASCII literals.
    pub fn literal(&self) -> Option<&AhoCorasick> {
        self.literal.as_ref()
    }

    /// Which keyword produced the match described by `locs`?
    ///
    /// Exactly one alternative participates per match; probe our label
    /// groups and take the first that is set.
    pub fn matched_keyword(&self, locs: &regex::CaptureLocations) -> Option<usize> {
        self.group_of
            .iter()
            .position(|&g| locs.get(g).is_some())
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Filter candidates down to valid keywords and build the combined matcher.
///
/// Returns `None` when no candidate survives - an explicit "no matcher"
/// result, not an error. Duplicate keywords each get independent labels;
/// dedup happens at the result-set level.
pub fn compile_keywords(candidates: &[String]) -> Option<CompiledSet> {
    let valid = filter_valid(candidates);
    if valid.is_empty() {
        return None;
    }

    match build_combined(&valid) {
        Some(set) => Some(set),
        None => {
            // Cross-keyword (?P<name>) clashes can fail the combined build
            // even though each keyword compiles alone. Retry once without
            // named-group keywords.
            let plain: Vec<String> = valid
                .into_iter()
                .filter(|k| !has_named_group(k))
                .collect();
            if plain.is_empty() {
                return None;
            }
            build_combined(&plain)
        }
    }
}

/// Keep candidates that are non-empty, non-whitespace-only, and compile as
/// case-insensitive regexes on their own. Order preserved, truncated at
/// `MAX_KEYWORDS`.
pub fn filter_valid(candidates: &[String]) -> Vec<String> {
    candidates
        .iter()
        .filter(|k| !k.trim().is_empty())
        .filter(|k| compiles_alone(k))
        .take(MAX_KEYWORDS)
        .cloned()
        .collect()
}

/// A keyword must compile both bare and wrapped in a group: wrapping is how
/// it enters the combined pattern, and a pattern like `a)(b` passes neither.
fn compiles_alone(pattern: &str) -> bool {
    RegexBuilder::new(&format!("(?:{pattern})"))
        .case_insensitive(true)
        .size_limit(COMBINED_SIZE_LIMIT)
        .build()
        .is_ok()
}

fn build_combined(keywords: &[String]) -> Option<CompiledSet> {
    let alternation = keywords
        .iter()
        .enumerate()
        .map(|(i, k)| format!("(?P<k{i}>{k})"))
        .collect::<Vec<_>>()
        .join("|");

    let regex = RegexBuilder::new(&alternation)
        .case_insensitive(true)
        .size_limit(COMBINED_SIZE_LIMIT)
        .build()
        .ok()?;

    // Resolve each label to its capture-group index in the combined program.
    let mut group_of = vec![0usize; keywords.len()];
    for (idx, name) in regex.capture_names().enumerate() {
        if let Some(name) = name {
            if let Some(i) = label_index(name, keywords.len()) {
                group_of[i] = idx;
            }
        }
    }

    let longest_len = keywords.iter().map(|k| k.len()).max().unwrap_or(0);
    let literal = build_literal(keywords);

    Some(CompiledSet {
        keywords: keywords.to_vec(),
        regex,
        group_of,
        longest_len,
        literal,
    })
}

/// Parse `k<i>` back to a keyword index. Ignores user-supplied group names
/// that merely look like labels but are out of range.
fn label_index(name: &str, count: usize) -> Option<usize> {
    let digits = name.strip_prefix('k')?;
    let i: usize = digits.parse().ok()?;
    (i < count).then_some(i)
}

/// Build the literal fast-path automaton when every keyword is a plain
/// ASCII literal. Overlapping search requires `MatchKind::Standard`.
fn build_literal(keywords: &[String]) -> Option<AhoCorasick> {
    if !keywords.iter().all(|k| is_ascii_literal(k)) {
        return None;
    }
    AhoCorasickBuilder::new()
        .match_kind(MatchKind::Standard)
        .ascii_case_insensitive(true)
        .build(keywords)
        .ok()
}

/// ASCII with no regex metacharacters: matching is byte-literal and ASCII
/// case folding agrees with the regex engine's case-insensitive semantics.
fn is_ascii_literal(pattern: &str) -> bool {
    pattern.is_ascii() && pattern.bytes().all(|b| !META_CHARS.contains(&b))
}

fn has_named_group(pattern: &str) -> bool {
    pattern.contains("(?P<") || pattern.contains("(?<")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // -------------------------------------------------------------------------
    // Filtering
    // -------------------------------------------------------------------------

    #[test]
    fn test_invalid_pattern_dropped() {
        let set = compile_keywords(&kw(&["[invalid", "valid"])).unwrap();
        assert_eq!(set.keywords(), &["valid".to_string()]);
    }

    #[test]
    fn test_empty_and_whitespace_dropped() {
        let set = compile_keywords(&kw(&["", "   ", "\t", "word"])).unwrap();
        assert_eq!(set.keywords(), &["word".to_string()]);
    }

    #[test]
    fn test_all_invalid_yields_no_matcher() {
        assert!(compile_keywords(&kw(&["[bad", "(worse", ""])).is_none());
    }

    #[test]
    fn test_empty_list_yields_no_matcher() {
        assert!(compile_keywords(&[]).is_none());
    }

    #[test]
    fn test_duplicates_keep_independent_labels() {
        let set = compile_keywords(&kw(&["foo", "foo"])).unwrap();
        assert_eq!(set.keyword_count(), 2);
    }

    #[test]
    fn test_keyword_list_truncated_at_cap() {
        let many: Vec<String> = (0..MAX_KEYWORDS + 50).map(|i| format!("w{i}")).collect();
        let set = compile_keywords(&many).unwrap();
        assert_eq!(set.keyword_count(), MAX_KEYWORDS);
    }

    // -------------------------------------------------------------------------
    // Combined build
    // -------------------------------------------------------------------------

    #[test]
    fn test_case_insensitive_combined() {
        let set = compile_keywords(&kw(&["alpha"])).unwrap();
        assert!(set.regex().is_match("ALPHA"));
        assert!(set.regex().is_match("Alpha"));
    }

    #[test]
    fn test_user_capture_groups_do_not_break_attribution() {
        // The inner group shifts positional numbering; attribution must
        // still land on the right keyword.
        let set = compile_keywords(&kw(&["a(b)c", "xyz"])).unwrap();
        let re = set.regex();
        let mut locs = re.capture_locations();
        let m = re.captures_read_at(&mut locs, "..xyz..", 0).unwrap();
        assert_eq!(m.as_str(), "xyz");
        assert_eq!(set.matched_keyword(&locs), Some(1));
    }

    #[test]
    fn test_clashing_named_groups_drop_offenders() {
        // Both compile alone; together the duplicate name fails the combined
        // build. The named-group keywords are dropped, the literal survives.
        let set = compile_keywords(&kw(&["(?P<x>a)", "(?P<x>b)", "plain"])).unwrap();
        assert_eq!(set.keywords(), &["plain".to_string()]);
    }

    #[test]
    fn test_named_group_colliding_with_label_namespace() {
        // `(?P<k1>z)` clashes with the label of the second keyword.
        let set = compile_keywords(&kw(&["(?P<k1>z)", "word"])).unwrap();
        assert_eq!(set.keywords(), &["word".to_string()]);
    }

    // -------------------------------------------------------------------------
    // Literal fast path detection
    // -------------------------------------------------------------------------

    #[test]
    fn test_literal_automaton_built_for_plain_words() {
        let set = compile_keywords(&kw(&["alpha", "beta gamma"])).unwrap();
        assert!(set.literal().is_some());
    }

    #[test]
    fn test_no_literal_automaton_for_regex_syntax() {
        let set = compile_keywords(&kw(&["al.ha", "beta"])).unwrap();
        assert!(set.literal().is_none());
    }

    #[test]
    fn test_no_literal_automaton_for_non_ascii() {
        let set = compile_keywords(&kw(&["naïve"])).unwrap();
        assert!(set.literal().is_none());
    }

    #[test]
    fn test_longest_len_tracks_pattern_bytes() {
        let set = compile_keywords(&kw(&["ab", "abcdef"])).unwrap();
        assert_eq!(set.longest_len(), 6);
    }
}
