//! Match scanner: presence and positional scans over a compiled set
//!
//! Both modes are pure functions of (compiled set, text) - no shared mutable
//! state between invocations, so they are safe to run inside a worker or
//! inline on the main context.
//!
//! Presence mode accumulates the set of distinct matched keywords and
//! short-circuits as soon as every keyword has been seen once. Positional
//! mode records every occurrence with its chunk-local byte offset and length.
//! Both guard against zero-width matches by forcing the cursor forward one
//! character so an empty-matching alternative cannot hang the scan.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::scanner::compiler::CompiledSet;
use crate::scanner::literal::literal_presence_into;

// =============================================================================
// Types
// =============================================================================

/// One positional occurrence, scoped to a single chunk's local text.
/// Field names are part of the worker wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    pub index: usize,
    pub length: usize,
}

// =============================================================================
// Presence mode
// =============================================================================

/// Distinct keywords occurring in `text`, in keyword-list order, original
/// casing as supplied by the user.
pub fn presence_scan(set: &CompiledSet, text: &str) -> Vec<String> {
    let mut found = HashSet::new();
    presence_scan_into(set, text, &mut found);
    collect_words(set, &found)
}

/// Accumulate found keyword indices into `found`; used by chunked scans so
/// the short-circuit spans chunks. Returns early once every keyword has
/// been seen.
pub fn presence_scan_into(set: &CompiledSet, text: &str, found: &mut HashSet<usize>) {
    let total = set.keyword_count();
    if found.len() >= total || text.is_empty() {
        return;
    }

    // Literal fast path: one automaton pass, overlapping so no occurring
    // pattern can be shadowed by another.
    if let Some(ac) = set.literal() {
        literal_presence_into(ac, text, total, found);
        return;
    }

    let re = set.regex();
    let mut locs = re.capture_locations();
    let mut at = 0usize;

    while at <= text.len() {
        let m = match re.captures_read_at(&mut locs, text, at) {
            Some(m) => m,
            None => break,
        };
        if let Some(i) = set.matched_keyword(&locs) {
            found.insert(i);
            if found.len() >= total {
                return;
            }
        }
        at = advance(text, m.start(), m.end());
    }
}

/// Materialize a found-index set as keywords in list order.
pub fn collect_words(set: &CompiledSet, found: &HashSet<usize>) -> Vec<String> {
    let mut indices: Vec<usize> = found.iter().copied().collect();
    indices.sort_unstable();
    indices
        .into_iter()
        .map(|i| set.keywords()[i].clone())
        .collect()
}

// =============================================================================
// Positional mode
// =============================================================================

/// Every occurrence of every keyword in `text`, chunk-local offsets.
/// No short-circuit; the highlight projector needs them all.
pub fn position_scan(set: &CompiledSet, text: &str) -> Vec<KeywordMatch> {
    let mut out = Vec::new();
    if text.is_empty() {
        return out;
    }

    let re = set.regex();
    let mut locs = re.capture_locations();
    let mut at = 0usize;

    while at <= text.len() {
        let m = match re.captures_read_at(&mut locs, text, at) {
            Some(m) => m,
            None => break,
        };
        if let Some(i) = set.matched_keyword(&locs) {
            out.push(KeywordMatch {
                keyword: set.keywords()[i].clone(),
                index: m.start(),
                length: m.end() - m.start(),
            });
        }
        at = advance(text, m.start(), m.end());
    }

    out
}

// =============================================================================
// Cursor advance
// =============================================================================

/// Next scan position after a match. Zero-width matches force the cursor
/// one character forward so the loop terminates.
fn advance(text: &str, start: usize, end: usize) -> usize {
    if end > start {
        end
    } else {
        match text[end..].chars().next() {
            Some(c) => end + c.len_utf8(),
            None => end + 1, // past the end: loop condition exits
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
