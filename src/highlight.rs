//! Highlight projection: positional matches → node ranges + style rule
//!
//! Takes the worker's positional results (keyed by text-node id) together
//! with the snapshot's node texts, and produces the range set to register
//! under the single named highlight plus the CSS rule for its color. The
//! set is replaced wholesale on every scan - no incremental diffing, so a
//! DOM that mutated between scans cannot leave stale ranges behind.
//!
//! Projection is tolerant per match: an offset that no longer fits its
//! node (mutated or detached since the snapshot) skips that one match, the
//! rest of the batch proceeds.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::scanner::chunker::NodeChunk;
use crate::session::ports::RangeSpec;
use crate::session::protocol::ChunkMatches;

// =============================================================================
// Constants
// =============================================================================

/// The one registered highlight name.
pub const HIGHLIGHT_NAME: &str = "watchcore-keywords";

/// Fallback when the configured color fails sanitation.
const DEFAULT_COLOR: &str = "#ffff00";

// =============================================================================
// Plan
// =============================================================================

/// Everything the host surface needs to render one scan's highlights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightPlan {
    pub name: &'static str,
    pub css: String,
    pub ranges: Vec<RangeSpec>,
}

impl HighlightPlan {
    /// Count of distinct keywords among successfully applied ranges -
    /// the number reported onward as "found count". `flags` is the
    /// per-range success vector from `HighlightSurface::apply`.
    pub fn distinct_applied(&self, flags: &[bool]) -> u32 {
        let applied: HashSet<&str> = self
            .ranges
            .iter()
            .zip(flags.iter().copied().chain(std::iter::repeat(false)))
            .filter(|(_, ok)| *ok)
            .map(|(r, _)| r.keyword.as_str())
            .collect();
        applied.len() as u32
    }
}

// =============================================================================
// Projection
// =============================================================================

/// Build the range set for one scan's positional results.
pub fn project(results: &[ChunkMatches], nodes: &[NodeChunk], color: &str) -> HighlightPlan {
    let by_id: HashMap<u32, &NodeChunk> = nodes.iter().map(|n| (n.id, n)).collect();

    let mut ranges = Vec::new();
    for chunk in results {
        let Some(node) = by_id.get(&chunk.id) else {
            continue; // node vanished between snapshot and projection
        };
        for m in &chunk.matches {
            let end = m.index.saturating_add(m.length);
            if !valid_span(&node.text, m.index, end) {
                continue; // skip this one match, keep the batch
            }
            ranges.push(RangeSpec {
                node_id: chunk.id,
                start: m.index,
                end,
                keyword: m.keyword.clone(),
            });
        }
    }

    HighlightPlan {
        name: HIGHLIGHT_NAME,
        css: style_rule(HIGHLIGHT_NAME, color),
        ranges,
    }
}

/// The style rule for the named highlight. The surface owns one style
/// element created once; only this rule text is rewritten on color change.
pub fn style_rule(name: &str, color: &str) -> String {
    format!("::highlight({}) {{ background-color: {}; }}", name, safe_color(color))
}

/// Offsets must land inside the node's text on character boundaries, and
/// zero-width ranges render nothing so they are dropped here.
fn valid_span(text: &str, start: usize, end: usize) -> bool {
    start < end && end <= text.len() && text.is_char_boundary(start) && text.is_char_boundary(end)
}

/// The color string ends up inside a CSS rule; anything that could close
/// the declaration is replaced with the default.
fn safe_color(color: &str) -> &str {
    let ok = !color.is_empty()
        && color.len() <= 64
        && color
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "#(),.% -".contains(c));
    if ok {
        color
    } else {
        DEFAULT_COLOR
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::matcher::KeywordMatch;

    fn node(id: u32, text: &str) -> NodeChunk {
        NodeChunk { id, text: text.to_string() }
    }

    fn hit(keyword: &str, index: usize, length: usize) -> KeywordMatch {
        KeywordMatch { keyword: keyword.to_string(), index, length }
    }

    // -------------------------------------------------------------------------
    // Projection
    // -------------------------------------------------------------------------

    #[test]
    fn test_project_builds_node_scoped_ranges() {
        let nodes = vec![node(0, "foo x bar"), node(1, "more foo")];
        let results = vec![
            ChunkMatches { id: 0, matches: vec![hit("foo", 0, 3), hit("bar", 6, 3)] },
            ChunkMatches { id: 1, matches: vec![hit("foo", 5, 3)] },
        ];
        let plan = project(&results, &nodes, "#123456");
        assert_eq!(plan.ranges.len(), 3);
        assert_eq!(plan.ranges[0], RangeSpec { node_id: 0, start: 0, end: 3, keyword: "foo".into() });
        assert_eq!(plan.ranges[2].node_id, 1);
    }

    #[test]
    fn test_missing_node_skips_its_matches_only() {
        let nodes = vec![node(0, "foo")];
        let results = vec![
            ChunkMatches { id: 0, matches: vec![hit("foo", 0, 3)] },
            ChunkMatches { id: 7, matches: vec![hit("foo", 0, 3)] },
        ];
        let plan = project(&results, &nodes, "#123456");
        assert_eq!(plan.ranges.len(), 1);
    }

    #[test]
    fn test_out_of_bounds_match_skipped_batch_proceeds() {
        // Node text shrank after the snapshot: the second match no longer fits.
        let nodes = vec![node(0, "short")];
        let results = vec![ChunkMatches {
            id: 0,
            matches: vec![hit("short", 0, 5), hit("gone", 10, 4)],
        }];
        let plan = project(&results, &nodes, "#123456");
        assert_eq!(plan.ranges.len(), 1);
    }

    #[test]
    fn test_non_char_boundary_match_skipped() {
        let nodes = vec![node(0, "été")];
        let results = vec![ChunkMatches { id: 0, matches: vec![hit("x", 1, 2)] }];
        let plan = project(&results, &nodes, "#123456");
        assert!(plan.ranges.is_empty());
    }

    #[test]
    fn test_zero_width_match_dropped() {
        let nodes = vec![node(0, "abc")];
        let results = vec![ChunkMatches { id: 0, matches: vec![hit("a*", 1, 0)] }];
        let plan = project(&results, &nodes, "#123456");
        assert!(plan.ranges.is_empty());
    }

    // -------------------------------------------------------------------------
    // Found count
    // -------------------------------------------------------------------------

    #[test]
    fn test_distinct_applied_counts_keywords_not_ranges() {
        let nodes = vec![node(0, "foo foo bar")];
        let results = vec![ChunkMatches {
            id: 0,
            matches: vec![hit("foo", 0, 3), hit("foo", 4, 3), hit("bar", 8, 3)],
        }];
        let plan = project(&results, &nodes, "#123456");
        assert_eq!(plan.distinct_applied(&[true, true, true]), 2);
    }

    #[test]
    fn test_failed_ranges_do_not_count() {
        let nodes = vec![node(0, "foo bar")];
        let results = vec![ChunkMatches {
            id: 0,
            matches: vec![hit("foo", 0, 3), hit("bar", 4, 3)],
        }];
        let plan = project(&results, &nodes, "#123456");
        assert_eq!(plan.distinct_applied(&[true, false]), 1);
        assert_eq!(plan.distinct_applied(&[false, false]), 0);
        // A short flags vector treats missing entries as failures.
        assert_eq!(plan.distinct_applied(&[true]), 1);
    }

    // -------------------------------------------------------------------------
    // Style rule
    // -------------------------------------------------------------------------

    #[test]
    fn test_style_rule_shape() {
        assert_eq!(
            style_rule("watchcore-keywords", "#ff0000"),
            "::highlight(watchcore-keywords) { background-color: #ff0000; }"
        );
    }

    #[test]
    fn test_style_rule_accepts_functional_colors() {
        let css = style_rule("n", "rgb(255, 0, 0)");
        assert!(css.contains("rgb(255, 0, 0)"));
    }

    #[test]
    fn test_hostile_color_replaced_with_default() {
        let css = style_rule("n", "red; } body { display: none");
        assert!(css.contains(DEFAULT_COLOR));
        assert!(!css.contains("display"));
    }
}
