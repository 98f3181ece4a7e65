//! Window planning and chunk splitting for large plain-text scans
//!
//! Large pages are scanned in fixed-size windows with an overlap between
//! consecutive slices so a keyword straddling a window boundary is not
//! lost. Matches inside the overlap may be double-reported; the presence
//! set dedupes them. Windows scale step-wise with total text length so
//! bigger pages cost fewer round-trips, not more.
//!
//! Highlight scans are chunked differently - one chunk per visible text
//! node, ids assigned by the snapshot - because match offsets must resolve
//! back to a specific DOM node. See `NodeChunk`.

use serde::{Deserialize, Serialize};

// =============================================================================
// Constants
// =============================================================================

/// Texts up to this size scan as a single chunk.
pub const SINGLE_CHUNK_MAX: usize = 64 * 1024;

/// Step thresholds: (max total length, window size).
const WINDOW_STEPS: &[(usize, usize)] = &[
    (256 * 1024, 32 * 1024),
    (1024 * 1024, 64 * 1024),
    (usize::MAX, 128 * 1024),
];

/// Overlap bounds: at least a generous floor (patterns can match longer
/// than their own source text), capped so overlap stays well under any
/// window size.
const OVERLAP_MIN: usize = 32;
pub const OVERLAP_MAX: usize = 512;

// =============================================================================
// Types
// =============================================================================

/// Chunking parameters for one plain-text scan.
///
/// Invariants: `overlap < window`, `window >= 1`, splitting covers the
/// input with no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub window: usize,
    pub overlap: usize,
}

impl WindowPlan {
    /// Plan for a text of `total_len` bytes searched with patterns whose
    /// longest source is `longest_pattern_len` bytes.
    pub fn for_len(total_len: usize, longest_pattern_len: usize) -> Self {
        let window = if total_len <= SINGLE_CHUNK_MAX {
            total_len.max(1)
        } else {
            WINDOW_STEPS
                .iter()
                .find(|(max, _)| total_len <= *max)
                .map(|(_, w)| *w)
                .unwrap_or(128 * 1024)
        };
        let overlap = longest_pattern_len
            .clamp(OVERLAP_MIN, OVERLAP_MAX)
            .min(window.saturating_sub(1));
        Self { window, overlap }
    }
}

/// One chunk of a highlight scan: a single text node's content with its
/// client-assigned node index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeChunk {
    pub id: u32,
    pub text: String,
}

// =============================================================================
// Splitting
// =============================================================================

/// Split `text` into overlapping windows, sequence-id per slice.
///
/// Window starts snap down and window ends snap up to UTF-8 character
/// boundaries, so snapping only ever widens a slice: the effective overlap
/// never drops below the planned one and no byte falls in a gap. The raw
/// cursor advances by at least one byte per window, so even hostile
/// wire-supplied window/overlap combinations (window smaller than one
/// character, overlap >= window) terminate - at worst with redundant
/// slices, which the presence set dedupes.
pub fn split_windows<'a>(text: &'a str, plan: &WindowPlan) -> Vec<(u32, &'a str)> {
    if text.len() <= plan.window {
        return vec![(0, text)];
    }

    let step = plan.window.saturating_sub(plan.overlap).max(1);
    let mut out = Vec::new();
    let mut cursor = 0usize;
    let mut id = 0u32;

    loop {
        let s = floor_char_boundary(text, cursor);
        let e = ceil_char_boundary(text, cursor.saturating_add(plan.window).min(text.len()));
        out.push((id, &text[s..e]));
        id += 1;
        if e >= text.len() {
            break;
        }
        cursor += step;
    }

    out
}

/// Largest char boundary at or below `i`.
fn floor_char_boundary(s: &str, i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    let mut i = i;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `i`.
fn ceil_char_boundary(s: &str, i: usize) -> usize {
    let mut i = i.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

// =============================================================================
// Tests
// =============================================================================
