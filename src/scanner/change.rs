//! ChangeDetector: signature-based skip detection
//!
//! Pages mutate constantly for reasons that do not change their visible
//! text (blinking cursors, ad refreshes). The detector fingerprints the
//! candidate text as (scan mode, length, FNV-1a hash) and downstream work is
//! skipped whenever the fingerprint matches the last committed scan.
//!
//! FNV-1a is implemented explicitly: the signature must be deterministic
//! and stable across runs and platforms for the skip logic to be testable
//! at all. Collision resistance is not required, only determinism and
//! reasonable avalanche.

use serde::{Deserialize, Serialize};

// =============================================================================
// FNV-1a
// =============================================================================

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the text's bytes.
pub fn fnv1a(text: &str) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in text.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

// =============================================================================
// Types
// =============================================================================

/// Fingerprint of one scan candidate. Any component changing invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSignature {
    /// Effective scan mode: highlight projection vs. plain presence.
    pub highlight_mode: bool,
    /// Candidate text length in bytes.
    pub len: usize,
    /// FNV-1a content hash.
    pub hash: u64,
}

impl ScanSignature {
    pub fn of(highlight_mode: bool, text: &str) -> Self {
        Self {
            highlight_mode,
            len: text.len(),
            hash: fnv1a(text),
        }
    }
}

/// Result of one change check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResult {
    pub has_changed: bool,
    pub current: ScanSignature,
    pub previous: Option<ScanSignature>,
}

// =============================================================================
// ChangeDetector
// =============================================================================

/// Signature-keyed change detector.
///
/// `check` is read-only with respect to the committed signature: a scan
/// that is superseded or errors out never commits, so the next attempt is
/// not wrongly skipped. `commit` records the signature of a completed scan.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<ScanSignature>,
    check_count: u64,
    skip_count: u64,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Would a scan with this signature be redundant?
    pub fn check(&mut self, sig: ScanSignature) -> ChangeResult {
        self.check_count += 1;
        let has_changed = self.last != Some(sig);
        if !has_changed {
            self.skip_count += 1;
        }
        ChangeResult {
            has_changed,
            current: sig,
            previous: self.last,
        }
    }

    /// Record the signature of a scan that ran to completion.
    pub fn commit(&mut self, sig: ScanSignature) {
        self.last = Some(sig);
    }

    /// Forget the committed signature; the next check always reports
    /// changed. Called when settings change so a stale signature cannot
    /// mask a keyword-list update.
    pub fn reset(&mut self) {
        self.last = None;
        self.check_count = 0;
        self.skip_count = 0;
    }

    pub fn last(&self) -> Option<ScanSignature> {
        self.last
    }

    pub fn check_count(&self) -> u64 {
        self.check_count
    }

    pub fn skip_count(&self) -> u64 {
        self.skip_count
    }

    /// Skip rate as percentage.
    pub fn skip_rate(&self) -> f64 {
        if self.check_count == 0 {
            return 0.0;
        }
        (self.skip_count as f64 / self.check_count as f64) * 100.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // Requirement 1: first check always reports changed
    // -------------------------------------------------------------------------
    #[test]
    fn test_first_check_reports_changed() {
        let mut detector = ChangeDetector::new();
        let sig = ScanSignature::of(false, "Hello world");
        assert!(detector.check(sig).has_changed);
    }

    // -------------------------------------------------------------------------
    // Requirement 2: committed signature suppresses the next identical check
    // -------------------------------------------------------------------------
    #[test]
    fn test_committed_signature_skips() {
        let mut detector = ChangeDetector::new();
        let sig = ScanSignature::of(false, "Hello world");
        detector.check(sig);
        detector.commit(sig);
        assert!(!detector.check(sig).has_changed);
    }

    // -------------------------------------------------------------------------
    // Requirement 3: uncommitted checks never suppress (aborted scans)
    // -------------------------------------------------------------------------
    #[test]
    fn test_uncommitted_check_does_not_suppress() {
        let mut detector = ChangeDetector::new();
        let sig = ScanSignature::of(false, "Hello world");
        detector.check(sig);
        // No commit: the episode was superseded. Same text must still scan.
        assert!(detector.check(sig).has_changed);
    }

    // -------------------------------------------------------------------------
    // Requirement 4: any signature component invalidates
    // -------------------------------------------------------------------------
    #[test]
    fn test_text_change_invalidates() {
        let mut detector = ChangeDetector::new();
        let sig = ScanSignature::of(false, "Hello world");
        detector.commit(sig);
        assert!(detector.check(ScanSignature::of(false, "Hello universe")).has_changed);
    }

    #[test]
    fn test_mode_change_invalidates() {
        let mut detector = ChangeDetector::new();
        detector.commit(ScanSignature::of(false, "same text"));
        assert!(detector.check(ScanSignature::of(true, "same text")).has_changed);
    }

    #[test]
    fn test_signature_reflexive_for_identical_input() {
        let a = ScanSignature::of(true, "The quick brown fox");
        let b = ScanSignature::of(true, "The quick brown fox");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_differs_on_content_same_length() {
        let a = ScanSignature::of(false, "abcd");
        let b = ScanSignature::of(false, "abce");
        assert_eq!(a.len, b.len);
        assert_ne!(a, b);
    }

    // -------------------------------------------------------------------------
    // Requirement 5: hash is deterministic and stable
    // -------------------------------------------------------------------------
    #[test]
    fn test_fnv1a_deterministic() {
        assert_eq!(fnv1a("watchcore"), fnv1a("watchcore"));
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        // Standard FNV-1a 64-bit vectors.
        assert_eq!(fnv1a(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a("a"), 0xaf63_dc4c_8601_ec8c);
    }

    // -------------------------------------------------------------------------
    // Requirement 6: counters and reset
    // -------------------------------------------------------------------------
    #[test]
    fn test_skip_rate() {
        let mut detector = ChangeDetector::new();
        let sig = ScanSignature::of(false, "A");
        detector.check(sig);
        detector.commit(sig);
        detector.check(sig);
        detector.check(sig);
        detector.check(sig);
        // 3 skips out of 4 checks = 75%
        assert!((detector.skip_rate() - 75.0).abs() < 0.01);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut detector = ChangeDetector::new();
        let sig = ScanSignature::of(false, "Hello");
        detector.check(sig);
        detector.commit(sig);

        detector.reset();
        assert_eq!(detector.check_count(), 0);
        assert_eq!(detector.skip_count(), 0);
        assert!(detector.last().is_none());
        assert!(detector.check(sig).has_changed);
    }

    #[test]
    fn test_empty_text_is_valid() {
        let mut detector = ChangeDetector::new();
        let empty = ScanSignature::of(false, "");
        detector.commit(empty);
        assert!(!detector.check(empty).has_changed);
        assert!(detector.check(ScanSignature::of(false, "not empty")).has_changed);
    }
}
