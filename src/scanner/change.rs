//! ChangeDetector: Skip full rescans of an unchanged page
//!
//! Hashes the page fingerprint (visible text plus unprocessed anchor
//! targets). A debounced full rescan whose fingerprint matches the one left
//! behind by the previous pass has nothing new to find.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

// =============================================================================
// Types
// =============================================================================

/// Result of change detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeResult {
    pub has_changed: bool,
    pub content_hash: u64,
}

// =============================================================================
// ChangeDetector
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    last_hash: Option<u64>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `fingerprint` with the last recorded one and remember it.
    pub fn check(&mut self, fingerprint: &str) -> ChangeResult {
        let current_hash = compute_hash(fingerprint);
        let has_changed = self.last_hash != Some(current_hash);
        self.last_hash = Some(current_hash);
        ChangeResult {
            has_changed,
            content_hash: current_hash,
        }
    }

    /// Remember the page state a pass left behind.
    pub fn record(&mut self, fingerprint: &str) -> u64 {
        let hash = compute_hash(fingerprint);
        self.last_hash = Some(hash);
        hash
    }

    /// Forget the last fingerprint so the next check always reports a change.
    pub fn reset(&mut self) {
        self.last_hash = None;
    }
}

fn compute_hash(fingerprint: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    fingerprint.hash(&mut hasher);
    hasher.finish()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_check_returns_changed() {
        let mut detector = ChangeDetector::new();
        assert!(detector.check("资源 https://pan.quark.cn/s/abc").has_changed);
    }

    #[test]
    fn test_same_fingerprint_unchanged() {
        let mut detector = ChangeDetector::new();
        detector.check("page");
        assert!(!detector.check("page").has_changed);
        assert!(detector.check("page\nhttps://pan.quark.cn/s/abc").has_changed);
    }

    #[test]
    fn test_record_sets_baseline() {
        let mut detector = ChangeDetector::new();
        let hash = detector.record("after pass");

        let result = detector.check("after pass");
        assert!(!result.has_changed);
        assert_eq!(result.content_hash, hash);
    }

    #[test]
    fn test_reset() {
        let mut detector = ChangeDetector::new();
        detector.check("Hello");
        detector.reset();
        assert!(detector.check("Hello").has_changed);
    }

    #[test]
    fn test_whitespace_matters() {
        let mut detector = ChangeDetector::new();
        detector.check("Hello world");
        assert!(detector.check("Hello  world").has_changed);
    }
}
