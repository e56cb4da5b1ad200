//! LinkRegistry: Per-session store of every link seen on the page
//!
//! Keyed by canonical URL. Entries are never removed; lifecycle flags are
//! only ever set, so a link's reported state never moves backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::patterns::PlatformKind;

// =============================================================================
// Types
// =============================================================================

/// Reported lifecycle of a link, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Discovered,
    Submitted,
    Rendered,
    Superseded,
}

/// A detected share link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkDescriptor {
    pub raw_url: String,
    pub canonical_url: String,
    #[serde(rename = "platformType")]
    pub platform: PlatformKind,
    pub display_name: String,
    pub share_id: String,
    pub password: Option<String>,
    /// Password was part of the URL itself.
    pub inline_password: bool,
    pub lifecycle_state: LifecycleState,
    pub discovered_at: DateTime<Utc>,
    /// Page occurrences rendered or collapsed onto this link.
    pub occurrences: usize,
    rendered: bool,
    submitted: bool,
    superseded: usize,
}

impl LinkDescriptor {
    pub fn new(
        raw_url: impl Into<String>,
        canonical_url: impl Into<String>,
        platform: PlatformKind,
        share_id: impl Into<String>,
        inline: Option<String>,
    ) -> Self {
        Self {
            raw_url: raw_url.into(),
            canonical_url: canonical_url.into(),
            platform,
            display_name: platform.display_name().to_string(),
            share_id: share_id.into(),
            inline_password: inline.is_some(),
            password: inline,
            lifecycle_state: LifecycleState::Discovered,
            discovered_at: Utc::now(),
            occurrences: 1,
            rendered: false,
            submitted: false,
            superseded: 0,
        }
    }

    pub fn is_rendered(&self) -> bool {
        self.rendered
    }

    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    fn refresh_state(&mut self) {
        self.lifecycle_state = if self.rendered && self.superseded > 0 {
            LifecycleState::Superseded
        } else if self.rendered {
            LifecycleState::Rendered
        } else if self.submitted {
            LifecycleState::Submitted
        } else {
            LifecycleState::Discovered
        };
    }
}

// =============================================================================
// LinkRegistry
// =============================================================================

#[derive(Debug, Default)]
pub struct LinkRegistry {
    index: HashMap<String, usize>,
    links: Vec<LinkDescriptor>,
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn get(&self, canonical_url: &str) -> Option<&LinkDescriptor> {
        self.index.get(canonical_url).map(|&idx| &self.links[idx])
    }

    fn get_mut(&mut self, canonical_url: &str) -> Option<&mut LinkDescriptor> {
        let idx = *self.index.get(canonical_url)?;
        self.links.get_mut(idx)
    }

    /// Insert a new link.
    ///
    /// Returns `true` when the canonical URL was new. A known entry without
    /// a password adopts the incoming one; nothing else changes.
    pub fn discover(&mut self, descriptor: LinkDescriptor) -> bool {
        if let Some(existing) = self.get_mut(&descriptor.canonical_url) {
            if existing.password.is_none() && descriptor.password.is_some() {
                existing.password = descriptor.password;
                existing.inline_password = descriptor.inline_password;
            }
            return false;
        }
        self.index
            .insert(descriptor.canonical_url.clone(), self.links.len());
        self.links.push(descriptor);
        true
    }

    /// Returns `true` if the password was recorded.
    pub fn set_password_if_absent(&mut self, canonical_url: &str, password: &str) -> bool {
        match self.get_mut(canonical_url) {
            Some(link) if link.password.is_none() => {
                link.password = Some(password.to_string());
                true
            }
            _ => false,
        }
    }

    pub fn is_rendered(&self, canonical_url: &str) -> bool {
        self.get(canonical_url).map_or(false, |l| l.rendered)
    }

    /// Returns `true` on the first transition.
    pub fn mark_rendered(&mut self, canonical_url: &str) -> bool {
        self.update(canonical_url, |link| !std::mem::replace(&mut link.rendered, true))
    }

    /// Returns `true` on the first transition.
    pub fn mark_submitted(&mut self, canonical_url: &str) -> bool {
        self.update(canonical_url, |link| !std::mem::replace(&mut link.submitted, true))
    }

    pub fn mark_superseded(&mut self, canonical_url: &str) -> bool {
        self.update(canonical_url, |link| {
            link.superseded += 1;
            link.occurrences += 1;
            true
        })
    }

    fn update<F>(&mut self, canonical_url: &str, f: F) -> bool
    where
        F: FnOnce(&mut LinkDescriptor) -> bool,
    {
        match self.get_mut(canonical_url) {
            Some(link) => {
                let changed = f(link);
                link.refresh_state();
                changed
            }
            None => false,
        }
    }

    /// Insertion-ordered copy for display.
    pub fn snapshot(&self) -> Vec<LinkDescriptor> {
        self.links.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LinkDescriptor> {
        self.links.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(canonical: &str) -> LinkDescriptor {
        LinkDescriptor::new(canonical, canonical, PlatformKind::Quark, "abc", None)
    }

    #[test]
    fn test_discover_dedups_by_canonical() {
        let mut registry = LinkRegistry::new();
        assert!(registry.discover(link("https://pan.quark.cn/s/abc")));
        assert!(!registry.discover(link("https://pan.quark.cn/s/abc")));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("https://pan.quark.cn/s/abc").unwrap().occurrences, 1);
    }

    #[test]
    fn test_state_derivation() {
        let mut registry = LinkRegistry::new();
        let url = "https://pan.quark.cn/s/abc";
        registry.discover(link(url));
        assert_eq!(registry.get(url).unwrap().lifecycle_state, LifecycleState::Discovered);

        assert!(registry.mark_submitted(url));
        assert_eq!(registry.get(url).unwrap().lifecycle_state, LifecycleState::Submitted);

        assert!(registry.mark_rendered(url));
        assert!(!registry.mark_rendered(url));
        assert_eq!(registry.get(url).unwrap().lifecycle_state, LifecycleState::Rendered);

        registry.mark_superseded(url);
        let entry = registry.get(url).unwrap();
        assert_eq!(entry.lifecycle_state, LifecycleState::Superseded);
        assert!(entry.is_submitted());
    }

    #[test]
    fn test_unknown_url_marks_nothing() {
        let mut registry = LinkRegistry::new();
        assert!(!registry.mark_rendered("nope"));
        assert!(!registry.is_rendered("nope"));
    }

    #[test]
    fn test_password_adopted_once() {
        let mut registry = LinkRegistry::new();
        let url = "https://pan.quark.cn/s/abc";
        registry.discover(link(url));
        assert!(registry.set_password_if_absent(url, "ab12"));
        assert!(!registry.set_password_if_absent(url, "zz99"));
        assert_eq!(registry.get(url).unwrap().password.as_deref(), Some("ab12"));
    }

    #[test]
    fn test_snapshot_serializes_for_popup() {
        let mut registry = LinkRegistry::new();
        registry.discover(link("https://pan.quark.cn/s/abc"));
        let json = serde_json::to_value(registry.snapshot()).unwrap();
        assert_eq!(json[0]["platformType"], "quark");
        assert_eq!(json[0]["lifecycleState"], "discovered");
        assert!(json[0]["discoveredAt"].is_string());
    }
}
