//! Configuration types and defaults
//!
//! `Settings` is what the extension's settings store hands to the content
//! script; `ScannerConfig` holds the scanner's own tunables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};

/// Platform keys present in a fresh settings object.
const DEFAULT_ENABLED_TYPES: [&str; 6] =
    ["baidu", "aliyun", "quark", "lanzou", "pan123", "generic"];

// =============================================================================
// Settings
// =============================================================================

/// User-facing settings, read once at session start and on update notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawSettings")]
pub struct Settings {
    /// Replace detected links with access buttons. Default: true
    pub auto_replace: bool,
    /// Submit newly found links to the backend. Default: true
    pub auto_submit: bool,
    /// No backend available: clicks without a password open the raw link. Default: false
    pub offline_mode: bool,
    /// Per-platform switch; a platform is enabled unless explicitly `false`.
    pub enabled_types: BTreeMap<String, bool>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_replace: true,
            auto_submit: true,
            offline_mode: false,
            enabled_types: DEFAULT_ENABLED_TYPES
                .iter()
                .map(|key| (key.to_string(), true))
                .collect(),
        }
    }
}

impl Settings {
    /// Parse settings JSON, filling missing fields from defaults.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::InvalidSettings(e.to_string()))
    }

    /// `enabledTypes[type] === false` disables; anything else enables.
    pub fn is_type_enabled(&self, platform: &str) -> bool {
        self.enabled_types.get(platform).copied().unwrap_or(true)
    }
}

/// Wire shape, including the pre-`enabledTypes` layout.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSettings {
    auto_replace: Option<bool>,
    auto_submit: Option<bool>,
    offline_mode: Option<bool>,
    enabled_types: Option<BTreeMap<String, bool>>,
    enabled_platforms: Option<BTreeMap<String, bool>>,
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        let defaults = Settings::default();

        let enabled_types = match (raw.enabled_types, raw.enabled_platforms) {
            (Some(types), _) => types,
            (None, Some(legacy)) => migrate_legacy_platforms(&legacy),
            (None, None) => defaults.enabled_types,
        };

        Self {
            auto_replace: raw.auto_replace.unwrap_or(defaults.auto_replace),
            auto_submit: raw.auto_submit.unwrap_or(defaults.auto_submit),
            offline_mode: raw.offline_mode.unwrap_or(defaults.offline_mode),
            enabled_types,
        }
    }
}

/// Old settings only knew four platforms; lanzou and generic were always on.
fn migrate_legacy_platforms(legacy: &BTreeMap<String, bool>) -> BTreeMap<String, bool> {
    let flag = |key: &str| legacy.get(key).copied() != Some(false);

    let mut types = BTreeMap::new();
    types.insert("baidu".to_string(), flag("baidu"));
    types.insert("aliyun".to_string(), flag("aliyun"));
    types.insert("quark".to_string(), flag("quark"));
    types.insert("lanzou".to_string(), true);
    types.insert("pan123".to_string(), flag("pan123"));
    types.insert("generic".to_string(), true);
    types
}

// =============================================================================
// Scanner Configuration
// =============================================================================

/// Tunables for the document scanner and mutation watcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Characters on each side of a URL searched for a password. Default: 100
    pub proximity_window: usize,
    /// Full-rescan coalescing window in milliseconds. Default: 500
    pub debounce_ms: u64,
    /// Trimmed text shorter than this is never scanned. Default: 10
    pub min_text_len: usize,
    /// Added-node count above which a batch becomes a full rescan. Default: 64
    pub max_targeted_nodes: usize,
    /// Targeted scans allowed inside one debounce window. Default: 20
    pub burst_limit: usize,
    /// Elements whose text is checked once and then flagged.
    pub container_tags: Vec<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            proximity_window: 100,
            debounce_ms: 500,
            min_text_len: 10,
            max_targeted_nodes: 64,
            burst_limit: 20,
            container_tags: ["pre", "code", "p", "div", "span", "td", "li", "blockquote"]
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
        }
    }
}

impl ScannerConfig {
    pub fn is_container(&self, tag: &str) -> bool {
        self.container_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.auto_replace);
        assert!(settings.auto_submit);
        assert!(!settings.offline_mode);
        assert!(settings.is_type_enabled("baidu"));
        // Unknown platforms are enabled
        assert!(settings.is_type_enabled("weiyun"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = Settings::from_json(r#"{"offlineMode": true}"#).unwrap();
        assert!(settings.offline_mode);
        assert!(settings.auto_replace);
        assert!(settings.is_type_enabled("quark"));
    }

    #[test]
    fn test_explicit_false_disables() {
        let settings =
            Settings::from_json(r#"{"enabledTypes": {"quark": false, "baidu": true}}"#).unwrap();
        assert!(!settings.is_type_enabled("quark"));
        assert!(settings.is_type_enabled("baidu"));
        assert!(settings.is_type_enabled("aliyun"));
    }

    #[test]
    fn test_legacy_enabled_platforms_migrated() {
        let settings = Settings::from_json(
            r#"{"enabledPlatforms": {"baidu": false, "lanzou": false}}"#,
        )
        .unwrap();
        assert!(!settings.is_type_enabled("baidu"));
        // lanzou was never switchable in the old layout
        assert!(settings.is_type_enabled("lanzou"));
        assert_eq!(settings.enabled_types.get("generic"), Some(&true));
    }

    #[test]
    fn test_enabled_types_wins_over_legacy() {
        let settings = Settings::from_json(
            r#"{"enabledTypes": {"baidu": true}, "enabledPlatforms": {"baidu": false}}"#,
        )
        .unwrap();
        assert!(settings.is_type_enabled("baidu"));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = Settings::from_json("{not json").unwrap_err();
        assert!(matches!(err, CoreError::InvalidSettings(_)));
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_string(&Settings::default()).unwrap();
        assert!(json.contains("autoReplace"));
        assert!(json.contains("enabledTypes"));
    }

    #[test]
    fn test_container_lookup() {
        let config = ScannerConfig::default();
        assert!(config.is_container("P"));
        assert!(config.is_container("blockquote"));
        assert!(!config.is_container("section"));
    }
}
