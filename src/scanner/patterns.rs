//! PatternRegistry: Static table of supported netdisk platforms
//!
//! Each platform owns one or more URL surface forms. Forms use named groups
//! `share_id` and (optionally) `password`, so callers never depend on group
//! positions.

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// =============================================================================
// Platform identity
// =============================================================================

/// Stable platform identifier. The string form is the settings key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Baidu,
    Aliyun,
    Quark,
    Pan123,
    Weiyun,
    Wangpan115,
    Lanzou,
}

impl PlatformKind {
    pub const ALL: [PlatformKind; 7] = [
        PlatformKind::Baidu,
        PlatformKind::Aliyun,
        PlatformKind::Quark,
        PlatformKind::Pan123,
        PlatformKind::Weiyun,
        PlatformKind::Wangpan115,
        PlatformKind::Lanzou,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Baidu => "baidu",
            PlatformKind::Aliyun => "aliyun",
            PlatformKind::Quark => "quark",
            PlatformKind::Pan123 => "pan123",
            PlatformKind::Weiyun => "weiyun",
            PlatformKind::Wangpan115 => "wangpan115",
            PlatformKind::Lanzou => "lanzou",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PlatformKind::Baidu => "百度网盘",
            PlatformKind::Aliyun => "阿里云盘",
            PlatformKind::Quark => "夸克网盘",
            PlatformKind::Pan123 => "123盘",
            PlatformKind::Weiyun => "腾讯微云",
            PlatformKind::Wangpan115 => "115网盘",
            PlatformKind::Lanzou => "蓝奏云",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PlatformKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}

// =============================================================================
// Types
// =============================================================================

/// One URL surface form of a platform.
#[derive(Debug)]
pub struct UrlForm {
    pub name: &'static str,
    regex: Regex,
}

impl UrlForm {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("static url form must compile"),
        }
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

#[derive(Debug)]
pub struct PlatformPattern {
    pub kind: PlatformKind,
    pub display_name: &'static str,
    /// Substrings one of which must appear before the forms are tried.
    pub hosts: &'static [&'static str],
    pub forms: Vec<UrlForm>,
    /// Label or query expression for a password written near the link.
    pub password_pattern: Option<Regex>,
}

/// Captured pieces of one form match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlCapture {
    pub form: &'static str,
    pub start: usize,
    pub end: usize,
    pub matched: String,
    pub share_id: String,
    pub password: Option<String>,
}

impl UrlCapture {
    fn from_captures(form: &'static str, caps: &Captures<'_>) -> Option<Self> {
        let whole = caps.get(0)?;
        let share_id = caps.name("share_id")?.as_str().to_string();
        Some(Self {
            form,
            start: whole.start(),
            end: whole.end(),
            matched: whole.as_str().to_string(),
            share_id,
            password: caps.name("password").map(|m| m.as_str().to_string()),
        })
    }
}

/// A match found by a global scan of free text, byte offsets into that text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOccurrence {
    pub platform: PlatformKind,
    pub capture: UrlCapture,
}

impl RawOccurrence {
    fn overlaps(&self, other: &RawOccurrence) -> bool {
        self.capture.start < other.capture.end && other.capture.start < self.capture.end
    }
}

// =============================================================================
// PatternRegistry
// =============================================================================

const SHARE_ID: &str = r"(?P<share_id>[A-Za-z0-9_-]+)";
const PASSWORD: &str = r"(?P<password>[A-Za-z0-9]{4})";
/// Optional `?pwd=xxxx` suffix; a longer value is left out of the match.
const PWD_QUERY: &str = r"(?:[?&]pwd=(?P<password>[A-Za-z0-9]{4})(?-u:\b))?";
const PAN123_QUERY: &str =
    r"(?:[?&](?:pwd|extraction-code)=(?P<password>[A-Za-z0-9]{4})(?-u:\b))?";

static REGISTRY: OnceLock<PatternRegistry> = OnceLock::new();

/// Platforms in detection priority order.
#[derive(Debug)]
pub struct PatternRegistry {
    platforms: Vec<PlatformPattern>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternRegistry {
    pub fn new() -> Self {
        let platforms = vec![
            PlatformPattern {
                kind: PlatformKind::Baidu,
                display_name: PlatformKind::Baidu.display_name(),
                hosts: &["pan.baidu.com"],
                forms: vec![
                    UrlForm::new(
                        "standard",
                        &format!(r"https?://pan\.baidu\.com/s/{}{}", SHARE_ID, PWD_QUERY),
                    ),
                    UrlForm::new(
                        "init",
                        &format!(
                            r"https?://pan\.baidu\.com/share/init\?surl={}{}",
                            SHARE_ID, PWD_QUERY
                        ),
                    ),
                ],
                password_pattern: None,
            },
            PlatformPattern {
                kind: PlatformKind::Aliyun,
                display_name: PlatformKind::Aliyun.display_name(),
                hosts: &["aliyundrive.com", "alipan.com"],
                forms: vec![UrlForm::new(
                    "standard",
                    &format!(
                        r"https?://(?:www\.aliyundrive\.com|www\.alipan\.com)/s/{}{}",
                        SHARE_ID, PWD_QUERY
                    ),
                )],
                password_pattern: Some(label_regex(r"[?&]pwd=")),
            },
            PlatformPattern {
                kind: PlatformKind::Pan123,
                display_name: PlatformKind::Pan123.display_name(),
                hosts: &["123pan.com", "123684.com"],
                forms: vec![UrlForm::new(
                    "standard",
                    &format!(
                        r"https?://(?:www\.123pan\.com|www\.123684\.com)/s/{}{}",
                        SHARE_ID, PAN123_QUERY
                    ),
                )],
                password_pattern: Some(label_regex(r"[?&](?:pwd|extraction-code)=")),
            },
            PlatformPattern {
                kind: PlatformKind::Weiyun,
                display_name: PlatformKind::Weiyun.display_name(),
                hosts: &["share.weiyun.com"],
                forms: vec![UrlForm::new(
                    "standard",
                    &format!(r"https?://share\.weiyun\.com/{}{}", SHARE_ID, PWD_QUERY),
                )],
                password_pattern: None,
            },
            PlatformPattern {
                kind: PlatformKind::Wangpan115,
                display_name: PlatformKind::Wangpan115.display_name(),
                hosts: &["115.com"],
                forms: vec![UrlForm::new(
                    "standard",
                    &format!(r"https?://115\.com/s/{}{}", SHARE_ID, PWD_QUERY),
                )],
                password_pattern: None,
            },
            PlatformPattern {
                kind: PlatformKind::Lanzou,
                display_name: PlatformKind::Lanzou.display_name(),
                hosts: &["lanzou"],
                forms: vec![UrlForm::new(
                    "standard",
                    &format!(
                        r"https?://(?:[A-Za-z0-9-]+\.)?lanzou[a-z]*\.com/{}{}",
                        SHARE_ID, PWD_QUERY
                    ),
                )],
                password_pattern: None,
            },
            PlatformPattern {
                kind: PlatformKind::Quark,
                display_name: PlatformKind::Quark.display_name(),
                hosts: &["pan.quark.cn"],
                forms: vec![UrlForm::new(
                    "standard",
                    &format!(r"https?://pan\.quark\.cn/s/{}{}", SHARE_ID, PWD_QUERY),
                )],
                password_pattern: None,
            },
        ];

        Self { platforms }
    }

    /// Process-wide registry, compiled on first use.
    pub fn global() -> &'static PatternRegistry {
        REGISTRY.get_or_init(PatternRegistry::new)
    }

    pub fn platforms(&self) -> &[PlatformPattern] {
        &self.platforms
    }

    pub fn get(&self, kind: PlatformKind) -> Option<&PlatformPattern> {
        self.platforms.iter().find(|p| p.kind == kind)
    }

    /// First platform (in priority order) whose form matches `url`.
    pub fn match_url(&self, url: &str) -> Option<(&PlatformPattern, UrlCapture)> {
        for platform in &self.platforms {
            if !platform.hosts.iter().any(|host| url.contains(host)) {
                continue;
            }
            for form in &platform.forms {
                if let Some(capture) = form
                    .regex
                    .captures(url)
                    .and_then(|caps| UrlCapture::from_captures(form.name, &caps))
                {
                    return Some((platform, capture));
                }
            }
        }
        None
    }

    /// Every form run over `text`; lower-priority spans overlapping an
    /// accepted one are dropped. Sorted by start offset.
    pub fn find_all(&self, text: &str) -> Vec<RawOccurrence> {
        let mut accepted: Vec<RawOccurrence> = Vec::new();

        for platform in &self.platforms {
            if !platform.hosts.iter().any(|host| text.contains(host)) {
                continue;
            }
            for form in &platform.forms {
                for caps in form.regex.captures_iter(text) {
                    let Some(capture) = UrlCapture::from_captures(form.name, &caps) else {
                        continue;
                    };
                    let occurrence = RawOccurrence {
                        platform: platform.kind,
                        capture,
                    };
                    if accepted.iter().any(|prev| prev.overlaps(&occurrence)) {
                        continue;
                    }
                    accepted.push(occurrence);
                }
            }
        }

        accepted.sort_by_key(|occ| occ.capture.start);
        accepted
    }
}

/// `提取码: xxxx` style labels or the platform's own query parameter.
fn label_regex(query: &str) -> Regex {
    Regex::new(&format!(
        r"(?i)(?:(?:提取|访问|密)?码[：:]\s*|{}\s*){}",
        query, PASSWORD
    ))
    .expect("static password pattern must compile")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        let registry = PatternRegistry::new();
        let order: Vec<_> = registry.platforms().iter().map(|p| p.kind.as_str()).collect();
        assert_eq!(
            order,
            vec!["baidu", "aliyun", "pan123", "weiyun", "wangpan115", "lanzou", "quark"]
        );
    }

    #[test]
    fn test_baidu_standard_before_init() {
        let registry = PatternRegistry::new();
        let (platform, capture) = registry
            .match_url("https://pan.baidu.com/s/1AbC-_x9")
            .unwrap();
        assert_eq!(platform.kind, PlatformKind::Baidu);
        assert_eq!(capture.form, "standard");
        assert_eq!(capture.share_id, "1AbC-_x9");
        assert_eq!(capture.password, None);
    }

    #[test]
    fn test_baidu_init_with_password() {
        let registry = PatternRegistry::new();
        let (_, capture) = registry
            .match_url("https://pan.baidu.com/share/init?surl=xyz123&pwd=ab12")
            .unwrap();
        assert_eq!(capture.form, "init");
        assert_eq!(capture.share_id, "xyz123");
        assert_eq!(capture.password.as_deref(), Some("ab12"));
    }

    #[test]
    fn test_every_platform_matches() {
        let registry = PatternRegistry::new();
        let cases = [
            ("https://www.alipan.com/s/Xy9", PlatformKind::Aliyun),
            ("https://www.aliyundrive.com/s/Xy9", PlatformKind::Aliyun),
            ("https://www.123pan.com/s/ab-c", PlatformKind::Pan123),
            ("https://www.123684.com/s/ab-c", PlatformKind::Pan123),
            ("https://share.weiyun.com/q1w2", PlatformKind::Weiyun),
            ("https://115.com/s/sw3", PlatformKind::Wangpan115),
            ("https://wwi.lanzoux.com/iAbc", PlatformKind::Lanzou),
            ("https://pan.quark.cn/s/3f9c", PlatformKind::Quark),
        ];
        for (url, kind) in cases {
            let (platform, _) = registry.match_url(url).unwrap_or_else(|| panic!("{}", url));
            assert_eq!(platform.kind, kind, "{}", url);
        }
    }

    #[test]
    fn test_unknown_host_is_none() {
        let registry = PatternRegistry::new();
        assert!(registry.match_url("https://example.com/s/abc").is_none());
        assert!(registry.match_url("pan.baidu.com/s/abc").is_none());
    }

    #[test]
    fn test_pwd_query_on_every_form() {
        let registry = PatternRegistry::new();
        for url in [
            "https://pan.baidu.com/s/1abcXYZ?pwd=zz99",
            "https://pan.quark.cn/s/3f9c?pwd=zz99",
            "https://share.weiyun.com/q1w2?pwd=zz99",
            "https://115.com/s/sw3?pwd=zz99",
            "https://wwi.lanzoux.com/iAbc?pwd=zz99",
        ] {
            let (_, capture) = registry.match_url(url).unwrap_or_else(|| panic!("{}", url));
            assert_eq!(capture.password.as_deref(), Some("zz99"), "{}", url);
            assert_eq!(capture.matched, url);
        }
    }

    #[test]
    fn test_long_pwd_value_not_captured() {
        let registry = PatternRegistry::new();
        let (_, capture) = registry
            .match_url("https://pan.quark.cn/s/3f9c?pwd=zz99abc")
            .unwrap();
        assert_eq!(capture.password, None);
        assert_eq!(capture.matched, "https://pan.quark.cn/s/3f9c");
    }

    #[test]
    fn test_pan123_extraction_code_param() {
        let registry = PatternRegistry::new();
        let (_, capture) = registry
            .match_url("https://www.123pan.com/s/abc?extraction-code=Zz11")
            .unwrap();
        assert_eq!(capture.password.as_deref(), Some("Zz11"));
    }

    #[test]
    fn test_find_all_sorted_by_offset() {
        let registry = PatternRegistry::new();
        let text = "夸克 https://pan.quark.cn/s/aaa 百度 https://pan.baidu.com/s/bbb";
        let found = registry.find_all(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].platform, PlatformKind::Quark);
        assert_eq!(found[1].platform, PlatformKind::Baidu);
        assert!(found[0].capture.start < found[1].capture.start);
        let baidu = &found[1].capture;
        assert_eq!(&text[baidu.start..baidu.end], "https://pan.baidu.com/s/bbb");
    }

    #[test]
    fn test_platform_password_pattern() {
        let registry = PatternRegistry::new();
        let aliyun = registry.get(PlatformKind::Aliyun).unwrap();
        let pattern = aliyun.password_pattern.as_ref().unwrap();
        let caps = pattern.captures("链接见上 提取码：k9Q2 谢谢").unwrap();
        assert_eq!(&caps["password"], "k9Q2");
        assert!(registry.get(PlatformKind::Quark).unwrap().password_pattern.is_none());
    }

    #[test]
    fn test_platform_kind_parse() {
        assert_eq!("pan123".parse::<PlatformKind>().unwrap(), PlatformKind::Pan123);
        assert!("dropbox".parse::<PlatformKind>().is_err());
        assert_eq!(serde_json::to_string(&PlatformKind::Wangpan115).unwrap(), "\"wangpan115\"");
    }
}
