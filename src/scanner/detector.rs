//! LinkDetector: Recognize share URLs in hrefs and free text

use serde::{Deserialize, Serialize};

use super::normalize::{normalize, query_password};
use super::password::char_window;
use super::patterns::{PatternRegistry, PlatformKind};
use super::registry::LinkDescriptor;

/// One share URL found inside a text, byte offsets into that text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMatch {
    pub start: usize,
    pub end: usize,
    pub raw_url: String,
    pub canonical_url: String,
    pub platform: PlatformKind,
    pub share_id: String,
    /// Password carried by the URL itself.
    pub inline_password: Option<String>,
    /// Platform-labelled password found within the proximity window.
    pub nearby_password: Option<String>,
}

impl LinkMatch {
    pub fn to_descriptor(&self) -> LinkDescriptor {
        LinkDescriptor::new(
            self.raw_url.clone(),
            self.canonical_url.clone(),
            self.platform,
            self.share_id.clone(),
            self.inline_password.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct LinkDetector {
    registry: &'static PatternRegistry,
    proximity_window: usize,
}

impl Default for LinkDetector {
    fn default() -> Self {
        Self::new(100)
    }
}

impl LinkDetector {
    pub fn new(proximity_window: usize) -> Self {
        Self {
            registry: PatternRegistry::global(),
            proximity_window,
        }
    }

    /// Classify one URL (typically an anchor `href`). A `pwd` query the form
    /// did not capture still counts as the inline password.
    pub fn detect_single(&self, url: &str) -> Option<LinkDescriptor> {
        let (platform, capture) = self.registry.match_url(url)?;
        let password = capture.password.or_else(|| query_password(url));
        Some(LinkDescriptor::new(
            url,
            normalize(url),
            platform.kind,
            capture.share_id,
            password,
        ))
    }

    /// Every share URL in `text`, in order of appearance.
    pub fn extract_all<'a>(&'a self, text: &'a str) -> impl Iterator<Item = LinkMatch> + 'a {
        self.registry
            .find_all(text)
            .into_iter()
            .filter(move |occ| !is_markup_boundary(text, occ.capture.start, occ.capture.end))
            .map(move |occ| {
                let capture = occ.capture;
                let nearby_password = if capture.password.is_none() {
                    self.nearby_password(occ.platform, text, capture.start, capture.end)
                } else {
                    None
                };
                LinkMatch {
                    start: capture.start,
                    end: capture.end,
                    canonical_url: normalize(&capture.matched),
                    raw_url: capture.matched,
                    platform: occ.platform,
                    share_id: capture.share_id,
                    inline_password: capture.password,
                    nearby_password,
                }
            })
    }

    fn nearby_password(
        &self,
        platform: PlatformKind,
        text: &str,
        start: usize,
        end: usize,
    ) -> Option<String> {
        let pattern = self.registry.get(platform)?.password_pattern.as_ref()?;
        let window = char_window(text, start, end, self.proximity_window);
        pattern
            .captures(window)
            .and_then(|caps| caps.name("password"))
            .map(|m| m.as_str().to_string())
    }
}

/// A URL sitting inside an attribute value or tag is not page text.
fn is_markup_boundary(text: &str, start: usize, end: usize) -> bool {
    let is_quote = |c: char| c == '"' || c == '\'';
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    before.map_or(false, is_quote)
        || after.map_or(false, is_quote)
        || text[start..end].contains(|c: char| c == '<' || c == '>')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::registry::LifecycleState;

    #[test]
    fn test_detect_single_fills_descriptor() {
        let detector = LinkDetector::default();
        let link = detector
            .detect_single("https://pan.baidu.com/share/init?surl=abc123&pwd=x7k2")
            .unwrap();
        assert_eq!(link.platform, PlatformKind::Baidu);
        assert_eq!(link.canonical_url, "https://pan.baidu.com/s/abc123?pwd=x7k2");
        assert_eq!(link.share_id, "abc123");
        assert_eq!(link.password.as_deref(), Some("x7k2"));
        assert!(link.inline_password);
        assert_eq!(link.lifecycle_state, LifecycleState::Discovered);
        assert_eq!(link.display_name, "百度网盘");
    }

    #[test]
    fn test_detect_single_reads_pwd_query() {
        let detector = LinkDetector::default();
        let link = detector
            .detect_single("https://pan.baidu.com/s/1abcXYZ?pwd=zz99")
            .unwrap();
        assert_eq!(link.canonical_url, "https://pan.baidu.com/s/1abcXYZ?pwd=zz99");
        assert_eq!(link.password.as_deref(), Some("zz99"));
        assert!(link.inline_password);

        let link = detector
            .detect_single("https://pan.quark.cn/s/3f9c?from=feed&pwd=zz99abc")
            .unwrap();
        assert_eq!(link.password.as_deref(), Some("zz99abc"));
    }

    #[test]
    fn test_text_match_consumes_pwd_query() {
        let detector = LinkDetector::default();
        let text = "资源 https://pan.quark.cn/s/3f9c?pwd=zz99 提取码: ab12";
        let found: Vec<_> = detector.extract_all(text).collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].raw_url, "https://pan.quark.cn/s/3f9c?pwd=zz99");
        assert_eq!(found[0].inline_password.as_deref(), Some("zz99"));
        assert_eq!(&text[found[0].end..], " 提取码: ab12");
    }

    #[test]
    fn test_detect_single_none_for_plain_urls() {
        let detector = LinkDetector::default();
        assert!(detector.detect_single("https://example.com/").is_none());
        assert!(detector.detect_single("").is_none());
    }

    #[test]
    fn test_extract_all_offsets() {
        let detector = LinkDetector::default();
        let text = "资源：https://pan.quark.cn/s/3f9c 和 https://share.weiyun.com/q1w2";
        let found: Vec<_> = detector.extract_all(text).collect();
        assert_eq!(found.len(), 2);
        for m in &found {
            assert_eq!(&text[m.start..m.end], m.raw_url);
        }
        assert_eq!(found[1].platform, PlatformKind::Weiyun);
    }

    #[test]
    fn test_markup_boundary_discarded() {
        let detector = LinkDetector::default();
        let text = r#"<a href="https://pan.quark.cn/s/3f9c">x</a>"#;
        assert_eq!(detector.extract_all(text).count(), 0);
    }

    #[test]
    fn test_nearby_password_for_aliyun() {
        let detector = LinkDetector::default();
        let text = "阿里云 https://www.alipan.com/s/Xy9Tz 提取码：k9Q2";
        let found: Vec<_> = detector.extract_all(text).collect();
        assert_eq!(found[0].nearby_password.as_deref(), Some("k9Q2"));
        assert_eq!(found[0].inline_password, None);
    }

    #[test]
    fn test_no_nearby_lookup_for_quark() {
        let detector = LinkDetector::default();
        let text = "夸克 https://pan.quark.cn/s/3f9c 提取码：k9Q2";
        let found: Vec<_> = detector.extract_all(text).collect();
        assert_eq!(found[0].nearby_password, None);
    }

    #[test]
    fn test_same_identity_twice() {
        let detector = LinkDetector::default();
        let text = "https://pan.baidu.com/s/abc123 又见 https://pan.baidu.com/share/init?surl=abc123";
        let found: Vec<_> = detector.extract_all(text).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].canonical_url, found[1].canonical_url);
    }
}
