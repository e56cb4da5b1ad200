//! URL canonicalization for deduplication.
//!
//! Baidu share links have two surface forms (`/s/{id}` and
//! `/share/init?surl={id}`) that collapse to one canonical URL. Every other
//! platform is only trimmed.

use regex::Regex;
use std::sync::OnceLock;

static BAIDU_STANDARD: OnceLock<Regex> = OnceLock::new();
static BAIDU_INIT: OnceLock<Regex> = OnceLock::new();
static PWD_PARAM: OnceLock<Regex> = OnceLock::new();

fn baidu_standard() -> &'static Regex {
    BAIDU_STANDARD.get_or_init(|| {
        Regex::new(r"pan\.baidu\.com/s/([A-Za-z0-9_-]+)").expect("static regex")
    })
}

fn baidu_init() -> &'static Regex {
    BAIDU_INIT.get_or_init(|| {
        Regex::new(r"pan\.baidu\.com/share/init\?surl=([A-Za-z0-9_-]+)").expect("static regex")
    })
}

fn pwd_param() -> &'static Regex {
    PWD_PARAM.get_or_init(|| Regex::new(r"[?&]pwd=([^&#/\s]+)").expect("static regex"))
}

/// Canonical identity of a share URL. Pure and idempotent.
pub fn normalize(url: &str) -> String {
    let trimmed = url
        .trim_start()
        .trim_end_matches(|c: char| c == '/' || c.is_whitespace());

    if !trimmed.contains("pan.baidu.com") {
        return trimmed.to_string();
    }

    let mut share_id = baidu_standard()
        .captures(trimmed)
        .map(|caps| caps[1].to_string());
    // init form wins when both appear
    if let Some(caps) = baidu_init().captures(trimmed) {
        share_id = Some(caps[1].to_string());
    }

    match share_id {
        Some(id) => {
            let mut canonical = format!("https://pan.baidu.com/s/{}", id);
            if let Some(caps) = pwd_param().captures(trimmed) {
                canonical.push_str("?pwd=");
                canonical.push_str(&caps[1]);
            }
            canonical
        }
        None => trimmed.to_string(),
    }
}

/// `pwd` query parameter of a URL, percent-decoded.
pub fn query_password(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url.trim()).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "pwd")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trailing_slashes_stripped() {
        assert_eq!(normalize("https://pan.quark.cn/s/abc///"), "https://pan.quark.cn/s/abc");
        assert_eq!(normalize("  https://pan.quark.cn/s/abc / "), "https://pan.quark.cn/s/abc");
    }

    #[test]
    fn test_baidu_forms_collapse() {
        assert_eq!(
            normalize("https://pan.baidu.com/share/init?surl=abc123"),
            normalize("https://pan.baidu.com/s/abc123")
        );
        assert_eq!(normalize("http://pan.baidu.com/s/abc123/"), "https://pan.baidu.com/s/abc123");
    }

    #[test]
    fn test_baidu_password_kept() {
        assert_eq!(
            normalize("https://pan.baidu.com/share/init?surl=abc123&pwd=x7k2"),
            "https://pan.baidu.com/s/abc123?pwd=x7k2"
        );
    }

    #[test]
    fn test_other_platforms_untouched() {
        let url = "https://www.alipan.com/s/Xy9?pwd=ab12";
        assert_eq!(normalize(url), url);
    }

    #[test]
    fn test_baidu_without_share_id() {
        assert_eq!(
            normalize("https://pan.baidu.com/disk/home/"),
            "https://pan.baidu.com/disk/home"
        );
    }

    #[test]
    fn test_query_password() {
        assert_eq!(
            query_password("https://www.alipan.com/s/abc?pwd=ab12").as_deref(),
            Some("ab12")
        );
        assert_eq!(
            query_password("https://pan.quark.cn/s/3f9c?from=share&pwd=zz99").as_deref(),
            Some("zz99")
        );
        assert_eq!(query_password("https://pan.quark.cn/s/3f9c?pwd="), None);
        assert_eq!(query_password("not a url"), None);
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(url in ".{0,80}") {
            let once = normalize(&url);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn prop_baidu_urls_idempotent(
            id in "[A-Za-z0-9_-]{1,16}",
            pwd in proptest::option::of("[A-Za-z0-9]{4}"),
            init in any::<bool>(),
            slashes in 0usize..3,
        ) {
            let mut url = if init {
                format!("https://pan.baidu.com/share/init?surl={}", id)
            } else {
                format!("https://pan.baidu.com/s/{}", id)
            };
            if let Some(pwd) = &pwd {
                url.push_str(if init { "&pwd=" } else { "?pwd=" });
                url.push_str(pwd);
            }
            url.push_str(&"/".repeat(slashes));
            let once = normalize(&url);
            prop_assert_eq!(normalize(&once), once.clone());
            prop_assert!(once.starts_with("https://pan.baidu.com/s/"));
        }
    }
}
