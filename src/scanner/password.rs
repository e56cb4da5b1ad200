//! PasswordInference: Guess a share link's extraction code from nearby text
//!
//! Candidates come from labelled patterns (`提取码: ab12`, `pwd: ab12`, ...)
//! in priority order, then bare four-character tokens as a last resort.
//! When a page carries several candidates, the ones closest to the URL win.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordCandidate {
    pub token: String,
    /// Byte offset of the token in the scanned text.
    pub source_index: usize,
    /// 0 = strongest label pattern; the bare-token fallback is last.
    pub pattern_priority: usize,
}

static LABEL_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn label_patterns() -> &'static [Regex] {
    LABEL_PATTERNS.get_or_init(|| {
        [
            r"(?i)(?:提取码|密码|访问码|提取密码|验证码)[：:]\s*(?P<token>[A-Za-z0-9]{4})",
            r"(?i)(?:pw|pwd|pass|password)[：:]\s*(?P<token>[A-Za-z0-9]{4})",
            r"(?i)(?:code|验证|校验码)[：:]\s*(?P<token>[A-Za-z0-9]{4})",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static password label must compile"))
        .collect()
    })
}

/// Priority assigned to bare tokens.
pub const BARE_TOKEN_PRIORITY: usize = 3;

static BARE_TOKEN: OnceLock<Regex> = OnceLock::new();
static URL_SPAN: OnceLock<Regex> = OnceLock::new();

/// Four ASCII alphanumerics between ASCII word boundaries, so `x7k2` in
/// `密码是x7k2哦` counts. Tokens inside a URL (share ids, `init`, `surl`) do not.
fn bare_tokens(text: &str) -> Vec<(usize, &str)> {
    let token = BARE_TOKEN.get_or_init(|| {
        Regex::new(r"(?-u:\b)[A-Za-z0-9]{4}(?-u:\b)").expect("static token pattern")
    });
    let url = URL_SPAN.get_or_init(|| Regex::new(r"https?://[!-~]+").expect("static url pattern"));

    let urls: Vec<_> = url.find_iter(text).map(|m| m.range()).collect();
    token
        .find_iter(text)
        .filter(|m| !urls.iter().any(|span| span.contains(&m.start())))
        .map(|m| (m.start(), m.as_str()))
        .collect()
}

// =============================================================================
// PasswordInference
// =============================================================================

#[derive(Debug, Clone)]
pub struct PasswordInference {
    window: usize,
}

impl Default for PasswordInference {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PasswordInference {
    /// `window`: characters searched on each side of a URL.
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    /// All candidates in priority order, each token once.
    pub fn extract_candidates(&self, text: &str) -> Vec<PasswordCandidate> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for (priority, pattern) in label_patterns().iter().enumerate() {
            for caps in pattern.captures_iter(text) {
                let Some(token) = caps.name("token") else { continue };
                if seen.insert(token.as_str().to_string()) {
                    out.push(PasswordCandidate {
                        token: token.as_str().to_string(),
                        source_index: token.start(),
                        pattern_priority: priority,
                    });
                }
            }
        }

        for (index, token) in bare_tokens(text) {
            if seen.insert(token.to_string()) {
                out.push(PasswordCandidate {
                    token: token.to_string(),
                    source_index: index,
                    pattern_priority: BARE_TOKEN_PRIORITY,
                });
            }
        }

        out
    }

    /// Pick the password for one link.
    ///
    /// Inline password > sole candidate > first pattern hit inside the
    /// proximity window around the URL > first candidate.
    pub fn choose(
        &self,
        inline: Option<&str>,
        canonical_url: &str,
        raw_url: &str,
        text: &str,
        candidates: &[PasswordCandidate],
    ) -> Option<String> {
        if let Some(password) = inline {
            return Some(password.to_string());
        }
        match candidates {
            [] => return None,
            [only] => return Some(only.token.clone()),
            _ => {}
        }

        let located = text
            .find(raw_url)
            .map(|idx| (idx, raw_url.len()))
            .or_else(|| text.find(canonical_url).map(|idx| (idx, canonical_url.len())));

        if let Some((start, len)) = located {
            let window = char_window(text, start, start + len, self.window);
            if let Some(token) = first_in_window(window) {
                return Some(token);
            }
        }

        candidates.first().map(|c| c.token.clone())
    }

    /// Convenience: candidates as plain strings.
    pub fn extract_passwords(&self, text: &str) -> Vec<String> {
        self.extract_candidates(text)
            .into_iter()
            .map(|c| c.token)
            .collect()
    }
}

fn first_in_window(window: &str) -> Option<String> {
    for pattern in label_patterns() {
        if let Some(token) = pattern.captures(window).and_then(|caps| caps.name("token")) {
            return Some(token.as_str().to_string());
        }
    }
    bare_tokens(window).first().map(|(_, token)| token.to_string())
}

/// Slice of `text` extending `radius` characters before `start` and after
/// `end` (byte offsets on char boundaries).
pub(crate) fn char_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let from = text[..start]
        .char_indices()
        .rev()
        .nth(radius.saturating_sub(1))
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    let from = if radius == 0 { start } else { from };
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(idx, _)| end + idx)
        .unwrap_or(text.len());
    &text[from..to]
}

/// Heuristic confidence in `[0, 10]` that `password` is the code for a link
/// described by `context`.
pub fn evaluate_likelihood(password: &str, context: &str) -> f64 {
    let mut score = 0.0;

    if label_patterns()
        .iter()
        .take(2)
        .any(|pattern| pattern.is_match(context))
    {
        score += 5.0;
    }

    if let Some(byte_idx) = context.find(password) {
        let position = context[..byte_idx].chars().count() as f64;
        let length = context.chars().count().max(1) as f64;
        let centered = 3.0 - ((position / length) - 0.5).abs() * 6.0;
        score += centered.max(0.0);
    }

    if password.len() == 4 && password.bytes().all(|b| b.is_ascii_alphanumeric()) {
        score += 2.0;
    }

    f64::min(score, 10.0)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_candidates_in_priority_order() {
        let inference = PasswordInference::default();
        let candidates = inference.extract_candidates("随便写的code:cd34，提取码: ab12");
        assert_eq!(candidates[0].token, "ab12");
        assert_eq!(candidates[0].pattern_priority, 0);
        assert_eq!(candidates[1].token, "cd34");
        assert_eq!(candidates[1].pattern_priority, 2);
    }

    #[test]
    fn test_duplicates_removed() {
        let inference = PasswordInference::default();
        let tokens = inference.extract_passwords("提取码：ab12 again ab12 pwd: ab12");
        assert_eq!(tokens.iter().filter(|t| *t == "ab12").count(), 1);
    }

    #[test]
    fn test_bare_tokens_next_to_cjk() {
        let tokens: Vec<_> = bare_tokens("密码是x7k2哦 abcde a_bc q1w2")
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(tokens, vec!["x7k2", "q1w2"]);
    }

    #[test]
    fn test_bare_tokens_skip_urls() {
        let inference = PasswordInference::default();
        let text = concat!(
            "资源 https://pan.quark.cn/s/3f9c 和 ",
            "https://pan.baidu.com/share/init?surl=abcd 备用 qq88"
        );
        assert_eq!(inference.extract_passwords(text), vec!["qq88".to_string()]);
        assert!(inference.extract_passwords("只有链接 https://pan.quark.cn/s/3f9c").is_empty());
    }

    #[test]
    fn test_choose_inline_wins() {
        let inference = PasswordInference::default();
        let candidates = inference.extract_candidates("提取码: ab12");
        let chosen = inference.choose(Some("zz99"), "u", "u", "提取码: ab12", &candidates);
        assert_eq!(chosen.as_deref(), Some("zz99"));
    }

    #[test]
    fn test_choose_single_candidate() {
        let inference = PasswordInference::default();
        let text = "链接 https://pan.quark.cn/s/abc 提取码: ab12";
        let candidates = inference.extract_candidates(text);
        let url = "https://pan.quark.cn/s/abc";
        let chosen = inference.choose(None, url, url, text, &candidates);
        assert_eq!(chosen.as_deref(), Some("ab12"));
    }

    #[test]
    fn test_choose_uses_proximity_window() {
        let inference = PasswordInference::default();
        let filler = "。".repeat(150);
        let url = "https://pan.quark.cn/s/abcdef";
        let text = format!("提取码: aa11 {} {} 提取码: bb22", filler, url);
        let candidates = inference.extract_candidates(&text);
        let chosen = inference.choose(None, url, url, &text, &candidates);
        assert_eq!(chosen.as_deref(), Some("bb22"));
    }

    #[test]
    fn test_choose_falls_back_to_first_candidate() {
        let inference = PasswordInference::default();
        let text = "提取码: aa11 提取码: bb22";
        let candidates = inference.extract_candidates(text);
        let chosen = inference.choose(None, "missing", "missing", text, &candidates);
        assert_eq!(chosen.as_deref(), Some("aa11"));
    }

    #[test]
    fn test_choose_without_candidates() {
        let inference = PasswordInference::default();
        assert_eq!(inference.choose(None, "u", "u", "nothing here!", &[]), None);
    }

    #[test]
    fn test_char_window_counts_chars() {
        let text = "一二三URL四五六";
        let start = text.find("URL").unwrap();
        assert_eq!(char_window(text, start, start + 3, 2), "二三URL四五");
        assert_eq!(char_window(text, start, start + 3, 10), text);
    }

    #[test]
    fn test_likelihood_scores() {
        let strong = evaluate_likelihood("ab12", "链接在上面 提取码: ab12 请查收");
        let weak = evaluate_likelihood("ab12", "ab12 随便");
        assert!(strong > weak);
        assert!(strong <= 10.0);
        assert_eq!(evaluate_likelihood("toolong", "nothing"), 0.0);
    }
}
