//! WASM bindings for the pure parts of the engine
//!
//! Detection, normalization and password inference need no page; they are
//! exported as free functions. `rewriteHtml` runs a full session over an
//! HTML string with the in-memory DOM, for pages the caller already holds
//! as markup.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::config::{ScannerConfig, Settings};
use crate::dom::MemoryDom;
use crate::error::CoreResult;
use crate::logging;
use crate::scanner::{
    self, LinkDescriptor, LinkDetector, PasswordInference, ScanConductor, ScanReport, SubmitRequest,
};

// =============================================================================
// Helpers
// =============================================================================

fn to_js<T: Serialize + ?Sized>(value: &T) -> JsValue {
    serde_wasm_bindgen::to_value(value).unwrap_or(JsValue::NULL)
}

/// `undefined`/`null` mean defaults.
pub(crate) fn settings_from_js(value: JsValue) -> Result<Settings, JsValue> {
    if value.is_undefined() || value.is_null() {
        return Ok(Settings::default());
    }
    serde_wasm_bindgen::from_value(value)
        .map_err(|e| JsValue::from_str(&format!("Failed to parse settings: {}", e)))
}

// =============================================================================
// Detection
// =============================================================================

#[wasm_bindgen(js_name = "detectLink")]
pub fn detect_link(url: &str) -> JsValue {
    match LinkDetector::default().detect_single(url) {
        Some(link) => to_js(&link),
        None => JsValue::NULL,
    }
}

#[wasm_bindgen(js_name = "extractLinks")]
pub fn extract_links(text: &str) -> JsValue {
    let detector = LinkDetector::default();
    let matches: Vec<_> = detector.extract_all(text).collect();
    to_js(&matches)
}

#[wasm_bindgen(js_name = "normalizeUrl")]
pub fn normalize_url(url: &str) -> String {
    scanner::normalize(url)
}

// =============================================================================
// Passwords
// =============================================================================

#[wasm_bindgen(js_name = "extractPasswords")]
pub fn extract_passwords(text: &str) -> Vec<String> {
    PasswordInference::default().extract_passwords(text)
}

/// Best password for the share link `url` mentioned in `text`.
#[wasm_bindgen(js_name = "findPassword")]
pub fn find_password(text: &str, url: &str) -> Option<String> {
    let inference = PasswordInference::default();
    let link = LinkDetector::default().detect_single(url);
    let canonical = link
        .as_ref()
        .map_or_else(|| scanner::normalize(url), |l| l.canonical_url.clone());
    let inline = link.as_ref().and_then(|l| l.password.as_deref());
    let candidates = inference.extract_candidates(text);
    inference.choose(inline, &canonical, url, text, &candidates)
}

#[wasm_bindgen(js_name = "passwordLikelihood")]
pub fn password_likelihood(password: &str, context: &str) -> f64 {
    scanner::evaluate_likelihood(password, context)
}

#[wasm_bindgen(js_name = "accessUrl")]
pub fn access_url(url: &str, password: &str) -> String {
    scanner::access_url(url, password)
}

// =============================================================================
// Logging
// =============================================================================

/// Route `tracing` output to the console at `level` (`error` .. `trace`).
#[wasm_bindgen(js_name = "initLogging")]
pub fn init_logging(level: &str) -> bool {
    logging::init(level)
}

// =============================================================================
// HTML rewriting
// =============================================================================

/// Outcome of rewriting one HTML document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResult {
    pub html: String,
    pub report: ScanReport,
    pub links: Vec<LinkDescriptor>,
    pub submissions: Vec<SubmitRequest>,
}

/// Run one session over `html` and return the rewritten body markup.
pub fn rewrite_html(html: &str, settings: Settings, points: u32) -> CoreResult<RewriteResult> {
    let mut conductor = ScanConductor::new(MemoryDom::from_html(html), ScannerConfig::default());
    conductor.update_points(points);
    conductor.hydrate_settings(settings);
    let report = conductor.start()?;

    Ok(RewriteResult {
        html: conductor.scanner().dom().body_html(),
        report,
        links: conductor.discovered_links(),
        submissions: conductor.drain_submissions(),
    })
}

#[wasm_bindgen(js_name = "rewriteHtml")]
pub fn js_rewrite_html(html: &str, settings: JsValue, points: u32) -> Result<JsValue, JsValue> {
    let settings = settings_from_js(settings)?;
    let result = rewrite_html(html, settings, points)?;
    Ok(to_js(&result))
}
