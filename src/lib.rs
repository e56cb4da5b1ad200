//! netdisk-core: Share-link detection and page rewriting
//!
//! A Rust/WASM engine that finds cloud-storage ("netdisk") share links in a
//! page, infers their extraction codes from surrounding text and replaces
//! each link, once per logical link, with an access button.
//!
//! # Architecture
//!
//! ## Scanner Components
//! - `patterns.rs` - PatternRegistry: Static per-platform URL forms
//! - `detector.rs` - LinkDetector: hrefs and free-text URL recognition
//! - `normalize.rs` - Canonical URL identity (baidu form collapse)
//! - `password.rs` - PasswordInference: Labelled and bare-token extraction codes
//! - `registry.rs` - LinkRegistry: Per-session link lifecycle store
//! - `document.rs` - DocumentScanner: **Idempotent** replacement passes
//! - `watcher.rs` - MutationWatcher: Targeted scans and debounced rescans
//! - `change.rs` - ChangeDetector: Skip unchanged full rescans
//! - `conductor.rs` - ScanConductor: Session state machine
//!
//! ## Page Backends
//! - `dom::MemoryDom` - Arena DOM for tests and offline HTML rewriting
//! - `browser::WebDom` - Live `web_sys` DOM (feature `browser`)
//!
//! # Usage (WASM)
//! ```javascript,ignore
//! import init, { ContentSession, initLogging } from 'netdisk-core';
//!
//! await init();
//! initLogging('info');
//!
//! const session = new ContentSession(await getSettings());
//! session.start();
//! session.checkPageUrl();
//!
//! for (const req of session.drainSubmissions()) {
//!   submitLink(req).then(r => session.reportSubmission(req.url, r.success, r.message));
//! }
//! ```

pub mod config;
pub mod dom;
pub mod error;
pub mod logging;
pub mod scanner;
pub mod wasm;

#[cfg(feature = "browser")]
pub mod browser;

// Public exports
pub use config::{ScannerConfig, Settings};
pub use error::{CoreError, CoreResult};
pub use scanner::*;

use wasm_bindgen::prelude::*;

// When the `wee_alloc` feature is enabled, use `wee_alloc` as the global
// allocator for smaller WASM bundle size.
#[cfg(feature = "wee_alloc")]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

/// Initialize panic hook for better error messages in browser console
#[wasm_bindgen(start)]
pub fn main() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

/// Get version information
#[wasm_bindgen]
pub fn version() -> String {
    format!("netdisk-core v{}", env!("CARGO_PKG_VERSION"))
}
