//! Error types shared by the DOM layer and the scanner.
//!
//! Detection misses are not errors (they are `None`); only DOM writes,
//! settings parsing and session gating can fail.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A DOM write was rejected by the page (or the in-memory tree).
    #[error("DOM write failed during {op}: {reason}")]
    DomWrite { op: &'static str, reason: String },

    /// The node was removed from the document between detection and replacement.
    #[error("node is no longer attached to the document")]
    Detached,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Scan requested before settings were hydrated.
    #[error("scan session is not ready")]
    NotReady,
}

impl CoreError {
    pub fn dom_write(op: &'static str, reason: impl Into<String>) -> Self {
        CoreError::DomWrite {
            op,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

impl From<CoreError> for wasm_bindgen::JsValue {
    fn from(err: CoreError) -> Self {
        wasm_bindgen::JsValue::from_str(&err.to_string())
    }
}
