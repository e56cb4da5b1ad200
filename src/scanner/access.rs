//! Access decisions for a clicked affordance.
//!
//! The glue layer performs the actual navigation and backend round trip;
//! these functions only decide what to do and which URL to open.

use serde::{Deserialize, Serialize};

/// What the glue should do after a button click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClickAction {
    /// Open the share page with the password pre-filled where supported.
    OpenWithPassword { url: String, password: String },
    /// Open the raw link; the user enters the password at the destination.
    OpenDirect { url: String },
    /// Ask the backend for a password, then call `resolve_password_response`.
    RequestPassword { url: String },
}

/// Backend answer to a password request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordResponse {
    pub success: bool,
    pub password: Option<String>,
    pub message: Option<String>,
}

/// Share URLs that accept the password as a `pwd` query parameter.
fn accepts_pwd_param(url: &str) -> bool {
    url.contains("pan.baidu.com/share/init")
        || ((url.contains("aliyundrive.com") || url.contains("alipan.com")) && url.contains("/s/"))
        || ((url.contains("123pan.com") || url.contains("123684.com")) && url.contains("/s/"))
}

/// URL to open for `url` with a known `password`.
pub fn access_url(url: &str, password: &str) -> String {
    if password.is_empty() || url.contains("pwd=") || !accepts_pwd_param(url) {
        return url.to_string();
    }
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair("pwd", password);
            parsed.to_string()
        }
        Err(_) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{}{}pwd={}", url, separator, password)
        }
    }
}

pub fn resolve_click(url: &str, password: Option<&str>, offline: bool) -> ClickAction {
    match password.filter(|p| !p.is_empty()) {
        Some(password) => ClickAction::OpenWithPassword {
            url: access_url(url, password),
            password: password.to_string(),
        },
        None if offline => ClickAction::OpenDirect {
            url: url.to_string(),
        },
        None => ClickAction::RequestPassword {
            url: url.to_string(),
        },
    }
}

pub fn resolve_password_response(url: &str, response: &PasswordResponse) -> ClickAction {
    match response.password.as_deref().filter(|p| response.success && !p.is_empty()) {
        Some(password) => ClickAction::OpenWithPassword {
            url: access_url(url, password),
            password: password.to_string(),
        },
        None => ClickAction::OpenDirect {
            url: url.to_string(),
        },
    }
}
