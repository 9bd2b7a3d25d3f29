use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

const REDACTED: &str = "***REDACTED***";
const SECRET_NAMES: [&str; 8] = [
    "authorization",
    "api-key",
    "api_key",
    "access_token",
    "token",
    "secret",
    "sig",
    "ocp-apim-subscription-key",
];

/// Controls the optional request/response echo on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDebugConfig {
    pub enabled: bool,
    pub redact_secrets: bool,
    pub max_body_chars: usize,
}

impl HttpDebugConfig {
    pub fn from_flag(enabled: bool) -> Self {
        Self {
            enabled,
            redact_secrets: true,
            max_body_chars: 2_000,
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::from_flag(false)
    }
}

pub fn redact_url(url: &Url, redact: bool) -> String {
    if !redact || url.query().is_none() {
        return url.to_string();
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if is_secret(&name) {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(kept);
    redacted.to_string()
}

pub fn header_lines(headers: &HeaderMap, redact: bool) -> Vec<String> {
    headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}",
                name.as_str(),
                shown_header_value(name.as_str(), value, redact)
            )
        })
        .collect()
}

fn shown_header_value(name: &str, value: &HeaderValue, redact: bool) -> String {
    if redact && is_secret(name) {
        return REDACTED.to_string();
    }

    value
        .to_str()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|_| "<non-utf8>".to_string())
}

/// Masks secret-looking keys anywhere inside a JSON body; other bodies pass through.
pub fn redact_body(raw: &str, redact: bool) -> String {
    if !redact {
        return raw.to_string();
    }

    let Ok(mut json) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    mask_secrets(&mut json);
    serde_json::to_string(&json).unwrap_or_else(|_| raw.to_string())
}

pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let total = input.chars().count();
    if total <= max_chars {
        return input.to_string();
    }

    let head: String = input.chars().take(max_chars).collect();
    format!("{head}... <truncated {} chars>", total - max_chars)
}

fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => map.iter_mut().for_each(|(key, item)| {
            if is_secret(key) {
                *item = Value::String(REDACTED.to_string());
            } else {
                mask_secrets(item);
            }
        }),
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

fn is_secret(name: &str) -> bool {
    SECRET_NAMES
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(name))
}
