//! Wire types exchanged with the Kordiam API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-credentials token response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds from the moment of the request.
    pub expires_in: i64,
}

/// Body returned by the element-creation endpoint.
///
/// Only `id` is relied upon; Kordiam returns it as a number, some proxies
/// as a string.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedElement {
    pub id: Value,
}

impl CreatedElement {
    /// Identifier as text, when the body carries a usable one.
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }
}
