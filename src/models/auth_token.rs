//! Token endpoint results

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_seconds, lenient_timestamp, IDTokenClaims, Received, ReceivedPayload};

// ---------------------------------------------------------------------------
// AuthToken
// ---------------------------------------------------------------------------

/// Result of a code exchange or a silent refresh
///
/// Either `error` is set (the provider rejected the request) or at least one
/// of `id_token` / `access_token` is set. A refresh produces a new value; the
/// stored token is replaced, never patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Claims decoded from `id_token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token_claims: Option<IDTokenClaims>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_timestamp"
    )]
    pub not_before: Option<DateTime<Utc>>,

    /// Access token lifetime in seconds
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient_seconds")]
    pub expires_in: Option<u64>,

    /// Base64 JSON `{uid, utid}` identifying the home account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,

    /// Space separated granted scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient_seconds")]
    pub refresh_token_expires_in: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_uri: Option<String>,

    /// Fields without a dedicated member (`ext_expires_in`, `correlation_id`, ...)
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,

    #[serde(skip)]
    pub received: Received,
}

impl AuthToken {
    /// Provider-side failure result
    pub fn from_error(error: impl Into<String>, description: Option<String>) -> Self {
        Self {
            error: Some(error.into()),
            error_description: description,
            ..Default::default()
        }
    }

    /// Returns `true` when the provider rejected the request
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Granted scopes as a list
    pub fn scopes(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// One line summary of the provider error, for logs
    pub fn error_summary(&self) -> String {
        match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => format!("{}: {}", error, description),
            (Some(error), None) => error.clone(),
            (None, _) => "no error".to_string(),
        }
    }
}

impl ReceivedPayload for AuthToken {
    fn set_received(&mut self, raw: serde_json::Value) {
        self.received = Received(Some(raw));
    }

    fn received(&self) -> Option<&serde_json::Value> {
        self.received.get()
    }
}

// ---------------------------------------------------------------------------
// BearerToken
// ---------------------------------------------------------------------------

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Token response returned to API clients
///
/// Serializes as `{"access_token": ..., "token_type": "bearer"}` and accepts
/// `token` in place of `access_token` on input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    #[serde(alias = "token")]
    pub access_token: String,

    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl BearerToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
        }
    }

    /// `{"Authorization": "<token_type> <token>"}`
    ///
    /// # Examples
    ///
    /// ```
    /// use msal_authcode::models::BearerToken;
    ///
    /// let header = BearerToken::new("abc").generate_header();
    /// assert_eq!(header.get("Authorization").map(String::as_str), Some("bearer abc"));
    /// ```
    pub fn generate_header(&self) -> HashMap<String, String> {
        HashMap::from([(
            "Authorization".to_string(),
            format!("{} {}", self.token_type, self.access_token),
        )])
    }
}
