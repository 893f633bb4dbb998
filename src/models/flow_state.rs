//! Login attempt state carried across the provider redirect

use serde::{Deserialize, Serialize};

use super::{Received, ReceivedPayload};
use crate::error::{MsalAuthError, Result};

/// Values generated when a login starts and needed again at callback time
///
/// Stored in the session under the `FlowState` key and read exactly once,
/// when the callback arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowState {
    /// Opaque anti-CSRF value, also used as the session id
    pub state: String,

    pub redirect_uri: String,

    /// Provider authorization URL the user is sent to
    #[serde(alias = "auth_uri")]
    pub authorization_uri: String,

    /// Scopes sent with the authorization request, reserved scopes included
    #[serde(default, alias = "scope")]
    pub requested_scopes: Vec<String>,

    /// PKCE verifier matching the challenge in `authorization_uri`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_verifier: Option<String>,

    /// Nonce expected back in the ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims_challenge: Option<String>,

    #[serde(skip)]
    pub received: Received,
}

impl ReceivedPayload for FlowState {
    fn set_received(&mut self, raw: serde_json::Value) {
        self.received = Received(Some(raw));
    }

    fn received(&self) -> Option<&serde_json::Value> {
        self.received.get()
    }
}

/// Parameters the provider sends back to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Base64 JSON `{uid, utid}` when `client_info=1` was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthResponse {
    /// Callback carrying an authorization code
    pub fn new(code: impl Into<String>, state: Option<String>) -> Self {
        Self {
            code: Some(code.into()),
            state,
            ..Default::default()
        }
    }

    /// Parse the callback query string (with or without the leading `?`)
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Serialization`] if the pairs cannot be mapped
    /// onto the response fields
    ///
    /// # Examples
    ///
    /// ```
    /// use msal_authcode::models::AuthResponse;
    ///
    /// let response = AuthResponse::from_query("?code=abc&state=xyz").unwrap();
    /// assert_eq!(response.code.as_deref(), Some("abc"));
    /// assert_eq!(response.state.as_deref(), Some("xyz"));
    /// ```
    pub fn from_query(query: &str) -> Result<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: serde_json::Map<String, serde_json::Value> =
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), serde_json::Value::String(v.into_owned())))
                .collect();
        serde_json::from_value(serde_json::Value::Object(pairs))
            .map_err(|e| MsalAuthError::Serialization(e).into())
    }
}
