//! Structural JWT and `client_info` decoding
//!
//! Nothing here checks signatures or times. [`decode_claims`] only turns the
//! payload segment into [`IDTokenClaims`]; validation is a separate step.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{MsalAuthError, Result};
use crate::models::{parse_payload, IDTokenClaims};

/// Decode the payload segment of a compact JWT into JSON
///
/// # Errors
///
/// Returns [`MsalAuthError::TokenDecode`] when the token does not have three
/// segments, the payload is not base64url, or it is not a JSON object
pub fn decode_payload(token: &str) -> Result<serde_json::Value> {
    let mut segments = token.trim().split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => {
            return Err(
                MsalAuthError::TokenDecode("expected a three segment JWT".to_string()).into(),
            )
        }
    };

    let bytes = decode_base64url(payload)?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| MsalAuthError::TokenDecode(format!("payload is not JSON: {}", e)))?;

    if !value.is_object() {
        return Err(
            MsalAuthError::TokenDecode("payload is not a JSON object".to_string()).into(),
        );
    }
    Ok(value)
}

/// Decode an ID token into claims
///
/// # Errors
///
/// Returns [`MsalAuthError::TokenDecode`] for malformed tokens or claims
/// with the wrong shape
pub fn decode_claims(id_token: &str, keep_raw: bool) -> Result<IDTokenClaims> {
    let payload = decode_payload(id_token)?;
    parse_payload(payload, keep_raw)
        .map_err(|e| MsalAuthError::TokenDecode(format!("unexpected claim types: {}", e)).into())
}

fn decode_base64url(segment: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| MsalAuthError::TokenDecode(format!("invalid base64url: {}", e)).into())
}

// ---------------------------------------------------------------------------
// ClientInfo
// ---------------------------------------------------------------------------

/// Decoded `client_info`: user id and tenant id in the home tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub uid: String,
    pub utid: String,
}

impl ClientInfo {
    /// Decode the base64url JSON `client_info` value
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::TokenDecode`] when the value is not base64url
    /// JSON with `uid` and `utid`
    pub fn decode(raw: &str) -> Result<Self> {
        let bytes = decode_base64url(raw)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MsalAuthError::TokenDecode(format!("invalid client_info: {}", e)).into())
    }

    /// `"{uid}.{utid}"`
    pub fn home_account_id(&self) -> String {
        format!("{}.{}", self.uid, self.utid)
    }
}
