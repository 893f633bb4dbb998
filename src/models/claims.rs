//! Decoded ID token claims
//!
//! A single flat struct covers the registered OIDC claims, the Azure AD and
//! B2C specific claims and the user-profile claims. Anything else the token
//! carries lands in [`IDTokenClaims::extra`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_timestamp, Received, ReceivedPayload, UserInfo};
use crate::validation::{validate_token, TokenStatus};

/// The `aud` claim, a single client id or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    /// Returns `true` when `client_id` is (or is among) the audience
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

impl From<&str> for Audience {
    fn from(value: &str) -> Self {
        Audience::Single(value.to_string())
    }
}

/// Claims carried by an ID token
///
/// Field names follow the Rust side; serde renames map them to the JWT claim
/// names (`iss`, `sub`, `aud`, `exp`, `nbf`, `iat`, `oid`, `tfp`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IDTokenClaims {
    /// Security token service that issued the token
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Principal the token asserts information about
    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// Intended recipient(s) of the token
    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<Audience>,

    /// Time after which the token is invalid
    #[serde(
        rename = "exp",
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_timestamp"
    )]
    pub expiration: Option<DateTime<Utc>>,

    /// Time before which the token is invalid
    #[serde(
        rename = "nbf",
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_timestamp"
    )]
    pub not_before: Option<DateTime<Utc>>,

    /// Time the token was issued
    #[serde(
        rename = "iat",
        default,
        skip_serializing_if = "Option::is_none",
        with = "lenient_timestamp"
    )]
    pub issue_time: Option<DateTime<Utc>>,

    /// Time the user last entered credentials
    #[serde(default, skip_serializing_if = "Option::is_none", with = "lenient_timestamp")]
    pub auth_time: Option<DateTime<Utc>>,

    /// Value echoed from the authorization request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Immutable object id of the user in the tenant
    #[serde(rename = "oid", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// B2C policy used to acquire the token
    #[serde(rename = "tfp", default, skip_serializing_if = "Option::is_none")]
    pub policy_used: Option<String>,

    /// Token version
    #[serde(rename = "ver", default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Set by B2C right after a sign-up
    #[serde(rename = "newUser", default, skip_serializing_if = "Option::is_none")]
    pub is_new_user: Option<bool>,

    // User profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(rename = "postalCode", default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(rename = "streetAddress", default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Present when the user has more groups than fit in the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hasgroups: Option<bool>,

    // Azure internal claims, opaque to applications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aio: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rh: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uti: Option<String>,

    /// Claims without a dedicated field
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,

    /// Raw payload, kept only when debug payloads are enabled
    #[serde(skip)]
    pub received: Received,
}

impl IDTokenClaims {
    /// Validate these claims at the current time
    ///
    /// Shorthand for [`validate_token`] with `now` left to the clock.
    pub fn validate(
        &self,
        client_id: Option<&str>,
        issuer: Option<&str>,
        nonce: Option<&str>,
    ) -> TokenStatus {
        validate_token(self, client_id, issuer, nonce, None)
    }

    /// Project the user-profile claims
    pub fn user_info(&self) -> UserInfo {
        UserInfo::from(self)
    }
}

impl ReceivedPayload for IDTokenClaims {
    fn set_received(&mut self, raw: serde_json::Value) {
        self.received = Received(Some(raw));
    }

    fn received(&self) -> Option<&serde_json::Value> {
        self.received.get()
    }
}
