//! Identity provider client
//!
//! [`IdentityClient`] is the seam between the auth-code state machine and
//! the provider. [`ConfidentialClient`] talks to the Azure AD v2.0 endpoints
//! over HTTP; tests substitute a fake.
//!
//! Operations that touch the token cache take it by `&mut`. The caller owns
//! the cache for the duration of one request and persists it afterwards when
//! [`TokenCache::has_state_changed`] is set.

pub mod confidential;
pub mod jwt;
pub mod pkce;
pub mod token_cache;

pub use confidential::ConfidentialClient;
pub use token_cache::{CachedAccessToken, TokenCache};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{AuthResponse, AuthToken, FlowState, IDTokenClaims, LocalAccount};

/// Scopes every authorization request carries
pub const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// Optional inputs of [`IdentityClient::initiate_auth_flow`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthFlowOptions {
    /// Use this state instead of generating one
    pub state: Option<String>,
    /// `prompt` parameter (`login`, `consent`, `select_account`, `none`)
    pub prompt: Option<String>,
    pub login_hint: Option<String>,
    pub domain_hint: Option<String>,
    /// JSON claims request, sent as the `claims` parameter
    pub claims_challenge: Option<String>,
}

impl AuthFlowOptions {
    pub fn with_state(state: Option<String>) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }
}

/// Operations the auth-code handler needs from the identity provider
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Build the authorization request for a new login attempt
    ///
    /// A fresh `state` is generated unless one is supplied in `options`.
    async fn initiate_auth_flow(
        &self,
        redirect_uri: &str,
        options: AuthFlowOptions,
    ) -> Result<FlowState>;

    /// Exchange the authorization code from `response` for tokens
    ///
    /// Provider-side rejection is returned as an [`AuthToken`] with `error`
    /// set, not as an `Err`. A state mismatch between `flow` and `response`
    /// is an `Err`.
    async fn finalize_auth_flow(
        &self,
        flow: &FlowState,
        response: &AuthResponse,
        cache: &mut TokenCache,
    ) -> Result<AuthToken>;

    /// Renew tokens from the cache without user interaction
    ///
    /// Returns `Ok(None)` when there is no account or no usable credential.
    async fn acquire_token_silent(
        &self,
        cache: &mut TokenCache,
        account: Option<&LocalAccount>,
        authority: Option<&str>,
        force_refresh: bool,
        claims_challenge: Option<&str>,
    ) -> Result<Option<AuthToken>>;

    /// Cached accounts, optionally filtered by username
    async fn get_accounts(
        &self,
        cache: &TokenCache,
        username: Option<&str>,
    ) -> Result<Vec<LocalAccount>>;

    /// Evict an account and its tokens from the cache
    async fn remove_account(&self, cache: &mut TokenCache, account: &LocalAccount) -> Result<()>;

    /// Structural decode of an ID token, `None` when malformed
    fn decode_id_token(&self, id_token: &str) -> Option<IDTokenClaims>;

    /// Decode an ID token and validate its claims
    ///
    /// # Errors
    ///
    /// `TokenDecode` for malformed tokens, `InvalidToken` with the failing
    /// status otherwise
    async fn validate_id_token(&self, id_token: &str, nonce: Option<&str>)
        -> Result<IDTokenClaims>;
}

/// Reserved scopes followed by `extra`, without duplicates
pub fn scopes_with_reserved(extra: &[String]) -> Vec<String> {
    let mut scopes: Vec<String> = RESERVED_SCOPES.iter().map(|s| s.to_string()).collect();
    for scope in extra {
        if !scopes.iter().any(|s| s.eq_ignore_ascii_case(scope)) {
            scopes.push(scope.clone());
        }
    }
    scopes
}
