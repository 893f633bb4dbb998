//! Serializable per-session token cache
//!
//! The cache travels with the session: it is loaded at the start of a
//! request, handed to the identity client by `&mut`, and saved back when
//! [`TokenCache::has_state_changed`] says so. It is never shared between
//! sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AuthToken, IDTokenClaims, LocalAccount};

/// Access tokens this close to expiry are treated as expired
pub const ACCESS_TOKEN_REFRESH_BUFFER_SECONDS: i64 = 300;

const MAX_TOKEN_LIFETIME_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// Cached access token for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccessToken {
    pub secret: String,

    #[serde(default)]
    pub token_type: Option<String>,

    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedAccessToken {
    /// Returns `true` when the token expires within the refresh buffer
    ///
    /// Tokens without an expiry are treated as expired, since nothing says
    /// how long they last.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => {
                now >= expires_at - Duration::seconds(ACCESS_TOKEN_REFRESH_BUFFER_SECONDS)
            }
        }
    }

    /// Returns `true` when every scope in `wanted` was granted
    pub fn covers(&self, wanted: &[String]) -> bool {
        wanted
            .iter()
            .all(|w| self.scopes.iter().any(|s| s.eq_ignore_ascii_case(w)))
    }
}

/// Accounts and tokens for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenCache {
    /// In the order they were first added
    #[serde(default)]
    accounts: Vec<LocalAccount>,

    /// Keyed by home account id
    #[serde(default)]
    id_tokens: BTreeMap<String, String>,

    #[serde(default)]
    access_tokens: BTreeMap<String, CachedAccessToken>,

    #[serde(default)]
    refresh_tokens: BTreeMap<String, String>,

    #[serde(default)]
    client_info: BTreeMap<String, String>,

    #[serde(skip)]
    state_changed: bool,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once anything was added or removed since load
    pub fn has_state_changed(&self) -> bool {
        self.state_changed
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All cached accounts, oldest first
    pub fn accounts(&self) -> &[LocalAccount] {
        &self.accounts
    }

    /// Cached accounts, optionally filtered by username
    pub fn find_accounts(&self, username: Option<&str>) -> Vec<LocalAccount> {
        self.accounts
            .iter()
            .filter(|a| username.map_or(true, |u| a.matches_username(u)))
            .cloned()
            .collect()
    }

    /// Store the tokens of a successful token response for `account`
    ///
    /// The account entry is replaced in place when it already exists, so
    /// the order of [`accounts`](Self::accounts) is stable.
    pub fn add(
        &mut self,
        account: LocalAccount,
        token: &AuthToken,
        scopes: &[String],
        now: DateTime<Utc>,
    ) {
        let home_id = account.home_account_id.clone();

        match self
            .accounts
            .iter_mut()
            .find(|a| a.home_account_id == home_id)
        {
            Some(existing) => *existing = account,
            None => self.accounts.push(account),
        }

        if let Some(id_token) = &token.id_token {
            self.id_tokens.insert(home_id.clone(), id_token.clone());
        }

        if let Some(access_token) = &token.access_token {
            let granted = token.scopes();
            let scopes = if granted.is_empty() {
                scopes.to_vec()
            } else {
                granted.into_iter().map(str::to_string).collect()
            };
            let expires_at = token.expires_in.and_then(|secs| {
                let secs = i64::try_from(secs).ok()?.min(MAX_TOKEN_LIFETIME_SECONDS);
                now.checked_add_signed(Duration::seconds(secs))
            });
            self.access_tokens.insert(
                home_id.clone(),
                CachedAccessToken {
                    secret: access_token.clone(),
                    token_type: token.token_type.clone(),
                    scopes,
                    expires_at,
                },
            );
        }

        if let Some(refresh_token) = &token.refresh_token {
            self.refresh_tokens
                .insert(home_id.clone(), refresh_token.clone());
        }

        if let Some(client_info) = &token.client_info {
            self.client_info.insert(home_id, client_info.clone());
        }

        self.state_changed = true;
    }

    pub fn id_token(&self, home_account_id: &str) -> Option<&str> {
        self.id_tokens.get(home_account_id).map(String::as_str)
    }

    pub fn access_token(&self, home_account_id: &str) -> Option<&CachedAccessToken> {
        self.access_tokens.get(home_account_id)
    }

    pub fn refresh_token(&self, home_account_id: &str) -> Option<&str> {
        self.refresh_tokens.get(home_account_id).map(String::as_str)
    }

    /// Rebuild an [`AuthToken`] from the cached entries of an account
    ///
    /// Returns `None` unless an unexpired access token covering `scopes` is
    /// cached. `expires_in` is the remaining lifetime. `id_token_claims` is
    /// filled from `claims` when given.
    pub fn cached_token(
        &self,
        home_account_id: &str,
        scopes: &[String],
        claims: Option<IDTokenClaims>,
        now: DateTime<Utc>,
    ) -> Option<AuthToken> {
        let access = self.access_tokens.get(home_account_id)?;
        if access.is_expired(now) || !access.covers(scopes) {
            return None;
        }

        let expires_in = access
            .expires_at
            .map(|at| u64::try_from((at - now).num_seconds()).unwrap_or(0));

        Some(AuthToken {
            id_token: self.id_tokens.get(home_account_id).cloned(),
            id_token_claims: claims,
            access_token: Some(access.secret.clone()),
            token_type: access.token_type.clone(),
            expires_in,
            scope: Some(access.scopes.join(" ")),
            refresh_token: self.refresh_tokens.get(home_account_id).cloned(),
            client_info: self.client_info.get(home_account_id).cloned(),
            ..Default::default()
        })
    }

    /// Drop an account and every token cached for it
    ///
    /// Returns `true` when the account was present.
    pub fn remove_account(&mut self, home_account_id: &str) -> bool {
        let before = self.accounts.len();
        self.accounts.retain(|a| a.home_account_id != home_account_id);
        self.id_tokens.remove(home_account_id);
        self.access_tokens.remove(home_account_id);
        self.refresh_tokens.remove(home_account_id);
        self.client_info.remove(home_account_id);

        let removed = self.accounts.len() != before;
        if removed {
            self.state_changed = true;
        }
        removed
    }

    /// Forget a refresh token the provider no longer accepts
    pub fn remove_refresh_token(&mut self, home_account_id: &str) {
        if self.refresh_tokens.remove(home_account_id).is_some() {
            self.state_changed = true;
        }
    }
}
