//! ID token claim validation
//!
//! [`validate_token`] checks the time window, issuer, audience and nonce of
//! already-decoded claims. Signature verification is not done here; it
//! belongs to whatever produced the claims.
//!
//! Every check runs, in a fixed order. When several fail, the status of the
//! last failing check is the one returned:
//!
//! 1. `NOT_YET_VALID`
//! 2. `WRONG_ISSUER`
//! 3. `WRONG_AUDIENCE`
//! 4. `EXPIRED`
//! 5. `WRONG_NONCE`

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::IDTokenClaims;

/// Tolerance applied to `nbf` and `exp`, in seconds
pub const CLOCK_SKEW_SECONDS: i64 = 120;

/// Outcome of [`validate_token`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenStatus {
    Valid,
    NotYetValid,
    WrongIssuer,
    WrongAudience,
    Expired,
    WrongNonce,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Valid => "VALID",
            TokenStatus::NotYetValid => "NOT_YET_VALID",
            TokenStatus::WrongIssuer => "WRONG_ISSUER",
            TokenStatus::WrongAudience => "WRONG_AUDIENCE",
            TokenStatus::Expired => "EXPIRED",
            TokenStatus::WrongNonce => "WRONG_NONCE",
        }
    }

    pub fn is_valid(&self) -> bool {
        *self == TokenStatus::Valid
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate decoded ID token claims
///
/// # Arguments
///
/// * `claims` - Decoded claims
/// * `client_id` - Expected audience; skipped when `None`
/// * `issuer` - Expected `iss`; skipped when `None`
/// * `nonce` - Expected nonce; skipped when `None`
/// * `now` - Evaluation time, defaults to the current time
///
/// # Returns
///
/// [`TokenStatus::Valid`] or the status of the last failing check
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use msal_authcode::models::IDTokenClaims;
/// use msal_authcode::validation::{validate_token, TokenStatus};
///
/// let now = Utc::now();
/// let claims = IDTokenClaims {
///     expiration: Some(now - Duration::seconds(600)),
///     ..Default::default()
/// };
/// assert_eq!(validate_token(&claims, None, None, None, Some(now)), TokenStatus::Expired);
/// ```
pub fn validate_token(
    claims: &IDTokenClaims,
    client_id: Option<&str>,
    issuer: Option<&str>,
    nonce: Option<&str>,
    now: Option<DateTime<Utc>>,
) -> TokenStatus {
    let now = now.unwrap_or_else(Utc::now);
    let skew = Duration::seconds(CLOCK_SKEW_SECONDS);
    let mut status = TokenStatus::Valid;

    if let Some(not_before) = claims.not_before {
        if now + skew < not_before {
            status = TokenStatus::NotYetValid;
        }
    }

    if let Some(expected) = issuer {
        if claims.issuer.as_deref() != Some(expected) {
            status = TokenStatus::WrongIssuer;
        }
    }

    if let Some(expected) = client_id {
        let in_audience = claims
            .audience
            .as_ref()
            .is_some_and(|aud| aud.contains(expected));
        if !in_audience {
            status = TokenStatus::WrongAudience;
        }
    }

    if let Some(expiration) = claims.expiration {
        if now - skew > expiration {
            status = TokenStatus::Expired;
        }
    }

    if let Some(expected) = nonce {
        if claims.nonce.as_deref() != Some(expected) {
            status = TokenStatus::WrongNonce;
        }
    }

    status
}
