//! Per-request authentication
//!
//! [`MsalScheme`] resolves the caller's identity from an `Authorization:
//! Bearer` header or, failing that, from the session token. An expired token
//! is renewed once through the session token cache before the claims are
//! validated.

use std::sync::Arc;

use crate::error::{MsalAuthError, Result};
use crate::handler::AuthCodeHandler;
use crate::models::{IDTokenClaims, UserInfo};
use crate::session::CookieSession;
use crate::validation::{validate_token, TokenStatus};

/// Hook run on claims that passed validation
pub type ClaimsProcessor = Arc<dyn Fn(&IDTokenClaims) -> Result<()> + Send + Sync>;

/// Extract the token of a `Bearer` authorization header
///
/// The scheme name is matched case-insensitively.
///
/// # Examples
///
/// ```
/// use msal_authcode::scheme::bearer_param;
///
/// assert_eq!(bearer_param("Bearer abc"), Some("abc"));
/// assert_eq!(bearer_param("bearer  abc "), Some("abc"));
/// assert_eq!(bearer_param("Basic abc"), None);
/// ```
pub fn bearer_param(authorization: &str) -> Option<&str> {
    let (scheme, param) = authorization.trim().split_once(' ')?;
    let param = param.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !param.is_empty()).then_some(param)
}

pub struct MsalScheme {
    handler: Arc<AuthCodeHandler>,
    claims_processing: Option<ClaimsProcessor>,
}

impl MsalScheme {
    pub fn new(handler: Arc<AuthCodeHandler>) -> Self {
        Self {
            handler,
            claims_processing: None,
        }
    }

    pub fn with_claims_processing(mut self, processor: ClaimsProcessor) -> Self {
        self.claims_processing = Some(processor);
        self
    }

    pub fn handler(&self) -> &AuthCodeHandler {
        &self.handler
    }

    /// Authenticate a request
    ///
    /// # Errors
    ///
    /// [`MsalAuthError::Unauthorized`] when no token is found or the bearer
    /// token fails validation, and [`MsalAuthError::InvalidToken`] with the
    /// failing status when the session token's claims do not validate
    /// against the configured client id and issuer
    pub async fn authenticate(
        &self,
        cookie: &mut CookieSession,
        authorization: Option<&str>,
    ) -> Result<IDTokenClaims> {
        let mut claims = match authorization.and_then(bearer_param) {
            Some(token) => self.handler.parse_id_token(cookie, token, true).await?,
            None => self.session_claims(cookie).await?,
        };

        let config = self.handler.config();
        let client_id = config.client_id.as_deref();
        let issuer = config.issuer.as_deref();

        if let Some(current) = &claims {
            if validate_token(current, client_id, issuer, None, None) == TokenStatus::Expired {
                if let Some(renewed) = self.renew(cookie, current).await? {
                    claims = Some(renewed);
                }
            }
        }

        let Some(claims) = claims else {
            tracing::debug!("No token found on request");
            return Err(MsalAuthError::Unauthorized.into());
        };

        let status = validate_token(&claims, client_id, issuer, None, None);
        if !status.is_valid() {
            tracing::debug!(status = %status, "Request token rejected");
            return Err(MsalAuthError::InvalidToken(status).into());
        }

        if let Some(processor) = &self.claims_processing {
            processor(&claims)?;
        }
        Ok(claims)
    }

    /// [`authenticate`](Self::authenticate) projected to the user profile
    pub async fn authenticate_user(
        &self,
        cookie: &mut CookieSession,
        authorization: Option<&str>,
    ) -> Result<UserInfo> {
        let claims = self.authenticate(cookie, authorization).await?;
        Ok(claims.user_info())
    }

    async fn session_claims(&self, cookie: &mut CookieSession) -> Result<Option<IDTokenClaims>> {
        let Some(token) = self.handler.get_token_from_session(cookie).await? else {
            return Ok(None);
        };
        match token.id_token_claims {
            Some(claims) => Ok(Some(claims)),
            None => self.handler.parse_auth_token(cookie, &token, false).await,
        }
    }

    async fn renew(
        &self,
        cookie: &mut CookieSession,
        expired: &IDTokenClaims,
    ) -> Result<Option<IDTokenClaims>> {
        tracing::debug!("Token expired, trying the session token cache");
        let Some(token) = self
            .handler
            .get_token_from_cache(cookie, expired.user_id.as_deref())
            .await?
        else {
            return Ok(None);
        };

        if token.id_token_claims.is_some() {
            return Ok(token.id_token_claims);
        }
        Ok(token
            .id_token
            .as_deref()
            .and_then(|id_token| self.handler.client().decode_id_token(id_token)))
    }
}
