//! Auth-code flow state machine
//!
//! [`AuthCodeHandler`] drives one login attempt through
//! `Started -> Redirected -> CallbackReceived -> Authenticated | Failed`.
//! It talks to the provider only through [`IdentityClient`] and to storage
//! only through [`SessionManager`].
//!
//! Every protocol or provider failure comes back as
//! [`MsalAuthError::Unauthorized`]. The specific reason is logged and never
//! returned. Transport errors pass through unchanged so the caller can retry.

use std::fmt;
use std::sync::Arc;

use crate::client::{AuthFlowOptions, ConfidentialClient, IdentityClient, TokenCache};
use crate::config::{resolve_logout_callback, MsalClientConfig};
use crate::error::{is_retryable, MsalAuthError, Result};
use crate::models::{AuthResponse, AuthToken, BearerToken, FlowState, IDTokenClaims};
use crate::session::{build_backend, CookieSession, SessionBackend, SessionManager};

/// Stage of a login attempt, logged as the `flow_state` field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFlowState {
    Started,
    Redirected,
    CallbackReceived,
    Authenticated,
    Failed,
}

impl AuthFlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthFlowState::Started => "STARTED",
            AuthFlowState::Redirected => "REDIRECTED",
            AuthFlowState::CallbackReceived => "CALLBACK_RECEIVED",
            AuthFlowState::Authenticated => "AUTHENTICATED",
            AuthFlowState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for AuthFlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// AuthCodeHandler
// ---------------------------------------------------------------------------

/// Orchestrates the authorization code flow for one application
///
/// The handler holds no per-user state. Each operation takes the request's
/// [`CookieSession`] and works on the session it points to.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use msal_authcode::config::{MsalClientConfig, SessionType};
/// use msal_authcode::handler::AuthCodeHandler;
/// use msal_authcode::session::CookieSession;
///
/// # async fn example() -> msal_authcode::error::Result<()> {
/// let config = MsalClientConfig {
///     client_id: Some("client-123".to_string()),
///     tenant: Some("contoso".to_string()),
///     redirect_uri: Some("https://app.example.com/token".to_string()),
///     session_type: SessionType::Memory,
///     ..Default::default()
/// };
/// let handler = AuthCodeHandler::from_config(Arc::new(config))?;
///
/// let mut cookie = CookieSession::new();
/// let target = handler.authorize_redirect(&mut cookie, None, None).await?;
/// println!("redirect to {}", target);
/// # Ok(())
/// # }
/// ```
pub struct AuthCodeHandler {
    config: Arc<MsalClientConfig>,
    client: Arc<dyn IdentityClient>,
    backend: Arc<dyn SessionBackend>,
}

impl AuthCodeHandler {
    pub fn new(
        config: Arc<MsalClientConfig>,
        client: Arc<dyn IdentityClient>,
        backend: Arc<dyn SessionBackend>,
    ) -> Self {
        Self {
            config,
            client,
            backend,
        }
    }

    /// Build the HTTP identity client and the configured session backend
    ///
    /// # Errors
    ///
    /// Propagates client construction and backend selection errors
    pub fn from_config(config: Arc<MsalClientConfig>) -> Result<Self> {
        let client = Arc::new(ConfidentialClient::new(Arc::clone(&config))?);
        let backend = build_backend(&config)?;
        Ok(Self::new(config, client, backend))
    }

    pub fn config(&self) -> &MsalClientConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn IdentityClient> {
        &self.client
    }

    /// Session view for one request
    pub fn session<'r>(&self, cookie: &'r mut CookieSession) -> SessionManager<'r> {
        SessionManager::new(cookie, Arc::clone(&self.backend))
    }

    /// Start a login attempt and return the provider URL to redirect to
    ///
    /// The flow's `state` becomes the session id, so the callback finds the
    /// flow through the cookie alone. `redirect_uri` falls back to the
    /// configured one.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when no redirect URI is available,
    /// and propagates client and session store errors
    pub async fn authorize_redirect(
        &self,
        cookie: &mut CookieSession,
        redirect_uri: Option<&str>,
        state: Option<String>,
    ) -> Result<String> {
        self.authorize_redirect_with(cookie, redirect_uri, AuthFlowOptions::with_state(state))
            .await
    }

    /// [`authorize_redirect`](Self::authorize_redirect) with prompt, hints
    /// and claims challenge
    pub async fn authorize_redirect_with(
        &self,
        cookie: &mut CookieSession,
        redirect_uri: Option<&str>,
        options: AuthFlowOptions,
    ) -> Result<String> {
        let redirect_uri = redirect_uri
            .filter(|uri| !uri.is_empty())
            .or(self.config.redirect_uri.as_deref())
            .ok_or_else(|| MsalAuthError::Config("redirect_uri is required".to_string()))?;

        tracing::debug!(flow_state = %AuthFlowState::Started, "Starting login");
        let flow = self.client.initiate_auth_flow(redirect_uri, options).await?;

        let mut session = self.session(cookie);
        session.init_session(flow.state.clone());
        session.save(&flow).await?;

        tracing::info!(flow_state = %AuthFlowState::Redirected, "Redirecting to identity provider");
        Ok(flow.authorization_uri)
    }

    /// Complete the login from the provider's callback
    ///
    /// When the caller passes no `state`, the stored flow's own state is
    /// used and the session cookie is the only correlation.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Unauthorized`] for a missing or mismatched
    /// flow, a provider rejection, or a token without `id_token`. Transport
    /// and session store errors pass through.
    pub async fn authorize_access_token(
        &self,
        cookie: &mut CookieSession,
        code: &str,
        state: Option<&str>,
    ) -> Result<AuthToken> {
        let session = self.session(cookie);

        let Some(flow) = session.load::<FlowState>().await? else {
            tracing::warn!(flow_state = %AuthFlowState::Failed, "Callback without a pending login");
            return Err(MsalAuthError::Unauthorized.into());
        };

        if let Some(state) = state {
            if state != flow.state {
                tracing::warn!(flow_state = %AuthFlowState::Failed, "Callback state does not match the pending login");
                return Err(MsalAuthError::Unauthorized.into());
            }
        }

        tracing::debug!(flow_state = %AuthFlowState::CallbackReceived, "Callback accepted");

        let mut cache = session.load::<TokenCache>().await?.unwrap_or_default();
        let response = AuthResponse::new(code, Some(state.unwrap_or(flow.state.as_str()).to_string()));

        let outcome = self
            .client
            .finalize_auth_flow(&flow, &response, &mut cache)
            .await;

        // A transport failure leaves the flow pending for a retried callback.
        match &outcome {
            Err(e) if is_retryable(e) => {
                tracing::warn!("Token exchange interrupted, login stays pending: {}", e);
            }
            _ => session.remove::<FlowState>().await?,
        }

        let token = match outcome {
            Ok(token) => token,
            Err(e) if is_retryable(&e) => return Err(e),
            Err(e) => {
                tracing::warn!(flow_state = %AuthFlowState::Failed, "Token exchange failed: {}", e);
                return Err(MsalAuthError::Unauthorized.into());
            }
        };

        if token.is_error() {
            tracing::warn!(flow_state = %AuthFlowState::Failed, "Provider rejected the code: {}", token.error_summary());
            return Err(MsalAuthError::Unauthorized.into());
        }
        if token.id_token.is_none() {
            tracing::warn!(flow_state = %AuthFlowState::Failed, "Token response has no id_token");
            return Err(MsalAuthError::Unauthorized.into());
        }

        session.save(&token).await?;
        if cache.has_state_changed() {
            session.save(&cache).await?;
        }

        tracing::info!(flow_state = %AuthFlowState::Authenticated, "Login completed");
        Ok(token)
    }

    /// [`authorize_access_token`](Self::authorize_access_token) returning
    /// the ID token as a bearer token
    pub async fn exchange_for_bearer(
        &self,
        cookie: &mut CookieSession,
        code: &str,
        state: Option<&str>,
    ) -> Result<BearerToken> {
        let token = self.authorize_access_token(cookie, code, state).await?;
        token
            .id_token
            .map(BearerToken::new)
            .ok_or_else(|| MsalAuthError::Unauthorized.into())
    }

    /// Token stored in the session, without any network call
    pub async fn get_token_from_session(
        &self,
        cookie: &mut CookieSession,
    ) -> Result<Option<AuthToken>> {
        self.session(cookie).load::<AuthToken>().await
    }

    /// Claims of `id_token`
    ///
    /// Without validation, claims already decoded on the session token for
    /// the same `id_token` are reused. Otherwise the token is decoded (and
    /// validated when `validate` is set) through the identity client.
    /// Malformed or invalid tokens yield `Ok(None)`.
    pub async fn parse_id_token(
        &self,
        cookie: &mut CookieSession,
        id_token: &str,
        validate: bool,
    ) -> Result<Option<IDTokenClaims>> {
        if !validate {
            if let Some(session_token) = self.get_token_from_session(cookie).await? {
                if session_token.id_token.as_deref() == Some(id_token) {
                    if let Some(claims) = session_token.id_token_claims {
                        return Ok(Some(claims));
                    }
                }
            }
            return Ok(self.client.decode_id_token(id_token));
        }

        match self.client.validate_id_token(id_token, None).await {
            Ok(claims) => Ok(Some(claims)),
            Err(e) if is_retryable(&e) => Err(e),
            Err(e) => {
                tracing::debug!("ID token rejected: {}", e);
                Ok(None)
            }
        }
    }

    /// [`parse_id_token`](Self::parse_id_token) for a whole token
    pub async fn parse_auth_token(
        &self,
        cookie: &mut CookieSession,
        token: &AuthToken,
        validate: bool,
    ) -> Result<Option<IDTokenClaims>> {
        match token.id_token.as_deref() {
            Some(id_token) => self.parse_id_token(cookie, id_token, validate).await,
            None => Ok(None),
        }
    }

    /// End the session and return the provider logout URL
    ///
    /// The post-logout target is `callback_url`, else `referer`, else the
    /// configured `return_to_path`.
    ///
    /// # Errors
    ///
    /// Propagates session store and authority errors
    pub async fn logout(
        &self,
        cookie: &mut CookieSession,
        callback_url: Option<&str>,
        referer: Option<&str>,
    ) -> Result<String> {
        let callback = resolve_logout_callback(callback_url, referer, &self.config.return_to_path);
        self.session(cookie).clear().await?;
        tracing::info!("Session cleared on logout");
        self.config.logout_url(&callback)
    }

    /// Renew the session user's tokens from the session token cache
    ///
    /// Only the first cached account is considered, and only when its local
    /// account id is `user_id`. The cache is saved back whatever the outcome.
    pub async fn get_token_from_cache(
        &self,
        cookie: &mut CookieSession,
        user_id: Option<&str>,
    ) -> Result<Option<AuthToken>> {
        let session = self.session(cookie);
        let Some(mut cache) = session.load::<TokenCache>().await? else {
            return Ok(None);
        };

        let accounts = self.client.get_accounts(&cache, None).await?;
        let outcome = match accounts.first() {
            Some(account) if Some(account.local_account_id.as_str()) == user_id => {
                self.client
                    .acquire_token_silent(&mut cache, Some(account), None, false, None)
                    .await
            }
            _ => {
                tracing::debug!("No cached account for this user");
                Ok(None)
            }
        };

        session.save(&cache).await?;
        let token = outcome?;

        if let Some(token) = &token {
            if token.id_token.is_some() {
                session.save(token).await?;
            }
        }
        Ok(token)
    }

    /// Returns `true` when the session holds a token whose claims validate
    pub async fn check_authenticated_session(&self, cookie: &mut CookieSession) -> Result<bool> {
        let Some(token) = self.get_token_from_session(cookie).await? else {
            return Ok(false);
        };

        let Some(claims) = self.parse_auth_token(cookie, &token, true).await? else {
            return Ok(false);
        };

        let status = claims.validate(
            self.config.client_id.as_deref(),
            self.config.issuer.as_deref(),
            None,
        );
        Ok(status.is_valid())
    }
}
