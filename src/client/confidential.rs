//! Confidential client for the Azure AD v2.0 endpoints
//!
//! Builds authorization URLs, exchanges codes, refreshes tokens and keeps
//! the per-session [`TokenCache`] up to date. Every network call goes through
//! [`ConfidentialClient::request_token`], which turns provider rejections
//! into an [`AuthToken`] with `error` set and transport failures into
//! [`MsalAuthError::Http`].
//!
//! # Flow overview
//!
//! 1. `initiate_auth_flow` generates `state`, PKCE and a nonce and builds the
//!    authorization URL.
//! 2. The provider redirects back with `code` and `state`.
//! 3. `finalize_auth_flow` checks `state`, posts the code with the PKCE
//!    verifier, checks the nonce and caches the result.
//! 4. `acquire_token_silent` serves cached access tokens or redeems the
//!    cached refresh token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

use super::jwt::{self, ClientInfo};
use super::{pkce, scopes_with_reserved, AuthFlowOptions, IdentityClient, TokenCache};
use crate::config::MsalClientConfig;
use crate::error::{MsalAuthError, Result};
use crate::models::{
    parse_payload, AuthResponse, AuthToken, FlowState, IDTokenClaims, LocalAccount, Received,
};
use crate::validation::{validate_token, TokenStatus};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

type FormParams = Vec<(&'static str, String)>;

/// HTTP implementation of [`IdentityClient`]
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use msal_authcode::client::{AuthFlowOptions, ConfidentialClient, IdentityClient};
/// use msal_authcode::config::MsalClientConfig;
///
/// # async fn example() -> msal_authcode::error::Result<()> {
/// let config = MsalClientConfig {
///     client_id: Some("client-123".to_string()),
///     tenant: Some("contoso".to_string()),
///     ..Default::default()
/// };
/// let client = ConfidentialClient::new(Arc::new(config))?;
/// let flow = client
///     .initiate_auth_flow("https://app.example.com/token", AuthFlowOptions::default())
///     .await?;
/// println!("{}", flow.authorization_uri);
/// # Ok(())
/// # }
/// ```
pub struct ConfidentialClient {
    http: reqwest::Client,
    config: Arc<MsalClientConfig>,
    client_id: String,
    authority: String,
}

impl ConfidentialClient {
    /// Create a client with its own HTTP connection pool
    ///
    /// The pool uses `http_timeout_seconds` for every request and sends
    /// `app_name` / `app_version` as telemetry headers.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when the client id or authority is
    /// unusable and [`MsalAuthError::Http`] when the HTTP client cannot be
    /// built
    pub fn new(config: Arc<MsalClientConfig>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("x-app-name", config.app_name.as_deref()),
            ("x-app-ver", config.app_version.as_deref()),
        ] {
            if let Some(value) = value {
                let value = HeaderValue::from_str(value).map_err(|e| {
                    MsalAuthError::Config(format!("Invalid {} header value: {}", name, e))
                })?;
                headers.insert(HeaderName::from_static(name), value);
            }
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .default_headers(headers)
            .build()
            .map_err(MsalAuthError::from)?;

        Self::with_http_client(config, http)
    }

    /// Create a client on top of an existing HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when the client id is missing or
    /// the authority cannot be built
    pub fn with_http_client(config: Arc<MsalClientConfig>, http: reqwest::Client) -> Result<Self> {
        let client_id = config
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MsalAuthError::Config("client_id is required".to_string()))?;
        let authority = config.authority()?;

        Ok(Self {
            http,
            config,
            client_id,
            authority,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn authorize_endpoint(&self) -> String {
        endpoint_for(&self.authority, "authorize")
    }

    pub fn token_endpoint(&self) -> String {
        endpoint_for(&self.authority, "token")
    }

    /// Acquire an app-only token with the client credentials grant
    ///
    /// Uses the configured scopes as-is, typically `{resource}/.default`.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::Config`] when no scopes or no client secret
    /// are configured, and transport errors as [`MsalAuthError::Http`]
    pub async fn acquire_token_for_client(
        &self,
        claims_challenge: Option<&str>,
    ) -> Result<AuthToken> {
        if self.config.scopes.is_empty() {
            return Err(MsalAuthError::Config(
                "scopes are required for the client credentials grant".to_string(),
            )
            .into());
        }
        if self.config.client_credential.is_none() {
            return Err(MsalAuthError::Config(
                "client_credential is required for the client credentials grant".to_string(),
            )
            .into());
        }

        let mut params: FormParams = vec![
            ("grant_type", "client_credentials".to_string()),
            ("scope", self.config.scopes.join(" ")),
        ];
        if let Some(claims) = claims_challenge {
            params.push(("claims", claims.to_string()));
        }
        self.push_credentials(&mut params);

        tracing::debug!("Requesting app-only token");
        self.request_token(&self.token_endpoint(), params).await
    }

    /// Exchange a user's access token for one scoped to this application's
    /// downstream API (on-behalf-of flow)
    ///
    /// # Errors
    ///
    /// Transport errors as [`MsalAuthError::Http`]; provider rejection is
    /// returned in the token's `error` field
    pub async fn acquire_token_on_behalf_of(
        &self,
        user_assertion: &str,
        claims_challenge: Option<&str>,
    ) -> Result<AuthToken> {
        let mut params: FormParams = vec![
            ("grant_type", JWT_BEARER_GRANT.to_string()),
            ("assertion", user_assertion.to_string()),
            ("requested_token_use", "on_behalf_of".to_string()),
            ("scope", scopes_with_reserved(&self.config.scopes).join(" ")),
            ("client_info", "1".to_string()),
        ];
        if let Some(claims) = claims_challenge {
            params.push(("claims", claims.to_string()));
        }
        self.push_credentials(&mut params);

        tracing::debug!("Requesting on-behalf-of token");
        let mut token = self.request_token(&self.token_endpoint(), params).await?;
        if !token.is_error() {
            self.attach_claims(&mut token)?;
        }
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    fn push_credentials(&self, params: &mut FormParams) {
        params.push(("client_id", self.client_id.clone()));
        if let Some(secret) = &self.config.client_credential {
            params.push(("client_secret", secret.clone()));
        }
    }

    /// POST a token request and parse the response
    async fn request_token(&self, endpoint: &str, params: FormParams) -> Result<AuthToken> {
        let resp = self
            .http
            .post(endpoint)
            .form(&params)
            .send()
            .await
            .map_err(MsalAuthError::from)?;

        let status = resp.status();
        let body = resp.text().await.map_err(MsalAuthError::from)?;

        let raw: serde_json::Value = match serde_json::from_str(&body) {
            Ok(raw) => raw,
            Err(_) if !status.is_success() => {
                tracing::warn!("Token endpoint returned {} with a non-JSON body", status);
                return Ok(AuthToken::from_error(
                    format!("http_{}", status.as_u16()),
                    Some(body),
                ));
            }
            Err(e) => return Err(MsalAuthError::Serialization(e).into()),
        };

        let mut token: AuthToken = parse_payload(raw, self.config.debug_payloads)?;
        if !status.is_success() && token.error.is_none() {
            token.error = Some(format!("http_{}", status.as_u16()));
        }
        if token.is_error() {
            tracing::warn!(
                "Token endpoint returned {}: {}",
                status,
                token.error_summary()
            );
        }
        Ok(token)
    }

    /// Decode the ID token of `token` into `id_token_claims`
    fn attach_claims(&self, token: &mut AuthToken) -> Result<Option<IDTokenClaims>> {
        let Some(id_token) = token.id_token.as_deref() else {
            return Ok(None);
        };
        let claims = jwt::decode_claims(id_token, self.config.debug_payloads)?;
        token.id_token_claims = Some(claims.clone());
        Ok(Some(claims))
    }

    fn environment(&self) -> String {
        Url::parse(&self.authority)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// Cache account for a token response
    ///
    /// The home account id comes from `client_info` (token first, then the
    /// callback), falling back to the user's object id.
    fn account_for(
        &self,
        token: &AuthToken,
        claims: Option<&IDTokenClaims>,
        callback_client_info: Option<&str>,
    ) -> Option<LocalAccount> {
        let client_info = token
            .client_info
            .as_deref()
            .or(callback_client_info)
            .and_then(|raw| match ClientInfo::decode(raw) {
                Ok(info) => Some(info),
                Err(e) => {
                    tracing::warn!("Ignoring client_info: {}", e);
                    None
                }
            });

        let local_account_id = claims.and_then(|c| c.user_id.clone().or_else(|| c.subject.clone()));
        let home_account_id = client_info
            .as_ref()
            .map(ClientInfo::home_account_id)
            .or_else(|| local_account_id.clone())?;

        let realm = client_info
            .as_ref()
            .map(|info| info.utid.clone())
            .or_else(|| {
                claims
                    .and_then(|c| c.extra.get("tid"))
                    .and_then(|tid| tid.as_str())
                    .map(str::to_string)
            })
            .unwrap_or_default();

        let username = claims.and_then(|c| {
            c.preferred_username
                .clone()
                .or_else(|| c.emails.as_ref().and_then(|e| e.first().cloned()))
        });

        Some(LocalAccount {
            local_account_id: local_account_id
                .or_else(|| client_info.as_ref().map(|info| info.uid.clone()))
                .unwrap_or_default(),
            home_account_id,
            environment: self.environment(),
            realm,
            username,
            authority_type: "MSSTS".to_string(),
        })
    }
}

fn endpoint_for(authority: &str, leaf: &str) -> String {
    format!("{}/oauth2/v2.0/{}", authority.trim_end_matches('/'), leaf)
}

#[async_trait]
impl IdentityClient for ConfidentialClient {
    async fn initiate_auth_flow(
        &self,
        redirect_uri: &str,
        options: AuthFlowOptions,
    ) -> Result<FlowState> {
        let state = options.state.unwrap_or_else(pkce::generate_state);
        let pkce_challenge = pkce::generate();
        let nonce = pkce::generate_nonce();
        let scopes = scopes_with_reserved(&self.config.scopes);

        let mut url = Url::parse(&self.authorize_endpoint()).map_err(|e| {
            MsalAuthError::Config(format!("invalid authorization endpoint URL: {}", e))
        })?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.client_id);
            query.append_pair("response_type", "code");
            query.append_pair("redirect_uri", redirect_uri);
            query.append_pair("scope", &scopes.join(" "));
            query.append_pair("state", &state);
            query.append_pair("code_challenge", &pkce_challenge.challenge);
            query.append_pair("code_challenge_method", &pkce_challenge.method);
            query.append_pair("nonce", &nonce);
            query.append_pair("client_info", "1");
            if let Some(prompt) = &options.prompt {
                query.append_pair("prompt", prompt);
            }
            if let Some(login_hint) = &options.login_hint {
                query.append_pair("login_hint", login_hint);
            }
            if let Some(domain_hint) = &options.domain_hint {
                query.append_pair("domain_hint", domain_hint);
            }
            if let Some(claims) = &options.claims_challenge {
                query.append_pair("claims", claims);
            }
        }

        tracing::debug!(authority = %self.authority, "Initiated auth code flow");

        Ok(FlowState {
            state,
            redirect_uri: redirect_uri.to_string(),
            authorization_uri: url.to_string(),
            requested_scopes: scopes,
            code_verifier: Some(pkce_challenge.verifier),
            nonce: Some(nonce),
            claims_challenge: options.claims_challenge,
            received: Received::default(),
        })
    }

    async fn finalize_auth_flow(
        &self,
        flow: &FlowState,
        response: &AuthResponse,
        cache: &mut TokenCache,
    ) -> Result<AuthToken> {
        match response.state.as_deref() {
            Some(state) if state == flow.state => {}
            Some(_) => {
                return Err(MsalAuthError::StateMismatch(
                    "state returned by the provider does not match the flow".to_string(),
                )
                .into())
            }
            None => {
                return Err(MsalAuthError::StateMismatch(
                    "state missing from the provider response".to_string(),
                )
                .into())
            }
        }

        if let Some(error) = &response.error {
            return Ok(AuthToken::from_error(
                error.clone(),
                response.error_description.clone(),
            ));
        }

        let Some(code) = response.code.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(AuthToken::from_error(
                "invalid_request",
                Some("authorization code missing from the provider response".to_string()),
            ));
        };

        let mut params: FormParams = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", flow.redirect_uri.clone()),
            ("scope", flow.requested_scopes.join(" ")),
            ("client_info", "1".to_string()),
        ];
        if let Some(verifier) = &flow.code_verifier {
            params.push(("code_verifier", verifier.clone()));
        }
        if let Some(claims) = &flow.claims_challenge {
            params.push(("claims", claims.clone()));
        }
        self.push_credentials(&mut params);

        let mut token = self.request_token(&self.token_endpoint(), params).await?;
        if token.is_error() {
            return Ok(token);
        }

        let claims = self.attach_claims(&mut token)?;
        if let (Some(expected), Some(claims)) = (flow.nonce.as_deref(), claims.as_ref()) {
            if claims.nonce.as_deref() != Some(expected) {
                return Err(MsalAuthError::InvalidToken(TokenStatus::WrongNonce).into());
            }
        }

        match self.account_for(&token, claims.as_ref(), response.client_info.as_deref()) {
            Some(account) => cache.add(account, &token, &flow.requested_scopes, Utc::now()),
            None => tracing::warn!("Token response carries no account identity, not cached"),
        }

        Ok(token)
    }

    async fn acquire_token_silent(
        &self,
        cache: &mut TokenCache,
        account: Option<&LocalAccount>,
        authority: Option<&str>,
        force_refresh: bool,
        claims_challenge: Option<&str>,
    ) -> Result<Option<AuthToken>> {
        let Some(account) = account else {
            tracing::debug!("No account given for silent acquisition");
            return Ok(None);
        };
        let home_id = account.home_account_id.as_str();
        let now = Utc::now();

        if !force_refresh && claims_challenge.is_none() {
            let claims = cache
                .id_token(home_id)
                .and_then(|id_token| self.decode_id_token(id_token));
            if let Some(token) = cache.cached_token(home_id, &self.config.scopes, claims, now) {
                tracing::debug!("Serving access token from cache");
                return Ok(Some(token));
            }
        }

        let Some(refresh_token) = cache.refresh_token(home_id).map(str::to_string) else {
            tracing::debug!("No refresh token cached for account");
            return Ok(None);
        };

        let endpoint = authority
            .map(|a| endpoint_for(a, "token"))
            .unwrap_or_else(|| self.token_endpoint());
        let scopes = scopes_with_reserved(&self.config.scopes);

        let mut params: FormParams = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
            ("scope", scopes.join(" ")),
            ("client_info", "1".to_string()),
        ];
        if let Some(claims) = claims_challenge {
            params.push(("claims", claims.to_string()));
        }
        self.push_credentials(&mut params);

        tracing::debug!("Redeeming cached refresh token");
        let mut token = self.request_token(&endpoint, params).await?;
        if token.is_error() {
            tracing::warn!("Silent token refresh rejected: {}", token.error_summary());
            if token.error.as_deref() == Some("invalid_grant") {
                cache.remove_refresh_token(home_id);
            }
            return Ok(None);
        }

        if token.id_token.is_none() {
            token.id_token = cache.id_token(home_id).map(str::to_string);
        }
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }
        self.attach_claims(&mut token)?;
        cache.add(account.clone(), &token, &scopes, now);

        Ok(Some(token))
    }

    async fn get_accounts(
        &self,
        cache: &TokenCache,
        username: Option<&str>,
    ) -> Result<Vec<LocalAccount>> {
        Ok(cache.find_accounts(username))
    }

    async fn remove_account(&self, cache: &mut TokenCache, account: &LocalAccount) -> Result<()> {
        if !cache.remove_account(&account.home_account_id) {
            tracing::debug!("Account to remove was not cached");
        }
        Ok(())
    }

    fn decode_id_token(&self, id_token: &str) -> Option<IDTokenClaims> {
        match jwt::decode_claims(id_token, self.config.debug_payloads) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("ID token decode failed: {}", e);
                None
            }
        }
    }

    async fn validate_id_token(
        &self,
        id_token: &str,
        nonce: Option<&str>,
    ) -> Result<IDTokenClaims> {
        let claims = jwt::decode_claims(id_token, self.config.debug_payloads)?;
        let status = validate_token(
            &claims,
            Some(&self.client_id),
            self.config.issuer.as_deref(),
            nonce,
            None,
        );
        if !status.is_valid() {
            return Err(MsalAuthError::InvalidToken(status).into());
        }
        Ok(claims)
    }
}
