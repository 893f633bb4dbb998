use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use serde_json::json;
use tempfile::TempDir;

use msal_authcode::client::{jwt, AuthFlowOptions, IdentityClient, TokenCache};
use msal_authcode::config::{MsalClientConfig, SessionType};
use msal_authcode::error::{MsalAuthError, Result};
use msal_authcode::handler::AuthCodeHandler;
use msal_authcode::models::{AuthResponse, AuthToken, FlowState, IDTokenClaims, LocalAccount};
use msal_authcode::session::{MemorySessionBackend, SessionBackend};
use msal_authcode::validation::validate_token;

pub const CLIENT_ID: &str = "client-123";

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("msal.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

fn b64(value: &serde_json::Value) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(value.to_string())
}

/// Compact JWT with an unverified signature segment
#[allow(dead_code)]
pub fn unsigned_jwt(claims: serde_json::Value) -> String {
    format!("{}.{}.sig", b64(&json!({"alg": "none", "typ": "JWT"})), b64(&claims))
}

/// ID token for `user_id` issued to [`CLIENT_ID`], expiring `exp_offset`
/// seconds from now
#[allow(dead_code)]
pub fn id_token(user_id: &str, nonce: Option<&str>, exp_offset: i64) -> String {
    let now = Utc::now().timestamp();
    let mut claims = json!({
        "iss": "https://login.example.com/v2.0",
        "sub": format!("sub-{}", user_id),
        "aud": CLIENT_ID,
        "iat": now,
        "nbf": now - 60,
        "exp": now + exp_offset,
        "oid": user_id,
        "tid": "tenant-1",
        "preferred_username": format!("{}@contoso.com", user_id),
        "name": "Ada Lovelace",
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = json!(nonce);
    }
    unsigned_jwt(claims)
}

/// Base64url `client_info` value
#[allow(dead_code)]
pub fn client_info(uid: &str, utid: &str) -> String {
    b64(&json!({"uid": uid, "utid": utid}))
}

#[allow(dead_code)]
pub fn memory_config() -> MsalClientConfig {
    MsalClientConfig {
        client_id: Some(CLIENT_ID.to_string()),
        tenant: Some("contoso".to_string()),
        session_type: SessionType::Memory,
        redirect_uri: Some("https://app.example.com/token".to_string()),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// FakeIdentityClient
// ---------------------------------------------------------------------------

/// Scripted result of `finalize_auth_flow`
#[allow(dead_code)]
#[derive(Clone)]
pub enum FinalizeReply {
    Token(AuthToken),
    /// Simulated network timeout
    Transport,
}

/// In-process identity client with scripted replies
#[allow(dead_code)]
pub struct FakeIdentityClient {
    finalize_reply: Mutex<FinalizeReply>,
    silent_reply: Mutex<Option<AuthToken>>,
    silent_fails: AtomicBool,
    pub initiate_calls: AtomicUsize,
    pub finalize_calls: AtomicUsize,
    pub silent_calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeIdentityClient {
    pub fn new() -> Self {
        Self {
            finalize_reply: Mutex::new(FinalizeReply::Token(AuthToken::default())),
            silent_reply: Mutex::new(None),
            silent_fails: AtomicBool::new(false),
            initiate_calls: AtomicUsize::new(0),
            finalize_calls: AtomicUsize::new(0),
            silent_calls: AtomicUsize::new(0),
        }
    }

    /// Reply with a token carrying `id_token` and an access token
    pub fn with_id_token(id_token: String) -> Self {
        let client = Self::new();
        client.set_finalize_reply(FinalizeReply::Token(AuthToken {
            id_token: Some(id_token),
            access_token: Some("access-1".to_string()),
            token_type: Some("Bearer".to_string()),
            expires_in: Some(3600),
            refresh_token: Some("refresh-1".to_string()),
            ..Default::default()
        }));
        client
    }

    pub fn set_finalize_reply(&self, reply: FinalizeReply) {
        *self.finalize_reply.lock().unwrap() = reply;
    }

    pub fn set_silent_reply(&self, token: Option<AuthToken>) {
        *self.silent_reply.lock().unwrap() = token;
    }

    /// Make `acquire_token_silent` drop the refresh token, then time out
    pub fn fail_silent(&self) {
        self.silent_fails.store(true, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityClient for FakeIdentityClient {
    async fn initiate_auth_flow(
        &self,
        redirect_uri: &str,
        options: AuthFlowOptions,
    ) -> Result<FlowState> {
        let n = self.initiate_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let state = options.state.unwrap_or_else(|| format!("state-{}", n));
        Ok(FlowState {
            authorization_uri: format!("https://login.example.com/authorize?state={}", state),
            state,
            redirect_uri: redirect_uri.to_string(),
            requested_scopes: vec!["openid".to_string(), "profile".to_string()],
            code_verifier: Some("verifier".to_string()),
            nonce: Some("nonce-1".to_string()),
            ..Default::default()
        })
    }

    async fn finalize_auth_flow(
        &self,
        flow: &FlowState,
        response: &AuthResponse,
        cache: &mut TokenCache,
    ) -> Result<AuthToken> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        if response.state.as_deref() != Some(flow.state.as_str()) {
            return Err(MsalAuthError::StateMismatch("fake".to_string()).into());
        }

        let reply = self.finalize_reply.lock().unwrap().clone();
        let mut token = match reply {
            FinalizeReply::Token(token) => token,
            FinalizeReply::Transport => {
                return Err(MsalAuthError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "token endpoint timed out",
                ))
                .into())
            }
        };

        if token.is_error() {
            return Ok(token);
        }
        if let Some(claims) = token.id_token.as_deref().and_then(|t| self.decode_id_token(t)) {
            let user_id = claims.user_id.clone().unwrap_or_default();
            let account = LocalAccount {
                home_account_id: format!("{}.tenant-1", user_id),
                local_account_id: user_id,
                username: claims.preferred_username.clone(),
                ..Default::default()
            };
            token.id_token_claims = Some(claims);
            cache.add(account, &token, &flow.requested_scopes, Utc::now());
        }
        Ok(token)
    }

    async fn acquire_token_silent(
        &self,
        cache: &mut TokenCache,
        account: Option<&LocalAccount>,
        _authority: Option<&str>,
        _force_refresh: bool,
        _claims_challenge: Option<&str>,
    ) -> Result<Option<AuthToken>> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        let Some(account) = account else {
            return Ok(None);
        };
        if self.silent_fails.load(Ordering::SeqCst) {
            cache.remove_refresh_token(&account.home_account_id);
            return Err(MsalAuthError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "token endpoint timed out",
            ))
            .into());
        }
        Ok(self.silent_reply.lock().unwrap().clone())
    }

    async fn get_accounts(
        &self,
        cache: &TokenCache,
        username: Option<&str>,
    ) -> Result<Vec<LocalAccount>> {
        Ok(cache.find_accounts(username))
    }

    async fn remove_account(&self, cache: &mut TokenCache, account: &LocalAccount) -> Result<()> {
        cache.remove_account(&account.home_account_id);
        Ok(())
    }

    fn decode_id_token(&self, id_token: &str) -> Option<IDTokenClaims> {
        jwt::decode_claims(id_token, false).ok()
    }

    async fn validate_id_token(
        &self,
        id_token: &str,
        nonce: Option<&str>,
    ) -> Result<IDTokenClaims> {
        let claims = jwt::decode_claims(id_token, false)?;
        let status = validate_token(&claims, Some(CLIENT_ID), None, nonce, None);
        if !status.is_valid() {
            return Err(MsalAuthError::InvalidToken(status).into());
        }
        Ok(claims)
    }
}

/// Handler over a fake client and a fresh in-memory backend
#[allow(dead_code)]
pub fn fake_handler(
    client: FakeIdentityClient,
) -> (AuthCodeHandler, Arc<FakeIdentityClient>, MemorySessionBackend) {
    let backend = MemorySessionBackend::new();
    let (handler, client) = fake_handler_with_backend(client, Arc::new(backend.clone()));
    (handler, client, backend)
}

/// Handler over a fake client and the given session backend
#[allow(dead_code)]
pub fn fake_handler_with_backend(
    client: FakeIdentityClient,
    backend: Arc<dyn SessionBackend>,
) -> (AuthCodeHandler, Arc<FakeIdentityClient>) {
    let client = Arc::new(client);
    let handler = AuthCodeHandler::new(
        Arc::new(memory_config()),
        Arc::clone(&client) as Arc<dyn IdentityClient>,
        backend,
    );
    (handler, client)
}
