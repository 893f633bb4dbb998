//! Auth-code handler state machine tests against a fake identity client

mod common;

use common::{
    fake_handler, fake_handler_with_backend, id_token, FakeIdentityClient, FinalizeReply,
};

use msal_authcode::client::TokenCache;
use msal_authcode::error::{is_retryable, is_unauthorized};
use msal_authcode::models::{AuthToken, FlowState, IDTokenClaims};
use msal_authcode::session::{
    CookieSession, FilesystemSessionBackend, SessionBackend, SessionManager,
};

use std::sync::Arc;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// authorize_redirect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_redirect_binds_session_to_flow_state() {
    let (handler, client, backend) = fake_handler(FakeIdentityClient::new());
    let mut cookie = CookieSession::new();

    let target = handler
        .authorize_redirect(&mut cookie, None, None)
        .await
        .unwrap();

    assert_eq!(target, "https://login.example.com/authorize?state=state-1");
    assert_eq!(cookie.session_id.as_deref(), Some("state-1"));
    assert_eq!(FakeIdentityClient::count(&client.initiate_calls), 1);

    let stored = backend.read("state-1").await.unwrap().unwrap();
    let flow: FlowState = serde_json::from_str(&stored["FlowState"]).unwrap();
    assert_eq!(flow.redirect_uri, "https://app.example.com/token");
}

#[tokio::test]
async fn test_redirect_uses_caller_state_and_redirect_uri() {
    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::new());
    let mut cookie = CookieSession::new();

    handler
        .authorize_redirect(
            &mut cookie,
            Some("https://other.example.com/cb"),
            Some("custom-state".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(cookie.session_id.as_deref(), Some("custom-state"));
    let flow = handler
        .session(&mut cookie)
        .load::<FlowState>()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(flow.redirect_uri, "https://other.example.com/cb");
}

// ---------------------------------------------------------------------------
// authorize_access_token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_callback_persists_token_and_cache() {
    let (handler, _client, _backend) =
        fake_handler(FakeIdentityClient::with_id_token(id_token("user-42", None, 3600)));
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let token = handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap();
    assert!(token.id_token.is_some());

    let session = handler.session(&mut cookie);
    assert_eq!(session.load::<AuthToken>().await.unwrap(), Some(token));
    assert!(session.load::<FlowState>().await.unwrap().is_none());

    let cache = session.load::<TokenCache>().await.unwrap().unwrap();
    assert_eq!(cache.accounts().len(), 1);
    assert_eq!(cache.accounts()[0].local_account_id, "user-42");
}

#[tokio::test]
async fn test_callback_with_mismatched_state_is_unauthorized() {
    let (handler, client, _backend) =
        fake_handler(FakeIdentityClient::with_id_token(id_token("user-42", None, 3600)));
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let err = handler
        .authorize_access_token(&mut cookie, "valid-code", Some("forged"))
        .await
        .unwrap_err();

    assert!(is_unauthorized(&err));
    assert_eq!(err.to_string(), "Authentication Error");
    assert_eq!(FakeIdentityClient::count(&client.finalize_calls), 0);
    assert!(handler
        .get_token_from_session(&mut cookie)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_callback_without_pending_flow_is_unauthorized() {
    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::new());
    let mut cookie = CookieSession::with_id("unknown");

    let err = handler
        .authorize_access_token(&mut cookie, "code", None)
        .await
        .unwrap_err();
    assert!(is_unauthorized(&err));
}

#[tokio::test]
async fn test_flow_state_is_single_use() {
    let (handler, client, _backend) =
        fake_handler(FakeIdentityClient::with_id_token(id_token("user-42", None, 3600)));
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap();
    let replay = handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap_err();

    assert!(is_unauthorized(&replay));
    assert_eq!(FakeIdentityClient::count(&client.finalize_calls), 1);
}

#[tokio::test]
async fn test_callback_without_state_uses_stored_flow() {
    let (handler, _client, _backend) =
        fake_handler(FakeIdentityClient::with_id_token(id_token("user-42", None, 3600)));
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let token = handler
        .authorize_access_token(&mut cookie, "code-1", None)
        .await
        .unwrap();
    assert!(token.id_token.is_some());
}

#[tokio::test]
async fn test_provider_error_is_unauthorized_without_detail() {
    let client = FakeIdentityClient::new();
    client.set_finalize_reply(FinalizeReply::Token(AuthToken::from_error(
        "invalid_grant",
        Some("AADSTS70008: The provided authorization code has expired".to_string()),
    )));
    let (handler, _client, _backend) = fake_handler(client);
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let err = handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap_err();
    assert!(is_unauthorized(&err));
    assert!(!format!("{:#}", err).contains("AADSTS70008"));
}

#[tokio::test]
async fn test_token_without_id_token_is_unauthorized() {
    let client = FakeIdentityClient::new();
    client.set_finalize_reply(FinalizeReply::Token(AuthToken {
        access_token: Some("access-only".to_string()),
        ..Default::default()
    }));
    let (handler, _client, _backend) = fake_handler(client);
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let err = handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap_err();
    assert!(is_unauthorized(&err));
    assert!(handler
        .get_token_from_session(&mut cookie)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_transport_error_stays_retryable() {
    let client = FakeIdentityClient::new();
    client.set_finalize_reply(FinalizeReply::Transport);
    let (handler, client, _backend) = fake_handler(client);
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let err = handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap_err();
    assert!(is_retryable(&err));
    assert!(!is_unauthorized(&err));

    let pending = handler.session(&mut cookie).load::<FlowState>().await.unwrap();
    assert_eq!(pending.map(|f| f.state), Some("state-1".to_string()));

    client.set_finalize_reply(FinalizeReply::Token(AuthToken {
        id_token: Some(id_token("user-42", None, 3600)),
        ..Default::default()
    }));
    let token = handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap();
    assert!(token.id_token.is_some());
    assert_eq!(FakeIdentityClient::count(&client.finalize_calls), 2);
    assert!(handler
        .session(&mut cookie)
        .load::<FlowState>()
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_exchange_for_bearer_returns_id_token() {
    let raw = id_token("user-42", None, 3600);
    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::with_id_token(raw.clone()));
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let bearer = handler
        .exchange_for_bearer(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap();
    assert_eq!(bearer.access_token, raw);
    assert_eq!(
        bearer.generate_header().get("Authorization"),
        Some(&format!("bearer {}", raw))
    );
}

// ---------------------------------------------------------------------------
// parse_id_token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_parse_id_token_reuses_session_claims_without_validation() {
    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::new());
    let raw = id_token("user-42", None, 3600);
    let cached = IDTokenClaims {
        display_name: Some("From session".to_string()),
        ..Default::default()
    };

    let mut cookie = CookieSession::with_id("s1");
    handler
        .session(&mut cookie)
        .save(&AuthToken {
            id_token: Some(raw.clone()),
            id_token_claims: Some(cached.clone()),
            ..Default::default()
        })
        .await
        .unwrap();

    let claims = handler
        .parse_id_token(&mut cookie, &raw, false)
        .await
        .unwrap();
    assert_eq!(claims, Some(cached));

    let fresh = handler
        .parse_id_token(&mut cookie, &raw, true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh.display_name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn test_parse_id_token_rejects_expired_when_validating() {
    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::new());
    let mut cookie = CookieSession::new();
    let expired = id_token("user-42", None, -600);

    assert!(handler
        .parse_id_token(&mut cookie, &expired, true)
        .await
        .unwrap()
        .is_none());
    assert!(handler
        .parse_id_token(&mut cookie, &expired, false)
        .await
        .unwrap()
        .is_some());
    assert!(handler
        .parse_id_token(&mut cookie, "garbage", false)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// logout
// ---------------------------------------------------------------------------

fn post_logout_target(url: &str) -> String {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "post_logout_redirect_uri")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

#[tokio::test]
async fn test_logout_clears_session_and_builds_url() {
    let (handler, _client, backend) =
        fake_handler(FakeIdentityClient::with_id_token(id_token("user-42", None, 3600)));
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();
    handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap();

    let url = handler
        .logout(&mut cookie, Some("https://b"), Some("https://a"))
        .await
        .unwrap();

    assert!(url.starts_with("https://login.microsoftonline.com/contoso/oauth2/v2.0/logout?"));
    assert_eq!(post_logout_target(&url), "https://b");
    assert!(cookie.session_id.is_none());
    assert!(backend.is_empty().await);
}

#[tokio::test]
async fn test_logout_callback_precedence() {
    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::new());

    let url = handler
        .logout(&mut CookieSession::new(), None, Some("https://a"))
        .await
        .unwrap();
    assert_eq!(post_logout_target(&url), "https://a");

    let url = handler
        .logout(&mut CookieSession::new(), None, None)
        .await
        .unwrap();
    assert_eq!(post_logout_target(&url), "/");
}

// ---------------------------------------------------------------------------
// get_token_from_cache / check_authenticated_session
// ---------------------------------------------------------------------------

async fn logged_in(
    client: FakeIdentityClient,
) -> (
    msal_authcode::AuthCodeHandler,
    Arc<FakeIdentityClient>,
    CookieSession,
) {
    let (handler, client, _backend) = fake_handler(client);
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();
    handler
        .authorize_access_token(&mut cookie, "code-1", Some("state-1"))
        .await
        .unwrap();
    (handler, client, cookie)
}

#[tokio::test]
async fn test_cache_refresh_only_for_matching_user() {
    let client = FakeIdentityClient::with_id_token(id_token("user-42", None, 3600));
    client.set_silent_reply(Some(AuthToken {
        id_token: Some(id_token("user-42", None, 7200)),
        access_token: Some("access-2".to_string()),
        ..Default::default()
    }));
    let (handler, client, mut cookie) = logged_in(client).await;

    let other = handler
        .get_token_from_cache(&mut cookie, Some("someone-else"))
        .await
        .unwrap();
    assert!(other.is_none());
    assert_eq!(FakeIdentityClient::count(&client.silent_calls), 0);

    let renewed = handler
        .get_token_from_cache(&mut cookie, Some("user-42"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renewed.access_token.as_deref(), Some("access-2"));
    assert_eq!(FakeIdentityClient::count(&client.silent_calls), 1);

    let session_token = handler.get_token_from_session(&mut cookie).await.unwrap();
    assert_eq!(session_token, Some(renewed));
}

#[tokio::test]
async fn test_cache_refresh_without_cache_is_none() {
    let (handler, client, _backend) = fake_handler(FakeIdentityClient::new());
    let mut cookie = CookieSession::with_id("s1");
    assert!(handler
        .get_token_from_cache(&mut cookie, Some("user-42"))
        .await
        .unwrap()
        .is_none());
    assert_eq!(FakeIdentityClient::count(&client.silent_calls), 0);
}

#[tokio::test]
async fn test_cache_is_saved_when_refresh_fails() {
    let client = FakeIdentityClient::with_id_token(id_token("user-42", None, 3600));
    client.fail_silent();
    let (handler, client, mut cookie) = logged_in(client).await;

    let before = handler
        .session(&mut cookie)
        .load::<TokenCache>()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.refresh_token("user-42.tenant-1"), Some("refresh-1"));

    let err = handler
        .get_token_from_cache(&mut cookie, Some("user-42"))
        .await
        .unwrap_err();
    assert!(is_retryable(&err));
    assert_eq!(FakeIdentityClient::count(&client.silent_calls), 1);

    let after = handler
        .session(&mut cookie)
        .load::<TokenCache>()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.refresh_token("user-42.tenant-1"), None);
    assert_eq!(after.accounts().len(), 1);
}

#[tokio::test]
async fn test_check_authenticated_session() {
    let (handler, _client, mut cookie) =
        logged_in(FakeIdentityClient::with_id_token(id_token("user-42", None, 3600))).await;
    assert!(handler.check_authenticated_session(&mut cookie).await.unwrap());

    let (handler, _client, mut cookie) =
        logged_in(FakeIdentityClient::with_id_token(id_token("user-42", None, -600))).await;
    assert!(!handler.check_authenticated_session(&mut cookie).await.unwrap());

    let (handler, _client, _backend) = fake_handler(FakeIdentityClient::new());
    assert!(!handler
        .check_authenticated_session(&mut CookieSession::new())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_handler_sessions_share_backend() {
    let (handler, _client, backend) = fake_handler(FakeIdentityClient::new());
    let mut cookie = CookieSession::new();
    handler.authorize_redirect(&mut cookie, None, None).await.unwrap();

    let shared: Arc<dyn SessionBackend> = Arc::new(backend);
    let mut same_cookie = cookie.clone();
    let direct = SessionManager::new(&mut same_cookie, shared);
    assert!(direct.load::<FlowState>().await.unwrap().is_some());
}

// ---------------------------------------------------------------------------
// filesystem backend
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login_round_trip_over_filesystem_backend() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("sessions");
    let (handler, _client) = fake_handler_with_backend(
        FakeIdentityClient::with_id_token(id_token("user-42", None, 3600)),
        Arc::new(FilesystemSessionBackend::new(&dir)),
    );

    let mut cookie = CookieSession::new();
    let target = handler
        .authorize_redirect(&mut cookie, None, Some("abc.def~1".to_string()))
        .await
        .unwrap();
    assert!(target.ends_with("state=abc.def~1"));
    assert_eq!(cookie.session_id.as_deref(), Some("abc.def~1"));

    handler
        .authorize_access_token(&mut cookie, "code-1", Some("abc.def~1"))
        .await
        .unwrap();
    assert!(handler.check_authenticated_session(&mut cookie).await.unwrap());

    let reopened = FilesystemSessionBackend::new(&dir);
    let stored = reopened.read("abc.def~1").await.unwrap().unwrap();
    assert!(stored.contains_key("AuthToken"));
    assert!(stored.contains_key("TokenCache"));
    assert!(!stored.contains_key("FlowState"));

    let mut generated = CookieSession::new();
    handler.authorize_redirect(&mut generated, None, None).await.unwrap();
    handler
        .authorize_access_token(&mut generated, "code-1", None)
        .await
        .unwrap();
    assert!(handler
        .get_token_from_session(&mut generated)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_tampered_cookie_over_filesystem_backend_is_unauthorized() {
    let tmp = TempDir::new().unwrap();
    let (handler, _client) = fake_handler_with_backend(
        FakeIdentityClient::new(),
        Arc::new(FilesystemSessionBackend::new(tmp.path().join("sessions"))),
    );

    for id in ["../escape", "a/b", "x.y"] {
        let err = handler
            .authorize_access_token(&mut CookieSession::with_id(id), "code-1", None)
            .await
            .unwrap_err();
        assert!(is_unauthorized(&err), "session id {:?}", id);
    }
}
