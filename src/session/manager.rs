//! Typed artifacts on top of a session backend
//!
//! The web layer owns a [`CookieSession`] per request (the signed cookie's
//! contents). A [`SessionManager`] borrows it together with a shared backend
//! and translates artifacts to and from the backend entry for that session.
//! Artifacts share one entry, each under its own type name.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{SessionBackend, SessionData};
use crate::client::TokenCache;
use crate::error::{MsalAuthError, Result};
use crate::models::{AuthToken, FlowState};

/// Cookie key the session id is stored under
pub const SESSION_COOKIE_KEY: &str = "sid";

/// Session cookie contents
///
/// Signing or encrypting the cookie is the web layer's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieSession {
    #[serde(rename = "sid", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl CookieSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cookie already bound to `session_id`
    pub fn with_id(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
        }
    }
}

/// A value that can be stored in a session
///
/// `TYPE_NAME` is the key inside the session entry, so two artifact types
/// must never share one.
pub trait SessionArtifact: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;
}

impl SessionArtifact for FlowState {
    const TYPE_NAME: &'static str = "FlowState";
}

impl SessionArtifact for AuthToken {
    const TYPE_NAME: &'static str = "AuthToken";
}

impl SessionArtifact for TokenCache {
    const TYPE_NAME: &'static str = "TokenCache";
}

/// Request-scoped view of one session
pub struct SessionManager<'r> {
    cookie: &'r mut CookieSession,
    backend: Arc<dyn SessionBackend>,
}

impl<'r> SessionManager<'r> {
    pub fn new(cookie: &'r mut CookieSession, backend: Arc<dyn SessionBackend>) -> Self {
        Self { cookie, backend }
    }

    /// Session id from the cookie, if one was bound
    pub fn session_id(&self) -> Option<&str> {
        self.cookie.session_id.as_deref()
    }

    /// Bind `session_id` to the cookie
    ///
    /// Call once per login attempt, before the first [`save`](Self::save).
    pub fn init_session(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        if self.cookie.session_id.as_deref() == Some(session_id.as_str()) {
            return;
        }
        tracing::debug!("Binding new session id to cookie");
        self.cookie.session_id = Some(session_id);
    }

    /// Store `artifact`, replacing any previous value of the same type
    ///
    /// Other artifact types already in the session are kept.
    ///
    /// # Errors
    ///
    /// Returns [`MsalAuthError::NoSession`] when no session id is bound, and
    /// propagates backend and serialization errors
    pub async fn save<T: SessionArtifact>(&self, artifact: &T) -> Result<()> {
        let session_id = self.require_session_id()?;
        let mut data = self.read_data(session_id).await?.unwrap_or_default();
        data.insert(T::TYPE_NAME.to_string(), serde_json::to_string(artifact)?);
        self.backend.write(session_id, &data).await
    }

    /// Load the stored artifact of type `T`
    ///
    /// Returns `Ok(None)` without a session id, without an entry, or when
    /// the entry holds no value of this type.
    ///
    /// # Errors
    ///
    /// Propagates backend errors and fails when the stored value does not
    /// deserialize as `T`
    pub async fn load<T: SessionArtifact>(&self) -> Result<Option<T>> {
        let Some(session_id) = self.session_id() else {
            return Ok(None);
        };

        let Some(data) = self.read_data(session_id).await? else {
            return Ok(None);
        };

        match data.get(T::TYPE_NAME) {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    /// Drop the stored artifact of type `T`, keeping the rest of the session
    ///
    /// No-op without a session id or without a value of this type.
    pub async fn remove<T: SessionArtifact>(&self) -> Result<()> {
        let Some(session_id) = self.session_id() else {
            return Ok(());
        };

        let Some(mut data) = self.read_data(session_id).await? else {
            return Ok(());
        };

        if data.remove(T::TYPE_NAME).is_some() {
            self.backend.write(session_id, &data).await?;
        }
        Ok(())
    }

    /// Delete the whole session and unbind the cookie
    ///
    /// No-op when no session id is bound.
    pub async fn clear(&mut self) -> Result<()> {
        let Some(session_id) = self.cookie.session_id.take() else {
            return Ok(());
        };

        tracing::debug!("Clearing session");
        if let Err(e) = self.backend.remove(&session_id).await {
            // keep the cookie bound so the caller can retry
            self.cookie.session_id = Some(session_id);
            return Err(e);
        }
        Ok(())
    }

    fn require_session_id(&self) -> Result<&str> {
        self.session_id()
            .ok_or_else(|| MsalAuthError::NoSession.into())
    }

    async fn read_data(&self, session_id: &str) -> Result<Option<SessionData>> {
        self.backend.read(session_id).await.map_err(|e| {
            tracing::warn!("Session store read failed: {}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionBackend;

    fn flow(state: &str) -> FlowState {
        FlowState {
            state: state.to_string(),
            redirect_uri: "https://app/token".into(),
            authorization_uri: "https://login/authorize".into(),
            requested_scopes: vec!["openid".into()],
            code_verifier: Some("verifier".into()),
            nonce: Some("nonce".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_save_without_session_fails() {
        let backend: Arc<dyn SessionBackend> = Arc::new(MemorySessionBackend::new());
        let mut cookie = CookieSession::new();
        let manager = SessionManager::new(&mut cookie, backend);

        let err = manager.save(&flow("s1")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MsalAuthError>(),
            Some(MsalAuthError::NoSession)
        ));
    }

    #[tokio::test]
    async fn test_artifacts_coexist_under_one_session() {
        let backend = MemorySessionBackend::new();
        let mut cookie = CookieSession::new();
        let mut manager = SessionManager::new(&mut cookie, Arc::new(backend.clone()));
        manager.init_session("s1");

        let token = AuthToken {
            id_token: Some("a.b.c".into()),
            ..Default::default()
        };
        manager.save(&flow("s1")).await.unwrap();
        manager.save(&token).await.unwrap();

        assert_eq!(manager.load::<FlowState>().await.unwrap(), Some(flow("s1")));
        assert_eq!(manager.load::<AuthToken>().await.unwrap(), Some(token));

        let raw = backend.read("s1").await.unwrap().unwrap();
        assert!(raw.contains_key("FlowState"));
        assert!(raw.contains_key("AuthToken"));
    }

    #[tokio::test]
    async fn test_remove_drops_only_that_type() {
        let backend: Arc<dyn SessionBackend> = Arc::new(MemorySessionBackend::new());
        let mut cookie = CookieSession::with_id("s1");
        let manager = SessionManager::new(&mut cookie, backend);

        manager.save(&flow("s1")).await.unwrap();
        manager.save(&AuthToken::default()).await.unwrap();
        manager.remove::<FlowState>().await.unwrap();

        assert!(manager.load::<FlowState>().await.unwrap().is_none());
        assert!(manager.load::<AuthToken>().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_unbinds_cookie() {
        let backend = MemorySessionBackend::new();
        let mut cookie = CookieSession::with_id("s1");
        {
            let mut manager = SessionManager::new(&mut cookie, Arc::new(backend.clone()));
            manager.save(&flow("s1")).await.unwrap();
            manager.clear().await.unwrap();
            assert!(manager.session_id().is_none());
            assert!(manager.load::<FlowState>().await.unwrap().is_none());
        }
        assert!(cookie.session_id.is_none());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_without_session_is_noop() {
        let backend: Arc<dyn SessionBackend> = Arc::new(MemorySessionBackend::new());
        let mut cookie = CookieSession::new();
        let mut manager = SessionManager::new(&mut cookie, backend);
        manager.clear().await.unwrap();
        assert!(manager.load::<AuthToken>().await.unwrap().is_none());
    }

    #[test]
    fn test_cookie_serializes_under_sid() {
        let cookie = CookieSession::with_id("abc");
        assert_eq!(serde_json::to_string(&cookie).unwrap(), r#"{"sid":"abc"}"#);
    }
}
