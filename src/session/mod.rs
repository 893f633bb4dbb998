//! Session persistence
//!
//! A [`SessionBackend`] maps an opaque session id to a small string map and
//! knows nothing about the protocol. [`SessionManager`] sits on top and is
//! the only place typed artifacts are turned into store entries.

pub mod filesystem;
pub mod manager;
pub mod memory;

pub use filesystem::FilesystemSessionBackend;
pub use manager::{CookieSession, SessionArtifact, SessionManager, SESSION_COOKIE_KEY};
pub use memory::MemorySessionBackend;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{MsalClientConfig, SessionType};
use crate::error::Result;

/// Payload stored per session: artifact type name to serialized artifact
pub type SessionData = HashMap<String, String>;

/// Key/value session store
///
/// Implementations must tolerate concurrent calls for different keys. Reading
/// a missing key yields `None`; writing and removing are idempotent.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    async fn write(&self, key: &str, value: &SessionData) -> Result<()>;

    /// Load the value stored under `key`
    async fn read(&self, key: &str) -> Result<Option<SessionData>>;

    /// Delete the value stored under `key`, if any
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Build the backend selected by the configuration
///
/// # Errors
///
/// Returns an error when the filesystem session directory cannot be
/// determined
pub fn build_backend(config: &MsalClientConfig) -> Result<Arc<dyn SessionBackend>> {
    match config.session_type {
        SessionType::Memory => {
            tracing::debug!("Using in-memory session store");
            Ok(Arc::new(MemorySessionBackend::new()))
        }
        SessionType::Filesystem => {
            let dir = config.session_directory()?;
            tracing::debug!("Using filesystem session store at {}", dir.display());
            Ok(Arc::new(FilesystemSessionBackend::new(dir)))
        }
    }
}
