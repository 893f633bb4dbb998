//! In-memory session backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionBackend, SessionData};
use crate::error::Result;

/// Process-lifetime session store
///
/// Each instance owns its own map. Clones share the map, so the application
/// root creates one and hands clones (or an `Arc`) to every manager.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionBackend {
    sessions: Arc<RwLock<HashMap<String, SessionData>>>,
}

impl MemorySessionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionBackend for MemorySessionBackend {
    async fn write(&self, key: &str, value: &SessionData) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<SessionData>> {
        Ok(self.sessions.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}
