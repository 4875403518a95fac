//! Session persistence contract.
//!
//! The core never persists conversations itself; embedders wire a
//! `SessionStore` around `Agent::conversation`. The in-memory
//! implementation is the reference for the contract and is useful in
//! tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ai::types::ModelMessage;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, session_id: &str) -> anyhow::Result<Vec<ModelMessage>>;
    async fn save(&self, session_id: &str, conversation: &[ModelMessage]) -> anyhow::Result<()>;
    async fn reset(&self, session_id: &str) -> anyhow::Result<()>;
}

/// Process-local session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<ModelMessage>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> anyhow::Result<Vec<ModelMessage>> {
        let sessions = self.sessions.lock().expect("session store poisoned");
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn save(&self, session_id: &str, conversation: &[ModelMessage]) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        sessions.insert(session_id.to_string(), conversation.to_vec());
        Ok(())
    }

    async fn reset(&self, session_id: &str) -> anyhow::Result<()> {
        let mut sessions = self.sessions.lock().expect("session store poisoned");
        sessions.remove(session_id);
        Ok(())
    }
}
