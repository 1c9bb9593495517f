//! Shared server state: the session store, the agent loop, the local
//! execution environment for `ExecuteCommand`, and a per-session write lock
//! so two concurrent `SendMessage` calls on the same session serialise
//! instead of racing each other's transcript append.

use std::collections::HashMap;
use std::sync::Arc;

use kore_core::agent::AgentLoop;
use kore_core::localenv::LocalEnvironment;
use kore_core::session_store::SessionStore;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::rpc::Event;

#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<SessionStore>,
    pub agent_loop: Arc<AgentLoop>,
    pub local_env: Arc<LocalEnvironment>,
    pub events: Arc<broadcast::Sender<Event>>,
    session_locks: Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>,
}

impl ServerState {
    pub fn new(store: Arc<SessionStore>, agent_loop: Arc<AgentLoop>, local_env: Arc<LocalEnvironment>) -> Self {
        let (tx, _rx) = broadcast::channel(256);
        Self {
            store,
            agent_loop,
            local_env,
            events: Arc::new(tx),
            session_locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the mutex guarding a given session's transcript, creating one
    /// on first use. Every `SendMessage` call for that session must hold it
    /// for the duration of the turn.
    pub async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.session_locks.read().await.get(session_id) {
            return lock.clone();
        }
        let mut guard = self.session_locks.write().await;
        guard.entry(session_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
