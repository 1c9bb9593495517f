//! Shared `ServerState` fixture for unit tests across this crate's modules.

use std::sync::Arc;

use async_trait::async_trait;
use kore_commons::error::KoreResult;
use kore_config::{AgentConfig, ContextConfig, LlmConfig};
use kore_core::agent::AgentLoop;
use kore_core::data::StreamEvent;
use kore_core::llm::{ChatRequest, LLMProvider};
use kore_core::localenv::LocalEnvironment;
use kore_core::security::{Interceptor, SecurityTier};
use kore_core::session_store::SessionStore;
use kore_core::skills::{AuditLogger, PolicyEngine, Registry, Runtime as SkillRuntime};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::state::ServerState;

struct NeverCalledProvider;

#[async_trait]
impl LLMProvider for NeverCalledProvider {
    async fn chat_stream(
        &self,
        _request: ChatRequest,
        _cancel: CancellationToken,
    ) -> KoreResult<tokio::sync::mpsc::Receiver<StreamEvent>> {
        unreachable!("not exercised by these tests")
    }

    fn get_model(&self) -> &str {
        "unused"
    }
}

/// An in-memory `ServerState` wired up with a never-called LLM provider, for
/// tests that only exercise the session store or the session-lock map.
pub(crate) fn test_state() -> ServerState {
    let store = Arc::new(SessionStore::open_in_memory().unwrap());
    let provider: Arc<dyn LLMProvider> = Arc::new(NeverCalledProvider);
    let registry = Arc::new(Registry::new(std::env::temp_dir()));
    let policy = Arc::new(RwLock::new(PolicyEngine::new(true)));
    let audit = Arc::new(AuditLogger::new(16));
    let skills = Arc::new(SkillRuntime::new(registry, policy, audit));
    let agent_loop = Arc::new(AgentLoop::new(
        provider,
        skills,
        "test",
        Vec::new(),
        AgentConfig::default(),
        ContextConfig::default(),
        LlmConfig::default(),
    ));
    let interceptor = Interceptor::new(SecurityTier::Strict, vec![std::env::temp_dir()]);
    let local_env = Arc::new(LocalEnvironment::new(interceptor, std::env::temp_dir()));
    ServerState::new(store, agent_loop, local_env)
}
