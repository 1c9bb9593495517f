//! `kore serve`: bind and run the session RPC server, wiring
//! `kore-core`'s agent loop and session store into `kore-server`'s router.

use std::sync::Arc;

use anyhow::{Context, Result};
use kore_config::KoreConfig;
use kore_core::agent::AgentLoop;
use kore_core::localenv::LocalEnvironment;
use kore_core::security::{Interceptor, SecurityTier};
use kore_core::session_store::SessionStore;
use kore_core::skills::{AuditLogger, PolicyEngine, Registry, Runtime as SkillRuntime};
use kore_server::{create_router, ServerState, Transport};
use tokio::sync::RwLock;
use tracing::info;

use super::chat::provider_for;

pub async fn run(config: KoreConfig) -> Result<()> {
    let provider = provider_for(&config)?;

    let registry = Arc::new(Registry::new(kore_config::data_dir()));
    let policy = Arc::new(RwLock::new(PolicyEngine::new(true)));
    let audit = Arc::new(AuditLogger::new(256));
    let skills = Arc::new(SkillRuntime::new(registry, policy, audit));

    let agent_loop = Arc::new(AgentLoop::new(
        provider,
        skills,
        "server",
        Vec::new(),
        config.agent.clone(),
        config.context.clone(),
        config.llm.clone(),
    ));

    let workdir = std::env::current_dir().context("resolving current directory")?;
    let interceptor = Interceptor::new(SecurityTier::Standard, vec![workdir.clone()]);
    let local_env = Arc::new(LocalEnvironment::new(interceptor, workdir));

    std::fs::create_dir_all(kore_config::data_dir()).context("creating data directory")?;
    let db_path = kore_config::data_dir().join("sessions.sqlite3");
    let store = Arc::new(SessionStore::open(&db_path).context("opening session store")?);

    let state = ServerState::new(store, agent_loop, local_env);
    let router = create_router(state);

    let transport = Transport::bind().await.context("binding session server transport")?;
    info!(address = %transport.describe(), "kore session server listening");

    transport.serve(router).await.context("serving session server")
}
