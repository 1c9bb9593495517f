//! `kore chat`: build one agent loop from the resolved config and run a
//! single user turn to completion.

use std::io::Read;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use kore_config::KoreConfig;
use kore_core::agent::AgentLoop;
use kore_core::data::{AgentMode, Role, Session};
use kore_core::llm::{LLMProvider, OllamaProvider, OpenAiProvider};
use kore_core::skills::{AuditLogger, PolicyEngine, Registry, Runtime as SkillRuntime};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub(crate) fn provider_for(config: &KoreConfig) -> Result<Arc<dyn LLMProvider>> {
    let llm = &config.llm;
    let base_url = llm.base_url.clone();
    match llm.provider.as_str() {
        "ollama" => {
            let base_url = base_url.unwrap_or_else(|| "http://localhost:11434".to_string());
            Ok(Arc::new(OllamaProvider::new(base_url, llm.model.clone())))
        }
        "openai" | "" => {
            let base_url = base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Arc::new(OpenAiProvider::new(base_url, llm.api_key.clone(), llm.model.clone())))
        }
        other => bail!("unknown llm.provider `{other}`"),
    }
}

pub async fn run(config: KoreConfig, msg: Option<String>) -> Result<()> {
    let content = match msg {
        Some(msg) => msg,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading message from stdin")?;
            buf
        }
    };

    let provider = provider_for(&config)?;

    let registry = Arc::new(Registry::new(kore_config::data_dir()));
    let policy = Arc::new(RwLock::new(PolicyEngine::new(true)));
    let audit = Arc::new(AuditLogger::new(256));
    let skills = Arc::new(SkillRuntime::new(registry, policy, audit));

    let agent_loop = AgentLoop::new(
        provider,
        skills,
        "chat",
        Vec::new(),
        config.agent.clone(),
        config.context.clone(),
        config.llm.clone(),
    );

    let mut session = Session::new("cli", AgentMode::Standard);
    agent_loop.run_turn(&mut session, &content, CancellationToken::new()).await?;

    for message in &session.messages {
        if matches!(message.role, Role::Assistant) {
            println!("{}", message.content);
        }
    }

    Ok(())
}
