//! Agent Loop (C11): the ReAct turn driver. Takes one user message, streams
//! the model's reply, assembles and dispatches any tool calls, and repeats
//! until the model stops asking for tools or `AgentConfig.max_loops` is hit.
//! Grounded on the teacher's `orchestrator/mod.rs` for the role-routing shape
//! and `subagents/registry.rs` for the optional plan/review passes.

mod compression;
mod orchestrator;
mod state;
mod tool_calls;

pub use compression::{compress_if_needed, estimate_tokens, transcript_tokens};
pub use orchestrator::Orchestrator;
pub use state::AgentState;
pub use tool_calls::{Outcome, ToolCallAccumulator};

use std::sync::Arc;

use futures::future::join_all;
use kore_commons::error::{KoreError, KoreResult};
use kore_config::{AgentConfig, ContextConfig, LlmConfig};
use tokio_util::sync::CancellationToken;

use crate::data::{Message, Role, Session, StreamEvent, ToolCall};
use crate::llm::{ChatRequest, LLMProvider, ToolSchema};
use crate::skills::Runtime as SkillRuntime;


pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    skills: Arc<SkillRuntime>,
    skill_id: String,
    tools: Vec<ToolSchema>,
    orchestrator: Orchestrator,
    context: ContextConfig,
    llm: LlmConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        skills: Arc<SkillRuntime>,
        skill_id: impl Into<String>,
        tools: Vec<ToolSchema>,
        agent: AgentConfig,
        context: ContextConfig,
        llm: LlmConfig,
    ) -> Self {
        Self {
            provider,
            skills,
            skill_id: skill_id.into(),
            tools,
            orchestrator: Orchestrator::new(agent),
            context,
            llm,
        }
    }

    /// Rewrites `session.agent_mode` at most once per turn, on the first
    /// configured keyword found (case-insensitively) in the user's input.
    fn apply_keyword_magic(&self, session: &mut Session, user_input: &str) {
        let lowered = user_input.to_ascii_lowercase();
        for keyword in self.orchestrator.keyword_keys() {
            if lowered.contains(&keyword) {
                if let Some(mode) = self.orchestrator.keyword_for(&keyword) {
                    if let Ok(parsed) = mode.parse() {
                        session.agent_mode = parsed;
                        return;
                    }
                }
            }
        }
    }

    async fn run_pass(
        &self,
        session: &Session,
        role: &str,
        phase: &str,
        cancel: &CancellationToken,
    ) -> KoreResult<Message> {
        let model = self.orchestrator.select_model(role, &[]);
        let request = ChatRequest {
            messages: session.messages.clone(),
            tools: Vec::new(),
            temperature: self.llm.temperature as f32,
            max_tokens: self.llm.max_tokens,
        };
        let _ = model; // model selection informs provider construction upstream; this provider is fixed.
        let content = drain_content_only(&self.provider, request, cancel).await?;
        let mut message = Message::new(session.id.clone(), Role::Assistant, content);
        message
            .metadata
            .insert("phase".to_string(), serde_json::Value::String(phase.to_string()));
        Ok(message)
    }

    /// Runs one full turn: optional plan pass, bounded execute loop, optional
    /// review pass. Mutates `session.messages` in place and bumps its stats.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        user_input: &str,
        cancel: CancellationToken,
    ) -> KoreResult<()> {
        self.apply_keyword_magic(session, user_input);
        session.append(Message::new(session.id.clone(), Role::User, user_input));
        compress_if_needed(&mut session.messages, self.context.max_tokens);

        if self.orchestrator.has_role("planner") {
            let plan = self.run_pass(session, "planner", "plan", &cancel).await?;
            session.append(plan);
        }

        self.execute_loop(session, &cancel).await?;

        if self.orchestrator.has_role("reviewer") {
            let review = self.run_pass(session, "reviewer", "review", &cancel).await?;
            session.append(review);
        }

        Ok(())
    }

    async fn execute_loop(&self, session: &mut Session, cancel: &CancellationToken) -> KoreResult<()> {
        let max_loops = self.orchestrator.max_loops().max(1);

        for _ in 0..max_loops {
            let request = ChatRequest {
                messages: session.messages.clone(),
                tools: self.tools.clone(),
                temperature: self.llm.temperature as f32,
                max_tokens: self.llm.max_tokens,
            };

            let (content, outcomes) = stream_turn(&self.provider, request, cancel).await?;

            if outcomes.is_empty() {
                session.append(Message::new(session.id.clone(), Role::Assistant, content));
                return Ok(());
            }

            let calls: Vec<ToolCall> = outcomes
                .iter()
                .map(|outcome| match outcome {
                    Outcome::Complete(call) => call.clone(),
                    Outcome::Malformed { id, name, raw_arguments } => ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: raw_arguments.clone(),
                    },
                })
                .collect();

            let mut assistant = Message::new(session.id.clone(), Role::Assistant, content);
            assistant.tool_calls = Some(calls.clone());
            session.append(assistant);

            // Dispatch every tool call concurrently; `join_all` preserves the
            // input order in its output, so results line up with `calls`.
            let results = join_all(outcomes.into_iter().map(|outcome| self.dispatch(outcome))).await;

            for (call, result) in calls.into_iter().zip(results) {
                session.statistics.tool_invocations += 1;
                let content = match result {
                    Ok(value) => value.to_string(),
                    Err(err) => format!("error: {err}"),
                };
                let mut tool_message = Message::new(session.id.clone(), Role::Tool, content);
                tool_message.tool_call_id = Some(call.id);
                session.append(tool_message);
            }

            compress_if_needed(&mut session.messages, self.context.max_tokens);
        }

        Ok(())
    }

    async fn dispatch(&self, outcome: Outcome) -> KoreResult<serde_json::Value> {
        match outcome {
            Outcome::Complete(call) => {
                let args: serde_json::Value = serde_json::from_str(&call.arguments)
                    .map_err(|e| KoreError::ToolError { tool: call.name.clone(), message: e.to_string() })?;
                self.skills.execute(&self.skill_id, &call.name, args).await
            }
            Outcome::Malformed { name, raw_arguments, .. } => Err(KoreError::ToolError {
                tool: name,
                message: format!("malformed tool call arguments: {raw_arguments}"),
            }),
        }
    }
}

/// Streams one model turn to completion, returning the accumulated text
/// content alongside the tool-call outcomes assembled along the way.
async fn stream_turn(
    provider: &Arc<dyn LLMProvider>,
    request: ChatRequest,
    cancel: &CancellationToken,
) -> KoreResult<(String, Vec<Outcome>)> {
    let mut receiver = provider.chat_stream(request, cancel.clone()).await?;
    let mut content = String::new();
    let mut accumulator = ToolCallAccumulator::new();

    while let Some(event) = receiver.recv().await {
        match event {
            StreamEvent::Content { text } => content.push_str(&text),
            StreamEvent::ToolCallDelta { .. } => accumulator.push(&event),
            StreamEvent::Done => break,
            StreamEvent::Error { message } => return Err(KoreError::Protocol(message)),
        }
    }

    Ok((content, accumulator.finish()))
}

/// Plan/review passes never emit tool calls; this drains content only and
/// surfaces a protocol error if the model tries to call a tool anyway.
async fn drain_content_only(
    provider: &Arc<dyn LLMProvider>,
    request: ChatRequest,
    cancel: &CancellationToken,
) -> KoreResult<String> {
    let (content, outcomes) = stream_turn(provider, request, cancel).await?;
    if !outcomes.is_empty() {
        return Err(KoreError::Protocol("tool calls are not supported in plan/review passes".into()));
    }
    Ok(content)
}
