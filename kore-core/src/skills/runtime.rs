//! Skill Runtime (C8): hosts builtin (in-process), external (subprocess),
//! and MCP (long-running JSON-RPC subprocess) skill flavours. Grounded on
//! the teacher's `skills/executor.rs`/`skills/container.rs` dispatch
//! pattern and `mcp/client.rs`'s JSON-RPC transport.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kore_commons::error::{KoreError, KoreResult};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, RwLock};

use super::audit::AuditLogger;
use super::policy::PolicyEngine;
use super::registry::Registry;
use super::types::{AuditEvent, SkillState, SkillType};

pub type BuiltinHandler = Arc<dyn Fn(Value) -> KoreResult<Value> + Send + Sync>;

enum ActiveSkill {
    Builtin(BuiltinHandler),
    External { entry_point: String },
    Mcp { child: Mutex<Child> },
}

pub struct Runtime {
    registry: Arc<Registry>,
    policy: Arc<RwLock<PolicyEngine>>,
    audit: Arc<AuditLogger>,
    builtins: HashMap<String, BuiltinHandler>,
    active: RwLock<HashMap<String, ActiveSkill>>,
}

impl Runtime {
    pub fn new(registry: Arc<Registry>, policy: Arc<RwLock<PolicyEngine>>, audit: Arc<AuditLogger>) -> Self {
        Self { registry, policy, audit, builtins: HashMap::new(), active: RwLock::new(HashMap::new()) }
    }

    pub fn register_builtin(&mut self, tool_name: impl Into<String>, handler: BuiltinHandler) {
        self.builtins.insert(tool_name.into(), handler);
    }

    /// Find the enabled manifest, construct an instance, and insert it into
    /// the active map. For MCP skills this spawns and holds the long-running
    /// subprocess; for external skills only the entry point is recorded.
    pub async fn load(&self, id: &str) -> KoreResult<()> {
        let manifest = self.registry.get(id).await?;
        if manifest.state != SkillState::Enabled {
            return Err(KoreError::Validation(format!("skill `{id}` is not enabled")));
        }

        let instance = match manifest.kind {
            SkillType::Builtin => {
                let handler = self
                    .builtins
                    .get(id)
                    .cloned()
                    .ok_or_else(|| KoreError::not_found("builtin skill handler", id))?;
                ActiveSkill::Builtin(handler)
            }
            SkillType::External => {
                let entry_point =
                    manifest.entry_point.clone().ok_or_else(|| KoreError::Fatal(format!("skill `{id}` missing entry_point")))?;
                ActiveSkill::External { entry_point }
            }
            SkillType::Mcp => {
                let entry_point =
                    manifest.entry_point.clone().ok_or_else(|| KoreError::Fatal(format!("skill `{id}` missing entry_point")))?;
                let child = Command::new(&entry_point)
                    .stdin(std::process::Stdio::piped())
                    .stdout(std::process::Stdio::piped())
                    .spawn()
                    .map_err(|e| KoreError::ToolError { tool: id.to_string(), message: e.to_string() })?;
                ActiveSkill::Mcp { child: Mutex::new(child) }
            }
        };

        self.active.write().await.insert(id.to_string(), instance);
        Ok(())
    }

    /// Policy check (with audit entry on deny) then dispatch, auditing the
    /// result either way.
    pub async fn execute(&self, id: &str, tool: &str, input: Value) -> KoreResult<Value> {
        let manifest = self.registry.get(id).await?;
        let verdict = self.policy.read().await.evaluate(&manifest, tool, &input);

        if !verdict.allow {
            self.audit
                .record(AuditEvent {
                    kind: "PermissionDenied".into(),
                    skill_id: id.to_string(),
                    tool: tool.to_string(),
                    input: input.clone(),
                    output: None,
                    reason: Some(verdict.reason.clone()),
                    error: None,
                    timestamp: Utc::now(),
                    success: false,
                })
                .await;
            return Err(KoreError::Security(kore_commons::error::SecurityError::CommandBlocked {
                command: format!("{id}:{tool}"),
                reason: verdict.reason,
            }));
        }

        let result = self.dispatch(id, tool, input.clone()).await;

        self.audit
            .record(AuditEvent {
                kind: "execute".into(),
                skill_id: id.to_string(),
                tool: tool.to_string(),
                input,
                output: result.as_ref().ok().cloned(),
                reason: None,
                error: result.as_ref().err().map(ToString::to_string),
                timestamp: Utc::now(),
                success: result.is_ok(),
            })
            .await;

        result
    }

    async fn dispatch(&self, id: &str, tool: &str, input: Value) -> KoreResult<Value> {
        let active = self.active.read().await;
        let instance = active.get(id).ok_or_else(|| KoreError::not_found("active skill", id))?;

        match instance {
            ActiveSkill::Builtin(handler) => handler(input),
            ActiveSkill::External { entry_point } => {
                let output = Command::new(entry_point)
                    .arg(tool)
                    .arg(input.to_string())
                    .output()
                    .await
                    .map_err(|e| KoreError::ToolError { tool: tool.to_string(), message: e.to_string() })?;
                if !output.status.success() {
                    return Err(KoreError::ToolError {
                        tool: tool.to_string(),
                        message: String::from_utf8_lossy(&output.stderr).to_string(),
                    });
                }
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                Ok(serde_json::from_str(&stdout).unwrap_or_else(|_| serde_json::json!({"output": stdout})))
            }
            ActiveSkill::Mcp { child } => mcp_tools_call(child, tool, input).await,
        }
    }

    pub async fn unload(&self, id: &str) -> KoreResult<()> {
        if let Some(ActiveSkill::Mcp { child }) = self.active.write().await.remove(id) {
            let _ = child.into_inner().kill().await;
        }
        Ok(())
    }
}

/// JSON-RPC 2.0 `tools/call` over the MCP subprocess's stdin/stdout.
async fn mcp_tools_call(child: &Mutex<Child>, tool: &str, input: Value) -> KoreResult<Value> {
    let mut guard = child.lock().await;
    let stdin = guard.stdin.as_mut().ok_or_else(|| KoreError::Fatal("mcp child missing stdin".into()))?;
    let stdout = guard.stdout.as_mut().ok_or_else(|| KoreError::Fatal("mcp child missing stdout".into()))?;

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": tool, "arguments": input},
    });
    let mut line = serde_json::to_string(&request).map_err(|e| KoreError::Protocol(e.to_string()))?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await.map_err(|e| KoreError::Transport(e.to_string()))?;

    let mut reader = BufReader::new(stdout);
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await.map_err(|e| KoreError::Transport(e.to_string()))?;

    let response: Value = serde_json::from_str(response_line.trim()).map_err(|e| KoreError::Protocol(e.to_string()))?;
    if let Some(error) = response.get("error") {
        return Err(KoreError::ToolError { tool: tool.to_string(), message: error.to_string() });
    }
    Ok(response.get("result").cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::types::{Permission, PermissionAction, PermissionType, SkillManifest, SkillState, SkillType};
    use chrono::Utc;
    use semver::Version;

    fn builtin_manifest(id: &str) -> SkillManifest {
        let now = Utc::now();
        SkillManifest {
            id: id.to_string(),
            name: id.to_string(),
            version: Version::parse("1.0.0").unwrap(),
            kind: SkillType::Builtin,
            entry_point: None,
            interpreter: None,
            dependencies: vec![],
            permissions: vec![Permission {
                kind: PermissionType::Command,
                resource: "*".into(),
                action: PermissionAction::Execute,
                reason: String::new(),
            }],
            tools: vec![],
            state: SkillState::Enabled,
            installed_at: now,
            updated_at: now,
        }
    }

    async fn runtime_with(manifest: SkillManifest, default_deny: bool) -> (Runtime, Arc<AuditLogger>) {
        let registry = Arc::new(Registry::new(std::env::temp_dir()));
        registry.register(manifest.clone()).await.unwrap();
        let policy = Arc::new(RwLock::new(PolicyEngine::new(default_deny)));
        let audit = Arc::new(AuditLogger::new(16));
        (Runtime::new(registry, policy, audit.clone()), audit)
    }

    #[tokio::test]
    async fn builtin_skill_executes_and_audits_success() {
        let (mut runtime, audit) = runtime_with(builtin_manifest("echo"), false).await;
        runtime.register_builtin("say", Arc::new(|input: Value| Ok(input)));
        runtime.load("echo").await.unwrap();

        let result = runtime.execute("echo", "say", serde_json::json!({"command": "say", "msg": "hi"})).await.unwrap();
        assert_eq!(result["msg"], "hi");

        let events = audit.for_skill("echo").await;
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
    }

    #[tokio::test]
    async fn policy_denial_short_circuits_dispatch_and_audits_reason() {
        let (mut runtime, audit) = runtime_with(builtin_manifest("echo"), true).await;
        runtime.register_builtin("say", Arc::new(|_input: Value| Ok(Value::Null)));
        runtime.load("echo").await.unwrap();

        let err = runtime.execute("echo", "say", serde_json::json!({"url": "https://example.com"})).await.unwrap_err();
        assert!(matches!(err, KoreError::Security(_)));

        let events = audit.for_skill("echo").await;
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert!(events[0].reason.is_some());
    }

    #[tokio::test]
    async fn loading_unknown_builtin_handler_fails() {
        let (runtime, _audit) = runtime_with(builtin_manifest("missing"), false).await;
        let err = runtime.load("missing").await.unwrap_err();
        assert!(matches!(err, KoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unload_is_a_no_op_for_non_mcp_skills() {
        let (mut runtime, _audit) = runtime_with(builtin_manifest("echo"), false).await;
        runtime.register_builtin("say", Arc::new(|input: Value| Ok(input)));
        runtime.load("echo").await.unwrap();
        runtime.unload("echo").await.unwrap();
        let err = runtime.execute("echo", "say", serde_json::json!({"command": "say"})).await.unwrap_err();
        assert!(matches!(err, KoreError::NotFound { .. }));
    }
}
