//! Capability-based policy evaluation: a request `(skill_id, tool_name,
//! input)` is checked against the skill's declared permission ceiling and a
//! per-skill policy list. First matching policy wins; default-deny when no
//! policy matches.

use std::collections::HashMap;

use chrono::Utc;

use super::types::{Permission, PermissionAction, PermissionType, Policy, SkillManifest};

pub struct PolicyEngine {
    policies: HashMap<String, Vec<Policy>>,
    default_deny: bool,
}

#[derive(Debug, Clone)]
pub struct EvalResult {
    pub allow: bool,
    pub reason: String,
}

impl PolicyEngine {
    pub fn new(default_deny: bool) -> Self {
        Self { policies: HashMap::new(), default_deny }
    }

    pub fn set_policies(&mut self, skill_id: impl Into<String>, policies: Vec<Policy>) {
        self.policies.insert(skill_id.into(), policies);
    }

    pub fn evaluate(&self, manifest: &SkillManifest, tool_name: &str, input: &serde_json::Value) -> EvalResult {
        let (kind, resource, action) = infer_request(tool_name, input);

        let declared = manifest.permissions.iter().any(|p| p.kind == kind);
        if !declared {
            return EvalResult { allow: false, reason: format!("skill does not declare `{kind:?}` permission") };
        }
        if !resource_within_ceiling(&manifest.permissions, kind, &resource) {
            return EvalResult { allow: false, reason: format!("resource `{resource}` exceeds declared permission ceiling") };
        }

        let now = Utc::now();
        if let Some(policies) = self.policies.get(&manifest.id) {
            for policy in policies {
                if policy.kind != kind {
                    continue;
                }
                if let Some(expires) = policy.expires_at
                    && expires < now
                {
                    continue;
                }
                if !glob_match(&policy.resource, &resource) {
                    continue;
                }
                if !action_matches(policy.action, action) {
                    continue;
                }
                return EvalResult {
                    allow: policy.allow,
                    reason: if policy.allow { "matched allow policy".into() } else { "matched deny policy".into() },
                };
            }
        }

        if self.default_deny {
            EvalResult { allow: false, reason: "no matching policy; default-deny".into() }
        } else {
            EvalResult { allow: true, reason: "no matching policy; default-allow".into() }
        }
    }
}

fn resource_within_ceiling(permissions: &[Permission], kind: PermissionType, resource: &str) -> bool {
    permissions.iter().any(|p| p.kind == kind && glob_match(&p.resource, resource))
}

fn action_matches(policy_action: PermissionAction, requested: PermissionAction) -> bool {
    matches!(policy_action, PermissionAction::Any) || policy_action == requested
}

/// Infers `(type, resource, action)` from the tool invocation per the
/// mapping table: filesystem from `input.path`/`input.file`, command from
/// `input.command`/tool name, network from `input.url`.
fn infer_request(tool_name: &str, input: &serde_json::Value) -> (PermissionType, String, PermissionAction) {
    if let Some(path) = input.get("path").or_else(|| input.get("file")).and_then(|v| v.as_str()) {
        let action = if tool_name.contains("write") { PermissionAction::Write } else { PermissionAction::Read };
        return (PermissionType::Filesystem, path.to_string(), action);
    }
    if let Some(url) = input.get("url").and_then(|v| v.as_str()) {
        let action = match input.get("action").and_then(|v| v.as_str()) {
            Some("read") => PermissionAction::Read,
            Some("write") => PermissionAction::Write,
            Some("execute") => PermissionAction::Execute,
            _ => PermissionAction::Any,
        };
        return (PermissionType::Network, url.to_string(), action);
    }
    let command = input.get("command").and_then(|v| v.as_str()).unwrap_or(tool_name);
    (PermissionType::Command, command.to_string(), PermissionAction::Execute)
}

/// Minimal glob: `*` matches anything; exact match otherwise, or a
/// prefix match when the pattern ends in `/*`.
fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix("/*") {
        return value == prefix || value.starts_with(&format!("{prefix}/"));
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::types::{SkillState, SkillType};
    use chrono::Utc;
    use semver::Version;

    fn manifest_with_permissions(permissions: Vec<Permission>) -> SkillManifest {
        let now = Utc::now();
        SkillManifest {
            id: "fs-skill".into(),
            name: "fs-skill".into(),
            version: Version::parse("1.0.0").unwrap(),
            kind: SkillType::Builtin,
            entry_point: None,
            interpreter: None,
            dependencies: vec![],
            permissions,
            tools: vec![],
            state: SkillState::Enabled,
            installed_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn undeclared_permission_type_is_denied() {
        let engine = PolicyEngine::new(true);
        let manifest = manifest_with_permissions(vec![]);
        let result = engine.evaluate(&manifest, "read_file", &serde_json::json!({"path": "a.txt"}));
        assert!(!result.allow);
    }

    #[test]
    fn declared_permission_with_no_policy_defaults_to_configured_verdict() {
        let mut engine = PolicyEngine::new(false);
        let manifest = manifest_with_permissions(vec![Permission {
            kind: PermissionType::Filesystem,
            resource: "/workspace/*".into(),
            action: PermissionAction::Read,
            reason: String::new(),
        }]);
        let result = engine.evaluate(&manifest, "read_file", &serde_json::json!({"path": "/workspace/a.txt"}));
        assert!(result.allow);

        engine.set_policies(
            "fs-skill",
            vec![Policy {
                kind: PermissionType::Filesystem,
                resource: "/workspace/secrets/*".into(),
                action: PermissionAction::Any,
                allow: false,
                expires_at: None,
            }],
        );
        let denied = engine.evaluate(&manifest, "read_file", &serde_json::json!({"path": "/workspace/secrets/key"}));
        assert!(!denied.allow);
    }

    #[test]
    fn expired_policy_is_skipped() {
        let mut engine = PolicyEngine::new(true);
        let manifest = manifest_with_permissions(vec![Permission {
            kind: PermissionType::Command,
            resource: "ls".into(),
            action: PermissionAction::Execute,
            reason: String::new(),
        }]);
        engine.set_policies(
            "fs-skill",
            vec![Policy {
                kind: PermissionType::Command,
                resource: "*".into(),
                action: PermissionAction::Any,
                allow: true,
                expires_at: Some(Utc::now() - chrono::Duration::hours(1)),
            }],
        );
        let result = engine.evaluate(&manifest, "ls", &serde_json::json!({"command": "ls"}));
        assert!(!result.allow, "expired policy must not apply; falls through to default-deny");
    }
}
