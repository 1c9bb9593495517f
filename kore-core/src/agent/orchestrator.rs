//! Role → model-id resolution. Generalizes the teacher's
//! `DistributedOrchestrator`'s `ExecutionTarget -> WorkExecutor` registry
//! (`orchestrator/mod.rs`) into a flat role -> model-id lookup: a turn's
//! `PLAN`/`EXECUTE`/`REVIEW` states each ask for the model configured for
//! their role, falling back to `"default"` when the role is unset.

use kore_config::AgentConfig;

pub struct Orchestrator {
    config: AgentConfig,
}

impl Orchestrator {
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// `capabilities` is accepted for forward compatibility with capability-
    /// aware routing; the current table is a pure role keyed lookup.
    pub fn select_model(&self, role: &str, _capabilities: &[&str]) -> String {
        self.config
            .models
            .get(role)
            .or_else(|| self.config.models.get("default"))
            .cloned()
            .unwrap_or_else(|| "gpt-4".to_string())
    }

    /// Whether a role has an explicit entry in the model table, used to gate
    /// the optional PLAN/REVIEW phases.
    pub fn has_role(&self, role: &str) -> bool {
        self.config.models.contains_key(role)
    }

    pub fn max_loops(&self) -> u32 {
        self.config.max_loops
    }

    pub fn keyword_for(&self, keyword: &str) -> Option<&str> {
        self.config.keyword_magic.get(keyword).map(String::as_str)
    }

    pub fn keyword_keys(&self) -> Vec<String> {
        self.config.keyword_magic.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(models: &[(&str, &str)]) -> AgentConfig {
        let mut map = HashMap::new();
        for (role, model) in models {
            map.insert(role.to_string(), model.to_string());
        }
        AgentConfig { max_loops: 4, models: map, keyword_magic: HashMap::new() }
    }

    #[test]
    fn select_model_falls_back_to_default_role() {
        let orchestrator = Orchestrator::new(config_with(&[("default", "gpt-4")]));
        assert_eq!(orchestrator.select_model("planner", &[]), "gpt-4");
    }

    #[test]
    fn select_model_prefers_exact_role() {
        let orchestrator =
            Orchestrator::new(config_with(&[("default", "gpt-4"), ("planner", "gpt-4-mini")]));
        assert_eq!(orchestrator.select_model("planner", &[]), "gpt-4-mini");
    }

    #[test]
    fn has_role_reports_explicit_entries_only() {
        let orchestrator = Orchestrator::new(config_with(&[("default", "gpt-4")]));
        assert!(!orchestrator.has_role("reviewer"));
        assert!(orchestrator.has_role("default"));
    }
}
