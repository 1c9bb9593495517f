//! Root config schema: keys and defaults from the external interfaces spec.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_context_max_tokens() -> u32 {
    8000
}
fn default_max_tree_depth() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: String::new(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ContextConfig {
    #[serde(default = "default_context_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_tree_depth")]
    pub max_tree_depth: u32,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_tokens: default_context_max_tokens(), max_tree_depth: default_max_tree_depth() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct SecurityConfig {
    #[serde(default)]
    pub blocked_cmds: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    #[default]
    Cli,
    Tui,
    Gui,
}

impl std::str::FromStr for UiMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cli" => Ok(Self::Cli),
            "tui" => Ok(Self::Tui),
            "gui" => Ok(Self::Gui),
            other => Err(format!("unknown ui mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct UiConfig {
    #[serde(default)]
    pub mode: UiMode,
}

fn default_max_loops() -> u32 {
    1
}

fn default_keyword_magic() -> HashMap<String, String> {
    let mut vocabulary = HashMap::new();
    vocabulary.insert("ultrawork".to_string(), "build".to_string());
    vocabulary.insert("analyze".to_string(), "plan".to_string());
    vocabulary
}

/// Role → model-id table and the Agent Loop's keyword-magic vocabulary and
/// bounded-loop count. The loop's role selection falls back to the
/// `"default"` entry when a role is missing from `models`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
    #[serde(default)]
    pub models: HashMap<String, String>,
    #[serde(default = "default_keyword_magic")]
    pub keyword_magic: HashMap<String, String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert("default".to_string(), default_model());
        Self { max_loops: default_max_loops(), models, keyword_magic: default_keyword_magic() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct KoreConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = KoreConfig::default();
        assert_eq!(cfg.llm.provider, "openai");
        assert_eq!(cfg.llm.model, "gpt-4");
        assert_eq!(cfg.llm.temperature, 0.7);
        assert_eq!(cfg.llm.max_tokens, 4000);
        assert_eq!(cfg.context.max_tokens, 8000);
        assert_eq!(cfg.context.max_tree_depth, 5);
        assert_eq!(cfg.ui.mode, UiMode::Cli);
        assert_eq!(cfg.agent.max_loops, 1);
        assert_eq!(cfg.agent.models.get("default"), Some(&"gpt-4".to_string()));
    }

    #[test]
    fn parses_ui_mode_case_insensitively() {
        assert_eq!("TUI".parse::<UiMode>().unwrap(), UiMode::Tui);
        assert!("invalid".parse::<UiMode>().is_err());
    }
}
