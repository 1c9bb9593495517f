//! Layered config loading: defaults -> user-home file -> project file ->
//! environment, environment winning. Each JSON layer is merged as a raw
//! `serde_json::Value` tree (only the keys a layer actually sets override
//! the layer beneath it) before the merged tree is deserialized into
//! [`KoreConfig`], so partial files never clobber unrelated defaults.

use std::env;
use std::path::{Path, PathBuf};

use kore_commons::error::{KoreError, KoreResult};
use serde_json::Value;

use crate::jsonc::strip_comments;
use crate::schema::KoreConfig;

const PROJECT_FILE: &str = ".kore.jsonc";
const USER_FILE: &str = "config.jsonc";

/// Recursively merge `overlay` on top of `base`; scalar/array values in
/// `overlay` replace `base`, object trees merge key by key.
fn merge_json_values(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => merge_json_values(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_slot, overlay_value) => *base_slot = overlay_value.clone(),
    }
}

fn read_jsonc_layer(path: &Path) -> KoreResult<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| KoreError::Storage(format!("reading {}: {e}", path.display())))?;
    let stripped = strip_comments(&raw);
    let value: Value = serde_json::from_str(&stripped)
        .map_err(|e| KoreError::Validation(format!("parsing {}: {e}", path.display())))?;
    Ok(Some(value))
}

fn env_overlay() -> Value {
    let mut llm = serde_json::Map::new();
    if let Ok(v) = env::var("KORE_LLM_PROVIDER") {
        llm.insert("provider".into(), Value::String(v));
    }
    if let Ok(v) = env::var("KORE_LLM_MODEL") {
        llm.insert("model".into(), Value::String(v));
    }
    if let Ok(v) = env::var("KORE_LLM_API_KEY") {
        llm.insert("api_key".into(), Value::String(v));
    }
    if let Ok(v) = env::var("KORE_LLM_BASE_URL") {
        llm.insert("base_url".into(), Value::String(v));
    }
    if let Ok(v) = env::var("KORE_LLM_TEMPERATURE") {
        if let Ok(parsed) = v.parse::<f64>() {
            llm.insert("temperature".into(), serde_json::json!(parsed));
        }
    }
    if let Ok(v) = env::var("KORE_LLM_MAX_TOKENS") {
        if let Ok(parsed) = v.parse::<u32>() {
            llm.insert("max_tokens".into(), serde_json::json!(parsed));
        }
    }

    let mut context = serde_json::Map::new();
    if let Ok(v) = env::var("KORE_CONTEXT_MAX_TOKENS") {
        if let Ok(parsed) = v.parse::<u32>() {
            context.insert("max_tokens".into(), serde_json::json!(parsed));
        }
    }

    let mut ui = serde_json::Map::new();
    if let Ok(v) = env::var("KORE_UI_MODE") {
        ui.insert("mode".into(), Value::String(v));
    }

    let mut root = serde_json::Map::new();
    if !llm.is_empty() {
        root.insert("llm".into(), Value::Object(llm));
    }
    if !context.is_empty() {
        root.insert("context".into(), Value::Object(context));
    }
    if !ui.is_empty() {
        root.insert("ui".into(), Value::Object(ui));
    }
    Value::Object(root)
}

fn validate(config: &KoreConfig) -> KoreResult<()> {
    if !(0.0..=2.0).contains(&config.llm.temperature) {
        return Err(KoreError::Validation(format!(
            "llm.temperature must be within [0, 2], got {}",
            config.llm.temperature
        )));
    }
    if config.context.max_tokens < 100 {
        return Err(KoreError::Validation(format!(
            "context.max_tokens must be >= 100, got {}",
            config.context.max_tokens
        )));
    }
    if config.context.max_tree_depth < 1 {
        return Err(KoreError::Validation(format!(
            "context.max_tree_depth must be >= 1, got {}",
            config.context.max_tree_depth
        )));
    }
    Ok(())
}

/// Load config from `project_dir` (looked up for `.kore.jsonc`) and the
/// user's home directory (`config.jsonc`), then apply environment overrides.
/// Precedence, lowest to highest: defaults, user-home file, project file,
/// environment.
pub fn load(project_dir: &Path) -> KoreResult<KoreConfig> {
    let mut merged = serde_json::to_value(KoreConfig::default())
        .map_err(|e| KoreError::Fatal(format!("serializing config defaults: {e}")))?;

    if let Some(home) = dirs::home_dir() {
        if let Some(layer) = read_jsonc_layer(&home.join(USER_FILE))? {
            merge_json_values(&mut merged, &layer);
        }
    }

    if let Some(layer) = read_jsonc_layer(&project_dir.join(PROJECT_FILE))? {
        merge_json_values(&mut merged, &layer);
    }

    merge_json_values(&mut merged, &env_overlay());

    let config: KoreConfig = serde_json::from_value(merged)
        .map_err(|e| KoreError::Validation(format!("assembling layered config: {e}")))?;
    validate(&config)?;
    Ok(config)
}

/// Convenience wrapper defaulting the project directory to the current
/// working directory, as the CLI entry point uses it.
pub fn load_default() -> KoreResult<KoreConfig> {
    let cwd = env::current_dir()
        .map_err(|e| KoreError::Storage(format!("reading current directory: {e}")))?;
    load(&cwd)
}

/// Path the session database and skill manifests live under.
pub fn data_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".kore")
}
