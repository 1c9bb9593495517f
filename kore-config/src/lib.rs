//! Layered JSONC configuration for Kore: defaults, user-home file, project
//! file, then environment overrides, highest precedence last.

pub mod jsonc;
pub mod loader;
pub mod schema;

pub use loader::{data_dir, load, load_default};
pub use schema::{AgentConfig, ContextConfig, KoreConfig, LlmConfig, SecurityConfig, UiConfig, UiMode};
