//! # Kore
//!
//! Kore is an AI coding-assistant runtime: a ReAct agent loop driving
//! multi-provider LLM streaming over a sandboxed local execution
//! environment, fronted by a persistent-session RPC server.
//!
//! - `kore-commons` - shared error types and path/diff utilities.
//! - `kore-config` - layered JSONC configuration.
//! - `kore-exec` - sandboxed subprocess spawning.
//! - `kore-core` - the security interceptor, virtual filesystem, process
//!   manager, local environment, LLM providers, skill runtime, session
//!   store, and the agent loop that ties them together.
//! - `kore-server` - the JSON-RPC session server (unary calls, a
//!   `SendMessage` WebSocket, and SSE streams for command output and
//!   events).
//! - `src/` (this crate) - the `kore` CLI binary.

pub mod cli;
