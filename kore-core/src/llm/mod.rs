//! LLM Provider abstraction: streaming chat over two wire protocols
//! (SSE/delta, line-JSON) plus an XML tool-grammar fallback for models
//! without native tool calls.

mod openai;
mod ollama;
mod sse;
mod xml_fallback;

pub use openai::OpenAiProvider;
pub use ollama::OllamaProvider;
pub use sse::{ToolCallBuilder, extract_data_payload, find_sse_boundary};

use async_trait::async_trait;
use kore_commons::error::KoreResult;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::data::{Message, StreamEvent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Two methods only: polymorphism stops at this one level, tagged by the
/// concrete provider rather than a deeper trait hierarchy.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn chat_stream(
        &self,
        request: ChatRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> KoreResult<mpsc::Receiver<StreamEvent>>;

    fn get_model(&self) -> &str;
}

/// Channel capacity shared by every provider's reader task, matching the
/// bounded backpressure the Agent Loop relies on (§5).
pub const STREAM_CHANNEL_CAPACITY: usize = 16;
