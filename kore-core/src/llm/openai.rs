//! SSE/delta streaming provider (C5): one HTTP POST, `data: <json>\n\n`
//! frames terminated by `data: [DONE]`. Grounded on the teacher's
//! `llm/providers/openai.rs` request shape and `shared::process_openai_stream`
//! framing loop.

use async_trait::async_trait;
use futures::StreamExt;
use kore_commons::error::{KoreError, KoreResult};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::sse::{ToolCallBuilder, apply_tool_call_deltas, extract_data_payload, find_sse_boundary};
use super::{ChatRequest, LLMProvider, STREAM_CHANNEL_CAPACITY};
use crate::data::{Role, StreamEvent};

pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), api_key: api_key.into(), model: model.into() }
    }

    fn build_payload(&self, request: &ChatRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                json!({
                    "role": role_str(m.role),
                    "content": m.content,
                    "tool_call_id": m.tool_call_id,
                })
            })
            .collect();

        let tools: Vec<Value> = request
            .tools
            .iter()
            .map(|t| json!({"type": "function", "function": {"name": t.name, "description": t.description, "parameters": t.parameters}}))
            .collect();

        let mut payload = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !tools.is_empty() {
            payload["tools"] = Value::Array(tools);
        }
        payload
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl LLMProvider for OpenAiProvider {
    async fn chat_stream(
        &self,
        request: ChatRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> KoreResult<mpsc::Receiver<StreamEvent>> {
        let payload = self.build_payload(&request);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| KoreError::Transport(e.to_string()))?;

        let mut byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut buffer = String::new();
            let mut builders: Vec<ToolCallBuilder> = Vec::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(StreamEvent::Error { message: "cancelled".into() }).await;
                        return;
                    }
                    chunk = byte_stream.next() => {
                        let Some(chunk) = chunk else {
                            let _ = tx.send(StreamEvent::Done).await;
                            return;
                        };
                        let bytes = match chunk {
                            Ok(b) => b,
                            Err(e) => {
                                let _ = tx.send(StreamEvent::Error { message: e.to_string() }).await;
                                return;
                            }
                        };
                        buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some((idx, len)) = find_sse_boundary(&buffer) {
                            let event = buffer[..idx].to_string();
                            buffer.drain(..idx + len);
                            let Some(data) = extract_data_payload(&event) else { continue };
                            if data == "[DONE]" {
                                emit_tool_calls(&tx, &mut builders).await;
                                let _ = tx.send(StreamEvent::Done).await;
                                return;
                            }
                            let Ok(value) = serde_json::from_str::<Value>(&data) else { continue };
                            if !dispatch_delta(&tx, &value, &mut builders).await {
                                return;
                            }
                            if value.get("choices").and_then(|c| c.get(0)).and_then(|c| c.get("finish_reason")).and_then(Value::as_str).is_some_and(|r| r != "null") {
                                emit_tool_calls(&tx, &mut builders).await;
                                let _ = tx.send(StreamEvent::Done).await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    fn get_model(&self) -> &str {
        &self.model
    }
}

/// Returns `false` if the receiver has gone away and the task should stop.
async fn dispatch_delta(tx: &mpsc::Sender<StreamEvent>, value: &Value, builders: &mut Vec<ToolCallBuilder>) -> bool {
    let Some(delta) = value.get("choices").and_then(|c| c.get(0)).and_then(|c| c.get("delta")) else { return true };
    if let Some(content) = delta.get("content").and_then(Value::as_str)
        && !content.is_empty()
        && tx.send(StreamEvent::Content { text: content.to_string() }).await.is_err()
    {
        return false;
    }
    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
        apply_tool_call_deltas(builders, calls);
    }
    true
}

async fn emit_tool_calls(tx: &mpsc::Sender<StreamEvent>, builders: &mut Vec<ToolCallBuilder>) {
    for (index, builder) in builders.drain(..).enumerate() {
        let _ = tx.send(builder.into_event(index)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Message;

    #[test]
    fn build_payload_includes_tool_schemas() {
        let provider = OpenAiProvider::new("https://api.openai.com/v1", "key", "gpt-4");
        let request = ChatRequest {
            messages: vec![Message::new("s1", Role::User, "hi")],
            tools: vec![super::super::ToolSchema {
                name: "read_file".into(),
                description: "reads a file".into(),
                parameters: json!({"type": "object"}),
            }],
            temperature: 0.7,
            max_tokens: 4000,
        };
        let payload = provider.build_payload(&request);
        assert_eq!(payload["tools"][0]["function"]["name"], "read_file");
        assert_eq!(payload["stream"], true);
    }
}
