//! Line-JSON streaming provider (C6): `{message:{content}, done}` frames,
//! one per line, over a local model endpoint. Native-tools mode behaves like
//! the SSE provider at the event level; fallback mode injects XML tool
//! grammar and parses it back out of the content stream. Grounded on the
//! teacher's `llm/providers/ollama/{client,parser}.rs`.

use async_trait::async_trait;
use futures::StreamExt;
use kore_commons::error::{KoreError, KoreResult};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use super::xml_fallback::{XmlToolScanner, tool_grammar_preamble};
use super::{ChatRequest, LLMProvider, STREAM_CHANNEL_CAPACITY};
use crate::data::{Role, StreamEvent};

/// Models known to support the native `tool_calls` field; anything else
/// falls back to XML-grammar injection.
const NATIVE_TOOL_MODELS: &[&str] = &["llama3.1", "llama3.2", "qwen2.5", "mistral-nemo"];

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into(), model: model.into() }
    }

    fn supports_native_tools(&self) -> bool {
        NATIVE_TOOL_MODELS.iter().any(|m| self.model.starts_with(m))
    }

    fn build_payload(&self, request: &ChatRequest, fallback: bool) -> Value {
        let mut messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": role_str(m.role), "content": m.content}))
            .collect();

        if fallback && !request.tools.is_empty() {
            let preamble = tool_grammar_preamble(&request.tools);
            match messages.iter_mut().find(|m| m["role"] == "system") {
                Some(system) => {
                    let existing = system["content"].as_str().unwrap_or_default();
                    system["content"] = json!(format!("{existing}\n{preamble}"));
                }
                None => messages.insert(0, json!({"role": "system", "content": preamble})),
            }
        }

        json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "options": {"temperature": request.temperature, "num_predict": request.max_tokens},
        })
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
impl LLMProvider for OllamaProvider {
    async fn chat_stream(
        &self,
        request: ChatRequest,
        cancel: tokio_util::sync::CancellationToken,
    ) -> KoreResult<mpsc::Receiver<StreamEvent>> {
        let fallback = !self.supports_native_tools();
        let payload = self.build_payload(&request, fallback);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| KoreError::Transport(e.to_string()))?;

        let mut byte_stream = response.bytes_stream();
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut line_buffer = String::new();
            let mut scanner = XmlToolScanner::new();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = tx.send(StreamEvent::Error { message: "cancelled".into() }).await;
                        return;
                    }
                    chunk = byte_stream.next() => {
                        let Some(chunk) = chunk else {
                            if let Some(event) = scanner.flush() {
                                let _ = tx.send(event).await;
                            }
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
                        line_buffer.push_str(&String::from_utf8_lossy(&bytes));

                        while let Some(newline_at) = line_buffer.find('\n') {
                            let line = line_buffer[..newline_at].to_string();
                            line_buffer.drain(..=newline_at);
                            if line.trim().is_empty() {
                                continue;
                            }
                            let Ok(value) = serde_json::from_str::<Value>(line.trim()) else { continue };

                            let content = value.get("message").and_then(|m| m.get("content")).and_then(Value::as_str).unwrap_or_default();
                            if !content.is_empty() {
                                if fallback {
                                    for event in scanner.feed(content) {
                                        if tx.send(event).await.is_err() {
                                            return;
                                        }
                                    }
                                } else if tx.send(StreamEvent::Content { text: content.to_string() }).await.is_err() {
                                    return;
                                }
                            }

                            if value.get("done").and_then(Value::as_bool) == Some(true) {
                                if fallback && let Some(event) = scanner.flush() {
                                    let _ = tx.send(event).await;
                                }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_model_detection_matches_known_prefixes() {
        let provider = OllamaProvider::new("http://localhost:11434", "llama3.1:8b");
        assert!(provider.supports_native_tools());
        let fallback_provider = OllamaProvider::new("http://localhost:11434", "phi3");
        assert!(!fallback_provider.supports_native_tools());
    }

    #[test]
    fn fallback_payload_injects_tool_grammar_into_system_message() {
        let provider = OllamaProvider::new("http://localhost:11434", "phi3");
        let request = ChatRequest {
            messages: vec![crate::data::Message::new("s1", Role::System, "be helpful")],
            tools: vec![super::super::ToolSchema {
                name: "read_file".into(),
                description: "reads a file".into(),
                parameters: json!({}),
            }],
            temperature: 0.2,
            max_tokens: 1000,
        };
        let payload = provider.build_payload(&request, true);
        let system_content = payload["messages"][0]["content"].as_str().unwrap();
        assert!(system_content.contains("read_file"));
    }
}
