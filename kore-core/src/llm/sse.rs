//! SSE framing and tool-call-delta accumulation shared by the delta-style
//! providers. Mirrors the teacher's `llm::providers::shared` helpers.

use serde_json::Value;

use crate::data::StreamEvent;

/// Find the byte offset and length of the next SSE event boundary
/// (`\n\n` or `\r\n\r\n`), whichever occurs first.
pub fn find_sse_boundary(buffer: &str) -> Option<(usize, usize)> {
    let newline = buffer.find("\n\n").map(|idx| (idx, 2));
    let carriage = buffer.find("\r\n\r\n").map(|idx| (idx, 4));
    match (newline, carriage) {
        (Some((n, nl)), Some((c, cl))) => Some(if n <= c { (n, nl) } else { (c, cl) }),
        (Some(b), None) | (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Pull the `data:` payload lines out of one SSE event block, joined by `\n`.
pub fn extract_data_payload(event: &str) -> Option<String> {
    let mut lines = Vec::new();
    for raw in event.lines() {
        let line = raw.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            lines.push(rest.trim_start().to_string());
        }
    }
    if lines.is_empty() { None } else { Some(lines.join("\n")) }
}

/// Accumulates one tool call's id/name/arguments across many deltas that
/// share the same `index`.
#[derive(Default, Clone)]
pub struct ToolCallBuilder {
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallBuilder {
    /// Apply one `choices[0].delta.tool_calls[i]` entry, accepting either
    /// the flat `{id,name,arguments}` shape or the nested `function` object.
    pub fn apply_delta(&mut self, delta: &Value) {
        if let Some(id) = delta.get("id").and_then(Value::as_str) {
            self.id = Some(id.to_string());
        }
        let (name, arguments) = match delta.get("function") {
            Some(function) => (
                function.get("name").and_then(Value::as_str),
                function.get("arguments"),
            ),
            None => (delta.get("name").and_then(Value::as_str), delta.get("arguments")),
        };
        if let Some(name) = name {
            self.name = Some(name.to_string());
        }
        if let Some(arguments) = arguments {
            match arguments.as_str() {
                Some(s) => self.arguments.push_str(s),
                None => self.arguments.push_str(&arguments.to_string()),
            }
        }
    }

    pub fn into_event(self, index: usize) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            id: self.id,
            name: self.name,
            arguments: if self.arguments.is_empty() { None } else { Some(self.arguments) },
            index,
        }
    }
}

/// Route one `choices[0].delta` value's tool_calls array into the
/// per-index builder set, resizing as new indices appear.
pub fn apply_tool_call_deltas(builders: &mut Vec<ToolCallBuilder>, deltas: &[Value]) {
    for (position, delta) in deltas.iter().enumerate() {
        let index = delta.get("index").and_then(Value::as_u64).map(|v| v as usize).unwrap_or(position);
        if builders.len() <= index {
            builders.resize_with(index + 1, ToolCallBuilder::default);
        }
        builders[index].apply_delta(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_double_newline_boundary() {
        let buf = "data: {\"a\":1}\n\nrest";
        assert_eq!(find_sse_boundary(buf), Some((13, 2)));
    }

    #[test]
    fn extracts_single_data_line() {
        let event = "data: {\"a\":1}";
        assert_eq!(extract_data_payload(event), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn tool_call_builder_accumulates_arguments_across_deltas() {
        let mut builder = ToolCallBuilder::default();
        builder.apply_delta(&serde_json::json!({"id": "c1", "function": {"name": "read_file"}}));
        builder.apply_delta(&serde_json::json!({"function": {"arguments": "{\"path\":"}}));
        builder.apply_delta(&serde_json::json!({"function": {"arguments": "\"main.go\"}"}}));
        let event = builder.into_event(0);
        match event {
            StreamEvent::ToolCallDelta { id, name, arguments, .. } => {
                assert_eq!(id.as_deref(), Some("c1"));
                assert_eq!(name.as_deref(), Some("read_file"));
                assert_eq!(arguments.as_deref(), Some("{\"path\":\"main.go\"}"));
            }
            _ => panic!("expected ToolCallDelta"),
        }
    }
}
