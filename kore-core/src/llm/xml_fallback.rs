//! XML tool-grammar fallback for providers without native tool calls.
//! Scans a growing content buffer for complete `<tool name="X">arg</tool>`
//! occurrences and synthesises whole (non-streamed) `ToolCallDelta` events,
//! suppressing the matched bytes from the emitted `Content` stream.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use regex::Regex;
use serde_json::json;

use crate::data::StreamEvent;

static TOOL_TAG: OnceLock<Regex> = OnceLock::new();

fn tool_tag_regex() -> &'static Regex {
    TOOL_TAG.get_or_init(|| {
        Regex::new(r#"(?s)<tool\s+name="([^"]+)">(.*?)</tool>"#).expect("static tool-tag pattern is valid")
    })
}

/// The grammar description injected into the first system message when a
/// model has no native tool-call support.
pub fn tool_grammar_preamble(tools: &[super::ToolSchema]) -> String {
    let mut preamble = String::from(
        "To invoke a tool, emit exactly `<tool name=\"TOOL_NAME\">input</tool>` inline in your response.\nAvailable tools:\n",
    );
    for tool in tools {
        preamble.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    preamble
}

pub struct XmlToolScanner {
    buffer: String,
    next_id: AtomicUsize,
}

impl Default for XmlToolScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlToolScanner {
    pub fn new() -> Self {
        Self { buffer: String::new(), next_id: AtomicUsize::new(0) }
    }

    /// Feed one content chunk; returns the events to emit immediately
    /// (content for text preceding any complete tag match, plus one
    /// synthesized `ToolCallDelta` per match). Text after the last match
    /// (which may be the start of a not-yet-complete tag) stays buffered.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        let regex = tool_tag_regex();

        loop {
            let Some(capture) = regex.captures(&self.buffer) else { break };
            let full_match = capture.get(0).expect("capture group 0 always matches");
            let name = capture.get(1).expect("named group present").as_str().to_string();
            let arg = capture.get(2).expect("body group present").as_str().to_string();

            let preceding = self.buffer[..full_match.start()].to_string();
            if !preceding.is_empty() {
                events.push(StreamEvent::Content { text: preceding });
            }

            let index = self.next_id.fetch_add(1, Ordering::SeqCst);
            events.push(StreamEvent::ToolCallDelta {
                id: Some(format!("xml_tool_{index}")),
                name: Some(name),
                arguments: Some(json!({ "input": arg }).to_string()),
                index,
            });

            self.buffer.drain(..full_match.end());
        }

        // Hold back a trailing `<` prefix that might be the start of a tag
        // still arriving; only flush whole-word safe suffixes early.
        if let Some(tag_start) = self.buffer.rfind('<')
            && self.buffer[tag_start..].len() < "<tool name=\"\">".len()
        {
            if tag_start > 0 {
                events.push(StreamEvent::Content { text: self.buffer[..tag_start].to_string() });
                self.buffer.drain(..tag_start);
            }
            return events;
        }

        if !self.buffer.contains('<') && !self.buffer.is_empty() {
            events.push(StreamEvent::Content { text: std::mem::take(&mut self.buffer) });
        }

        events
    }

    /// Flush whatever remains on `done`, stripping any dangling tag markup.
    pub fn flush(&mut self) -> Option<StreamEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let stripped = self.buffer.replace(['<', '>'], "");
        self.buffer.clear();
        if stripped.is_empty() { None } else { Some(StreamEvent::Content { text: stripped }) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_single_complete_tool_call() {
        let mut scanner = XmlToolScanner::new();
        let events = scanner.feed("sure, <tool name=\"read_file\">main.go</tool>");
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Content { text } => assert_eq!(text, "sure, "),
            _ => panic!("expected leading content"),
        }
        match &events[1] {
            StreamEvent::ToolCallDelta { name, arguments, .. } => {
                assert_eq!(name.as_deref(), Some("read_file"));
                assert_eq!(arguments.as_deref(), Some("{\"input\":\"main.go\"}"));
            }
            _ => panic!("expected tool call delta"),
        }
    }

    #[test]
    fn holds_back_partial_tag_prefix_across_chunks() {
        let mut scanner = XmlToolScanner::new();
        let first = scanner.feed("ok <to");
        assert!(
            first.iter().all(|e| !matches!(e, StreamEvent::ToolCallDelta { .. })),
            "no tool call should fire before the tag is complete"
        );
        let second = scanner.feed("ol name=\"grep\">needle</tool> done");
        assert!(second.iter().any(|e| matches!(e, StreamEvent::ToolCallDelta { .. })));
    }
}
