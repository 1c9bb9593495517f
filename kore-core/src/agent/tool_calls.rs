//! Accumulates `StreamEvent::ToolCallDelta` events by index into complete
//! `ToolCall`s over the course of one streamed turn.

use std::collections::BTreeMap;

use crate::data::{StreamEvent, ToolCall};

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Complete(ToolCall),
    Malformed { id: String, name: String, raw_arguments: String },
}

#[derive(Default)]
pub struct ToolCallAccumulator {
    by_index: BTreeMap<usize, ToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one `ToolCallDelta` event into the call at its index. Ignores
    /// non-`ToolCallDelta` events; callers filter the stream themselves.
    pub fn push(&mut self, event: &StreamEvent) {
        let StreamEvent::ToolCallDelta { id, name, arguments, index } = event else {
            return;
        };
        let entry = self.by_index.entry(*index).or_insert_with(|| ToolCall {
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
        });
        if let Some(id) = id {
            entry.id = id.clone();
        }
        if let Some(name) = name {
            entry.name = name.clone();
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(arguments);
        }
    }

    /// Drains accumulated calls in index order, classifying each by whether
    /// its `arguments` parsed as a JSON object.
    pub fn finish(self) -> Vec<Outcome> {
        self.by_index
            .into_values()
            .map(|call| {
                if call.is_complete() {
                    Outcome::Complete(call)
                } else {
                    Outcome::Malformed {
                        id: call.id,
                        name: call.name,
                        raw_arguments: call.arguments,
                    }
                }
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> StreamEvent {
        StreamEvent::ToolCallDelta {
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: arguments.map(str::to_string),
            index,
        }
    }

    #[test]
    fn assembles_a_single_call_split_across_deltas() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(0, Some("call_1"), Some("read_file"), Some("{\"path\":")));
        acc.push(&delta(0, None, None, Some("\"a.txt\"}")));
        let outcomes = acc.finish();
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            Outcome::Complete(call) => {
                assert_eq!(call.id, "call_1");
                assert_eq!(call.name, "read_file");
                assert_eq!(call.arguments, "{\"path\":\"a.txt\"}");
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn truncated_arguments_are_reported_malformed() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(0, Some("call_1"), Some("read_file"), Some("{\"path\":")));
        let outcomes = acc.finish();
        assert!(matches!(outcomes[0], Outcome::Malformed { .. }));
    }

    #[test]
    fn preserves_index_order_across_interleaved_deltas() {
        let mut acc = ToolCallAccumulator::new();
        acc.push(&delta(1, Some("call_b"), Some("grep"), Some("{}")));
        acc.push(&delta(0, Some("call_a"), Some("ls"), Some("{}")));
        let outcomes = acc.finish();
        let ids: Vec<String> = outcomes
            .into_iter()
            .map(|o| match o {
                Outcome::Complete(call) => call.id,
                Outcome::Malformed { id, .. } => id,
            })
            .collect();
        assert_eq!(ids, vec!["call_a".to_string(), "call_b".to_string()]);
    }
}
