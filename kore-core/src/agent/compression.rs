//! Context compression: when the transcript's estimated token count exceeds
//! `ContextConfig.max_tokens`, the oldest half of the transcript is folded
//! into one synthetic system message so the loop can keep running instead
//! of overflowing the provider's context window.

use crate::data::{Message, Role};

/// Rough token estimate; good enough to trigger compression without a real
/// tokenizer in the hot path.
pub fn estimate_tokens(text: &str) -> u32 {
    (text.len() as u32).div_ceil(4)
}

pub fn transcript_tokens(messages: &[Message]) -> u32 {
    messages.iter().map(|m| estimate_tokens(&m.content)).sum()
}

/// Returns `true` and rewrites `messages` in place if compression ran.
pub fn compress_if_needed(messages: &mut Vec<Message>, max_tokens: u32) -> bool {
    if transcript_tokens(messages) <= max_tokens {
        return false;
    }
    let split = messages.len() / 2;
    if split == 0 {
        return false;
    }
    let older: Vec<Message> = messages.drain(..split).collect();
    let summary_body: String = older
        .iter()
        .map(|m| format!("{:?}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    let session_id = older
        .first()
        .map(|m| m.session_id.clone())
        .or_else(|| messages.first().map(|m| m.session_id.clone()))
        .unwrap_or_default();
    let mut summary = Message::new(
        session_id,
        Role::System,
        format!("[compressed {} earlier messages]\n{summary_body}", older.len()),
    );
    summary
        .metadata
        .insert("compressed".to_string(), serde_json::Value::Bool(true));
    messages.insert(0, summary);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(content: &str) -> Message {
        Message::new("sess-1", Role::User, content)
    }

    #[test]
    fn leaves_short_transcripts_untouched() {
        let mut messages = vec![msg("hi"), msg("there")];
        assert!(!compress_if_needed(&mut messages, 8000));
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn compresses_oldest_half_when_over_budget() {
        let mut messages: Vec<Message> =
            (0..10).map(|i| msg(&"word ".repeat(200).to_string() + &i.to_string())).collect();
        let before = messages.len();
        let compressed = compress_if_needed(&mut messages, 50);
        assert!(compressed);
        assert!(messages.len() < before);
        assert!(messages[0].metadata.contains_key("compressed"));
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn does_not_loop_forever_on_a_single_oversized_message() {
        let mut messages = vec![msg(&"word ".repeat(5000))];
        assert!(!compress_if_needed(&mut messages, 10));
        assert_eq!(messages.len(), 1);
    }
}
