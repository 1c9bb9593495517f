//! Shared data model: `Message`, `ToolCall`, `StreamEvent`, `Session`.
//! Every type round-trips through `serde` for both RPC transit
//! (`kore-server`) and at-rest storage (`session_store`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON string, the concatenation of streamed argument deltas.
    pub arguments: String,
}

impl ToolCall {
    /// A call is complete iff `arguments` parses as a JSON object.
    pub fn is_complete(&self) -> bool {
        matches!(
            serde_json::from_str::<serde_json::Value>(&self.arguments),
            Ok(serde_json::Value::Object(_))
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// A tagged event yielded by an LLM provider stream. For a given
/// `ToolCallDelta` index, the first delta carries `id`/`name`; later deltas
/// append to `arguments` only. `Done` is always the final event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    Content { text: String },
    ToolCallDelta {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
        index: usize,
    },
    Done,
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Standard,
    Plan,
    Build,
}

impl std::str::FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "plan" => Ok(Self::Plan),
            "build" => Ok(Self::Build),
            other => Err(format!("unknown agent_mode `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Closed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub turn_count: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tool_invocations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub agent_mode: AgentMode,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub statistics: SessionStatistics,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    pub fn new(name: impl Into<String>, agent_mode: AgentMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            agent_mode,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
            description: String::new(),
            tags: Vec::new(),
            statistics: SessionStatistics::default(),
            metadata: HashMap::new(),
            messages: Vec::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.statistics.turn_count += 1;
        self.messages.push(message);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_completeness_requires_json_object() {
        let mut call = ToolCall { id: "1".into(), name: "read_file".into(), arguments: "{\"path\":".into() };
        assert!(!call.is_complete());
        call.arguments = "{\"path\": \"a.txt\"}".into();
        assert!(call.is_complete());
    }

    #[test]
    fn agent_mode_parses_case_insensitively_and_rejects_unknown() {
        assert_eq!("BUILD".parse::<AgentMode>().unwrap(), AgentMode::Build);
        assert!("bogus".parse::<AgentMode>().is_err());
    }

    #[test]
    fn message_round_trips_through_json() {
        let message = Message::new("sess-1", Role::Assistant, "hello");
        let json = serde_json::to_string(&message).unwrap();
        let restored: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.id, message.id);
        assert_eq!(restored.content, "hello");
    }

    #[test]
    fn session_append_bumps_turn_count_and_updated_at() {
        let mut session = Session::new("demo", AgentMode::Standard);
        let before = session.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        session.append(Message::new(&session.id, Role::User, "hi"));
        assert_eq!(session.statistics.turn_count, 1);
        assert!(session.updated_at >= before);
    }

    #[test]
    fn session_round_trips_through_json() {
        let mut session = Session::new("demo", AgentMode::Build);
        session.append(Message::new(&session.id, Role::User, "hi"));
        let json = serde_json::to_string(&session).unwrap();
        let restored: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.messages.len(), 1);
        assert_eq!(restored.agent_mode, AgentMode::Build);
    }
}
