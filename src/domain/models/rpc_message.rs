//! Worker RPC wire protocol (spec §6): newline-delimited JSON, UTF-8.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands sent orchestrator → worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcCommand {
    GetState {
        id: String,
    },
    Prompt {
        message: String,
    },
    Steer {
        message: String,
    },
    FollowUp {
        #[serde(rename = "message")]
        message: String,
    },
    SetModel {
        provider: String,
        #[serde(rename = "modelId")]
        model_id: String,
    },
}

impl RpcCommand {
    /// The remote command name (`follow_up`, `steer`, ...) matching §6's
    /// literal `type` values; `FollowUp` serializes to `follow_up` and
    /// `GetState` to `get_state` automatically via `serde`'s `snake_case`
    /// rename, but tests assert this explicitly to lock the wire shape.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut s = serde_json::to_string(self)?;
        s.push('\n');
        Ok(s)
    }
}

/// Events received worker → orchestrator. `Other` retains any event whose
/// `type` is not one of the four named families (§4.4): the raw JSON value
/// is kept so it can be pushed onto the event ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkerEvent {
    #[serde(rename = "response")]
    Response {
        command: String,
        #[serde(flatten)]
        extra: Value,
    },
    #[serde(rename = "agent_start")]
    AgentStart {
        #[serde(flatten)]
        extra: Value,
    },
    #[serde(rename = "agent_end")]
    AgentEnd {
        #[serde(flatten)]
        extra: Value,
    },
    #[serde(rename = "message_update")]
    MessageUpdate {
        #[serde(rename = "assistantMessageEvent")]
        assistant_message_event: AssistantMessageEvent,
    },
    #[serde(other)]
    Other,
}

/// Nested event shape for `message_update` (§4.4, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantMessageEvent {
    TextDelta { delta: String },
    #[serde(other)]
    Other,
}

impl WorkerEvent {
    /// Parse a single line of the worker's `out` file. Returns `None` on
    /// malformed JSON — non-JSON lines are silently discarded (§4.3).
    pub fn parse_line(line: &str) -> Option<(Self, String)> {
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            return None;
        }
        serde_json::from_str::<Self>(trimmed)
            .ok()
            .map(|event| (event, trimmed.to_string()))
    }

    /// Whether this event matches the handshake response for `get_state`.
    pub fn is_startup_check_response(&self) -> bool {
        matches!(self, WorkerEvent::Response { command, .. } if command == "get_state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_up_serializes_as_follow_up() {
        let cmd = RpcCommand::FollowUp { message: "hi".into() };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "follow_up");
        assert_eq!(json["message"], "hi");
    }

    #[test]
    fn get_state_serializes_with_id() {
        let cmd = RpcCommand::GetState { id: "startup-check".into() };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "get_state");
        assert_eq!(json["id"], "startup-check");
    }

    #[test]
    fn parses_text_delta() {
        let line = r#"{"type":"message_update","assistantMessageEvent":{"type":"text_delta","delta":"hello"}}"#;
        let (event, _raw) = WorkerEvent::parse_line(line).unwrap();
        match event {
            WorkerEvent::MessageUpdate { assistant_message_event: AssistantMessageEvent::TextDelta { delta } } => {
                assert_eq!(delta, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn non_json_line_is_discarded() {
        assert!(WorkerEvent::parse_line("not json at all").is_none());
    }

    #[test]
    fn unknown_event_type_retained_as_other() {
        let line = r#"{"type":"tool_call","name":"bash"}"#;
        let (event, raw) = WorkerEvent::parse_line(line).unwrap();
        assert!(matches!(event, WorkerEvent::Other));
        assert!(raw.contains("tool_call"));
    }

    #[test]
    fn handshake_response_detected() {
        let line = r#"{"type":"response","command":"get_state","state":"idle"}"#;
        let (event, _) = WorkerEvent::parse_line(line).unwrap();
        assert!(event.is_startup_check_response());
    }
}
