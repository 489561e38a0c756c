//! Wire messages exchanged with the build backend.
//!
//! Inbound messages are JSON objects tagged by `type` with their payload
//! under `data`. They are classified into the closed [`BackendEvent`] enum;
//! tags this crate does not know become [`BackendEvent::Unknown`] so newer
//! backends never abort a session.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::Result;

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Handshake message carrying the backend-assigned session id.
    Connected { session_id: String },
    /// `workflow_started`
    Started,
    /// `agent_message`
    AgentMessage { agent: String },
    /// `workflow_completed`
    Completed(CompletedPayload),
    /// `workflow_cancelled`
    Cancelled,
    /// `error`
    Error { message: String },
    /// Any tag not listed above.
    Unknown { kind: String },
}

/// Payload of a `workflow_completed` message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletedPayload {
    #[serde(default)]
    pub results: Value,
    #[serde(default)]
    pub code_files: Value,
    #[serde(default)]
    pub token_usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    data: Value,
}

impl BackendEvent {
    /// Classify one text frame from the backend.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawMessage = serde_json::from_str(text)?;
        Ok(Self::classify(raw))
    }

    fn classify(raw: RawMessage) -> Self {
        let kind = raw.kind.unwrap_or_else(|| "unknown".to_string());
        let data = raw.data;

        match kind.as_str() {
            "workflow_started" => BackendEvent::Started,
            "agent_message" => BackendEvent::AgentMessage {
                agent: str_field(&data, "agent").unwrap_or("unknown").to_string(),
            },
            "workflow_completed" => {
                BackendEvent::Completed(serde_json::from_value(data).unwrap_or_default())
            }
            "workflow_cancelled" => BackendEvent::Cancelled,
            "error" => BackendEvent::Error {
                message: str_field(&data, "message")
                    .unwrap_or("Unknown error")
                    .to_string(),
            },
            _ => match str_field(&data, "session_id") {
                Some(session_id) => BackendEvent::Connected {
                    session_id: session_id.to_string(),
                },
                None => BackendEvent::Unknown { kind },
            },
        }
    }

    /// The wire tag this event was classified from.
    pub fn kind(&self) -> &str {
        match self {
            BackendEvent::Connected { .. } => "connection",
            BackendEvent::Started => "workflow_started",
            BackendEvent::AgentMessage { .. } => "agent_message",
            BackendEvent::Completed(_) => "workflow_completed",
            BackendEvent::Cancelled => "workflow_cancelled",
            BackendEvent::Error { .. } => "error",
            BackendEvent::Unknown { kind } => kind,
        }
    }
}

impl CompletedPayload {
    /// Produced files as a filename -> content map.
    ///
    /// `code_files` comes in three shapes: a list of file names (contents
    /// looked up in `results`), a list of `{name|path, content}` objects, or
    /// a name -> content object.
    pub fn artifacts(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();

        match &self.code_files {
            Value::Array(entries) => {
                for entry in entries {
                    match entry {
                        Value::String(name) => {
                            let content = str_field(&self.results, name).unwrap_or_default();
                            files.insert(name.clone(), content.to_string());
                        }
                        Value::Object(_) => {
                            let name = str_field(entry, "name")
                                .or_else(|| str_field(entry, "path"))
                                .or_else(|| str_field(entry, "filename"));
                            if let Some(name) = name {
                                let content = str_field(entry, "content").unwrap_or_default();
                                files.insert(name.to_string(), content.to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            Value::Object(map) => {
                for (name, content) in map {
                    let content = match content {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    files.insert(name.clone(), content);
                }
            }
            _ => {}
        }

        files
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Requests sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    StartWorkflow {
        /// Workflow identifier understood by the backend.
        yaml_file: String,
        task_prompt: String,
        log_level: String,
    },
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
