// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the conversation history.
///
/// One flat struct serves both the chat wire format and the journal file:
/// optional fields are omitted from JSON entirely, so a journal written by
/// one turn deserializes identically on the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Tool name, set on tool-result messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested by the model, set on assistant messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Id of the call this message answers, set on tool-result messages only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant message carrying tool calls.  An empty call list collapses
    /// to a plain assistant message so `tool_calls: []` never hits the wire.
    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            name: None,
            tool_calls: if calls.is_empty() { None } else { Some(calls) },
            tool_call_id: None,
        }
    }

    /// Result message answering the tool call `id` issued to tool `name`.
    pub fn tool_result(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            name: Some(name.into()),
            tool_calls: None,
            tool_call_id: Some(id.into()),
        }
    }

    /// Calls carried by this message, empty for non-assistant messages.
    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// A completed model-emitted tool call, OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".into()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.  Kept as a string until dispatch —
    /// validation is the runner's job, not the transport's.
    pub arguments: String,
}

/// A tool schema provided to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object
    pub parameters: serde_json::Value,
}

// ─── Streaming deltas ─────────────────────────────────────────────────────────

/// One incremental frame from the chat endpoint.  A frame may carry a
/// content chunk, tool-call fragments, or neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatDelta {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallFragment>,
}

impl ChatDelta {
    pub fn text(chunk: impl Into<String>) -> Self {
        Self {
            content: Some(chunk.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn fragment(fragment: ToolCallFragment) -> Self {
        Self {
            content: None,
            tool_calls: vec![fragment],
        }
    }
}

/// A fragment of a streamed tool call.  The first fragment of a call
/// carries a non-empty `id` (plus the starting name/arguments substring);
/// continuation fragments carry an empty `id` and only extend the
/// arguments string of the call opened last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    /// Positional index in the assistant's tool-call list.
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallFragment {
    /// Opening fragment of a new call.
    pub fn open(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
        }
    }

    /// Continuation fragment extending the arguments of the last call.
    pub fn args(index: u32, arguments: impl Into<String>) -> Self {
        Self {
            index,
            id: String::new(),
            name: String::new(),
            arguments: arguments.into(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
        assert_eq!(Message::tool_result("1", "t", "out").role, Role::Tool);
    }

    #[test]
    fn tool_result_links_call_id_and_name() {
        let m = Message::tool_result("call_9", "get_time", "12:00");
        assert_eq!(m.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(m.name.as_deref(), Some("get_time"));
        assert_eq!(m.content, "12:00");
    }

    #[test]
    fn empty_call_list_collapses_to_none() {
        let m = Message::assistant_with_calls("hi", vec![]);
        assert!(m.tool_calls.is_none());
        assert!(m.calls().is_empty());
    }

    #[test]
    fn plain_message_serializes_without_optional_fields() {
        let json = serde_json::to_string(&Message::user("hello")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hello"}"#);
    }

    #[test]
    fn tool_call_serializes_openai_shape() {
        let call = ToolCall::new("call_1", "shell", r#"{"cmd":"ls"}"#);
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["id"], "call_1");
        assert_eq!(v["type"], "function");
        assert_eq!(v["function"]["name"], "shell");
        assert_eq!(v["function"]["arguments"], r#"{"cmd":"ls"}"#);
    }

    #[test]
    fn message_round_trips_through_json() {
        let original = Message::assistant_with_calls(
            "",
            vec![ToolCall::new("c1", "get_time", "{}")],
        );
        let json = serde_json::to_string(&original).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role, Role::Assistant);
        assert_eq!(back.calls(), original.calls());
    }

    #[test]
    fn message_deserializes_with_missing_content() {
        let m: Message = serde_json::from_str(r#"{"role":"assistant"}"#).unwrap();
        assert_eq!(m.content, "");
    }

    #[test]
    fn fragment_helpers_distinguish_open_and_continuation() {
        let open = ToolCallFragment::open(0, "c1", "shell");
        assert!(!open.id.is_empty());
        let cont = ToolCallFragment::args(0, "{\"x\":");
        assert!(cont.id.is_empty());
        assert_eq!(cont.arguments, "{\"x\":");
    }
}
