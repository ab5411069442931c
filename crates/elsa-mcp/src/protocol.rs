// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! JSON-RPC 2.0 subset spoken to tool-provider children.
//!
//! Messages are line-delimited UTF-8, one per line.  Methods used:
//! `initialize`, the one-way `notifications/initialized`, `tools/list`
//! and `tools/call`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Protocol revision advertised in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: &'static str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// A notification carries no id and expects no response.
pub fn notification(method: &str, params: Option<Value>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params.unwrap_or_else(|| json!({})),
    })
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    /// Present on server-initiated requests and notifications, which share
    /// the stream with our responses and must be skipped.
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Parameters of the `initialize` request.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "clientInfo": { "name": client_name, "version": client_version },
    })
}

/// One tool as reported by `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema", rename = "inputSchema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    json!({ "type": "object" })
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<ToolDef>,
}

/// Result of `tools/call`.
#[derive(Debug, Default, Deserialize)]
pub struct CallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallResult {
    /// Newline-joined text items.  Non-text items contribute nothing.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
