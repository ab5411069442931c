// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Chat-completion client for OpenAI-compatible streaming endpoints.
//!
//! Every supported provider speaks the same `/chat/completions` SSE wire
//! format; this module is the single implementation, configured per
//! provider with a URL and an optional bearer key (see `endpoints.rs`).

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use crate::{provider::DeltaStream, ChatDelta, Message, ToolCallFragment, ToolSchema};

pub struct OpenAICompatChat {
    /// Provider id returned by `ChatProvider::name()`.
    provider_name: String,
    /// Model id forwarded to the API.
    model: String,
    /// Bearer key; `None` for local servers.
    api_key: Option<String>,
    /// Full chat completions URL.
    chat_url: String,
    client: reqwest::Client,
}

impl OpenAICompatChat {
    /// Construct a client from an API base that ends **before**
    /// `/chat/completions`, e.g. `https://api.openai.com/v1`.
    pub fn new(
        provider_name: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        base_url: &str,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            provider_name: provider_name.into(),
            model: model.into(),
            api_key,
            chat_url: format!("{base}/chat/completions"),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl crate::ChatProvider for OpenAICompatChat {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> anyhow::Result<DeltaStream> {
        let body = build_request_body(&self.model, messages, tools);

        debug!(
            provider = %self.provider_name,
            model = %self.model,
            tool_count = tools.len(),
            message_count = messages.len(),
            "sending streaming chat request"
        );

        let mut req = self.client.post(&self.chat_url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("{} request failed", self.provider_name))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("{} error {status}: {text}", self.provider_name);
        }

        let byte_stream = resp.bytes_stream();
        // SSE events can be split across TCP packets.  Maintain a line
        // buffer across chunks; emit deltas only for complete lines.
        let delta_stream = byte_stream
            .scan(String::new(), |buf, chunk| {
                let deltas: Vec<anyhow::Result<ChatDelta>> = match chunk {
                    Ok(b) => {
                        buf.push_str(&String::from_utf8_lossy(&b));
                        drain_complete_sse_lines(buf)
                    }
                    Err(e) => vec![Err(anyhow::anyhow!(e))],
                };
                std::future::ready(Some(deltas))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(delta_stream))
    }
}

/// Build the JSON request body.  Messages serialize directly — the flat
/// [`Message`] struct *is* the OpenAI wire shape — and each tool schema is
/// wrapped in the `{type: "function", function: …}` envelope.
pub(crate) fn build_request_body(model: &str, messages: &[Message], tools: &[ToolSchema]) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    if !tools.is_empty() {
        let wrapped: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = json!(wrapped);
    }
    body
}

/// Drain all complete `\n`-terminated SSE lines from `buf`.
///
/// Any trailing incomplete line is left in `buf` so the next TCP chunk can
/// extend it.  Without this, an event split across packets would be
/// silently dropped and tool-call fragments would land in the wrong slot.
pub(crate) fn drain_complete_sse_lines(buf: &mut String) -> Vec<anyhow::Result<ChatDelta>> {
    let mut deltas = Vec::new();
    while let Some(nl_pos) = buf.find('\n') {
        let line = buf[..nl_pos].trim_end_matches('\r').to_string();
        *buf = buf[nl_pos + 1..].to_string();
        if let Some(delta) = parse_sse_data_line(&line) {
            deltas.push(Ok(delta));
        }
    }
    deltas
}

/// Parse a single complete SSE `data:` line into a [`ChatDelta`].
///
/// Returns `None` for empty lines, comments, the `[DONE]` sentinel and
/// unparseable payloads.
fn parse_sse_data_line(line: &str) -> Option<ChatDelta> {
    let data = line.strip_prefix("data: ")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let v: Value = serde_json::from_str(data).ok()?;
    Some(parse_sse_chunk(&v))
}

fn parse_sse_chunk(v: &Value) -> ChatDelta {
    let delta = &v["choices"][0]["delta"];

    let mut fragments = Vec::new();
    if let Some(tool_calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tool_calls {
            fragments.push(ToolCallFragment {
                index: tc["index"].as_u64().unwrap_or(0) as u32,
                id: tc["id"].as_str().unwrap_or("").to_string(),
                name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                arguments: tc["function"]["arguments"]
                    .as_str()
                    .unwrap_or("")
                    .to_string(),
            });
        }
    }

    let content = delta
        .get("content")
        .and_then(|c| c.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    ChatDelta {
        content,
        tool_calls: fragments,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
