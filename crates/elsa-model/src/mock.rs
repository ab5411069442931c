// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;

use crate::{provider::DeltaStream, ChatDelta, Message, ToolCallFragment, ToolSchema};

/// A pre-scripted chat provider.  Each `stream_chat` call pops the next
/// delta script from the front of the queue, so tests can specify exact
/// frame sequences — including fragmented tool calls — without network
/// access.
pub struct ScriptedChat {
    scripts: Arc<Mutex<Vec<Vec<ChatDelta>>>>,
    /// The messages and manifest of the last request, for test assertions.
    #[allow(clippy::type_complexity)]
    pub last_request: Arc<Mutex<Option<(Vec<Message>, Vec<ToolSchema>)>>>,
}

impl ScriptedChat {
    /// Build a provider from an ordered list of per-call delta scripts.
    pub fn new(scripts: Vec<Vec<ChatDelta>>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Convenience: provider that always streams a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![vec![ChatDelta::text(reply)]])
    }

    /// Convenience: one tool call (streamed as opening fragment plus one
    /// arguments continuation) followed by a final text turn.
    pub fn tool_then_text(
        tool_id: impl Into<String>,
        tool_name: impl Into<String>,
        args_json: impl Into<String>,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            vec![
                ChatDelta::fragment(ToolCallFragment::open(0, tool_id, tool_name)),
                ChatDelta::fragment(ToolCallFragment::args(0, args_json)),
            ],
            vec![ChatDelta::text(final_text)],
        ])
    }
}

#[async_trait]
impl crate::ChatProvider for ScriptedChat {
    fn name(&self) -> &str {
        "scripted-mock"
    }

    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> anyhow::Result<DeltaStream> {
        *self.last_request.lock().unwrap() = Some((messages.to_vec(), tools.to_vec()));
        let deltas = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Fallback when all scripts are consumed
                vec![ChatDelta::text("[no more scripts]")]
            } else {
                scripts.remove(0)
            }
        };
        let wrapped: Vec<anyhow::Result<ChatDelta>> = deltas.into_iter().map(Ok).collect();
        Ok(Box::pin(stream::iter(wrapped)))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
