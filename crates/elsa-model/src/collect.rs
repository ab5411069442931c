// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Reassembles an assistant message from a stream of chat deltas.
//!
//! Content chunks are emitted losslessly in arrival order for display.
//! Tool-call fragments do not carry closing markers: a fragment with a
//! non-empty `id` opens a new call slot, and every empty-`id` fragment
//! extends the arguments string of the call opened last.  Argument JSON is
//! never parsed here — only the runner validates it, after end-of-stream.

use tracing::warn;

use crate::{ChatDelta, Message, ToolCall};

/// Incremental assistant-message collector.
///
/// Drive it with [`absorb`](Self::absorb) for every delta, then call
/// [`finish`](Self::finish) at end-of-stream.  If the underlying read
/// fails, `finish` still returns the partial message — that partial record
/// is authoritative for the turn and belongs in the journal.
#[derive(Debug, Default)]
pub struct StreamCollector {
    content: String,
    calls: Vec<ToolCall>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta into the message under construction.  Returns the
    /// content chunk to relay to the operator, when the delta carried one.
    pub fn absorb(&mut self, delta: ChatDelta) -> Option<String> {
        for fragment in delta.tool_calls {
            if !fragment.id.is_empty() {
                self.calls.push(ToolCall::new(
                    fragment.id,
                    fragment.name,
                    fragment.arguments,
                ));
            } else if let Some(last) = self.calls.last_mut() {
                last.function.arguments.push_str(&fragment.arguments);
            } else {
                // Continuation with nothing open: the opening fragment was
                // lost upstream.  Dropping it beats inventing a call with no
                // id or name.
                warn!(
                    arguments = %fragment.arguments,
                    "dropping tool-call continuation with no open call"
                );
            }
        }

        match delta.content {
            Some(chunk) if !chunk.is_empty() => {
                self.content.push_str(&chunk);
                Some(chunk)
            }
            _ => None,
        }
    }

    /// Finalize into the assistant message for this turn.
    pub fn finish(self) -> Message {
        Message::assistant_with_calls(self.content, self.calls)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
