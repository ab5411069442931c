// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

/// Events emitted by the orchestrator during a conversation.
/// Front-ends subscribe to these to drive their output.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// A text chunk streamed from the model, in arrival order
    TextDelta(String),
    /// Dispatch of one tool call is about to begin
    ToolCallStarted {
        call_id: String,
        tool_name: String,
        arguments: String,
    },
    /// One tool call finished and its result was recorded
    ToolCallFinished {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
    /// The assistant answered without tool calls; the conversation is idle
    TurnComplete,
}
