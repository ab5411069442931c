// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod collect;
mod endpoints;
mod mock;
mod openai_compat;
mod provider;
mod types;

pub use collect::StreamCollector;
pub use endpoints::{endpoint_for, provider_from_model_id, Endpoint};
pub use mock::ScriptedChat;
pub use openai_compat::OpenAICompatChat;
pub use provider::{ChatProvider, DeltaStream};
pub use types::{ChatDelta, FunctionCall, Message, Role, ToolCall, ToolCallFragment, ToolSchema};
