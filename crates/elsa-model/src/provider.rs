// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::{ChatDelta, Message, ToolSchema};

pub type DeltaStream = Pin<Box<dyn Stream<Item = anyhow::Result<ChatDelta>> + Send>>;

/// A chat streaming endpoint.
///
/// The orchestrator never inspects transport specifics; it drives the
/// returned delta stream to completion and surfaces stream errors as-is.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Human-readable provider name for status display.
    fn name(&self) -> &str;

    /// Model identifier as reported to users.
    fn model_name(&self) -> &str;

    /// Issue one streaming chat request over the given history and tool
    /// manifest.  The stream ends when the model's turn is complete.
    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> anyhow::Result<DeltaStream>;
}
