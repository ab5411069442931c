// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

/// The operator's answer to a safety confirmation.
///
/// A denial may carry a textual explanation; that text flows back to the
/// model as the tool result so the model can adjust its next step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub approved: bool,
    pub message: String,
}

impl Confirmation {
    pub fn approved() -> Self {
        Self {
            approved: true,
            message: String::new(),
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            approved: false,
            message: message.into(),
        }
    }
}

/// Capability through which the core reaches the operator.
///
/// The terminal front-end implements these synchronously (behind
/// `spawn_blocking`); an asynchronous front-end resolves them through a
/// single-slot awaitable channel.  A Ctrl-C or EOF while a question is
/// pending must resolve to a denial with an empty message.
#[async_trait]
pub trait OperatorIo: Send + Sync {
    /// Ask the operator to approve or deny the displayed operation.
    async fn confirm(&self, prompt: &str) -> Confirmation;

    /// Display `prompt` and read multi-line input terminated by a blank
    /// line.  Returns the joined input without the terminator.
    async fn read_block(&self, prompt: &str) -> String;

    /// Print user-visible text (output banners) to the operator.
    fn show(&self, text: &str);
}
