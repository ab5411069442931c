// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use elsa_config::AskLevel;

use crate::{Confirmation, OperatorIo};

/// Whether `ask` requires operator confirmation for an operation with the
/// given `safe` flag.
pub fn needs_confirmation(ask: AskLevel, safe: bool) -> bool {
    match ask {
        AskLevel::None => false,
        AskLevel::Unsafe => !safe,
        AskLevel::All => true,
    }
}

/// Gate one operation through the confirmation policy.
///
/// Approval is one-shot: nothing is cached, every call is gated anew.
pub async fn confirm_execution(
    ask: AskLevel,
    safe: bool,
    prompt: &str,
    io: &dyn OperatorIo,
) -> Confirmation {
    if !needs_confirmation(ask, safe) {
        return Confirmation::approved();
    }
    io.confirm(prompt).await
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
