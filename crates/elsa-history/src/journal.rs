// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use elsa_model::{Message, Role};
use serde::{Deserialize, Serialize};

/// On-disk record of one conversation.  The file is rewritten whole after
/// every assistant message and every tool result, so at any moment the
/// disk holds a coherent prefix of the in-memory conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Journal {
    #[serde(default)]
    pub agent_path: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Trim a loaded conversation for retry: keep messages up to and including
/// the last user message, or only the leading system message when no user
/// message exists.  `replacement` swaps the content of that trailing user
/// message.  Idempotent in both halves.
pub fn trim_for_retry(messages: &mut Vec<Message>, replacement: Option<&str>) {
    match messages.iter().rposition(|m| m.role == Role::User) {
        Some(last_user) => {
            messages.truncate(last_user + 1);
            if let Some(text) = replacement {
                messages[last_user].content = text.to_string();
            }
        }
        None => {
            let keep = usize::from(messages.first().map(|m| m.role) == Some(Role::System));
            messages.truncate(keep);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
