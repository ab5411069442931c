// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use clap::Parser;
use elsa_config::AskLevel;

/// Command-line surface.  Everything the core consumes arrives through
/// these flags: an ask level, a conversation identifier, a model
/// identifier and an agent reference.
#[derive(Debug, Parser)]
#[command(name = "elsa", version, about = "Turn natural-language requests into shell actions")]
pub struct Cli {
    /// Agent name (resolved under the config directory) or path to an
    /// agent TOML file
    pub agent: Option<String>,

    /// Prompt text; piped stdin is appended
    #[arg(trailing_var_arg = true)]
    pub prompt: Vec<String>,

    /// Model identifier, provider/model
    #[arg(short, long)]
    pub model: Option<String>,

    /// Confirmation policy: none, unsafe or all
    #[arg(short, long, value_parser = parse_ask_level)]
    pub ask: Option<AskLevel>,

    /// Continue a conversation (id, or 1-based recency index)
    #[arg(short = 'c', long = "continue", value_name = "ID")]
    pub continue_id: Option<String>,

    /// Retry a conversation from its last user message
    #[arg(short = 'r', long = "retry", value_name = "ID")]
    pub retry_id: Option<String>,

    /// Verbose logging to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn prompt_text(&self) -> String {
        self.prompt.join(" ")
    }
}

fn parse_ask_level(s: &str) -> Result<AskLevel, String> {
    s.parse().map_err(|e: anyhow::Error| e.to_string())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
