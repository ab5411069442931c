// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod terminal;

use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use elsa_config::{load_agent_by_name, AskLevel};
use elsa_core::{Orchestrator, TurnEvent};
use elsa_history::{trim_for_retry, HistoryStore, Journal};
use elsa_mcp::ProviderRegistry;
use elsa_model::provider_from_model_id;
use terminal::TerminalIo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let history = HistoryStore::new(HistoryStore::default_dir()?);
    let prompt = gather_prompt(&cli);

    // Resolve the conversation mode first: continue/retry load an existing
    // journal and inherit agent and model from it unless overridden.
    let existing_id = cli.continue_id.as_ref().or(cli.retry_id.as_ref());
    let (journal_path, loaded, conversation_ref) = match existing_id {
        Some(id) => {
            let path = history.locate(id)?;
            let journal = history.load(&path)?;
            (path, Some(journal), None)
        }
        None => {
            let id = uuid::Uuid::new_v4().to_string();
            (PathBuf::new(), None, Some(id))
        }
    };

    let agent_ref = cli
        .agent
        .clone()
        .or_else(|| {
            loaded
                .as_ref()
                .map(|j| j.agent_path.clone())
                .filter(|p| !p.is_empty())
        })
        .context("no agent given (pass an agent name or path)")?;
    let agent = load_agent_by_name(&agent_ref)?;

    let model_id = cli
        .model
        .clone()
        .or_else(|| {
            loaded
                .as_ref()
                .map(|j| j.model.clone())
                .filter(|m| !m.is_empty())
        })
        .or_else(|| agent.model.clone())
        .context("no model configured (pass --model provider/model)")?;

    let ask = cli.ask.or(agent.ask).unwrap_or(AskLevel::default());

    let journal_path = match conversation_ref {
        Some(id) => history.new_conversation_path(&id, &agent.name),
        None => journal_path,
    };

    let provider = provider_from_model_id(&model_id)?;
    let mut registry = ProviderRegistry::new(agent.mcp_servers.clone());
    registry.start_servers().await?;

    let io: Arc<dyn elsa_tools::OperatorIo> = Arc::new(TerminalIo);
    let mut orchestrator = Orchestrator::new(
        agent,
        agent_ref,
        model_id,
        ask,
        provider,
        registry,
        history,
        journal_path,
        io,
    );

    let result = run_conversation(&mut orchestrator, &cli, loaded, prompt).await;
    orchestrator.shutdown().await;
    result
}

async fn run_conversation(
    orchestrator: &mut Orchestrator,
    cli: &Cli,
    loaded: Option<Journal>,
    prompt: String,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel(256);
    let printer = tokio::spawn(print_events(rx));

    let outcome = if cli.retry_id.is_some() {
        let mut messages = loaded.map(|j| j.messages).unwrap_or_default();
        let replacement = (!prompt.is_empty()).then_some(prompt.as_str());
        trim_for_retry(&mut messages, replacement);
        orchestrator.seed_history(messages);
        orchestrator.resume(tx).await
    } else {
        if prompt.is_empty() {
            bail!("no prompt given");
        }
        if let Some(journal) = loaded {
            orchestrator.seed_history(journal.messages);
        }
        orchestrator.submit(&prompt, tx).await
    };

    let _ = printer.await;
    outcome
}

/// Relay orchestrator events to the terminal: tokens as they stream, a
/// marker line per tool call.
async fn print_events(mut rx: mpsc::Receiver<TurnEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::TextDelta(chunk) => {
                print!("{chunk}");
                let _ = std::io::stdout().flush();
            }
            TurnEvent::ToolCallStarted { tool_name, .. } => {
                println!("\n[{tool_name}]");
            }
            TurnEvent::ToolCallFinished { .. } => {}
            TurnEvent::TurnComplete => {
                println!();
            }
        }
    }
}

/// CLI words plus piped stdin, separated by a blank line.
fn gather_prompt(cli: &Cli) -> String {
    let mut prompt = cli.prompt_text();
    let mut stdin = std::io::stdin();
    if !stdin.is_terminal() {
        let mut piped = String::new();
        if stdin.read_to_string(&mut piped).is_ok() {
            let piped = piped.trim_end();
            if !piped.is_empty() {
                if prompt.is_empty() {
                    prompt = piped.to_string();
                } else {
                    prompt = format!("{prompt}\n\n{piped}");
                }
            }
        }
    }
    prompt
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
