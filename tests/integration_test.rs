// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// Integration tests wiring a TOML agent file through the orchestrator
/// with the scripted mock provider.
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use elsa_config::{load_agent, AskLevel};
use elsa_core::Orchestrator;
use elsa_history::HistoryStore;
use elsa_mcp::ProviderRegistry;
use elsa_model::{Role, ScriptedChat};
use elsa_tools::{Confirmation, OperatorIo};

struct ApprovingIo;

#[async_trait]
impl OperatorIo for ApprovingIo {
    async fn confirm(&self, _prompt: &str) -> Confirmation {
        Confirmation::approved()
    }
    async fn read_block(&self, _prompt: &str) -> String {
        String::new()
    }
    fn show(&self, _text: &str) {}
}

#[tokio::test]
async fn agent_file_round_trip_through_the_loop() {
    let mut agent_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    agent_file
        .write_all(
            br#"
name = "greeter"
system_prompt = "You greet people."

[[functions]]
name = "greet"
description = "print a greeting"
command = "echo hello {{who}}"
safe = true

[[functions.parameters]]
name = "who"
required = true
"#,
        )
        .unwrap();
    let agent = load_agent(agent_file.path()).unwrap();
    assert_eq!(agent.name, "greeter");

    let history_dir = tempfile::tempdir().unwrap();
    let history = HistoryStore::new(history_dir.path());
    let journal_path = history.new_conversation_path("it-conv", &agent.name);

    let provider = ScriptedChat::tool_then_text(
        "call-1",
        "greet",
        r#"{"who":"world"}"#,
        "Greeted them.",
    );
    let mut orchestrator = Orchestrator::new(
        agent,
        agent_file.path().to_string_lossy(),
        "mock/model",
        AskLevel::Unsafe,
        Arc::new(provider),
        ProviderRegistry::new(BTreeMap::new()),
        history,
        journal_path,
        Arc::new(ApprovingIo),
    );

    let (tx, _rx) = mpsc::channel(256);
    orchestrator.submit("greet the world", tx).await.unwrap();

    let msgs = orchestrator.messages();
    assert_eq!(msgs.len(), 5);
    assert_eq!(msgs[0].role, Role::System);
    let tool = msgs.iter().find(|m| m.role == Role::Tool).unwrap();
    assert_eq!(tool.content, "Command: echo hello world\n\nOutput: \nhello world");

    // The journal on disk parses back to the same conversation.
    let store = HistoryStore::new(history_dir.path());
    let journal = store.load(orchestrator.journal_path()).unwrap();
    assert_eq!(journal.messages.len(), 5);
    assert_eq!(journal.model, "mock/model");
}
