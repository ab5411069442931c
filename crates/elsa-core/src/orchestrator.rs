// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use elsa_config::{Agent, AskLevel};
use elsa_history::{HistoryStore, Journal};
use elsa_mcp::ProviderRegistry;
use elsa_model::{ChatProvider, Message, StreamCollector, ToolCall, ToolSchema};
use elsa_tools::{render_prose, FunctionRunner, OperatorIo, RenderInputs};

use crate::{
    events::TurnEvent,
    manifest::{function_schema, provider_schema},
};

/// Outcome classification for one tool-call dispatch.
///
/// `Unknown` aborts the conversation (a configuration error); `Failed` is
/// informational to the model and is recorded as an `Error: …` tool result
/// while the loop continues.
#[derive(Debug, Error)]
enum DispatchError {
    #[error("unknown tool '{0}'")]
    Unknown(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Drives one conversation: streaming request, tool dispatch, journal
/// persistence, repeated until the assistant answers without tool calls.
///
/// The orchestrator exclusively owns the message log.  Tool calls within a
/// turn dispatch strictly sequentially in emission order, and the journal
/// is rewritten after every insertion so the on-disk record is always a
/// prefix of the in-memory one.
pub struct Orchestrator {
    agent: Agent,
    agent_path: String,
    model_id: String,
    ask: AskLevel,
    provider: Arc<dyn ChatProvider>,
    runner: FunctionRunner,
    registry: ProviderRegistry,
    history: HistoryStore,
    journal_path: PathBuf,
    io: Arc<dyn OperatorIo>,
    messages: Vec<Message>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent: Agent,
        agent_path: impl Into<String>,
        model_id: impl Into<String>,
        ask: AskLevel,
        provider: Arc<dyn ChatProvider>,
        registry: ProviderRegistry,
        history: HistoryStore,
        journal_path: PathBuf,
        io: Arc<dyn OperatorIo>,
    ) -> Self {
        let model_id = model_id.into();
        Self {
            runner: FunctionRunner::new(Arc::clone(&io), model_id.clone()),
            agent,
            agent_path: agent_path.into(),
            model_id,
            ask,
            provider,
            registry,
            history,
            journal_path,
            io,
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn journal_path(&self) -> &PathBuf {
        &self.journal_path
    }

    /// Pre-load history from an existing journal (continue / retry modes).
    pub fn seed_history(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    /// Push a user message and run the loop until the assistant's final
    /// answer.  On a fresh conversation the agent's system prompt and
    /// initial message render first.
    pub async fn submit(
        &mut self,
        user_input: &str,
        tx: mpsc::Sender<TurnEvent>,
    ) -> anyhow::Result<()> {
        if self.messages.is_empty() {
            self.render_preamble().await;
        }
        self.messages.push(Message::user(user_input));
        self.run_loop(tx).await
    }

    /// Run the loop on the seeded history as-is.  Used for retry, where
    /// the trimmed journal already ends with a user message.
    pub async fn resume(&mut self, tx: mpsc::Sender<TurnEvent>) -> anyhow::Result<()> {
        self.run_loop(tx).await
    }

    /// Render the system prompt and optional initial message of a fresh
    /// conversation.  Both are prose templates: shell and prompt blocks
    /// resolve, with no parameters in scope.
    async fn render_preamble(&mut self) {
        let empty = serde_json::Map::new();
        let inputs = RenderInputs {
            params: &[],
            args: &empty,
        };
        if let Some(tpl) = self.agent.system_prompt.clone() {
            let text = render_prose(&tpl, inputs, self.io.as_ref()).await;
            self.messages.push(Message::system(text));
        }
        if let Some(tpl) = self.agent.initial_message.clone() {
            let text = render_prose(&tpl, inputs, self.io.as_ref()).await;
            self.messages.push(Message::user(text));
        }
    }

    async fn run_loop(&mut self, tx: mpsc::Sender<TurnEvent>) -> anyhow::Result<()> {
        loop {
            let manifest = self.tool_manifest();
            let mut stream = self
                .provider
                .stream_chat(&self.messages, &manifest)
                .await
                .context("chat request failed")?;

            let mut collector = StreamCollector::new();
            let mut stream_err: Option<anyhow::Error> = None;
            while let Some(item) = stream.next().await {
                match item {
                    Ok(delta) => {
                        if let Some(chunk) = collector.absorb(delta) {
                            let _ = tx.send(TurnEvent::TextDelta(chunk)).await;
                        }
                    }
                    Err(e) => {
                        stream_err = Some(e);
                        break;
                    }
                }
            }

            // The partial message is the authoritative record for this
            // turn even when the read failed; it goes to disk before the
            // error surfaces.
            let assistant = collector.finish();
            let calls: Vec<ToolCall> = assistant.calls().to_vec();
            self.messages.push(assistant);
            self.save()?;
            if let Some(e) = stream_err {
                return Err(e).context("chat stream failed");
            }

            if calls.is_empty() {
                let _ = tx.send(TurnEvent::TurnComplete).await;
                return Ok(());
            }

            for call in calls {
                let _ = tx
                    .send(TurnEvent::ToolCallStarted {
                        call_id: call.id.clone(),
                        tool_name: call.function.name.clone(),
                        arguments: call.function.arguments.clone(),
                    })
                    .await;

                let (content, is_error) = match self.dispatch(&call).await {
                    Ok(content) => (content, false),
                    Err(DispatchError::Unknown(name)) => {
                        return Err(anyhow::anyhow!("unknown tool '{name}'"));
                    }
                    Err(DispatchError::Failed(e)) => {
                        warn!(tool = %call.function.name, "tool call failed: {e:#}");
                        (format!("Error: {e}"), true)
                    }
                };

                self.messages.push(Message::tool_result(
                    &call.id,
                    &call.function.name,
                    &content,
                ));
                self.save()?;

                let _ = tx
                    .send(TurnEvent::ToolCallFinished {
                        call_id: call.id.clone(),
                        tool_name: call.function.name.clone(),
                        content,
                        is_error,
                    })
                    .await;
            }
        }
    }

    /// Shell functions of the agent plus the namespaced provider tools.
    fn tool_manifest(&self) -> Vec<ToolSchema> {
        let mut manifest: Vec<ToolSchema> =
            self.agent.functions.iter().map(function_schema).collect();
        manifest.extend(self.registry.all_tools().iter().map(provider_schema));
        manifest
    }

    /// Route one call through the explicit routing table and invoke it.
    ///
    /// Exact shell-function names win over provider tools, so a function
    /// that happens to carry an `mcp_` prefix can never be misrouted.
    async fn dispatch(&self, call: &ToolCall) -> Result<String, DispatchError> {
        let name = call.function.name.as_str();
        debug!(tool = %name, "dispatching tool call");

        if let Some(spec) = self.agent.function(name) {
            let outcome = self
                .runner
                .execute(self.ask, spec, &call.function.arguments)
                .await
                .map_err(DispatchError::Failed)?;
            return Ok(format!(
                "Command: {}\n\nOutput: \n{}",
                outcome.command, outcome.output
            ));
        }

        if self.registry.resolve(name).is_some() {
            let arguments: Value = if call.function.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                serde_json::from_str(&call.function.arguments)
                    .with_context(|| {
                        format!("invalid JSON arguments: {}", call.function.arguments)
                    })
                    .map_err(DispatchError::Failed)?
            };
            let text = self
                .registry
                .call_tool(name, &arguments, self.ask, self.io.as_ref())
                .await
                .map_err(DispatchError::Failed)?;
            return Ok(text);
        }

        Err(DispatchError::Unknown(name.to_string()))
    }

    /// Stop every tool-provider child.  Call once the conversation ends.
    pub async fn shutdown(&mut self) {
        self.registry.stop_all().await;
    }

    /// Rewrite the journal with the current message log.
    fn save(&self) -> anyhow::Result<()> {
        let journal = Journal {
            agent_path: self.agent_path.clone(),
            model: self.model_id.clone(),
            messages: self.messages.clone(),
        };
        self.history.save(&self.journal_path, &journal)
    }
}
