// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};
use elsa_config::{AskLevel, ToolProviderSpec};
use serde_json::Value;
use tracing::{debug, warn};

use elsa_tools::OperatorIo;

use crate::{ProviderClient, ProviderTool};

/// Owns the set of provider clients and routes calls to them.
///
/// Startup is all-or-nothing: a failure while starting any server stops
/// every server already started, so no partial-up state is ever visible.
pub struct ProviderRegistry {
    specs: BTreeMap<String, ToolProviderSpec>,
    clients: Vec<Arc<ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new(specs: BTreeMap<String, ToolProviderSpec>) -> Self {
        Self {
            specs,
            clients: Vec::new(),
        }
    }

    /// Start every configured server in name order.
    pub async fn start_servers(&mut self) -> anyhow::Result<()> {
        for (name, spec) in self.specs.clone() {
            let mut client = ProviderClient::new(&name, spec);
            match client.start().await {
                Ok(()) => {
                    debug!(server = %name, tools = client.tools().len(), "tool provider ready");
                    self.clients.push(Arc::new(client));
                }
                Err(e) => {
                    warn!(server = %name, "tool provider failed to start; rolling back");
                    self.stop_all().await;
                    return Err(e).with_context(|| format!("starting servers for '{name}'"));
                }
            }
        }
        Ok(())
    }

    /// Stop every running client.
    pub async fn stop_all(&mut self) {
        for client in self.clients.drain(..) {
            client.stop().await;
        }
    }

    /// Union of all per-client tool manifests.
    pub fn all_tools(&self) -> Vec<ProviderTool> {
        self.clients
            .iter()
            .flat_map(|c| c.tools().iter().cloned())
            .collect()
    }

    /// Find the client owning the namespaced tool name.
    pub fn resolve(&self, outer_name: &str) -> Option<(Arc<ProviderClient>, ProviderTool)> {
        for client in &self.clients {
            if let Some(tool) = client.tools().iter().find(|t| t.outer_name == outer_name) {
                return Some((Arc::clone(client), tool.clone()));
            }
        }
        None
    }

    /// Dispatch a call to the owning client.  An unknown name is a hard
    /// error — the caller treats it as a configuration failure.
    pub async fn call_tool(
        &self,
        outer_name: &str,
        arguments: &Value,
        ask: AskLevel,
        io: &dyn OperatorIo,
    ) -> anyhow::Result<String> {
        let (client, tool) = match self.resolve(outer_name) {
            Some(found) => found,
            None => bail!("unknown provider tool '{outer_name}'"),
        };
        client.call_tool(&tool, arguments, ask, io).await
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
