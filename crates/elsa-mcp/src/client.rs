// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Supervises one tool-provider child process.
//!
//! The child speaks JSON-RPC 2.0 line-framed over stdin/stdout, one
//! message per line.  All request/response traffic for a client flows
//! through a single mutex held across each write/read pair, so the one
//! stdio stream never interleaves two conversations.  Request ids are
//! unique and monotonically increasing; responses are matched by id and
//! unrelated lines (server notifications, stray responses) are skipped.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context};
use elsa_config::{AskLevel, ToolProviderSpec};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use elsa_tools::{confirm_execution, OperatorIo};

use crate::protocol::{
    initialize_params, notification, CallResult, JsonRpcRequest, JsonRpcResponse, ToolsListResult,
};

/// Deadline for handshake and discovery requests.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for tool invocations; provider tools can be slow.
const CALL_TIMEOUT: Duration = Duration::from_secs(120);

/// One tool exposed by a provider, renamed into the outward manifest.
#[derive(Debug, Clone)]
pub struct ProviderTool {
    /// Namespaced name in the tool manifest: `mcp_<server>_<tool>`.
    pub outer_name: String,
    /// Name the server knows the tool by.
    pub inner_name: String,
    pub description: String,
    pub schema: Value,
    pub safe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    New,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

struct Pipe {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

/// Client for a single tool-provider child.
pub struct ProviderClient {
    name: String,
    spec: ToolProviderSpec,
    state: Mutex<ClientState>,
    /// Held across every write/read pair; `None` once stopped.
    pipe: tokio::sync::Mutex<Option<Pipe>>,
    next_id: AtomicU64,
    tools: Vec<ProviderTool>,
}

impl ProviderClient {
    pub fn new(name: impl Into<String>, spec: ToolProviderSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            state: Mutex::new(ClientState::New),
            pipe: tokio::sync::Mutex::new(None),
            next_id: AtomicU64::new(1),
            tools: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tools exposed after a successful [`start`](Self::start).
    pub fn tools(&self) -> &[ProviderTool] {
        &self.tools
    }

    /// Spawn the child, run the `initialize` handshake and discover tools.
    ///
    /// Any failure tears the child down and leaves the client `Failed`;
    /// the teardown path reuses the already-held pipe access rather than
    /// re-acquiring the mutex.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        {
            let mut state = self.state.lock().unwrap();
            if *state != ClientState::New {
                bail!("server '{}' already started", self.name);
            }
            *state = ClientState::Starting;
        }

        match self.start_inner().await {
            Ok(tools) => {
                self.tools = tools;
                *self.state.lock().unwrap() = ClientState::Ready;
                Ok(())
            }
            Err(e) => {
                let pipe = self.pipe.get_mut();
                stop_internal(pipe).await;
                *self.state.lock().unwrap() = ClientState::Failed;
                Err(e).with_context(|| format!("starting mcp server '{}'", self.name))
            }
        }
    }

    async fn start_inner(&mut self) -> anyhow::Result<Vec<ProviderTool>> {
        debug!(server = %self.name, command = %self.spec.command, "spawning tool provider");
        let mut child = Command::new(&self.spec.command)
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", self.spec.command))?;

        let stdin = child.stdin.take().context("child stdin unavailable")?;
        let stdout = child.stdout.take().context("child stdout unavailable")?;
        let stderr = child.stderr.take().context("child stderr unavailable")?;

        // Drain stderr in the background so the child never blocks on a
        // full pipe; lines surface in the trace log.
        let server = self.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.trim().is_empty() {
                    debug!(server = %server, "stderr: {line}");
                }
            }
        });

        // Handshake and discovery run on a local pipe; it is stored only
        // once the client is fully ready.  If any step fails, the local
        // pipe drops here and `kill_on_drop` reaps the child.
        let mut pipe = Pipe {
            child,
            stdin,
            reader: BufReader::new(stdout),
        };

        // Handshake.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let init = JsonRpcRequest::new(
            id,
            "initialize",
            Some(initialize_params("elsa", env!("CARGO_PKG_VERSION"))),
        );
        let resp = request(&mut pipe, &init, STARTUP_TIMEOUT).await?;
        if let Some(err) = resp.error {
            bail!("initialize failed: {} (code {})", err.message, err.code);
        }
        write_line(
            &mut pipe.stdin,
            &notification("notifications/initialized", None),
        )
        .await?;

        // Discovery.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let list = JsonRpcRequest::new(id, "tools/list", None);
        let resp = request(&mut pipe, &list, STARTUP_TIMEOUT).await?;
        if let Some(err) = resp.error {
            bail!("tools/list failed: {} (code {})", err.message, err.code);
        }
        let listed: ToolsListResult = match resp.result {
            Some(v) => serde_json::from_value(v).context("parsing tools/list result")?,
            None => ToolsListResult::default(),
        };

        *self.pipe.get_mut() = Some(pipe);
        Ok(self.filter_tools(listed))
    }

    /// Apply the allow-list and per-tool safety overrides, and rename each
    /// surviving tool into the `mcp_<server>_<tool>` namespace.
    fn filter_tools(&self, listed: ToolsListResult) -> Vec<ProviderTool> {
        listed
            .tools
            .into_iter()
            .filter(|t| {
                self.spec.allowed_functions.is_empty()
                    || self.spec.allowed_functions.iter().any(|a| a == &t.name)
            })
            .map(|t| {
                let safe = self.spec.safe_functions.iter().any(|s| s == &t.name)
                    || self.spec.safe;
                ProviderTool {
                    outer_name: format!("mcp_{}_{}", self.name, t.name),
                    inner_name: t.name,
                    description: t.description,
                    schema: t.input_schema,
                    safe,
                }
            })
            .collect()
    }

    /// Invoke one discovered tool, gated by the confirmation policy.
    ///
    /// A denial is not an error; the operator's message becomes the tool
    /// result.  An `isError` response surfaces as a
    /// `Tool execution error` so the caller can report it inline.
    pub async fn call_tool(
        &self,
        tool: &ProviderTool,
        arguments: &Value,
        ask: AskLevel,
        io: &dyn OperatorIo,
    ) -> anyhow::Result<String> {
        {
            let state = self.state.lock().unwrap();
            if *state != ClientState::Ready {
                bail!("server '{}' is not running", self.name);
            }
        }

        let shown = serde_json::to_string(arguments).unwrap_or_default();
        let decision = confirm_execution(
            ask,
            tool.safe,
            &format!("Call '{}' with {shown}", tool.outer_name),
            io,
        )
        .await;
        if !decision.approved {
            return Ok(format!("Message from user: {}", decision.message));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(
            id,
            "tools/call",
            Some(json!({ "name": tool.inner_name, "arguments": arguments })),
        );

        let mut guard = self.pipe.lock().await;
        let pipe = match guard.as_mut() {
            Some(p) => p,
            None => bail!("server '{}' is not running", self.name),
        };
        let resp = match request(pipe, &req, CALL_TIMEOUT).await {
            Ok(r) => r,
            Err(e) => {
                // Broken framing: the stream can no longer be trusted.
                *self.state.lock().unwrap() = ClientState::Failed;
                return Err(e);
            }
        };
        drop(guard);

        if let Some(err) = resp.error {
            bail!("tools/call failed: {} (code {})", err.message, err.code);
        }
        let result: CallResult = match resp.result {
            Some(v) => serde_json::from_value(v).context("parsing tools/call result")?,
            None => CallResult::default(),
        };

        let text = result.text();
        if result.is_error {
            bail!("Tool execution error\n{text}");
        }
        if text.is_empty() {
            // Distinguish "ran fine, said nothing" from a lost result.
            return Ok("(No output)".to_string());
        }
        Ok(text)
    }

    /// Close stdin, kill the child and wait for it.
    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, ClientState::Stopped | ClientState::Stopping) {
                return;
            }
            *state = ClientState::Stopping;
        }
        let mut guard = self.pipe.lock().await;
        stop_internal(&mut guard).await;
        *self.state.lock().unwrap() = ClientState::Stopped;
    }
}

/// Teardown with pipe access already in hand — safe to call from the
/// failure path of `start`, which must not re-acquire the mutex.
async fn stop_internal(pipe: &mut Option<Pipe>) {
    if let Some(mut p) = pipe.take() {
        drop(p.stdin);
        if let Err(e) = p.child.kill().await {
            warn!("killing tool provider: {e}");
        }
        let _ = p.child.wait().await;
    }
}

async fn write_line(stdin: &mut ChildStdin, message: &impl serde::Serialize) -> anyhow::Result<()> {
    let mut line = serde_json::to_vec(message).context("serializing request")?;
    line.push(b'\n');
    stdin.write_all(&line).await.context("writing to server")?;
    stdin.flush().await.context("flushing to server")?;
    Ok(())
}

/// One request/response exchange.  The caller holds the pipe, so the pair
/// cannot interleave with another request.  Lines are read with
/// `read_line`, which grows without bound — multi-megabyte responses are
/// accepted by construction.
async fn request(
    pipe: &mut Pipe,
    req: &JsonRpcRequest,
    deadline: Duration,
) -> anyhow::Result<JsonRpcResponse> {
    write_line(&mut pipe.stdin, req).await?;

    let read = async {
        let mut line = String::new();
        loop {
            line.clear();
            let n = pipe
                .reader
                .read_line(&mut line)
                .await
                .context("reading from server")?;
            if n == 0 {
                bail!("server closed its stdout");
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let resp: JsonRpcResponse = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!("unparseable line from server: {e}");
                    continue;
                }
            };
            if resp.method.is_some() {
                // Server-initiated notification or request; not ours.
                debug!(method = ?resp.method, "skipping server-initiated message");
                continue;
            }
            match resp.id {
                Some(id) if id == req.id => return Ok(resp),
                other => {
                    debug!(?other, expected = req.id, "skipping response with foreign id");
                }
            }
        }
    };

    match tokio::time::timeout(deadline, read).await {
        Ok(result) => result,
        Err(_) => bail!(
            "request '{}' timed out after {} seconds",
            req.method,
            deadline.as_secs()
        ),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
