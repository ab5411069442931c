// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use tracing::debug;

use crate::Agent;

/// Directory searched for agents referenced by bare name.
pub fn agent_search_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("elsa/agents"))
}

/// Load and validate an agent file from an explicit path.
///
/// The agent name defaults to the file stem when the file does not set one.
pub fn load_agent(path: &Path) -> anyhow::Result<Agent> {
    debug!(path = %path.display(), "loading agent");
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let mut agent: Agent =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;

    if agent.name.is_empty() {
        agent.name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    validate(&agent).with_context(|| format!("invalid agent {}", path.display()))?;
    Ok(agent)
}

/// Resolve an agent reference: a path when it points at an existing file
/// (or ends in `.toml`), otherwise a bare name under the search path.
pub fn load_agent_by_name(reference: &str) -> anyhow::Result<Agent> {
    let as_path = Path::new(reference);
    if as_path.is_file() || reference.ends_with(".toml") {
        return load_agent(as_path);
    }
    let dir = agent_search_path().context("no config directory available")?;
    let path = dir.join(format!("{reference}.toml"));
    if !path.is_file() {
        bail!("agent '{reference}' not found at {}", path.display());
    }
    load_agent(&path)
}

/// Structural validation: names unique, parameter types sane, required
/// parameters without defaults.  Runs once at load time so the runner can
/// trust every function declaration at call time.
fn validate(agent: &Agent) -> anyhow::Result<()> {
    if agent.name.is_empty() {
        bail!("agent name must not be empty");
    }

    let mut fn_names = HashSet::new();
    for f in &agent.functions {
        if f.name.is_empty() {
            bail!("function with empty name");
        }
        if !fn_names.insert(f.name.as_str()) {
            bail!("duplicate function name '{}'", f.name);
        }
        if f.command.is_empty() {
            bail!("function '{}' has an empty command", f.name);
        }

        let mut param_names = HashSet::new();
        for p in &f.parameters {
            if p.name.is_empty() {
                bail!("function '{}' has a parameter with empty name", f.name);
            }
            if !param_names.insert(p.name.as_str()) {
                bail!("function '{}' declares parameter '{}' twice", f.name, p.name);
            }
            if p.required && p.default.is_some() {
                bail!(
                    "function '{}': required parameter '{}' must not declare a default",
                    f.name,
                    p.name
                );
            }
        }
    }

    for (name, srv) in &agent.mcp_servers {
        if srv.command.is_empty() {
            bail!("mcp server '{name}' has an empty command");
        }
    }
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
