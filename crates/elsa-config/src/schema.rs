// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Serde default helper — returns `false`.
///
/// Named so the intent reads at the field site; functions declared unsafe
/// must opt in explicitly with `safe = true`.
fn default_unsafe() -> bool {
    false
}

fn default_timeout() -> u64 {
    60
}

/// Confirmation policy for tool execution.
///
/// - `None`   — never prompt the operator.
/// - `Unsafe` — prompt only for operations not marked `safe` (the default).
/// - `All`    — prompt for every operation, safe or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AskLevel {
    None,
    #[default]
    Unsafe,
    All,
}

impl std::str::FromStr for AskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "unsafe" => Ok(Self::Unsafe),
            "all" => Ok(Self::All),
            other => anyhow::bail!("invalid ask level '{other}' (expected none, unsafe or all)"),
        }
    }
}

impl std::fmt::Display for AskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Unsafe => write!(f, "unsafe"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A named bundle of system prompt, shell functions and tool-provider
/// servers under which one conversation runs.  Immutable per session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Agent {
    /// Agent name; defaults to the file stem when loaded from disk.
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// System prompt template (may contain shell and prompt blocks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Rendered and inserted as the first user message of a fresh conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_message: Option<String>,
    /// Default model identifier, `provider/model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Default confirmation policy when the CLI does not override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask: Option<AskLevel>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
    /// Tool-provider servers, keyed by server name.  BTreeMap keeps startup
    /// order (and therefore failure rollback order) deterministic.
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ToolProviderSpec>,
}

impl Agent {
    /// Look up a shell function by exact name.
    pub fn function(&self, name: &str) -> Option<&FunctionSpec> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// A templated shell command exposed to the model as a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Shell command template with `{{param}}` / `{{$shell}}` / `{{#prompt}}`
    /// placeholders.
    pub command: String,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    /// Functions are unsafe unless declared otherwise.
    #[serde(default = "default_unsafe")]
    pub safe: bool,
    /// Template for data piped to the command's stdin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    /// Working-directory template; `~` and `$VAR` are expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,
    /// Banner template printed to the operator before execution.
    /// Part of the user-visible UX, never of the model-visible result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
    /// Execution deadline in seconds; zero or absent means 60.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl FunctionSpec {
    /// Effective deadline in seconds.  A configured zero falls back to the
    /// default so a function can never run without a deadline.
    pub fn timeout_secs(&self) -> u64 {
        if self.timeout == 0 {
            default_timeout()
        } else {
            self.timeout
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[default]
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// JSON Schema type name as sent in the tool manifest.
    pub fn json_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// One declared parameter of a shell function.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub param_type: ParamType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Rendering format: a plain string acts as a boolean-like toggle
    /// (truthy value → the format string, falsy → empty); a string with a
    /// single `%` directive applies printf-style formatting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Enumeration of allowed values, surfaced as `enum` in the manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    /// Substituted into the argument map when the model omits an optional
    /// parameter.  Required parameters must not declare one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// Launch description for an external tool-provider child process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolProviderSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Server-wide safety default for tools not listed in `safe_functions`.
    #[serde(default = "default_unsafe")]
    pub safe: bool,
    /// Tools allow-listed as safe regardless of the server default.
    #[serde(default)]
    pub safe_functions: Vec<String>,
    /// When non-empty, only these tools are exposed to the model.
    #[serde(default)]
    pub allowed_functions: Vec<String>,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
