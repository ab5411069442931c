// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod loader;
mod schema;

pub use loader::{agent_search_path, load_agent, load_agent_by_name};
pub use schema::{
    Agent, AskLevel, FunctionSpec, ParamType, ParameterSpec, ToolProviderSpec,
};
