// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use elsa_config::FunctionSpec;
use elsa_mcp::ProviderTool;
use elsa_model::ToolSchema;
use serde_json::{json, Map, Value};

/// Tool-manifest entry for one shell function.
///
/// Wire shape: `{name, description, parameters: {type: "object",
/// properties: {…}, required: […]}}`, with `enum` populated from a
/// parameter's declared options.
pub fn function_schema(spec: &FunctionSpec) -> ToolSchema {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for p in &spec.parameters {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(p.param_type.json_name()));
        prop.insert("description".into(), json!(p.description));
        if let Some(options) = &p.options {
            prop.insert("enum".into(), json!(options));
        }
        properties.insert(p.name.clone(), Value::Object(prop));
        if p.required {
            required.push(p.name.clone());
        }
    }
    ToolSchema {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

/// Tool-manifest entry for one namespaced provider tool.  The provider's
/// own input schema passes through untouched.
pub fn provider_schema(tool: &ProviderTool) -> ToolSchema {
    ToolSchema {
        name: tool.outer_name.clone(),
        description: tool.description.clone(),
        parameters: tool.schema.clone(),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
