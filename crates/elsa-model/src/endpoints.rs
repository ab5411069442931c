// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use anyhow::{bail, Context};

use crate::{ChatProvider, OpenAICompatChat};

/// Endpoint defaults for one OpenAI-compatible provider.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    pub base_url: &'static str,
    /// Environment variable holding the bearer key; `None` for local servers.
    pub key_env: Option<&'static str>,
}

/// Known OpenAI-compatible providers.
pub fn endpoint_for(provider: &str) -> Option<Endpoint> {
    let ep = match provider {
        "openai" => Endpoint {
            base_url: "https://api.openai.com/v1",
            key_env: Some("OPENAI_API_KEY"),
        },
        "openrouter" => Endpoint {
            base_url: "https://openrouter.ai/api/v1",
            key_env: Some("OPENROUTER_API_KEY"),
        },
        "groq" => Endpoint {
            base_url: "https://api.groq.com/openai/v1",
            key_env: Some("GROQ_API_KEY"),
        },
        "deepseek" => Endpoint {
            base_url: "https://api.deepseek.com/v1",
            key_env: Some("DEEPSEEK_API_KEY"),
        },
        "mistral" => Endpoint {
            base_url: "https://api.mistral.ai/v1",
            key_env: Some("MISTRAL_API_KEY"),
        },
        "ollama" => Endpoint {
            base_url: "http://localhost:11434/v1",
            key_env: None,
        },
        _ => return None,
    };
    Some(ep)
}

/// Build a provider from a `provider/model` identifier.
///
/// The model half may itself contain `/` (OpenRouter-style ids), so only
/// the first separator splits.
pub fn provider_from_model_id(model_id: &str) -> anyhow::Result<Arc<dyn ChatProvider>> {
    let (provider, model) = model_id
        .split_once('/')
        .with_context(|| format!("model identifier '{model_id}' is not of the form provider/model"))?;
    if model.is_empty() {
        bail!("model identifier '{model_id}' has an empty model name");
    }
    let ep = endpoint_for(provider)
        .with_context(|| format!("unknown provider '{provider}'"))?;

    let api_key = match ep.key_env {
        Some(var) => Some(
            std::env::var(var)
                .with_context(|| format!("environment variable {var} not set for provider '{provider}'"))?,
        ),
        None => None,
    };
    Ok(Arc::new(OpenAICompatChat::new(
        provider,
        model,
        api_key,
        ep.base_url,
    )))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
