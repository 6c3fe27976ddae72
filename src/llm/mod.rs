//! LLM integration — provider trait plus an OpenAI-compatible HTTP backend.
//!
//! The relevance filter and fulfillment engine only need plain chat
//! completions, so the provider surface is a single `complete()` call.

pub mod provider;

pub use provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider};

use std::sync::Arc;

use crate::config::LlmConfig;
use crate::error::LlmError;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = provider::OpenAiCompatProvider::new(config)?;
    tracing::info!(model = %config.model, base = %config.api_base, "LLM provider ready");
    Ok(Arc::new(provider))
}
