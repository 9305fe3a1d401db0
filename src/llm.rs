//! # Completion Service
//!
//! Two model tiers behind one trait: `Smart` for planning and synthesis,
//! `Fast` for per-paper summaries. The production implementation goes through
//! Rig's OpenRouter provider; tests substitute deterministic stubs.

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::openrouter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::CompletionError;

/// Class of model selected by task criticality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    /// Reasoning-heavy work: planning, report synthesis
    Smart,
    /// Cheap, high-volume work: summarization
    Fast,
}

/// Text-completion collaborator.
///
/// Implementations must not retry internally; callers decide what a failure
/// means for the workflow.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        tier: ModelTier,
        system_prompt: Option<&str>,
    ) -> Result<String, CompletionError>;
}

/// OpenRouter-backed completion service.
pub struct OpenRouterClient {
    client: Option<openrouter::Client>,
    smart_model: String,
    fast_model: String,
}

impl OpenRouterClient {
    /// Build a client from configuration.
    ///
    /// A missing API key is not an error here: the service still starts and
    /// every completion call reports `MissingApiKey`.
    pub fn new(config: &Config) -> Self {
        let client = if config.api_configured() {
            Some(openrouter::Client::from_val(config.api_key.clone().into()))
        } else {
            None
        };

        Self {
            client,
            smart_model: config.smart_model.clone(),
            fast_model: config.fast_model.clone(),
        }
    }

    /// Model id serving the given tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Smart => &self.smart_model,
            ModelTier::Fast => &self.fast_model,
        }
    }
}

#[async_trait]
impl CompletionService for OpenRouterClient {
    async fn complete(
        &self,
        prompt: &str,
        tier: ModelTier,
        system_prompt: Option<&str>,
    ) -> Result<String, CompletionError> {
        let client = self.client.as_ref().ok_or(CompletionError::MissingApiKey)?;
        let model = self.model_for(tier);

        info!(model = %model, ?tier, "Calling OpenRouter");

        let mut builder = client.agent(model);
        if let Some(system) = system_prompt {
            builder = builder.preamble(system);
        }
        let agent = builder.build();

        let response = agent
            .prompt(prompt)
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        if response.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        debug!(model = %model, chars = response.len(), "Completion received");
        Ok(response)
    }
}
