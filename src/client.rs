//! Generative host access.
//!
//! The router talks to the generative host through [`GenerativeBackend`],
//! an object-safe seam so tests can script completions. The production
//! implementation targets an OpenAI-compatible chat completions endpoint.
//!
//! Prompts reaching this module were assembled by the sandboxed renderer
//! from catalogue templates and scrubbed variables; nothing else may be
//! sent to the host.

use std::time::{Duration, Instant};

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::debug;

use crate::error::GenerationError;

/// A fully assembled prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    /// System prompt from the code-controlled catalogue.
    pub system: String,
    /// User message carrying the scrubbed request material.
    pub user: String,
}

/// Budget for a single generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationBudget {
    /// Token cap for the completion.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Wall-clock timeout for the call.
    pub timeout: Duration,
}

/// Seam to the external generative host.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Requests one completion within the budget.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] on host failure or empty output; the
    /// wall-clock timeout is enforced by [`generate`], not here.
    async fn complete(
        &self,
        prompt: &AssembledPrompt,
        budget: &GenerationBudget,
    ) -> std::result::Result<String, GenerationError>;
}

/// Runs a completion under the budget's wall-clock timeout.
///
/// # Errors
///
/// Returns [`GenerationError::Timeout`] when the deadline elapses; the
/// caller reports that to the circuit breaker like any other failure.
pub async fn generate(
    backend: &dyn GenerativeBackend,
    prompt: &AssembledPrompt,
    budget: &GenerationBudget,
) -> std::result::Result<String, GenerationError> {
    let started = Instant::now();
    match tokio::time::timeout(budget.timeout, backend.complete(prompt, budget)).await {
        Ok(result) => result,
        Err(_) => {
            #[allow(clippy::cast_possible_truncation)]
            let elapsed_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;
            Err(GenerationError::Timeout { elapsed_ms })
        }
    }
}

/// OpenAI-compatible chat completions backend.
///
/// The API key is taken from the standard `OPENAI_API_KEY` environment
/// variable by the underlying client; an alternate host is configured via
/// the base URL.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Creates a backend for `model`, optionally overriding the API base.
    #[must_use]
    pub fn new(model: impl Into<String>, api_base: Option<&str>) -> Self {
        let config = match api_base {
            Some(base) => OpenAIConfig::new().with_api_base(base),
            None => OpenAIConfig::new(),
        };
        Self {
            client: Client::with_config(config),
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerativeBackend for OpenAiBackend {
    async fn complete(
        &self,
        prompt: &AssembledPrompt,
        budget: &GenerationBudget,
    ) -> std::result::Result<String, GenerationError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt.system.as_str())
            .build()
            .map_err(|e| GenerationError::Host(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.user.as_str())
            .build()
            .map_err(|e| GenerationError::Host(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(budget.max_tokens)
            .temperature(budget.temperature)
            .messages([system.into(), user.into()])
            .build()
            .map_err(|e| GenerationError::Host(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| GenerationError::Host(e.to_string()))?;

        debug!(model = %self.model, choices = response.choices.len(), "completion received");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GenerationError::EmptyCompletion)
    }
}
