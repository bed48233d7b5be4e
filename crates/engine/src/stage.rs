//! The stage abstraction and the completion context stages share.

use crate::state::TurnState;
use async_trait::async_trait;
use charmline_core::error::{ProviderError, Result};
use charmline_core::message::Turn;
use charmline_core::provider::{CompletionRequest, Provider};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One step of the turn pipeline.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, ctx: &StageContext, state: &mut TurnState) -> Result<()>;
}

/// The backend a request was routed to, plus sampling settings.
#[derive(Clone)]
pub struct StageContext {
    pub provider: Arc<dyn Provider>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Upper bound on each completion call
    pub timeout: Duration,
}

impl StageContext {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Send `turns` and return the completion text. Never retried.
    pub async fn complete_text(&self, turns: Vec<Turn>) -> Result<String> {
        let mut request = CompletionRequest::new(&self.model, turns);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;

        debug!(
            provider = self.provider.name(),
            model = %self.model,
            turns = request.turns.len(),
            "Calling completion backend"
        );

        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!(
                    "{} did not answer within {}s",
                    self.provider.name(),
                    self.timeout.as_secs()
                ))
            })??;

        Ok(response.text)
    }
}
