//! Shared test helpers for engine tests.

use crate::stage::StageContext;
use crate::state::TurnState;
use crate::window::WindowBudget;
use charmline_core::error::ProviderError;
use charmline_core::message::Turn;
use charmline_core::persona::Persona;
use charmline_core::provider::{CompletionRequest, CompletionResponse, Provider};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that returns a sequence of scripted results.
///
/// Records every request. Panics if more calls are made than results
/// provided.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn unavailable() -> Self {
        Self::new(vec![Err(ProviderError::Unavailable("connection refused".into()))])
    }

    /// Wait `delay` before answering each call.
    pub fn slow(texts: &[&str], delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::texts(texts)
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(CompletionResponse {
                text,
                usage: None,
                model: "test-model".into(),
            }),
            Some(Err(e)) => Err(e),
            None => panic!("ScriptedProvider: no more responses (call #{call})"),
        }
    }
}

/// Threshold 74, one gallery image.
pub fn persona() -> Persona {
    let mut persona = Persona::new("ava", "Ava", "Playful barista.", 74);
    persona.kinks = vec!["banter".into()];
    persona.categories = vec!["cafe".into()];
    persona.gallery = vec!["https://cdn.example.com/ava/1.jpg".into()];
    persona
}

pub fn context(provider: Arc<ScriptedProvider>) -> StageContext {
    StageContext::new(provider, "test-model")
}

pub fn state_with(stored: Vec<Turn>, message: &str, scores: Vec<u32>) -> TurnState {
    TurnState::new(
        &persona(),
        stored,
        Turn::user(message),
        scores,
        &WindowBudget::default(),
    )
}
