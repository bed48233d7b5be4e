//! The chat engine: one request in, one persisted exchange out.
//!
//! 1. Load the persona and the conversation (or start one in memory)
//! 2. Append the user turn and window the history
//! 3. Run the pipeline
//! 4. Compose the outbound message and pick a reward image
//! 5. Persist the exchange atomically, together with the conversation row
//!    when the conversation is new
//!
//! Nothing is written unless every step before persistence succeeds.

use crate::pipeline::Pipeline;
use crate::stage::StageContext;
use crate::state::TurnState;
use crate::window::WindowBudget;
use charmline_config::AppConfig;
use charmline_core::error::{Error, ProviderError, Result};
use charmline_core::message::{ConversationId, ConversationRecord, Turn};
use charmline_core::persona::PersonaId;
use charmline_core::provider::Backend;
use charmline_core::store::{ConversationStore, Exchange, PersonaCatalog};
use charmline_providers::ProviderRouter;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// One inbound chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub persona_id: PersonaId,
    #[serde(default)]
    pub conversation_id: Option<ConversationId>,
    pub message: String,
    #[serde(default)]
    pub backend: Option<Backend>,
}

impl ChatRequest {
    pub fn new(persona_id: &str, message: impl Into<String>) -> Self {
        Self {
            persona_id: PersonaId::from(persona_id),
            conversation_id: None,
            message: message.into(),
            backend: None,
        }
    }

    pub fn in_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }
}

/// The result of a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub conversation_id: ConversationId,
    /// Reply text, with the reward line appended when the gate fired
    pub message: String,
    /// This turn's score; 0 when the turn was not scored
    pub impression_score: u32,
    /// Rounded mean over all scored turns
    pub avg_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_image: Option<String>,
    pub backend: Backend,
    pub gate_met: bool,
}

/// Sampling and budget settings applied to every turn.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub budget: WindowBudget,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            budget: WindowBudget::from(&config.window),
            temperature: config.temperature,
            max_tokens: Some(config.max_tokens),
            timeout: Duration::from_secs(config.completion_timeout_secs),
        }
    }
}

pub struct ChatEngine {
    router: Arc<ProviderRouter>,
    catalog: Arc<dyn PersonaCatalog>,
    store: Arc<dyn ConversationStore>,
    pipeline: Pipeline,
    settings: EngineSettings,
}

impl ChatEngine {
    pub fn new(
        router: Arc<ProviderRouter>,
        catalog: Arc<dyn PersonaCatalog>,
        store: Arc<dyn ConversationStore>,
        pipeline: Pipeline,
        settings: EngineSettings,
    ) -> Self {
        Self {
            router,
            catalog,
            store,
            pipeline,
            settings,
        }
    }

    /// Standard pipeline and settings from configuration.
    pub fn from_config(
        config: &AppConfig,
        router: Arc<ProviderRouter>,
        catalog: Arc<dyn PersonaCatalog>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self::new(
            router,
            catalog,
            store,
            Pipeline::standard(&config.window),
            EngineSettings::from_config(config),
        )
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<dyn PersonaCatalog> {
        &self.catalog
    }

    /// Run one chat turn end to end.
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatOutcome> {
        if request.message.trim().is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }

        let persona = self.catalog.get(&request.persona_id).await?;

        let (backend, route) = self.router.resolve(request.backend).ok_or_else(|| {
            ProviderError::Unavailable(format!(
                "backend '{}' is not configured",
                request.backend.unwrap_or(self.router.default_backend())
            ))
        })?;

        let is_new = request.conversation_id.is_none();
        let mut record = match &request.conversation_id {
            Some(id) => {
                let record = self.store.load(id).await?;
                if record.persona_id != persona.id {
                    return Err(Error::Validation(format!(
                        "conversation {id} belongs to persona {}",
                        record.persona_id
                    )));
                }
                record
            }
            None => ConversationRecord::new(persona.id.clone()),
        };

        let mut state = TurnState::new(
            &persona,
            std::mem::take(&mut record.turns),
            Turn::user(request.message),
            std::mem::take(&mut record.score_history),
            &self.settings.budget,
        );

        let ctx = StageContext {
            provider: route.provider,
            model: route.model,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            timeout: self.settings.timeout,
        };
        self.pipeline.run(&ctx, &mut state).await?;

        let reply = state
            .reply()
            .map(|t| t.content.clone())
            .ok_or_else(|| ProviderError::Unavailable("backend returned no reply".into()))?;
        let message = compose_message(&reply, &state);
        let reward_image = if state.gate_met {
            pick_reward_image(&persona.gallery)
        } else {
            None
        };

        let conversation_id = record.id.clone();
        let exchange = Exchange {
            user: state.user_turn().clone(),
            assistant: Turn::assistant(message.clone()),
            score_history: state.score_history.clone(),
        };
        if is_new {
            self.store.create_with_exchange(record, exchange).await?;
        } else {
            self.store.append_exchange(&conversation_id, exchange).await?;
        }

        info!(
            conversation_id = %conversation_id,
            persona_id = %persona.id,
            backend = %backend,
            score = state.turn_score,
            avg = state.avg_score,
            gate = state.gate_met,
            truncated = state.truncated,
            "Completed chat turn"
        );

        Ok(ChatOutcome {
            conversation_id,
            message,
            impression_score: state.turn_score,
            avg_score: state.avg_score,
            reward_image,
            backend,
            gate_met: state.gate_met,
        })
    }
}

/// The reply, plus the reward line on its own paragraph when the gate fired.
fn compose_message(reply: &str, state: &TurnState) -> String {
    match (&state.reward_line, state.gate_met) {
        (Some(line), true) => format!("{reply}\n\n{line}"),
        _ => reply.to_string(),
    }
}

/// Uniformly random gallery entry.
fn pick_reward_image(gallery: &[String]) -> Option<String> {
    gallery.choose(&mut rand::rng()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, persona};
    use charmline_core::ErrorKind;
    use charmline_core::persona::Persona;
    use charmline_store::InMemoryStore;

    struct Harness {
        engine: ChatEngine,
        store: Arc<InMemoryStore>,
        provider: Arc<ScriptedProvider>,
    }

    fn harness(persona: Persona, responses: Vec<std::result::Result<String, ProviderError>>) -> Harness {
        harness_with(persona, ScriptedProvider::new(responses))
    }

    fn harness_with(persona: Persona, provider: ScriptedProvider) -> Harness {
        let provider = Arc::new(provider);
        let mut router = ProviderRouter::new(Backend::OpenAi);
        router.register(Backend::OpenAi, provider.clone(), "gpt-4");
        router.register(Backend::Anthropic, provider.clone(), "claude-3-opus-20240229");

        let store = Arc::new(InMemoryStore::with_personas([persona]));
        let engine = ChatEngine::from_config(
            &AppConfig::default(),
            Arc::new(router),
            store.clone(),
            store.clone(),
        );
        Harness {
            engine,
            store,
            provider,
        }
    }

    fn texts(texts: &[&str]) -> Vec<std::result::Result<String, ProviderError>> {
        texts.iter().map(|t| Ok(t.to_string())).collect()
    }

    #[tokio::test]
    async fn opening_turn_creates_conversation_without_scoring() {
        let h = harness(persona(), texts(&["Well hello there."]));
        let outcome = h.engine.handle(ChatRequest::new("ava", "hi!")).await.unwrap();

        assert_eq!(outcome.message, "Well hello there.");
        assert_eq!(outcome.impression_score, 0);
        assert_eq!(outcome.avg_score, 0);
        assert!(outcome.reward_image.is_none());
        assert_eq!(outcome.backend, Backend::OpenAi);
        assert_eq!(h.provider.call_count(), 1);

        let record = h.store.load(&outcome.conversation_id).await.unwrap();
        assert_eq!(record.turns.len(), 2);
        assert!(record.score_history.is_empty());
    }

    #[tokio::test]
    async fn threshold_scenario_over_three_turns() {
        // threshold 74: opening, then 80, 60 (avg 70), then 90 (avg 77)
        let h = harness(
            persona(),
            texts(&[
                "Hi.",
                "Ha.", "80", "Sending a photo your way.",
                "Hm.", "60",
                "Wow.", "90", "Here's a photo, just for you.",
            ]),
        );

        let first = h.engine.handle(ChatRequest::new("ava", "hi")).await.unwrap();
        let id = first.conversation_id.clone();

        let second = h
            .engine
            .handle(ChatRequest::new("ava", "love the latte art").in_conversation(id.clone()))
            .await
            .unwrap();
        assert_eq!(second.avg_score, 80);
        assert!(second.gate_met);
        assert_eq!(second.message, "Ha.\n\nSending a photo your way.");

        let third = h
            .engine
            .handle(ChatRequest::new("ava", "ok").in_conversation(id.clone()))
            .await
            .unwrap();
        assert_eq!(third.impression_score, 60);
        assert_eq!(third.avg_score, 70);
        assert!(!third.gate_met);
        assert_eq!(third.message, "Hm.");
        assert!(third.reward_image.is_none());

        let fourth = h
            .engine
            .handle(ChatRequest::new("ava", "a pun-based haiku").in_conversation(id.clone()))
            .await
            .unwrap();
        assert_eq!(fourth.avg_score, 77);
        assert!(fourth.gate_met);
        assert_eq!(fourth.message, "Wow.\n\nHere's a photo, just for you.");
        assert_eq!(
            fourth.reward_image.as_deref(),
            Some("https://cdn.example.com/ava/1.jpg")
        );

        let record = h.store.load(&id).await.unwrap();
        assert_eq!(record.score_history, vec![80, 60, 90]);
        assert_eq!(record.turns.len(), 8);
        assert_eq!(record.turns[7].content, fourth.message);
    }

    #[tokio::test]
    async fn invalid_score_writes_nothing() {
        let h = harness(persona(), texts(&["Hi.", "Cute.", "ninety"]));
        let first = h.engine.handle(ChatRequest::new("ava", "hi")).await.unwrap();

        let err = h
            .engine
            .handle(ChatRequest::new("ava", "hello again").in_conversation(first.conversation_id.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidScore);

        let record = h.store.load(&first.conversation_id).await.unwrap();
        assert_eq!(record.turns.len(), 2);
        assert!(record.score_history.is_empty());
    }

    #[tokio::test]
    async fn failed_opening_turn_leaves_no_conversation() {
        let h = harness_with(persona(), ScriptedProvider::unavailable());

        let err = h.engine.handle(ChatRequest::new("ava", "hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(h.store.conversation_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_turn_writes_nothing() {
        let h = harness_with(
            persona(),
            ScriptedProvider::slow(&["Too late."], Duration::from_secs(30)),
        );
        let record = h.store.create(&PersonaId::from("ava")).await.unwrap();
        h.store
            .append_exchange(
                &record.id,
                Exchange {
                    user: Turn::user("hi"),
                    assistant: Turn::assistant("hey"),
                    score_history: vec![70],
                },
            )
            .await
            .unwrap();

        let engine = Arc::new(h.engine);
        let request = ChatRequest::new("ava", "still there?").in_conversation(record.id.clone());
        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.handle(request).await }
        });

        // The reply call is in flight.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.provider.call_count(), 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_secs(60)).await;
        let stored = h.store.load(&record.id).await.unwrap();
        let contents: Vec<&str> = stored.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hey"]);
        assert_eq!(stored.score_history, vec![70]);
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_gallery_gives_text_but_no_image() {
        let mut p = persona();
        p.gallery.clear();
        let h = harness(p, texts(&["Hi.", "Nice.", "95", "A photo is on its way."]));

        let first = h.engine.handle(ChatRequest::new("ava", "hi")).await.unwrap();
        let second = h
            .engine
            .handle(ChatRequest::new("ava", "espresso or bust").in_conversation(first.conversation_id))
            .await
            .unwrap();

        assert!(second.gate_met);
        assert!(second.message.ends_with("\n\nA photo is on its way."));
        assert!(second.reward_image.is_none());
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_any_call() {
        let h = harness(persona(), vec![]);
        let err = h.engine.handle(ChatRequest::new("ava", "   ")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(h.provider.call_count(), 0);
        assert_eq!(h.store.conversation_count().await, 0);
    }

    #[tokio::test]
    async fn unknown_persona_and_conversation() {
        let h = harness(persona(), vec![]);

        let err = h.engine.handle(ChatRequest::new("nobody", "hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = h
            .engine
            .handle(ChatRequest::new("ava", "hi").in_conversation(ConversationId::from("missing")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn backend_is_chosen_per_request() {
        let h = harness(persona(), texts(&["Hello!"]));
        let outcome = h
            .engine
            .handle(ChatRequest::new("ava", "hi").with_backend(Backend::Anthropic))
            .await
            .unwrap();
        assert_eq!(outcome.backend, Backend::Anthropic);
        assert_eq!(h.provider.requests()[0].model, "claude-3-opus-20240229");
    }

    #[tokio::test]
    async fn unconfigured_backend_is_unavailable() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut router = ProviderRouter::new(Backend::OpenAi);
        router.register(Backend::OpenAi, provider, "gpt-4");
        let store = Arc::new(InMemoryStore::with_personas([persona()]));
        let engine = ChatEngine::from_config(
            &AppConfig::default(),
            Arc::new(router),
            store.clone(),
            store.clone(),
        );

        let err = engine
            .handle(ChatRequest::new("ava", "hi").with_backend(Backend::Anthropic))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn conversation_of_another_persona_is_rejected() {
        let h = harness(persona(), texts(&["Hi."]));
        let other = h.store.create(&PersonaId::from("rex")).await.unwrap();

        let err = h
            .engine
            .handle(ChatRequest::new("ava", "hi").in_conversation(other.id))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(h.provider.call_count(), 0);
    }

    #[test]
    fn reward_line_only_when_gate_met() {
        let mut state = crate::test_helpers::state_with(vec![], "hi", vec![]);
        state.reward_line = Some("Photo incoming.".into());
        assert_eq!(compose_message("Hey.", &state), "Hey.");
        state.gate_met = true;
        assert_eq!(compose_message("Hey.", &state), "Hey.\n\nPhoto incoming.");
    }

    #[test]
    fn reward_image_comes_from_gallery() {
        let gallery = vec!["a.jpg".to_string(), "b.jpg".to_string(), "c.jpg".to_string()];
        for _ in 0..20 {
            let picked = pick_reward_image(&gallery).unwrap();
            assert!(gallery.contains(&picked));
        }
        assert!(pick_reward_image(&[]).is_none());
    }
}
