//! Personality stage: the in-character reply.

use crate::stage::{Stage, StageContext};
use crate::state::TurnState;
use async_trait::async_trait;
use charmline_config::WindowConfig;
use charmline_core::error::Result;
use charmline_core::message::Turn;

/// Produces exactly one persona reply per turn.
pub struct PersonalityStage {
    /// Turns of full history folded into the truncation summary
    summary_tail: usize,
    /// Character cap on the summary's topic list
    summary_chars: usize,
}

impl PersonalityStage {
    pub fn new(summary_tail: usize, summary_chars: usize) -> Self {
        Self {
            summary_tail,
            summary_chars,
        }
    }

    pub fn from_config(config: &WindowConfig) -> Self {
        Self::new(config.summary_tail, config.summary_chars)
    }

    /// The system instruction for the reply call.
    pub fn system_instruction(&self, state: &TurnState) -> String {
        let mut parts = vec![format!(
            "You are {}, with the following personality:\n{}",
            state.persona_name, state.enhanced_prompt
        )];

        if state.truncated {
            parts.push(summary_line(
                &state.history,
                state.window.len(),
                self.summary_tail,
                self.summary_chars,
            ));
        }

        parts.push(
            "Respond to the user's latest message in character, in the first person, \
             staying true to your persona. Keep the conversation engaging.\n\
             Keep responses under 50 words."
                .to_string(),
        );
        parts.push(format!(
            "Current conversation length: {} messages",
            state.history.len()
        ));

        parts.join("\n\n")
    }
}

impl Default for PersonalityStage {
    fn default() -> Self {
        Self::from_config(&WindowConfig::default())
    }
}

/// One-line note telling the persona that older turns were left out.
///
/// Plain concatenation of the last `tail` turns, cut at `cap` characters.
pub fn summary_line(history: &[Turn], window_len: usize, tail: usize, cap: usize) -> String {
    let recent = history[history.len().saturating_sub(tail)..]
        .iter()
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join(" | ");
    let topics: String = recent.chars().take(cap).collect();

    format!(
        "[Previous context summary: This is message {window_len} of a {} message conversation. Recent topics: {topics}...]",
        history.len()
    )
}

#[async_trait]
impl Stage for PersonalityStage {
    fn name(&self) -> &'static str {
        "personality"
    }

    async fn run(&self, ctx: &StageContext, state: &mut TurnState) -> Result<()> {
        let mut turns = Vec::with_capacity(state.window.len() + 1);
        turns.push(Turn::system(self.system_instruction(state)));
        turns.extend(state.window.iter().cloned());

        let reply = ctx.complete_text(turns).await?;
        state.working.push(Turn::assistant(reply));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, context, state_with};
    use charmline_core::message::Role;
    use std::sync::Arc;

    #[test]
    fn summary_line_format() {
        let history = vec![
            Turn::user("one"),
            Turn::assistant("two"),
            Turn::user("three"),
        ];
        assert_eq!(
            summary_line(&history, 2, 5, 100),
            "[Previous context summary: This is message 2 of a 3 message conversation. Recent topics: one | two | three...]"
        );
    }

    #[test]
    fn summary_line_caps_topics() {
        let history: Vec<Turn> = (0..8).map(|_| Turn::user("z".repeat(60))).collect();
        let line = summary_line(&history, 1, 5, 100);
        let topics = line
            .split("Recent topics: ")
            .nth(1)
            .unwrap()
            .trim_end_matches("...]");
        assert_eq!(topics.chars().count(), 100);
    }

    #[test]
    fn instruction_has_summary_only_when_truncated() {
        let stage = PersonalityStage::default();

        let state = state_with(vec![Turn::user("hi"), Turn::assistant("hey")], "hello", vec![]);
        let text = stage.system_instruction(&state);
        assert!(text.contains("Playful barista."));
        assert!(text.contains("under 50 words"));
        assert!(text.contains("Current conversation length: 3 messages"));
        assert!(!text.contains("Previous context summary"));

        let stored: Vec<Turn> = (0..30).map(|i| Turn::user(format!("m{i}"))).collect();
        let state = state_with(stored, "latest", vec![]);
        assert!(state.truncated);
        let text = stage.system_instruction(&state);
        assert!(text.contains(
            "[Previous context summary: This is message 20 of a 31 message conversation."
        ));
        assert!(text.contains("m28 | m29 | latest..."));
    }

    #[tokio::test]
    async fn appends_one_reply_from_one_call() {
        let provider = Arc::new(ScriptedProvider::texts(&["Hey stranger."]));
        let ctx = context(provider.clone());
        let mut state = state_with(vec![], "hello", vec![]);

        PersonalityStage::default().run(&ctx, &mut state).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(state.working.len(), 2);
        assert_eq!(state.reply().unwrap().content, "Hey stranger.");

        let request = &provider.requests()[0];
        assert_eq!(request.turns[0].role, Role::System);
        assert_eq!(request.turns[1].content, "hello");
    }

    #[tokio::test]
    async fn backend_failure_is_fatal() {
        let provider = Arc::new(ScriptedProvider::unavailable());
        let ctx = context(provider.clone());
        let mut state = state_with(vec![], "hello", vec![]);

        let err = PersonalityStage::default()
            .run(&ctx, &mut state)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), charmline_core::ErrorKind::BackendUnavailable);
        assert!(state.reply().is_none());
    }
}
