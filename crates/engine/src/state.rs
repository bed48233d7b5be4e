//! Per-request turn state shared by the pipeline stages.

use crate::window::{Window, WindowBudget, window};
use charmline_core::message::Turn;
use charmline_core::persona::Persona;

/// The unit of work for one chat turn.
///
/// Built from stored history at request start, mutated only by the pipeline,
/// and dropped once the exchange is persisted.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub persona_name: String,
    /// Computed once from the persona for this request
    pub enhanced_prompt: String,
    pub threshold: u32,

    /// Stored turns followed by the new user turn
    pub history: Vec<Turn>,
    /// Windowed suffix of `history`
    pub window: Vec<Turn>,
    pub truncated: bool,
    pub estimated_tokens: usize,

    /// Window plus the reply once the personality stage has run
    pub working: Vec<Turn>,

    /// Prior samples plus this turn's sample, if scored
    pub score_history: Vec<u32>,
    /// This turn's raw score; 0 when the turn was not scored
    pub turn_score: u32,
    /// Rounded mean of `score_history`
    pub avg_score: u32,
    pub gate_met: bool,
    pub reward_line: Option<String>,
}

impl TurnState {
    pub fn new(
        persona: &Persona,
        stored: Vec<Turn>,
        user_turn: Turn,
        score_history: Vec<u32>,
        budget: &WindowBudget,
    ) -> Self {
        let enhanced_prompt = persona.enhanced_prompt();
        let mut history = stored;
        history.push(user_turn);

        let Window {
            turns,
            truncated,
            estimated_tokens,
        } = window(&history, &enhanced_prompt, budget);

        Self {
            persona_name: persona.name.clone(),
            enhanced_prompt,
            threshold: persona.threshold,
            working: turns.clone(),
            window: turns,
            truncated,
            estimated_tokens,
            history,
            avg_score: crate::scoring::rounded_mean(&score_history),
            score_history,
            turn_score: 0,
            gate_met: false,
            reward_line: None,
        }
    }

    /// The user turn this request appended.
    pub fn user_turn(&self) -> &Turn {
        // `new` always pushes one turn.
        &self.history[self.history.len() - 1]
    }

    /// The persona reply, once produced.
    pub fn reply(&self) -> Option<&Turn> {
        if self.working.len() > self.window.len() {
            self.working.last()
        } else {
            None
        }
    }
}
