//! Context windowing: the newest suffix of a conversation that fits the
//! token budget.
//!
//! Walks the history newest to oldest, charging each turn against the budget
//! after the fixed system overhead and the persona prompt. The result is
//! always a contiguous suffix in oldest-first order, and is never empty for a
//! non-empty history.

use crate::token::estimate_tokens;
use charmline_config::WindowConfig;
use charmline_core::message::Turn;
use tracing::warn;

/// Budget constants for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBudget {
    /// Tokens reserved for instruction scaffolding
    pub system_overhead: usize,
    /// Ceiling on the estimated prompt cost
    pub max_tokens: usize,
    /// Ceiling on the number of turns
    pub max_turns: usize,
}

impl Default for WindowBudget {
    fn default() -> Self {
        Self {
            system_overhead: 1000,
            max_tokens: 8000,
            max_turns: 20,
        }
    }
}

impl From<&WindowConfig> for WindowBudget {
    fn from(config: &WindowConfig) -> Self {
        Self {
            system_overhead: config.system_overhead,
            max_tokens: config.max_tokens,
            max_turns: config.max_turns,
        }
    }
}

/// The windowed slice of a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub turns: Vec<Turn>,
    /// True when older turns were left out
    pub truncated: bool,
    /// Overhead + prompt + kept turns
    pub estimated_tokens: usize,
}

/// Select the newest turns of `history` that fit the budget.
pub fn window(history: &[Turn], prompt: &str, budget: &WindowBudget) -> Window {
    let base = budget.system_overhead + estimate_tokens(prompt);
    let mut cost = base;
    let mut start = history.len();

    for (i, turn) in history.iter().enumerate().rev() {
        let turn_cost = estimate_tokens(&turn.content);
        if cost + turn_cost > budget.max_tokens {
            if start == history.len() {
                warn!(
                    turn_tokens = turn_cost,
                    budget = budget.max_tokens,
                    "Newest turn alone exceeds the context budget; sending it anyway"
                );
                start = i;
            }
            break;
        }
        cost += turn_cost;
        start = i;
    }

    let max_turns = budget.max_turns.max(1);
    if history.len() - start > max_turns {
        start = history.len() - max_turns;
    }

    let turns = history[start..].to_vec();
    let estimated_tokens = base
        + turns
            .iter()
            .map(|t| estimate_tokens(&t.content))
            .sum::<usize>();

    Window {
        truncated: turns.len() < history.len(),
        turns,
        estimated_tokens,
    }
}
