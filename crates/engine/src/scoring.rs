//! Scoring stage: rates the user's latest message and decides the reward
//! gate from the rolling average.

use crate::stage::{Stage, StageContext};
use crate::state::TurnState;
use async_trait::async_trait;
use charmline_core::error::{Error, Result};
use charmline_core::message::Turn;
use tracing::{debug, warn};

/// Rounded mean of all samples, ties rounding up. 0 for no samples.
pub fn rounded_mean(samples: &[u32]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let n = samples.len() as u64;
    let sum: u64 = samples.iter().map(|&s| u64::from(s)).sum();
    ((2 * sum + n) / (2 * n)) as u32
}

/// Parse a bare integer score in 1..=100.
pub fn parse_score(text: &str) -> Result<u32> {
    let trimmed = text.trim();
    let score: u32 = trimmed
        .parse()
        .map_err(|_| Error::InvalidScore(format!("expected an integer, got '{trimmed}'")))?;
    if !(1..=100).contains(&score) {
        return Err(Error::InvalidScore(format!("{score} is outside 1..=100")));
    }
    Ok(score)
}

/// Scores the turn, then asks for a reward line when the average clears
/// the threshold. At most two completion calls.
#[derive(Debug, Default)]
pub struct ScoringStage;

impl ScoringStage {
    fn rubric(state: &TurnState) -> String {
        format!(
            "You are {}, with the following personality:\n{}\n\n\
             Rate the user's next message on a scale of 1-100 based on how impressed you would be.\n\
             Consider creativity, humor, charm, uniqueness, genuine interest, respectfulness, effort and confidence.\n\
             Return only the numeric score.",
            state.persona_name, state.enhanced_prompt
        )
    }

    fn reward_instruction(state: &TurnState) -> String {
        format!(
            "You are {}, with the following personality:\n{}\n\n\
             TASK: Write a reward message of one sentence at most.\n\
             - Mention you're sending a photo\n\
             - Keep it tasteful\n\
             - Do not leave the response empty",
            state.persona_name, state.enhanced_prompt
        )
    }
}

#[async_trait]
impl Stage for ScoringStage {
    fn name(&self) -> &'static str {
        "scoring"
    }

    async fn run(&self, ctx: &StageContext, state: &mut TurnState) -> Result<()> {
        // Nothing came before the opening message of a new conversation.
        if state.history.len() < 2 {
            debug!("Opening turn; skipping scoring");
            state.turn_score = 0;
            return Ok(());
        }

        // The user turn immediately before the reply.
        let target = state
            .working
            .len()
            .checked_sub(2)
            .and_then(|i| state.working.get(i))
            .ok_or_else(|| Error::Validation("no user message to score".into()))?
            .content
            .clone();

        let raw = ctx
            .complete_text(vec![Turn::system(Self::rubric(state)), Turn::user(target)])
            .await?;
        let score = parse_score(&raw)?;

        state.score_history.push(score);
        state.turn_score = score;
        state.avg_score = rounded_mean(&state.score_history);
        state.gate_met = state.avg_score >= state.threshold;

        debug!(
            score,
            avg = state.avg_score,
            threshold = state.threshold,
            gate = state.gate_met,
            "Scored turn"
        );

        if state.gate_met {
            let line = ctx
                .complete_text(vec![
                    Turn::system(Self::reward_instruction(state)),
                    Turn::user("Write the reward message now."),
                ])
                .await?;
            let line = line.trim();
            if line.is_empty() {
                warn!("Backend returned an empty reward line; sending the reply without it");
            } else {
                state.reward_line = Some(line.to_string());
            }
        }

        Ok(())
    }
}
