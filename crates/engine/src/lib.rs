//! Conversation orchestration for Charmline.
//!
//! A chat turn flows through:
//!
//! ```text
//! history + new user turn → window → personality → scoring → compose → persist
//! ```
//!
//! The pipeline is a fixed, ordered list of [`Stage`]s over a per-request
//! [`TurnState`]. No conversation state lives in the engine between requests.

pub mod engine;
pub mod personality;
pub mod pipeline;
pub mod scoring;
pub mod stage;
pub mod state;
pub mod token;
pub mod window;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use engine::{ChatEngine, ChatOutcome, ChatRequest, EngineSettings};
pub use personality::PersonalityStage;
pub use pipeline::Pipeline;
pub use scoring::{ScoringStage, parse_score, rounded_mean};
pub use stage::{Stage, StageContext};
pub use state::TurnState;
pub use token::estimate_tokens;
pub use window::{Window, WindowBudget, window};
