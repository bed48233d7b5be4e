//! Pipeline executor: runs stages strictly in order over one turn state.

use crate::personality::PersonalityStage;
use crate::scoring::ScoringStage;
use crate::stage::{Stage, StageContext};
use crate::state::TurnState;
use charmline_config::WindowConfig;
use charmline_core::error::Result;
use tracing::debug;

/// An ordered list of stages. The first error aborts the run.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Personality, then scoring.
    pub fn standard(window: &WindowConfig) -> Self {
        Self::new(vec![
            Box::new(PersonalityStage::from_config(window)),
            Box::new(ScoringStage),
        ])
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, ctx: &StageContext, state: &mut TurnState) -> Result<()> {
        for stage in &self.stages {
            debug!(stage = stage.name(), "Running stage");
            stage.run(ctx, state).await?;
        }
        Ok(())
    }
}
