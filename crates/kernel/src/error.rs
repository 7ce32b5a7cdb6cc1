use keel_ecs::ResourceError;
use thiserror::Error;

use crate::stage::StageLabel;

/// Errors raised while configuring or stepping a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("fixed delta must be finite and greater than zero, got {0}")]
    InvalidFixedDelta(f64),

    #[error("max catch-up steps must be at least 1, got {0}")]
    InvalidMaxCatchUpSteps(u32),

    #[error("delta time must be finite and non-negative, got {0}")]
    InvalidDeltaTime(f64),

    #[error("unknown stage `{0}`")]
    UnknownStage(StageLabel),

    #[error("stage `{0}` already exists")]
    DuplicateStage(StageLabel),

    #[error("cannot add stage `{0}` after the scheduler has started stepping")]
    StagesLocked(StageLabel),

    #[error("system `{system}` already registered in stage `{stage}`")]
    DuplicateSystem { stage: StageLabel, system: String },

    #[error("async system `{system}` is not allowed in synchronous stage `{stage}`")]
    AsyncNotAllowed { stage: StageLabel, system: String },

    #[error("system `{system}` failed in stage `{stage}`")]
    System {
        stage: StageLabel,
        system: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}
