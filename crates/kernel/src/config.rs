use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::time::TimeResource;

/// Scheduler construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Simulation step in seconds.
    pub fixed_delta: f64,
    /// Upper bound on `FixedUpdate` runs per frame.
    pub max_catch_up_steps: u32,
    /// Record stage and system timings.
    pub profiling: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fixed_delta: 1.0 / 60.0,
            max_catch_up_steps: 5,
            profiling: false,
        }
    }
}

impl SchedulerConfig {
    pub fn time(&self) -> Result<TimeResource, ScheduleError> {
        TimeResource::new(self.fixed_delta, self.max_catch_up_steps)
    }
}
