use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Fixed-step clock state owned by the scheduler.
///
/// Real frame time accumulates in `accumulator` and is drained in
/// `fixed_delta` chunks, at most `max_catch_up_steps` per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeResource {
    pub fixed_delta: f64,
    pub max_catch_up_steps: u32,
    pub accumulator: f64,
    /// Total real time passed to successful `step` calls.
    pub elapsed: f64,
    /// Real delta of the most recent frame.
    pub delta: f64,
    pub frame_count: u64,
    pub fixed_step_count: u64,
}

impl TimeResource {
    pub fn new(fixed_delta: f64, max_catch_up_steps: u32) -> Result<Self, ScheduleError> {
        if !fixed_delta.is_finite() || fixed_delta <= 0.0 {
            return Err(ScheduleError::InvalidFixedDelta(fixed_delta));
        }
        if max_catch_up_steps < 1 {
            return Err(ScheduleError::InvalidMaxCatchUpSteps(max_catch_up_steps));
        }
        Ok(Self {
            fixed_delta,
            max_catch_up_steps,
            accumulator: 0.0,
            elapsed: 0.0,
            delta: 0.0,
            frame_count: 0,
            fixed_step_count: 0,
        })
    }

    /// Fraction of a fixed step left in the accumulator, for render
    /// interpolation between the last two simulation states.
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.fixed_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_fixed_delta() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                TimeResource::new(bad, 4),
                Err(ScheduleError::InvalidFixedDelta(_))
            ));
        }
    }

    #[test]
    fn rejects_zero_catch_up() {
        assert!(matches!(
            TimeResource::new(1.0 / 60.0, 0),
            Err(ScheduleError::InvalidMaxCatchUpSteps(0))
        ));
    }

    #[test]
    fn starts_zeroed() {
        let time = TimeResource::new(0.5, 1).unwrap();
        assert_eq!(time.accumulator, 0.0);
        assert_eq!(time.frame_count, 0);
        assert_eq!(time.alpha(), 0.0);
    }

    #[test]
    fn alpha_is_fraction_of_step() {
        let mut time = TimeResource::new(0.5, 1).unwrap();
        time.accumulator = 0.25;
        assert_eq!(time.alpha(), 0.5);
    }
}
