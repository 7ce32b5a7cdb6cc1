//! Static checks on a schedule's `FixedUpdate` stage.
//!
//! `FixedUpdate` is the deterministic part of the frame. An async system
//! there is a hard violation. A run condition, or two conflicting systems
//! that share an `order` and are therefore ordered only by registration, is
//! a warning.

use keel_kernel::{Scheduler, SimWorld, StageLabel};
use serde::Serialize;

const VIOLATION_PENALTY: u32 = 25;
const WARNING_PENALTY: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeterminismReport {
    /// `100 - 25 * violations - 10 * warnings`, floored at zero.
    pub score: u32,
    pub warnings: Vec<String>,
    pub violations: Vec<String>,
}

impl DeterminismReport {
    fn new(warnings: Vec<String>, violations: Vec<String>) -> Self {
        let penalty = VIOLATION_PENALTY
            .saturating_mul(violations.len() as u32)
            .saturating_add(WARNING_PENALTY.saturating_mul(warnings.len() as u32));
        Self {
            score: 100u32.saturating_sub(penalty),
            warnings,
            violations,
        }
    }

    pub fn is_deterministic(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct DeterminismValidator;

impl DeterminismValidator {
    pub fn validate<W: SimWorld>(scheduler: &Scheduler<W>) -> DeterminismReport {
        let mut warnings = Vec::new();
        let mut violations = Vec::new();

        let Some(stage) = scheduler.stage(&StageLabel::FixedUpdate) else {
            return DeterminismReport::new(warnings, violations);
        };
        let systems = stage.systems();

        for system in systems {
            if system.is_async() {
                violations.push(format!(
                    "system `{}` in FixedUpdate is asynchronous",
                    system.id()
                ));
            }
            if system.has_run_if() {
                warnings.push(format!(
                    "system `{}` in FixedUpdate is gated by a run condition",
                    system.id()
                ));
            }
        }

        for (i, a) in systems.iter().enumerate() {
            for b in &systems[i + 1..] {
                if a.order() == b.order() && a.conflicts_with(b) {
                    warnings.push(format!(
                        "systems `{}` and `{}` share order {} and conflict; registration order decides",
                        a.id(),
                        b.id(),
                        a.order()
                    ));
                }
            }
        }

        let report = DeterminismReport::new(warnings, violations);
        tracing::debug!(
            score = report.score,
            warnings = report.warnings.len(),
            violations = report.violations.len(),
            "determinism report"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use keel_ecs::World;
    use keel_kernel::{System, TimeResource};

    struct Position;
    struct Velocity;

    fn scheduler() -> Scheduler<World> {
        Scheduler::new(World::new(), TimeResource::new(1.0 / 60.0, 4).unwrap())
    }

    fn noop(id: &str) -> System<World> {
        System::<World>::new(id, StageLabel::FixedUpdate, |_ctx| Ok(()))
    }

    #[test]
    fn clean_schedule_scores_full() {
        let mut scheduler = scheduler();
        scheduler.add_system(noop("physics")).unwrap();
        let report = DeterminismValidator::validate(&scheduler);
        assert_eq!(report.score, 100);
        assert!(report.is_deterministic());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn async_fixed_system_is_violation() {
        let mut scheduler = scheduler();
        scheduler
            .add_system(System::<World>::new_async("net", StageLabel::FixedUpdate, |_ctx| {
                async { Ok(()) }.boxed_local()
            }))
            .unwrap();
        let report = DeterminismValidator::validate(&scheduler);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.score, 75);
        assert!(!report.is_deterministic());
    }

    #[test]
    fn async_outside_fixed_update_is_ignored() {
        let mut scheduler = scheduler();
        scheduler
            .add_system(System::<World>::new_async("present", StageLabel::Render, |_ctx| {
                async { Ok(()) }.boxed_local()
            }))
            .unwrap();
        assert_eq!(DeterminismValidator::validate(&scheduler).score, 100);
    }

    #[test]
    fn run_if_and_order_conflicts_warn() {
        let mut scheduler = scheduler();
        scheduler
            .add_system(noop("gated").run_if(|_world: &World| true).with_order(-5))
            .unwrap();
        scheduler
            .add_system(noop("physics").reads::<Position>().writes::<Velocity>())
            .unwrap();
        scheduler
            .add_system(noop("movement").reads::<Velocity>().writes::<Position>())
            .unwrap();
        scheduler
            .add_system(
                noop("late")
                    .reads::<Velocity>()
                    .writes::<Position>()
                    .with_order(1),
            )
            .unwrap();

        let report = DeterminismValidator::validate(&scheduler);
        assert_eq!(report.warnings.len(), 2);
        assert!(report.violations.is_empty());
        assert_eq!(report.score, 80);
    }

    #[test]
    fn score_floors_at_zero() {
        let mut scheduler = scheduler();
        for i in 0..5 {
            scheduler
                .add_system(System::<World>::new_async(format!("a{i}"), StageLabel::FixedUpdate, |_ctx| {
                    async { Ok(()) }.boxed_local()
                }))
                .unwrap();
        }
        assert_eq!(DeterminismValidator::validate(&scheduler).score, 0);
    }

    #[test]
    fn report_serializes() {
        let report = DeterminismReport::new(vec!["w".into()], Vec::new());
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"score\":90"));
    }
}
