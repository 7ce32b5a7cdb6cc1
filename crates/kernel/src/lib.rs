//! Staged, fixed-timestep frame loop for the keel engine core.
//!
//! A [`Scheduler`] owns a world and nine built-in stages. Every
//! [`Scheduler::step`] runs `Boot` (first step only), `PreUpdate`, zero or
//! more `FixedUpdate` sub-steps, then `Update`, `LateUpdate`, `RenderPrep`,
//! `Render` and `PostRender`.
//!
//! # Invariants
//! - Systems in a stage run one at a time by `(order, insertion)`.
//! - Only `RenderPrep`, `Render`, `PostRender` and `Shutdown` run async
//!   systems. An async system anywhere else fails its stage.
//! - A stage's command buffer is flushed only when every system in it
//!   succeeded.
//! - `FixedUpdate` runs at most `max_catch_up_steps` times per step.
//! - Determinism state lives in resources, never in globals.

pub mod config;
pub mod error;
pub mod events;
pub mod profiler;
pub mod rng;
pub mod scheduler;
pub mod stage;
pub mod time;
pub mod world;

pub use config::SchedulerConfig;
pub use error::ScheduleError;
pub use events::{EventBus, EventQueue};
pub use profiler::{ProfileStats, Profiler};
pub use rng::SeededRng;
pub use scheduler::Scheduler;
pub use stage::{Stage, StageLabel, System, SystemContext, SystemResult};
pub use time::TimeResource;
pub use world::SimWorld;

pub fn crate_info() -> &'static str {
    concat!("keel-kernel v", env!("CARGO_PKG_VERSION"))
}
