//! Frame loop driver.
//!
//! Each [`Scheduler::step`] runs, in order:
//!
//! 1. `Boot`, until it has completed once without error.
//! 2. `PreUpdate`.
//! 3. `FixedUpdate`, once per whole `fixed_delta` in the accumulator, capped
//!    at `max_catch_up_steps`. Time left over past the cap is dropped.
//! 4. `Update`, `LateUpdate`, `RenderPrep`, `Render`, `PostRender`.
//!
//! Custom stages are never part of a step; drive them with
//! [`Scheduler::run_stage`].

use std::fmt;
use std::time::Instant;

use crate::config::SchedulerConfig;
use crate::error::ScheduleError;
use crate::events::EventBus;
use crate::profiler::Profiler;
use crate::stage::{Stage, StageLabel, System};
use crate::time::TimeResource;
use crate::world::SimWorld;

const FRAME_STAGES: [StageLabel; 5] = [
    StageLabel::Update,
    StageLabel::LateUpdate,
    StageLabel::RenderPrep,
    StageLabel::Render,
    StageLabel::PostRender,
];

/// Owns a world, its stages, and the fixed-step clock.
pub struct Scheduler<W: SimWorld> {
    world: W,
    stages: Vec<Stage<W>>,
    time: TimeResource,
    event_bus: Option<Box<dyn EventBus>>,
    profiler: Profiler,
    booted: bool,
    started: bool,
    running: bool,
    paused: bool,
}

impl<W: SimWorld> Scheduler<W> {
    /// A running scheduler with the nine built-in stages.
    pub fn new(world: W, time: TimeResource) -> Self {
        let stages = StageLabel::BUILT_IN
            .iter()
            .map(|label| Stage::new(label.clone(), label.allows_async()))
            .collect();
        Self {
            world,
            stages,
            time,
            event_bus: None,
            profiler: Profiler::new(),
            booted: false,
            started: false,
            running: true,
            paused: false,
        }
    }

    pub fn from_config(world: W, config: &SchedulerConfig) -> Result<Self, ScheduleError> {
        let mut scheduler = Self::new(world, config.time()?);
        scheduler.profiler.set_enabled(config.profiling);
        Ok(scheduler)
    }

    /// Register a custom stage. Only allowed before the first step.
    pub fn add_stage(&mut self, label: StageLabel, allows_async: bool) -> Result<(), ScheduleError> {
        if self.started {
            return Err(ScheduleError::StagesLocked(label));
        }
        if self.stage(&label).is_some() {
            return Err(ScheduleError::DuplicateStage(label));
        }
        tracing::debug!(stage = %label, allows_async, "stage added");
        self.stages.push(Stage::new(label, allows_async));
        Ok(())
    }

    /// Register a system in the stage named by [`System::stage`].
    pub fn add_system(&mut self, system: System<W>) -> Result<(), ScheduleError> {
        let label = system.stage().clone();
        let stage = self
            .stage_mut(&label)
            .ok_or(ScheduleError::UnknownStage(label))?;
        stage.add_system(system)
    }

    pub fn remove_system(&mut self, stage: &StageLabel, id: &str) -> Result<bool, ScheduleError> {
        let stage = self
            .stage_mut(stage)
            .ok_or_else(|| ScheduleError::UnknownStage(stage.clone()))?;
        Ok(stage.remove_system(id))
    }

    pub fn stage(&self, label: &StageLabel) -> Option<&Stage<W>> {
        self.stages.iter().find(|stage| stage.label() == label)
    }

    fn stage_mut(&mut self, label: &StageLabel) -> Option<&mut Stage<W>> {
        self.stages.iter_mut().find(|stage| stage.label() == label)
    }

    /// Built-in stages in frame order, then custom stages in the order added.
    pub fn stages(&self) -> impl Iterator<Item = &Stage<W>> + '_ {
        self.stages.iter()
    }

    pub fn time(&self) -> &TimeResource {
        &self.time
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn into_world(self) -> W {
        self.world
    }

    /// Install the bus handed to systems as `ctx.events`. The scheduler never
    /// clears it.
    pub fn set_event_bus(&mut self, bus: impl EventBus) {
        self.event_bus = Some(Box::new(bus));
    }

    pub fn event_bus<T: EventBus>(&self) -> Option<&T> {
        self.event_bus.as_deref()?.downcast_ref()
    }

    pub fn event_bus_mut<T: EventBus>(&mut self) -> Option<&mut T> {
        self.event_bus.as_deref_mut()?.downcast_mut()
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    pub fn profiler_mut(&mut self) -> &mut Profiler {
        &mut self.profiler
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_booted(&self) -> bool {
        self.booted
    }

    /// Advance one frame by `dt` seconds of real time.
    ///
    /// A no-op while paused or after shutdown. On error the frame stops at
    /// the failing stage; the fixed-step accumulator may be partly drained.
    pub async fn step(&mut self, dt: f64) -> Result<(), ScheduleError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(ScheduleError::InvalidDeltaTime(dt));
        }
        if !self.running || self.paused {
            return Ok(());
        }
        self.started = true;
        self.time.delta = dt;
        self.time.elapsed += dt;

        if !self.booted {
            tracing::info!("booting");
            self.run(&StageLabel::Boot, dt).await?;
            self.booted = true;
        }

        self.run(&StageLabel::PreUpdate, dt).await?;

        let fixed_delta = self.time.fixed_delta;
        self.time.accumulator += dt;
        let mut steps = 0;
        while self.time.accumulator >= fixed_delta && steps < self.time.max_catch_up_steps {
            self.run(&StageLabel::FixedUpdate, fixed_delta).await?;
            self.time.accumulator -= fixed_delta;
            self.time.fixed_step_count += 1;
            steps += 1;
        }
        if self.time.accumulator >= fixed_delta {
            tracing::warn!(
                dropped = self.time.accumulator,
                steps,
                "catch-up cap reached, dropping accumulated time"
            );
            self.time.accumulator = 0.0;
        }

        for label in &FRAME_STAGES {
            self.run(label, dt).await?;
        }

        self.time.frame_count += 1;
        Ok(())
    }

    /// Run a single stage once with the last frame's delta.
    pub async fn run_stage(&mut self, label: &StageLabel) -> Result<(), ScheduleError> {
        let delta = self.time.delta;
        self.run(label, delta).await
    }

    /// Run `Shutdown` and stop. Later calls to `step` and `shutdown` do
    /// nothing.
    pub async fn shutdown(&mut self) -> Result<(), ScheduleError> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.paused = false;
        tracing::info!(frames = self.time.frame_count, "shutting down");
        self.run(&StageLabel::Shutdown, 0.0).await
    }

    async fn run(&mut self, label: &StageLabel, delta_time: f64) -> Result<(), ScheduleError> {
        let Some(stage) = self.stages.iter_mut().find(|stage| stage.label() == label) else {
            return Err(ScheduleError::UnknownStage(label.clone()));
        };
        let started = Instant::now();
        let result = stage
            .execute(
                &mut self.world,
                delta_time,
                self.event_bus.as_deref_mut(),
                &mut self.profiler,
            )
            .await;
        if self.profiler.is_enabled() {
            self.profiler
                .record(&format!("stage:{label}"), started.elapsed());
        }
        result
    }
}

impl<W: SimWorld> fmt::Debug for Scheduler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("stages", &self.stages)
            .field("time", &self.time)
            .field("booted", &self.booted)
            .field("running", &self.running)
            .field("paused", &self.paused)
            .finish_non_exhaustive()
    }
}
