//! Stages and the systems they run.
//!
//! A [`System`] is a plain record: an id, ordering metadata, declared
//! component access, an optional run condition, and a callable body. A
//! [`Stage`] keeps its systems sorted by `(order, insertion)` and runs them
//! one at a time, awaiting each async body before starting the next.

use std::fmt;
use std::time::Instant;

use futures::future::LocalBoxFuture;
use keel_ecs::{Component, ComponentTypeId, ResourceMap};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::events::EventBus;
use crate::profiler::Profiler;
use crate::world::SimWorld;

/// Name of a stage in the frame loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageLabel {
    Boot,
    PreUpdate,
    FixedUpdate,
    Update,
    LateUpdate,
    RenderPrep,
    Render,
    PostRender,
    Shutdown,
    Custom(String),
}

impl StageLabel {
    /// The built-in stages in frame order.
    pub const BUILT_IN: [StageLabel; 9] = [
        StageLabel::Boot,
        StageLabel::PreUpdate,
        StageLabel::FixedUpdate,
        StageLabel::Update,
        StageLabel::LateUpdate,
        StageLabel::RenderPrep,
        StageLabel::Render,
        StageLabel::PostRender,
        StageLabel::Shutdown,
    ];

    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Default async policy. Custom stages choose theirs when added.
    pub fn allows_async(&self) -> bool {
        matches!(
            self,
            Self::RenderPrep | Self::Render | Self::PostRender | Self::Shutdown
        )
    }

    pub fn is_built_in(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Boot => "Boot",
            Self::PreUpdate => "PreUpdate",
            Self::FixedUpdate => "FixedUpdate",
            Self::Update => "Update",
            Self::LateUpdate => "LateUpdate",
            Self::RenderPrep => "RenderPrep",
            Self::Render => "Render",
            Self::PostRender => "PostRender",
            Self::Shutdown => "Shutdown",
            Self::Custom(name) => name.as_str(),
        }
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a system body can touch while it runs.
pub struct SystemContext<'a, W: SimWorld> {
    pub world: &'a mut W,
    /// `fixed_delta` inside `FixedUpdate`, the real frame delta elsewhere.
    pub delta_time: f64,
    /// The running stage's buffer, flushed after the stage's last system.
    pub commands: &'a mut W::Commands,
    pub events: Option<&'a mut (dyn EventBus + 'static)>,
}

impl<W: SimWorld> SystemContext<'_, W> {
    pub fn resources(&self) -> &ResourceMap {
        self.world.resources()
    }

    pub fn resources_mut(&mut self) -> &mut ResourceMap {
        self.world.resources_mut()
    }

    /// The event bus, if one is installed and has type `T`.
    pub fn events_mut<T: EventBus>(&mut self) -> Option<&mut T> {
        self.events.as_deref_mut()?.downcast_mut::<T>()
    }
}

pub type SystemResult = anyhow::Result<()>;

type RunIf<W> = Box<dyn Fn(&W) -> bool>;
type SyncBody<W> = Box<dyn FnMut(&mut SystemContext<'_, W>) -> SystemResult>;
type AsyncBody<W> = Box<dyn for<'a> FnMut(SystemContext<'a, W>) -> LocalBoxFuture<'a, SystemResult>>;

enum SystemBody<W: SimWorld> {
    Sync(SyncBody<W>),
    Async(AsyncBody<W>),
}

/// A unit of per-frame work.
pub struct System<W: SimWorld> {
    id: String,
    stage: StageLabel,
    order: i32,
    reads: Vec<ComponentTypeId>,
    writes: Vec<ComponentTypeId>,
    run_if: Option<RunIf<W>>,
    body: SystemBody<W>,
    seq: u64,
}

impl<W: SimWorld> System<W> {
    pub fn new<F>(id: impl Into<String>, stage: StageLabel, body: F) -> Self
    where
        F: FnMut(&mut SystemContext<'_, W>) -> SystemResult + 'static,
    {
        Self::with_body(id.into(), stage, SystemBody::Sync(Box::new(body)))
    }

    /// A system whose body returns a future. Only stages that allow async
    /// will run it; anywhere else the stage fails when it reaches it.
    pub fn new_async<F>(id: impl Into<String>, stage: StageLabel, body: F) -> Self
    where
        F: for<'a> FnMut(SystemContext<'a, W>) -> LocalBoxFuture<'a, SystemResult> + 'static,
    {
        Self::with_body(id.into(), stage, SystemBody::Async(Box::new(body)))
    }

    fn with_body(id: String, stage: StageLabel, body: SystemBody<W>) -> Self {
        Self {
            id,
            stage,
            order: 0,
            reads: Vec::new(),
            writes: Vec::new(),
            run_if: None,
            body,
            seq: 0,
        }
    }

    /// Lower orders run first. Ties run in registration order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn reads<T: Component>(mut self) -> Self {
        self.reads.push(ComponentTypeId::of::<T>());
        self
    }

    pub fn writes<T: Component>(mut self) -> Self {
        self.writes.push(ComponentTypeId::of::<T>());
        self
    }

    /// Skip the system on frames where `condition` returns false.
    pub fn run_if(mut self, condition: impl Fn(&W) -> bool + 'static) -> Self {
        self.run_if = Some(Box::new(condition));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stage(&self) -> &StageLabel {
        &self.stage
    }

    pub fn order(&self) -> i32 {
        self.order
    }

    pub fn read_set(&self) -> &[ComponentTypeId] {
        &self.reads
    }

    pub fn write_set(&self) -> &[ComponentTypeId] {
        &self.writes
    }

    pub fn is_async(&self) -> bool {
        matches!(self.body, SystemBody::Async(_))
    }

    pub fn has_run_if(&self) -> bool {
        self.run_if.is_some()
    }

    /// Two systems conflict if either writes a component the other reads
    /// or writes.
    pub fn conflicts_with(&self, other: &Self) -> bool {
        let touches = |writes: &[ComponentTypeId], other: &Self| {
            writes
                .iter()
                .any(|ty| other.reads.contains(ty) || other.writes.contains(ty))
        };
        touches(&self.writes, other) || touches(&other.writes, self)
    }
}

impl<W: SimWorld> fmt::Debug for System<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("order", &self.order)
            .field("reads", &self.reads)
            .field("writes", &self.writes)
            .field("run_if", &self.run_if.is_some())
            .field("async", &self.is_async())
            .finish()
    }
}

/// An ordered list of systems with its own async policy and command buffer.
pub struct Stage<W: SimWorld> {
    label: StageLabel,
    allows_async: bool,
    systems: Vec<System<W>>,
    next_seq: u64,
    commands: W::Commands,
}

impl<W: SimWorld> Stage<W> {
    pub fn new(label: StageLabel, allows_async: bool) -> Self {
        Self {
            label,
            allows_async,
            systems: Vec::new(),
            next_seq: 0,
            commands: W::Commands::default(),
        }
    }

    pub fn label(&self) -> &StageLabel {
        &self.label
    }

    pub fn allows_async(&self) -> bool {
        self.allows_async
    }

    /// Systems in execution order.
    pub fn systems(&self) -> &[System<W>] {
        &self.systems
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Commands left over from a run that aborted before its flush.
    pub fn pending_commands(&self) -> &W::Commands {
        &self.commands
    }

    pub fn add_system(&mut self, mut system: System<W>) -> Result<(), ScheduleError> {
        if self.systems.iter().any(|existing| existing.id == system.id) {
            return Err(ScheduleError::DuplicateSystem {
                stage: self.label.clone(),
                system: system.id,
            });
        }
        system.seq = self.next_seq;
        self.next_seq += 1;
        self.systems.push(system);
        self.sort();
        Ok(())
    }

    pub fn remove_system(&mut self, id: &str) -> bool {
        let before = self.systems.len();
        self.systems.retain(|system| system.id != id);
        let removed = self.systems.len() != before;
        if removed {
            self.sort();
        }
        removed
    }

    fn sort(&mut self) {
        self.systems.sort_by_key(|system| (system.order, system.seq));
    }

    /// Run every system once, in order, then flush the stage's commands.
    ///
    /// The first failing system aborts the stage. Systems that already ran
    /// keep their direct effects, and the command buffer is not flushed;
    /// its contents wait for the next run of this stage that completes.
    pub async fn execute(
        &mut self,
        world: &mut W,
        delta_time: f64,
        mut events: Option<&mut (dyn EventBus + 'static)>,
        profiler: &mut Profiler,
    ) -> Result<(), ScheduleError> {
        tracing::debug!(stage = %self.label, systems = self.systems.len(), "executing stage");

        for system in &mut self.systems {
            if let Some(run_if) = &system.run_if {
                if !run_if(&*world) {
                    tracing::trace!(stage = %self.label, system = %system.id, "system skipped");
                    continue;
                }
            }

            tracing::trace!(stage = %self.label, system = %system.id, "running system");
            let started = Instant::now();
            let result = match &mut system.body {
                SystemBody::Sync(body) => {
                    let mut ctx = SystemContext {
                        world: &mut *world,
                        delta_time,
                        commands: &mut self.commands,
                        events: events.as_deref_mut(),
                    };
                    body(&mut ctx)
                }
                SystemBody::Async(body) => {
                    if !self.allows_async {
                        tracing::warn!(
                            stage = %self.label,
                            system = %system.id,
                            "async system in synchronous stage; stage aborted"
                        );
                        return Err(ScheduleError::AsyncNotAllowed {
                            stage: self.label.clone(),
                            system: system.id.clone(),
                        });
                    }
                    let ctx = SystemContext {
                        world: &mut *world,
                        delta_time,
                        commands: &mut self.commands,
                        events: events.as_deref_mut(),
                    };
                    body(ctx).await
                }
            };
            if profiler.is_enabled() {
                profiler.record(&format!("system:{}", system.id), started.elapsed());
            }

            if let Err(source) = result {
                tracing::warn!(
                    stage = %self.label,
                    system = %system.id,
                    error = %source,
                    "system failed; stage aborted"
                );
                return Err(ScheduleError::System {
                    stage: self.label.clone(),
                    system: system.id.clone(),
                    source,
                });
            }
        }

        world.flush(&mut self.commands);
        Ok(())
    }
}

impl<W: SimWorld> fmt::Debug for Stage<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("label", &self.label)
            .field("allows_async", &self.allows_async)
            .field("systems", &self.systems)
            .finish()
    }
}
