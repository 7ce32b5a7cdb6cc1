//! Developer tooling: world inspector and determinism validation.
//!
//! # Invariants
//! - Tools only read; nothing here mutates a World or a Scheduler.

pub mod inspector;
pub mod validator;

pub use inspector::{EntityInfo, WorldInspector, WorldSummary};
pub use validator::{DeterminismReport, DeterminismValidator};

pub fn crate_info() -> &'static str {
    concat!("keel-tools v", env!("CARGO_PKG_VERSION"))
}
