//! Shared identity types for the keel engine core.
//!
//! # Invariants
//! - `EntityId` equality includes the generation; a recycled slot never
//!   compares equal to its previous occupant.
//! - `Symbol` identity is allocated once per `Symbol::new` call.

mod types;

pub use types::{EntityId, Symbol};
