//! netrec-schemas
//!
//! Shared data model for the reconciliation workspace:
//! - observations as written by telemetry producers
//! - resolved entities and source-of-truth records (same key space)
//! - field / entity differences with severity
//!
//! Plus the small cross-cutting helpers every component needs: canonical
//! JSON, an injectable clock, and per-key mutual exclusion.
//!
//! Pure types. No IO.

pub mod canonical;
pub mod clock;
mod kind;
pub mod locks;
mod model;

pub use clock::{Clock, ManualClock, SystemClock};
pub use kind::{EntityKind, NaturalKey};
pub use locks::KeyedLocks;
pub use model::*;
