//! netrec-runtime
//!
//! Run orchestrator. Wires the snapshot store, resolver, comparator,
//! result cache, controller and audit log into one reconciliation run:
//!
//! 1. Sweep expired approvals.
//! 2. Fan out one worker per (entity kind, device), bounded by
//!    `engine.concurrency`. Each worker resolves, loads truth, compares and
//!    hands actionable diffs to the controller.
//! 3. A device whose telemetry or inventory read fails is reported as
//!    unresolved; the other devices carry on.
//! 4. Audit every outcome, then build the report.

mod error;
mod orchestrator;
mod settings;
mod worker;

pub use error::RunError;
pub use orchestrator::Orchestrator;
pub use settings::RunSettings;
pub use worker::{RESOLVE_TOOL, COMPARE_TOOL};
