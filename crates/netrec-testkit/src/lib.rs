//! netrec-testkit
//!
//! Deterministic fixtures for reconciliation scenarios: observation and
//! record builders, telemetry sources and inventories that fail on demand,
//! and a `ManualClock`-driven harness that assembles a full run.

mod fixtures;
mod harness;
mod sources;

pub use fixtures::{attrs, interface_obs, interface_record, obs, record, write_inventory_json};
pub use harness::{Harness, HarnessBuilder, START_MS};
pub use sources::{FailingSource, FlakyInventory, UnavailableInventory};
