//! netrec-compare
//!
//! Comparison Engine: joins resolved state against source-of-truth records
//! on the natural key and produces severity-tagged [`EntityDiff`]s.
//!
//! The engine never interprets field semantics. That is the injected
//! [`Comparator`]'s job; the engine aggregates its output and applies the
//! [`AutoCorrectPolicy`].
//!
//! [`EntityDiff`]: netrec_schemas::EntityDiff

mod comparator;
mod engine;
mod policy;
mod rules;

pub use comparator::Comparator;
pub use engine::compare;
pub use policy::{AutoCorrectPolicy, NEVER_AUTO_CORRECT};
pub use rules::{FieldRule, RuleTableComparator};
