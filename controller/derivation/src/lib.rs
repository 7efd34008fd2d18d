//! Derived-state computation.
//!
//! After a batch of user mutations is staged, the [`engine::DerivationEngine`]
//! rebuilds the derived resources reachable from the touched identifiers:
//! aggregated address groups on services, per-AG port mappings, and the
//! `IEAgAgRule` set implied by the `RuleS2S` graph. Rebuilds are pure and
//! idempotent; running the engine twice over committed state is a no-op.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod port_mapping;

pub use self::engine::{DerivationEngine, Touched};
