//! The mutation orchestrator of the netguard control plane.
//!
//! Callers propose a [`Batch`] of resource mutations; [`Orchestrator::apply`]
//! validates every item against a transactional store view, stages the
//! writes, recomputes derived state, re-validates the result, stamps Ready
//! conditions and commits. The first failure aborts the whole batch with a
//! typed error and nothing is committed.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod batch;
mod orchestrator;

pub use self::{
    batch::{Batch, Mutation, Resource, ResourceKind, ResourceRef},
    orchestrator::{ApplyError, ApplyReport, Orchestrator},
};
