//! Per-kind validators over a store snapshot.
//!
//! Validators are stateless: each borrows a reader for the duration of one
//! check and never mutates store state. Business failures surface as the
//! typed error taxonomy from the core crate; transient store failures are
//! retried by the kernel and surface as `StoreUnavailable` once the retry
//! budget is exhausted.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod kernel;

#[cfg(test)]
mod testutil;

mod address_group;
mod agag_rule;
mod binding;
mod binding_policy;
mod network;
mod network_binding;
mod port_mapping;
mod rule_s2s;
mod service;
mod service_alias;

pub use self::{
    address_group::AddressGroupValidator,
    agag_rule::IEAgAgRuleValidator,
    binding::AddressGroupBindingValidator,
    binding_policy::AddressGroupBindingPolicyValidator,
    network::NetworkValidator,
    network_binding::NetworkBindingValidator,
    port_mapping::PortMappingValidator,
    rule_s2s::RuleS2SValidator,
    service::ServiceValidator,
    service_alias::ServiceAliasValidator,
};

use async_trait::async_trait;
use netguard_controller_core::{Error, Object, ResourceIdentifier};

/// The canonical validation surface every kind implements.
#[async_trait]
pub trait Validate<T: Object>: Send + Sync {
    /// Duplicate gate, then references, then kind-specific invariants.
    async fn validate_for_creation(&self, obj: &T) -> Result<(), Error>;

    /// Immutability guards, then references, then kind-specific invariants.
    async fn validate_for_update(&self, old: &T, new: &T) -> Result<(), Error>;

    /// Creation checks minus the duplicate gate; runs after the object has
    /// been staged, against the state the batch produced.
    async fn validate_for_post_commit(&self, obj: &T) -> Result<(), Error>;

    /// Enumerates deletion blockers; returns the first as
    /// [`Error::DependencyExists`].
    async fn check_dependencies(&self, id: &ResourceIdentifier) -> Result<(), Error>;
}
