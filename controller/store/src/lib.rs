//! Store contracts the control plane is written against.
//!
//! A `Registry` hands out consistent-snapshot readers and transactional
//! writers. Writers read their own staged state, which post-commit
//! validation depends on. The only bundled implementation is the in-memory
//! registry in [`mem`]; production backends implement the same traits.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
pub mod mem;

pub use self::error::StoreError;

use async_trait::async_trait;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping,
    IEAgAgRule, Network, NetworkBinding, RuleS2S, Service, ServiceAlias,
};
use netguard_controller_core::{Object, ResourceIdentifier};
use std::collections::BTreeSet;

/// Restriction applied to a listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    /// Match everything.
    #[default]
    All,
    /// Match any of the given identifiers.
    Ids(BTreeSet<ResourceIdentifier>),
    /// Match everything in any of the given namespaces.
    Namespaces(BTreeSet<String>),
}

impl Scope {
    pub fn ids(ids: impl IntoIterator<Item = ResourceIdentifier>) -> Self {
        Scope::Ids(ids.into_iter().collect())
    }

    pub fn id(id: ResourceIdentifier) -> Self {
        Scope::Ids(BTreeSet::from([id]))
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Scope::Namespaces(BTreeSet::from([namespace.into()]))
    }

    pub fn matches(&self, id: &ResourceIdentifier) -> bool {
        match self {
            Scope::All => true,
            Scope::Ids(ids) => ids.contains(id),
            Scope::Namespaces(namespaces) => namespaces.contains(&id.namespace),
        }
    }
}

/// Batch write verb.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SyncOp {
    Upsert,
    Delete,
}

/// Read access to one resource kind.
///
/// `get` is the primary-key path; listing is reserved for scoped queries.
#[async_trait]
pub trait ReadCollection<T: Object>: Send + Sync {
    async fn list(&self, scope: &Scope) -> Result<Vec<T>, StoreError>;

    /// Single lookup; a missing resource is the distinguished
    /// [`StoreError::NotFound`].
    async fn get(&self, id: &ResourceIdentifier) -> Result<T, StoreError>;
}

/// Write access to one resource kind; mutations are staged until `commit`.
#[async_trait]
pub trait WriteCollection<T: Object>: Send + Sync {
    async fn sync(&mut self, op: SyncOp, items: Vec<T>) -> Result<(), StoreError>;
}

/// A consistent snapshot over every resource kind.
pub trait Reader:
    ReadCollection<Service>
    + ReadCollection<AddressGroup>
    + ReadCollection<AddressGroupBinding>
    + ReadCollection<AddressGroupBindingPolicy>
    + ReadCollection<AddressGroupPortMapping>
    + ReadCollection<ServiceAlias>
    + ReadCollection<RuleS2S>
    + ReadCollection<IEAgAgRule>
    + ReadCollection<Network>
    + ReadCollection<NetworkBinding>
{
}

impl<R> Reader for R where
    R: ReadCollection<Service>
        + ReadCollection<AddressGroup>
        + ReadCollection<AddressGroupBinding>
        + ReadCollection<AddressGroupBindingPolicy>
        + ReadCollection<AddressGroupPortMapping>
        + ReadCollection<ServiceAlias>
        + ReadCollection<RuleS2S>
        + ReadCollection<IEAgAgRule>
        + ReadCollection<Network>
        + ReadCollection<NetworkBinding>
{
}

/// A transaction: reads observe the staged writes, nothing is visible to
/// other readers until `commit`.
#[async_trait]
pub trait Writer:
    Reader
    + WriteCollection<Service>
    + WriteCollection<AddressGroup>
    + WriteCollection<AddressGroupBinding>
    + WriteCollection<AddressGroupBindingPolicy>
    + WriteCollection<AddressGroupPortMapping>
    + WriteCollection<ServiceAlias>
    + WriteCollection<RuleS2S>
    + WriteCollection<IEAgAgRule>
    + WriteCollection<Network>
    + WriteCollection<NetworkBinding>
{
    /// Atomically publishes the staged writes.
    ///
    /// Fails with [`StoreError::VersionConflict`] when a concurrently
    /// committed transaction touched any of the same resources.
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discards the staged writes.
    async fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Source of readers and writers.
#[async_trait]
pub trait Registry: Send + Sync {
    type Reader: Reader;
    type Writer: Writer;

    async fn reader(&self) -> Result<Self::Reader, StoreError>;
    async fn writer(&self) -> Result<Self::Writer, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_matching() {
        let a = ResourceIdentifier::new("ns1", "a");
        let b = ResourceIdentifier::new("ns2", "b");

        assert!(Scope::All.matches(&a));

        let ids = Scope::id(a.clone());
        assert!(ids.matches(&a));
        assert!(!ids.matches(&b));

        let ns = Scope::namespace("ns2");
        assert!(!ns.matches(&a));
        assert!(ns.matches(&b));
    }
}
