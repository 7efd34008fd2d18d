use super::impl_object;
use crate::{AddressGroupRef, Meta, NetworkRef, ResourceIdentifier};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    pub cidr: String,
}

/// A single CIDR that can be attached to an address group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: NetworkSpec,
    /// Set while a `NetworkBinding` references this network. Maintained by
    /// the derivation engine.
    #[serde(default)]
    pub is_bound: bool,
}

impl Network {
    pub fn new(id: ResourceIdentifier, cidr: impl Into<String>) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec: NetworkSpec { cidr: cidr.into() },
            is_bound: false,
        }
    }
}

impl_object!(Network, "Network");

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBindingSpec {
    pub network_ref: NetworkRef,
    pub address_group_ref: AddressGroupRef,
}

/// Attaches a network to an address group within one namespace.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkBinding {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: NetworkBindingSpec,
}

impl NetworkBinding {
    pub fn new(id: ResourceIdentifier, spec: NetworkBindingSpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
        }
    }
}

impl_object!(NetworkBinding, "NetworkBinding");
