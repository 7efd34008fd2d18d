use super::impl_object;
use crate::{AddressGroupRef, Meta, ResourceIdentifier, ServiceRef};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroupBindingPolicySpec {
    pub service_ref: ServiceRef,
    pub address_group_ref: AddressGroupRef,
}

/// Authorizes a cross-namespace binding.
///
/// Lives in the address group's namespace and names both sides; it is the
/// sole capability granting the crossing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroupBindingPolicy {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: AddressGroupBindingPolicySpec,
}

impl AddressGroupBindingPolicy {
    pub fn new(id: ResourceIdentifier, spec: AddressGroupBindingPolicySpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
        }
    }
}

impl_object!(AddressGroupBindingPolicy, "AddressGroupBindingPolicy");
