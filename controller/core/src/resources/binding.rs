use super::impl_object;
use crate::{AddressGroupRef, Meta, ResourceIdentifier, ServiceRef};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroupBindingSpec {
    pub service_ref: ServiceRef,
    pub address_group_ref: AddressGroupRef,
}

/// Attaches a service to an address group.
///
/// Lives in the service's namespace. Crossing into another namespace's
/// address group requires an `AddressGroupBindingPolicy` there.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroupBinding {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: AddressGroupBindingSpec,
}

impl AddressGroupBinding {
    pub fn new(id: ResourceIdentifier, spec: AddressGroupBindingSpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
        }
    }

    /// Referenced service with the namespace defaulted to the binding's own.
    pub fn effective_service_ref(&self) -> ServiceRef {
        if self.spec.service_ref.namespace().is_empty() {
            ServiceRef::new(self.id.namespace.clone(), self.spec.service_ref.name())
        } else {
            self.spec.service_ref.clone()
        }
    }

    /// Referenced group with the namespace defaulted to the binding's own.
    pub fn effective_address_group_ref(&self) -> AddressGroupRef {
        if self.spec.address_group_ref.namespace().is_empty() {
            AddressGroupRef::new(
                self.id.namespace.clone(),
                self.spec.address_group_ref.name(),
            )
        } else {
            self.spec.address_group_ref.clone()
        }
    }
}

impl_object!(AddressGroupBinding, "AddressGroupBinding");
