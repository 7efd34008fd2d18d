use super::impl_object;
use crate::{Meta, ResourceIdentifier, ServiceRef};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAliasSpec {
    pub service_ref: ServiceRef,
}

/// A stable name for a service, used by `RuleS2S` references.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAlias {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: ServiceAliasSpec,
}

impl ServiceAlias {
    pub fn new(id: ResourceIdentifier, spec: ServiceAliasSpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
        }
    }

    /// The referenced service, with the namespace defaulted to the alias's
    /// own when the reference leaves it blank.
    pub fn effective_service_ref(&self) -> ServiceRef {
        if self.spec.service_ref.namespace().is_empty() {
            ServiceRef::new(self.id.namespace.clone(), self.spec.service_ref.name())
        } else {
            self.spec.service_ref.clone()
        }
    }
}

impl_object!(ServiceAlias, "ServiceAlias");
