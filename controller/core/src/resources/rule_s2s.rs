use super::impl_object;
use crate::{Meta, ResourceIdentifier, ServiceAliasRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of the traffic a rule governs, from the local service's view.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Traffic {
    #[default]
    #[serde(rename = "INGRESS")]
    Ingress,
    #[serde(rename = "EGRESS")]
    Egress,
}

impl fmt::Display for Traffic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Traffic::Ingress => f.write_str("ingress"),
            Traffic::Egress => f.write_str("egress"),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleS2SSpec {
    #[serde(default)]
    pub traffic: Traffic,
    /// Alias of the service on the rule's own side; must live in the rule's
    /// namespace.
    pub service_local_ref: ServiceAliasRef,
    /// Alias of the peer service.
    pub service_ref: ServiceAliasRef,
    #[serde(default)]
    pub trace: bool,
}

/// High-level rule between two service aliases.
///
/// Expands into zero or more `IEAgAgRule`s over the cartesian product of the
/// two services' aggregated address groups. The whole spec is immutable once
/// the rule is Ready.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleS2S {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: RuleS2SSpec,
}

impl RuleS2S {
    pub fn new(id: ResourceIdentifier, spec: RuleS2SSpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
        }
    }

    /// Local alias with the namespace defaulted to the rule's own.
    pub fn local_alias_ref(&self) -> ServiceAliasRef {
        if self.spec.service_local_ref.namespace().is_empty() {
            ServiceAliasRef::new(self.id.namespace.clone(), self.spec.service_local_ref.name())
        } else {
            self.spec.service_local_ref.clone()
        }
    }

    /// Target alias with the namespace defaulted to the rule's own.
    pub fn target_alias_ref(&self) -> ServiceAliasRef {
        if self.spec.service_ref.namespace().is_empty() {
            ServiceAliasRef::new(self.id.namespace.clone(), self.spec.service_ref.name())
        } else {
            self.spec.service_ref.clone()
        }
    }
}

impl_object!(RuleS2S, "RuleS2S");
