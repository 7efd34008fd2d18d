use super::{impl_object, RuleAction};
use crate::{Meta, ResourceIdentifier};
use serde::{Deserialize, Serialize};

/// A CIDR entry projected onto an address group from a bound `Network`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkItem {
    pub name: String,
    pub cidr: String,
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroupSpec {
    #[serde(default)]
    pub default_action: RuleAction,
    #[serde(default)]
    pub logs: bool,
    #[serde(default)]
    pub trace: bool,
}

/// A named set of CIDRs used as a traffic endpoint in rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroup {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: AddressGroupSpec,
    /// Populated through `NetworkBinding`, never written directly.
    #[serde(default)]
    pub networks: Vec<NetworkItem>,
}

impl AddressGroup {
    pub fn new(id: ResourceIdentifier) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec: AddressGroupSpec::default(),
            networks: Vec::new(),
        }
    }
}

impl_object!(AddressGroup, "AddressGroup");
