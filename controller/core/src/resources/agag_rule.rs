use super::{impl_object, RuleAction, Traffic};
use crate::ports::Protocol;
use crate::{AddressGroupRef, Meta, ResourceIdentifier};
use serde::{Deserialize, Serialize};

/// One port clause of a low-level rule. Specification strings, parsed by the
/// port algebra when validated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub destination: String,
}

impl PortSpec {
    pub fn destination(destination: impl Into<String>) -> Self {
        Self {
            source: None,
            destination: destination.into(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IEAgAgRuleSpec {
    pub transport: Protocol,
    #[serde(default)]
    pub traffic: Traffic,
    pub address_group_local: AddressGroupRef,
    pub address_group: AddressGroupRef,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub action: RuleAction,
    #[serde(default)]
    pub logs: bool,
    #[serde(default)]
    pub priority: i32,
}

/// Low-level ingress/egress rule between two address groups.
///
/// Owned by the derivation engine when generated from a `RuleS2S`; the
/// originating rule's key is recorded in the `derived-from` label. After
/// Ready, transport, traffic, both groups and the action are immutable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IEAgAgRule {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    pub spec: IEAgAgRuleSpec,
}

impl IEAgAgRule {
    /// Label recording the `RuleS2S` a generated rule was derived from.
    pub const DERIVED_FROM_LABEL: &'static str = "netguard.io/derived-from";

    pub fn new(id: ResourceIdentifier, spec: IEAgAgRuleSpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
        }
    }

    pub fn derived_from(&self) -> Option<&str> {
        self.meta
            .labels
            .get(Self::DERIVED_FROM_LABEL)
            .map(String::as_str)
    }
}

impl_object!(IEAgAgRule, "IEAgAgRule");
