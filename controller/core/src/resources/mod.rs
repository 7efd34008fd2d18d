//! The resource model of the control plane.
//!
//! User-owned kinds are created and deleted explicitly; derived kinds
//! (`AddressGroupPortMapping`, `IEAgAgRule`) and derived fields
//! (`Service::aggregated_address_groups`, `AddressGroup::networks`,
//! `Network::is_bound`) are owned by the derivation engine.

mod address_group;
mod agag_rule;
mod binding;
mod binding_policy;
mod network;
mod port_mapping;
mod rule_s2s;
mod service;
mod service_alias;

pub use self::{
    address_group::{AddressGroup, AddressGroupSpec, NetworkItem},
    agag_rule::{IEAgAgRule, IEAgAgRuleSpec, PortSpec},
    binding::{AddressGroupBinding, AddressGroupBindingSpec},
    binding_policy::{AddressGroupBindingPolicy, AddressGroupBindingPolicySpec},
    network::{Network, NetworkBinding, NetworkBindingSpec, NetworkSpec},
    port_mapping::{AddressGroupPortMapping, ProtocolPorts, ServicePortsRef},
    rule_s2s::{RuleS2S, RuleS2SSpec, Traffic},
    service::{IngressPort, Service, ServiceSpec},
    service_alias::{ServiceAlias, ServiceAliasSpec},
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict a low-level rule applies to matched traffic.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleAction {
    #[default]
    #[serde(rename = "accept")]
    Accept,
    #[serde(rename = "drop")]
    Drop,
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Accept => f.write_str("accept"),
            RuleAction::Drop => f.write_str("drop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Protocol;
    use crate::{AddressGroupRef, ResourceIdentifier, ServiceAliasRef};
    use serde_json::json;

    #[test]
    fn service_wire_shape_is_camel_case() {
        let mut service = Service::new(
            ResourceIdentifier::new("ns1", "s"),
            ServiceSpec {
                description: "edge".to_string(),
                ingress_ports: vec![IngressPort::new(Protocol::Tcp, "80")],
                address_groups: vec![AddressGroupRef::new("ns1", "g")],
            },
        );
        service.aggregated_address_groups = vec![AddressGroupRef::new("ns1", "g")];

        assert_eq!(
            serde_json::to_value(&service).unwrap(),
            json!({
                "id": {"name": "s", "namespace": "ns1"},
                "meta": {"generation": 0, "observedGeneration": 0, "resourceVersion": 0},
                "spec": {
                    "description": "edge",
                    "ingressPorts": [{"protocol": "TCP", "port": "80", "description": ""}],
                    "addressGroups": [{"name": "g", "namespace": "ns1"}],
                },
                "aggregatedAddressGroups": [{"name": "g", "namespace": "ns1"}],
            })
        );
    }

    #[test]
    fn rule_enums_use_wire_vocabulary() {
        let rule = RuleS2S::new(
            ResourceIdentifier::new("ns1", "r"),
            RuleS2SSpec {
                traffic: Traffic::Egress,
                service_local_ref: ServiceAliasRef::new("ns1", "a1"),
                service_ref: ServiceAliasRef::new("ns1", "a2"),
                trace: true,
            },
        );
        let value = serde_json::to_value(&rule).unwrap();
        assert_eq!(value["spec"]["traffic"], json!("EGRESS"));

        let parsed: RuleS2S = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, rule);
    }

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(serde_json::to_value(RuleAction::Accept).unwrap(), json!("accept"));
        assert_eq!(serde_json::to_value(RuleAction::Drop).unwrap(), json!("drop"));
    }
}

macro_rules! impl_object {
    ($ty:ty, $kind:literal) => {
        impl crate::Object for $ty {
            const KIND: &'static str = $kind;

            fn id(&self) -> &crate::ResourceIdentifier {
                &self.id
            }

            fn meta(&self) -> &crate::Meta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut crate::Meta {
                &mut self.meta
            }
        }
    };
}

pub(crate) use impl_object;
