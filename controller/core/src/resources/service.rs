use super::impl_object;
use crate::ports::Protocol;
use crate::{AddressGroupRef, Meta, ResourceIdentifier};
use serde::{Deserialize, Serialize};

/// One exposed port (or range list) of a service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressPort {
    pub protocol: Protocol,
    /// Port specification string, e.g. `"80"` or `"80,8080-8090"`.
    pub port: String,
    #[serde(default)]
    pub description: String,
}

impl IngressPort {
    pub fn new(protocol: Protocol, port: impl Into<String>) -> Self {
        Self {
            protocol,
            port: port.into(),
            description: String::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ingress_ports: Vec<IngressPort>,
    /// Address groups attached directly by the user. Must not intersect the
    /// groups attached via `AddressGroupBinding`.
    #[serde(default)]
    pub address_groups: Vec<AddressGroupRef>,
}

/// A user-declared service with ingress ports and address-group attachments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: ServiceSpec,
    /// Spec groups plus every group attached via a binding. Maintained by
    /// the derivation engine; ignored on user input.
    #[serde(default)]
    pub aggregated_address_groups: Vec<AddressGroupRef>,
}

impl Service {
    pub fn new(id: ResourceIdentifier, spec: ServiceSpec) -> Self {
        Self {
            id,
            meta: Meta::default(),
            spec,
            aggregated_address_groups: Vec::new(),
        }
    }
}

impl_object!(Service, "Service");
