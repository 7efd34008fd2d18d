use super::impl_object;
use crate::ports::{PortRange, Protocol};
use crate::{Meta, ResourceIdentifier, ServiceRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-protocol port ranges a single service projects onto an address group.
pub type ProtocolPorts = BTreeMap<Protocol, Vec<PortRange>>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePortsRef {
    pub service: ServiceRef,
    #[serde(default)]
    pub ports: ProtocolPorts,
}

/// Derived index of which service ports are projected onto an address group.
///
/// Keyed by the owning address group's identifier. Entries are kept sorted
/// by service key so rebuilds are byte-stable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressGroupPortMapping {
    pub id: ResourceIdentifier,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub access_ports: Vec<ServicePortsRef>,
}

impl AddressGroupPortMapping {
    pub fn new(id: ResourceIdentifier) -> Self {
        Self {
            id,
            meta: Meta::default(),
            access_ports: Vec::new(),
        }
    }

    pub fn ports_for(&self, service: &ServiceRef) -> Option<&ProtocolPorts> {
        self.access_ports
            .iter()
            .find(|entry| entry.service == *service)
            .map(|entry| &entry.ports)
    }

    /// Replaces the service's projection, keeping entries ordered.
    pub fn set_ports(&mut self, service: ServiceRef, ports: ProtocolPorts) {
        match self
            .access_ports
            .iter_mut()
            .find(|entry| entry.service == service)
        {
            Some(entry) => entry.ports = ports,
            None => {
                self.access_ports.push(ServicePortsRef { service, ports });
                self.access_ports.sort_by_key(|entry| entry.service.key());
            }
        }
    }

    pub fn remove_service(&mut self, service: &ServiceRef) {
        self.access_ports.retain(|entry| entry.service != *service);
    }

    pub fn is_empty(&self) -> bool {
        self.access_ports.is_empty()
    }
}

impl_object!(AddressGroupPortMapping, "AddressGroupPortMapping");
