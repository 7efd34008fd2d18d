//! Per-address-group port projections.
//!
//! A mapping records, for one address group, which port ranges every
//! attached service projects onto it. Overlap verdicts never depend on the
//! order services were attached: entries are kept sorted by service key and
//! projections are sorted by range.

use netguard_controller_core::ports;
use netguard_controller_core::resources::{AddressGroupPortMapping, ProtocolPorts, Service};
use netguard_controller_core::{ConflictKind, Error, Object, ResourceIdentifier, ServiceRef};

/// Projects a service's ingress ports per protocol.
///
/// Unparseable specs are skipped; the service validator rejects them before
/// they can reach a mapping.
pub fn project_service(service: &Service) -> ProtocolPorts {
    let mut projected = ProtocolPorts::new();
    for ingress in &service.spec.ingress_ports {
        match ports::parse_ranges(&ingress.port) {
            Ok(ranges) => projected
                .entry(ingress.protocol)
                .or_insert_with(Vec::new)
                .extend(ranges),
            Err(error) => {
                tracing::debug!(
                    service = %service.id,
                    port = %ingress.port,
                    %error,
                    "Skipping unparseable ingress port",
                );
            }
        }
    }
    for ranges in projected.values_mut() {
        ranges.sort();
    }
    projected
}

/// Produces a mapping for `address_group` holding just this service.
pub fn create_for(address_group: &ResourceIdentifier, service: &Service) -> AddressGroupPortMapping {
    let mut mapping = AddressGroupPortMapping::new(address_group.clone());
    update_with(&mut mapping, &ServiceRef::from(service.id.clone()), service);
    mapping
}

/// Replaces `service`'s entry with a fresh projection of its current ports.
pub fn update_with(
    mapping: &mut AddressGroupPortMapping,
    service: &ServiceRef,
    current: &Service,
) {
    mapping.set_ports(service.clone(), project_service(current));
}

/// Rejects `service` if its ports overlap any other service's ports in the
/// mapping for the same protocol. The service's own entry is ignored, so the
/// check is valid both for admission and for updates.
pub fn check_overlaps(service: &Service, mapping: &AddressGroupPortMapping) -> Result<(), Error> {
    let own_ref = ServiceRef::from(service.id.clone());
    let own_ports = project_service(service);

    for entry in &mapping.access_ports {
        if entry.service == own_ref {
            continue;
        }
        for (protocol, ranges) in &entry.ports {
            let own_ranges = match own_ports.get(protocol) {
                Some(ranges) => ranges,
                None => continue,
            };
            for own in own_ranges {
                for other in ranges {
                    if own.overlaps(other) {
                        return Err(Error::Conflict {
                            kind: Service::KIND,
                            key: service.key(),
                            conflict: ConflictKind::PortOverlap,
                            details: format!(
                                "{} ports {} of {} and {} of {} overlap in address group {}",
                                protocol,
                                own,
                                service.id,
                                other,
                                entry.service,
                                mapping.id,
                            ),
                            affected: vec![service.key(), entry.service.key()],
                        });
                    }
                }
            }
        }
    }

    Ok(())
}

/// Internal consistency of a mapping: across any two distinct services,
/// ranges of the same protocol are disjoint.
pub fn check_internal(mapping: &AddressGroupPortMapping) -> Result<(), Error> {
    for (i, a) in mapping.access_ports.iter().enumerate() {
        for b in &mapping.access_ports[i + 1..] {
            for (protocol, a_ranges) in &a.ports {
                let b_ranges = match b.ports.get(protocol) {
                    Some(ranges) => ranges,
                    None => continue,
                };
                for ra in a_ranges {
                    for rb in b_ranges {
                        if ra.overlaps(rb) {
                            return Err(Error::Conflict {
                                kind: AddressGroupPortMapping::KIND,
                                key: mapping.key(),
                                conflict: ConflictKind::PortOverlap,
                                details: format!(
                                    "{} ports {} of {} and {} of {} overlap",
                                    protocol, ra, a.service, rb, b.service,
                                ),
                                affected: vec![a.service.key(), b.service.key()],
                            });
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
