use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::ports;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupPortMapping, ProtocolPorts, Service,
    ServiceAlias,
};
use netguard_controller_core::{ConflictKind, Error, Object, ResourceIdentifier};
use netguard_controller_derivation::port_mapping;
use netguard_controller_store::{Reader, Scope};
use std::collections::BTreeSet;

pub struct ServiceValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> ServiceValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    pub async fn validate_references(&self, service: &Service) -> Result<(), Error> {
        for group in &service.spec.address_groups {
            kernel::ensure_exists::<AddressGroup, R>(self.reader, group.id()).await?;
        }
        Ok(())
    }

    fn validate_spec_groups(&self, service: &Service) -> Result<(), Error> {
        let mut seen = BTreeSet::new();
        for group in &service.spec.address_groups {
            if !seen.insert(group.key()) {
                return Err(Error::validation(format!(
                    "address group {} listed more than once in spec",
                    group
                )));
            }
        }
        Ok(())
    }

    fn validate_ingress_ports(&self, service: &Service) -> Result<(), Error> {
        let mut by_protocol = ProtocolPorts::new();
        for ingress in &service.spec.ingress_ports {
            let ranges = ports::parse_ranges(&ingress.port).map_err(|err| {
                Error::validation(format!("ingress port {:?}: {}", ingress.port, err))
            })?;
            by_protocol
                .entry(ingress.protocol)
                .or_insert_with(Vec::new)
                .extend(ranges);
        }
        for (protocol, ranges) in &by_protocol {
            ports::check_disjoint(ranges, *protocol)
                .map_err(|err| Error::validation(err.to_string()))?;
        }
        Ok(())
    }

    async fn bindings_of(&self, service: &Service) -> Result<Vec<AddressGroupBinding>, Error> {
        let bindings: Vec<AddressGroupBinding> =
            kernel::list_scoped(self.reader, &Scope::namespace(service.namespace())).await?;
        Ok(bindings
            .into_iter()
            .filter(|binding| binding.effective_service_ref().id() == &service.id)
            .collect())
    }

    /// Spec groups must not repeat an attachment that already exists as a
    /// binding.
    async fn validate_no_binding_collisions(&self, service: &Service) -> Result<(), Error> {
        for binding in self.bindings_of(service).await? {
            if service
                .spec
                .address_groups
                .contains(&binding.spec.address_group_ref)
            {
                return Err(Error::Conflict {
                    kind: Service::KIND,
                    key: service.key(),
                    conflict: ConflictKind::DuplicateBinding,
                    details: format!(
                        "address group {} is already attached via binding {}",
                        binding.spec.address_group_ref, binding.id
                    ),
                    affected: vec![binding.key()],
                });
            }
        }
        Ok(())
    }

    /// Every group this service projects onto must stay disjoint from the
    /// other services already projected there, per protocol. Covers both
    /// spec attachments and bindings pinning the service elsewhere.
    async fn validate_port_overlaps(&self, service: &Service) -> Result<(), Error> {
        let mut groups: BTreeSet<ResourceIdentifier> = service
            .spec
            .address_groups
            .iter()
            .map(|group| group.id().clone())
            .collect();
        for binding in self.bindings_of(service).await? {
            groups.insert(binding.spec.address_group_ref.id().clone());
        }

        for group in &groups {
            let mapping =
                kernel::check_entity_exists::<AddressGroupPortMapping, R>(self.reader, group)
                    .await?;
            if let Some(mapping) = mapping {
                port_mapping::check_overlaps(service, &mapping)?;
            }
        }
        Ok(())
    }

    async fn validate_invariants(&self, service: &Service) -> Result<(), Error> {
        self.validate_spec_groups(service)?;
        self.validate_no_binding_collisions(service).await?;
        self.validate_ingress_ports(service)?;
        self.validate_port_overlaps(service).await
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<Service> for ServiceValidator<'a, R> {
    async fn validate_for_creation(&self, service: &Service) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<Service, R>(self.reader, &service.id).await?;
        kernel::ensure_namespaced(service)?;
        self.validate_references(service).await?;
        self.validate_invariants(service).await
    }

    async fn validate_for_update(&self, _old: &Service, new: &Service) -> Result<(), Error> {
        self.validate_references(new).await?;
        self.validate_invariants(new).await
    }

    async fn validate_for_post_commit(&self, service: &Service) -> Result<(), Error> {
        kernel::ensure_namespaced(service)?;
        self.validate_references(service).await?;
        self.validate_invariants(service).await
    }

    async fn check_dependencies(&self, id: &ResourceIdentifier) -> Result<(), Error> {
        let aliases: Vec<ServiceAlias> =
            kernel::list_scoped(self.reader, &Scope::namespace(id.namespace.clone())).await?;
        if aliases
            .iter()
            .any(|alias| alias.effective_service_ref().id() == id)
        {
            return Err(Error::DependencyExists {
                kind: Service::KIND,
                key: id.key(),
                blocking_kind: ServiceAlias::KIND,
            });
        }

        if let Some(service) =
            kernel::check_entity_exists::<Service, R>(self.reader, id).await?
        {
            if !service.aggregated_address_groups.is_empty() {
                return Err(Error::DependencyExists {
                    kind: Service::KIND,
                    key: id.key(),
                    blocking_kind: AddressGroup::KIND,
                });
            }
        }

        Ok(())
    }
}
