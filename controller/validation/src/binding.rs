use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping,
    Service,
};
use netguard_controller_core::{ConflictKind, Error, Object, ResourceIdentifier};
use netguard_controller_derivation::port_mapping;
use netguard_controller_store::{Reader, Scope};

pub struct AddressGroupBindingValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> AddressGroupBindingValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_fields(&self, binding: &AddressGroupBinding) -> Result<(), Error> {
        kernel::ensure_namespaced(binding)?;
        if binding.spec.service_ref.name().is_empty() {
            return Err(Error::validation(format!(
                "binding {}: serviceRef.name is required",
                binding.id
            )));
        }
        if binding.spec.address_group_ref.name().is_empty() {
            return Err(Error::validation(format!(
                "binding {}: addressGroupRef.name is required",
                binding.id
            )));
        }
        let service = binding.effective_service_ref();
        if service.namespace() != binding.namespace() {
            return Err(Error::validation(format!(
                "binding {} must live in the namespace of service {}",
                binding.id, service,
            )));
        }
        Ok(())
    }

    pub async fn validate_references(
        &self,
        binding: &AddressGroupBinding,
    ) -> Result<(Service, AddressGroup), Error> {
        let service = kernel::ensure_exists::<Service, R>(
            self.reader,
            binding.effective_service_ref().id(),
        )
        .await?;
        let group = kernel::ensure_exists::<AddressGroup, R>(
            self.reader,
            binding.effective_address_group_ref().id(),
        )
        .await?;
        Ok((service, group))
    }

    /// At most one binding per `(service, address group)` pair. Bindings of
    /// a service live in its namespace, so the scan is namespace-scoped.
    async fn validate_unique(&self, binding: &AddressGroupBinding) -> Result<(), Error> {
        let peers: Vec<AddressGroupBinding> =
            kernel::list_scoped(self.reader, &Scope::namespace(binding.namespace())).await?;
        for peer in peers {
            if peer.id == binding.id {
                continue;
            }
            if peer.effective_service_ref() == binding.effective_service_ref()
                && peer.effective_address_group_ref() == binding.effective_address_group_ref()
            {
                return Err(Error::Conflict {
                    kind: AddressGroupBinding::KIND,
                    key: binding.key(),
                    conflict: ConflictKind::DuplicateBinding,
                    details: format!(
                        "binding {} already attaches service {} to address group {}",
                        peer.id,
                        binding.effective_service_ref(),
                        binding.effective_address_group_ref(),
                    ),
                    affected: vec![peer.key()],
                });
            }
        }
        Ok(())
    }

    fn validate_not_in_spec(
        &self,
        binding: &AddressGroupBinding,
        service: &Service,
    ) -> Result<(), Error> {
        let group = binding.effective_address_group_ref();
        if service.spec.address_groups.contains(&group) {
            return Err(Error::Conflict {
                kind: AddressGroupBinding::KIND,
                key: binding.key(),
                conflict: ConflictKind::DuplicateBinding,
                details: format!(
                    "address group {} is already in the spec of service {}",
                    group, service.id
                ),
                affected: vec![service.key()],
            });
        }
        Ok(())
    }

    /// A binding that crosses namespaces is admissible only when a policy in
    /// the group's namespace names both sides.
    async fn validate_cross_namespace(
        &self,
        binding: &AddressGroupBinding,
    ) -> Result<(), Error> {
        let group = binding.effective_address_group_ref();
        if group.namespace() == binding.namespace() {
            return Ok(());
        }

        let service = binding.effective_service_ref();
        let policies: Vec<AddressGroupBindingPolicy> =
            kernel::list_scoped(self.reader, &Scope::namespace(group.namespace())).await?;
        let authorized = policies.iter().any(|policy| {
            policy.spec.service_ref == service && policy.spec.address_group_ref == group
        });
        if !authorized {
            return Err(Error::Conflict {
                kind: AddressGroupBinding::KIND,
                key: binding.key(),
                conflict: ConflictKind::CrossNamespaceDenied,
                details: format!(
                    "no AddressGroupBindingPolicy in {} authorizes binding service {} to address group {}",
                    group.namespace(),
                    service,
                    group,
                ),
                affected: vec![service.key(), group.key()],
            });
        }
        Ok(())
    }

    /// Simulates the attachment against the group's current mapping.
    async fn validate_mapping(
        &self,
        binding: &AddressGroupBinding,
        service: &Service,
    ) -> Result<(), Error> {
        let group = binding.effective_address_group_ref();
        let mapping = kernel::check_entity_exists::<AddressGroupPortMapping, R>(
            self.reader,
            group.id(),
        )
        .await?;
        if let Some(mapping) = mapping {
            port_mapping::check_overlaps(service, &mapping)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<AddressGroupBinding> for AddressGroupBindingValidator<'a, R> {
    async fn validate_for_creation(&self, binding: &AddressGroupBinding) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<AddressGroupBinding, R>(self.reader, &binding.id)
            .await?;
        self.validate_fields(binding)?;
        let (service, _group) = self.validate_references(binding).await?;
        self.validate_unique(binding).await?;
        self.validate_not_in_spec(binding, &service)?;
        self.validate_cross_namespace(binding).await?;
        self.validate_mapping(binding, &service).await
    }

    async fn validate_for_update(
        &self,
        old: &AddressGroupBinding,
        new: &AddressGroupBinding,
    ) -> Result<(), Error> {
        // Renaming either side would orphan the mapping entry, so both refs
        // are frozen outright, Ready or not.
        kernel::ensure_field_immutable(
            "serviceRef",
            &old.effective_service_ref(),
            &new.effective_service_ref(),
        )?;
        kernel::ensure_field_immutable(
            "addressGroupRef",
            &old.effective_address_group_ref(),
            &new.effective_address_group_ref(),
        )?;
        kernel::ensure_spec_unchanged_when_ready(old, &old.spec, &new.spec)?;

        self.validate_fields(new)?;
        let (service, _group) = self.validate_references(new).await?;
        self.validate_cross_namespace(new).await?;
        self.validate_mapping(new, &service).await
    }

    async fn validate_for_post_commit(&self, binding: &AddressGroupBinding) -> Result<(), Error> {
        self.validate_fields(binding)?;
        let (service, _group) = self.validate_references(binding).await?;
        self.validate_unique(binding).await?;
        self.validate_not_in_spec(binding, &service)?;
        self.validate_cross_namespace(binding).await?;
        self.validate_mapping(binding, &service).await
    }

    async fn check_dependencies(&self, _id: &ResourceIdentifier) -> Result<(), Error> {
        // Deleting a binding only retracts derived state.
        Ok(())
    }
}
