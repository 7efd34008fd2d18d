use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{AddressGroup, Network, NetworkBinding};
use netguard_controller_core::{ConflictKind, Error, Object, ResourceIdentifier};
use netguard_controller_store::{Reader, Scope};

pub struct NetworkBindingValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> NetworkBindingValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_fields(&self, binding: &NetworkBinding) -> Result<(), Error> {
        kernel::ensure_namespaced(binding)?;
        for (field, namespace) in [
            ("networkRef", binding.spec.network_ref.namespace()),
            ("addressGroupRef", binding.spec.address_group_ref.namespace()),
        ] {
            if !namespace.is_empty() && namespace != binding.namespace() {
                return Err(Error::validation(format!(
                    "network binding {}: {} must stay within the binding's namespace",
                    binding.id, field
                )));
            }
        }
        Ok(())
    }

    pub async fn validate_references(&self, binding: &NetworkBinding) -> Result<(), Error> {
        kernel::ensure_exists::<Network, R>(self.reader, binding.spec.network_ref.id()).await?;
        kernel::ensure_exists::<AddressGroup, R>(
            self.reader,
            binding.spec.address_group_ref.id(),
        )
        .await?;
        Ok(())
    }

    /// A network carries a single attachment: any other binding already
    /// referencing it blocks this one.
    async fn validate_network_free(&self, binding: &NetworkBinding) -> Result<(), Error> {
        let peers: Vec<NetworkBinding> =
            kernel::list_scoped(self.reader, &Scope::namespace(binding.namespace())).await?;
        for peer in peers {
            if peer.id == binding.id {
                continue;
            }
            if peer.spec.network_ref == binding.spec.network_ref {
                return Err(Error::Conflict {
                    kind: NetworkBinding::KIND,
                    key: binding.key(),
                    conflict: ConflictKind::DuplicateBinding,
                    details: format!(
                        "network {} is already bound by {}",
                        binding.spec.network_ref, peer.id
                    ),
                    affected: vec![peer.key()],
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<NetworkBinding> for NetworkBindingValidator<'a, R> {
    async fn validate_for_creation(&self, binding: &NetworkBinding) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<NetworkBinding, R>(self.reader, &binding.id)
            .await?;
        self.validate_fields(binding)?;
        self.validate_references(binding).await?;
        self.validate_network_free(binding).await
    }

    async fn validate_for_update(
        &self,
        old: &NetworkBinding,
        new: &NetworkBinding,
    ) -> Result<(), Error> {
        // Re-pointing at another group while keeping the network is not a
        // rebinding; it is rejected outright.
        kernel::ensure_field_immutable(
            "addressGroupRef",
            &old.spec.address_group_ref,
            &new.spec.address_group_ref,
        )?;
        self.validate_fields(new)?;
        self.validate_references(new).await?;
        if old.spec.network_ref != new.spec.network_ref {
            self.validate_network_free(new).await?;
        }
        Ok(())
    }

    async fn validate_for_post_commit(&self, binding: &NetworkBinding) -> Result<(), Error> {
        self.validate_fields(binding)?;
        self.validate_references(binding).await?;
        self.validate_network_free(binding).await
    }

    async fn check_dependencies(&self, _id: &ResourceIdentifier) -> Result<(), Error> {
        Ok(())
    }
}
