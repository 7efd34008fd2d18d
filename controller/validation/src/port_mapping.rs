use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::AddressGroupPortMapping;
use netguard_controller_core::{Error, ResourceIdentifier};
use netguard_controller_derivation::port_mapping;
use netguard_controller_store::Reader;

/// Port mappings are derived; the orchestrator rejects user writes before
/// they ever reach a validator. What remains here is the internal
/// consistency guard the derivation engine's output is held to.
pub struct PortMappingValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> PortMappingValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<AddressGroupPortMapping> for PortMappingValidator<'a, R> {
    async fn validate_for_creation(
        &self,
        mapping: &AddressGroupPortMapping,
    ) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<AddressGroupPortMapping, R>(
            self.reader,
            &mapping.id,
        )
        .await?;
        port_mapping::check_internal(mapping)
    }

    async fn validate_for_update(
        &self,
        _old: &AddressGroupPortMapping,
        new: &AddressGroupPortMapping,
    ) -> Result<(), Error> {
        port_mapping::check_internal(new)
    }

    async fn validate_for_post_commit(
        &self,
        mapping: &AddressGroupPortMapping,
    ) -> Result<(), Error> {
        port_mapping::check_internal(mapping)
    }

    async fn check_dependencies(&self, _id: &ResourceIdentifier) -> Result<(), Error> {
        Ok(())
    }
}
