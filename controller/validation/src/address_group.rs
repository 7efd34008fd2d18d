use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{AddressGroup, AddressGroupBinding, Service};
use netguard_controller_core::{Error, Object, ResourceIdentifier};
use netguard_controller_store::{Reader, Scope};
use std::str::FromStr;

pub struct AddressGroupValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> AddressGroupValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_network_items(&self, group: &AddressGroup) -> Result<(), Error> {
        for item in &group.networks {
            if item.name.is_empty() {
                return Err(Error::validation(format!(
                    "address group {}: network item without a name",
                    group.id
                )));
            }
            if item.kind.is_empty() {
                return Err(Error::validation(format!(
                    "address group {}: network item {} without a kind",
                    group.id, item.name
                )));
            }
            if ipnet::IpNet::from_str(&item.cidr).is_err() {
                return Err(Error::validation(format!(
                    "address group {}: network item {} has invalid CIDR {:?}",
                    group.id, item.name, item.cidr
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<AddressGroup> for AddressGroupValidator<'a, R> {
    async fn validate_for_creation(&self, group: &AddressGroup) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<AddressGroup, R>(self.reader, &group.id).await?;
        kernel::ensure_namespaced(group)?;
        if !group.networks.is_empty() {
            return Err(Error::validation(
                "networks are attached via NetworkBinding and cannot be set directly",
            ));
        }
        Ok(())
    }

    async fn validate_for_update(
        &self,
        _old: &AddressGroup,
        new: &AddressGroup,
    ) -> Result<(), Error> {
        self.validate_network_items(new)
    }

    async fn validate_for_post_commit(&self, group: &AddressGroup) -> Result<(), Error> {
        kernel::ensure_namespaced(group)?;
        self.validate_network_items(group)
    }

    async fn check_dependencies(&self, id: &ResourceIdentifier) -> Result<(), Error> {
        let services: Vec<Service> = kernel::list_scoped(self.reader, &Scope::All).await?;
        if services.iter().any(|service| {
            service
                .spec
                .address_groups
                .iter()
                .any(|group| group.id() == id)
        }) {
            return Err(Error::DependencyExists {
                kind: AddressGroup::KIND,
                key: id.key(),
                blocking_kind: Service::KIND,
            });
        }

        let bindings: Vec<AddressGroupBinding> =
            kernel::list_scoped(self.reader, &Scope::All).await?;
        if bindings
            .iter()
            .any(|binding| binding.spec.address_group_ref.id() == id)
        {
            return Err(Error::DependencyExists {
                kind: AddressGroup::KIND,
                key: id.key(),
                blocking_kind: AddressGroupBinding::KIND,
            });
        }

        Ok(())
    }
}
