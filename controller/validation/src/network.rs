use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{Network, NetworkBinding};
use netguard_controller_core::{Error, Object, ResourceIdentifier};
use netguard_controller_store::{Reader, Scope};
use std::str::FromStr;

pub struct NetworkValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> NetworkValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_cidr(&self, network: &Network) -> Result<(), Error> {
        if ipnet::IpNet::from_str(&network.spec.cidr).is_err() {
            return Err(Error::validation(format!(
                "network {} has invalid CIDR {:?}",
                network.id, network.spec.cidr
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<Network> for NetworkValidator<'a, R> {
    async fn validate_for_creation(&self, network: &Network) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<Network, R>(self.reader, &network.id).await?;
        kernel::ensure_namespaced(network)?;
        self.validate_cidr(network)
    }

    async fn validate_for_update(&self, _old: &Network, new: &Network) -> Result<(), Error> {
        self.validate_cidr(new)
    }

    async fn validate_for_post_commit(&self, network: &Network) -> Result<(), Error> {
        kernel::ensure_namespaced(network)?;
        self.validate_cidr(network)
    }

    async fn check_dependencies(&self, id: &ResourceIdentifier) -> Result<(), Error> {
        let bindings: Vec<NetworkBinding> =
            kernel::list_scoped(self.reader, &Scope::namespace(id.namespace.clone())).await?;
        if bindings
            .iter()
            .any(|binding| binding.spec.network_ref.id() == id)
        {
            return Err(Error::DependencyExists {
                kind: Network::KIND,
                key: id.key(),
                blocking_kind: NetworkBinding::KIND,
            });
        }
        Ok(())
    }
}
