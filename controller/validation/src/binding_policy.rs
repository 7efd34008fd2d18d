use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, Service,
};
use netguard_controller_core::{ConflictKind, Error, Object, ResourceIdentifier};
use netguard_controller_store::{Reader, Scope};

pub struct AddressGroupBindingPolicyValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> AddressGroupBindingPolicyValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_fields(&self, policy: &AddressGroupBindingPolicy) -> Result<(), Error> {
        kernel::ensure_namespaced(policy)?;
        if policy.spec.service_ref.name().is_empty() {
            return Err(Error::validation(format!(
                "policy {}: serviceRef.name is required",
                policy.id
            )));
        }
        let group = &policy.spec.address_group_ref;
        if !group.namespace().is_empty() && group.namespace() != policy.namespace() {
            return Err(Error::validation(format!(
                "policy {} must live in the namespace of address group {}",
                policy.id, group
            )));
        }
        Ok(())
    }

    pub async fn validate_references(
        &self,
        policy: &AddressGroupBindingPolicy,
    ) -> Result<(), Error> {
        kernel::ensure_exists::<Service, R>(self.reader, policy.spec.service_ref.id()).await?;
        kernel::ensure_exists::<AddressGroup, R>(
            self.reader,
            policy.spec.address_group_ref.id(),
        )
        .await?;
        Ok(())
    }

    async fn validate_unique(&self, policy: &AddressGroupBindingPolicy) -> Result<(), Error> {
        let peers: Vec<AddressGroupBindingPolicy> =
            kernel::list_scoped(self.reader, &Scope::namespace(policy.namespace())).await?;
        for peer in peers {
            if peer.id == policy.id {
                continue;
            }
            if peer.spec.service_ref == policy.spec.service_ref
                && peer.spec.address_group_ref == policy.spec.address_group_ref
            {
                return Err(Error::Conflict {
                    kind: AddressGroupBindingPolicy::KIND,
                    key: policy.key(),
                    conflict: ConflictKind::DuplicatePolicy,
                    details: format!(
                        "policy {} already authorizes service {} for address group {}",
                        peer.id, policy.spec.service_ref, policy.spec.address_group_ref,
                    ),
                    affected: vec![peer.key()],
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<AddressGroupBindingPolicy>
    for AddressGroupBindingPolicyValidator<'a, R>
{
    async fn validate_for_creation(
        &self,
        policy: &AddressGroupBindingPolicy,
    ) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<AddressGroupBindingPolicy, R>(
            self.reader,
            &policy.id,
        )
        .await?;
        self.validate_fields(policy)?;
        self.validate_references(policy).await?;
        self.validate_unique(policy).await
    }

    async fn validate_for_update(
        &self,
        old: &AddressGroupBindingPolicy,
        new: &AddressGroupBindingPolicy,
    ) -> Result<(), Error> {
        kernel::ensure_field_immutable(
            "serviceRef",
            &old.spec.service_ref,
            &new.spec.service_ref,
        )?;
        kernel::ensure_field_immutable(
            "addressGroupRef",
            &old.spec.address_group_ref,
            &new.spec.address_group_ref,
        )?;
        self.validate_fields(new)?;
        self.validate_references(new).await
    }

    async fn validate_for_post_commit(
        &self,
        policy: &AddressGroupBindingPolicy,
    ) -> Result<(), Error> {
        self.validate_fields(policy)?;
        self.validate_references(policy).await?;
        self.validate_unique(policy).await
    }

    /// A policy cannot be withdrawn while a binding still relies on it.
    async fn check_dependencies(&self, id: &ResourceIdentifier) -> Result<(), Error> {
        let Some(policy) = kernel::check_entity_exists::<AddressGroupBindingPolicy, R>(
            self.reader,
            id,
        )
        .await?
        else {
            return Ok(());
        };

        let bindings: Vec<AddressGroupBinding> =
            kernel::list_scoped(self.reader, &Scope::All).await?;
        if bindings.iter().any(|binding| {
            binding.effective_service_ref() == policy.spec.service_ref
                && binding.effective_address_group_ref() == policy.spec.address_group_ref
        }) {
            return Err(Error::DependencyExists {
                kind: AddressGroupBindingPolicy::KIND,
                key: id.key(),
                blocking_kind: AddressGroupBinding::KIND,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, seed};
    use netguard_controller_core::ports::Protocol;
    use netguard_controller_store::Registry;

    #[tokio::test]
    async fn policy_must_live_with_its_group() {
        let registry = seed(|stage| {
            stage.service(testutil::service("ns1", "s", &[(Protocol::Tcp, "80")]));
            stage.group(testutil::group("ns2", "g"));
        })
        .await;
        let reader = registry.reader().await.unwrap();
        let validator = AddressGroupBindingPolicyValidator::new(&reader);

        // Policy placed in the service's namespace instead of the group's.
        let mut misplaced = testutil::policy("ns1", "p", "ns1", "s", "g");
        misplaced.spec.address_group_ref =
            netguard_controller_core::AddressGroupRef::new("ns2", "g");
        let err = validator
            .validate_for_creation(&misplaced)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        validator
            .validate_for_creation(&testutil::policy("ns2", "p", "ns1", "s", "g"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_pair_is_rejected() {
        let registry = seed(|stage| {
            stage.service(testutil::service("ns1", "s", &[(Protocol::Tcp, "80")]));
            stage.group(testutil::group("ns2", "g"));
            stage.policy(testutil::policy("ns2", "p1", "ns1", "s", "g"));
        })
        .await;
        let reader = registry.reader().await.unwrap();
        let validator = AddressGroupBindingPolicyValidator::new(&reader);

        let err = validator
            .validate_for_creation(&testutil::policy("ns2", "p2", "ns1", "s", "g"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict {
                conflict: ConflictKind::DuplicatePolicy,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn delete_blocked_while_binding_exists() {
        let registry = seed(|stage| {
            stage.service(testutil::service("ns1", "s", &[(Protocol::Tcp, "80")]));
            stage.group(testutil::group("ns2", "g"));
            stage.policy(testutil::policy("ns2", "p", "ns1", "s", "g"));
            stage.binding(testutil::binding_to("ns1", "b", "s", "ns2", "g"));
        })
        .await;
        let reader = registry.reader().await.unwrap();
        let validator = AddressGroupBindingPolicyValidator::new(&reader);

        let err = validator
            .check_dependencies(&testutil::id("ns2", "p"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::DependencyExists {
                kind: "AddressGroupBindingPolicy",
                key: "ns2/p".to_string(),
                blocking_kind: "AddressGroupBinding",
            }
        );
    }
}
