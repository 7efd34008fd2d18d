use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{RuleS2S, Service, ServiceAlias};
use netguard_controller_core::{Error, Object, ResourceIdentifier};
use netguard_controller_store::{Reader, Scope};

pub struct ServiceAliasValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> ServiceAliasValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_fields(&self, alias: &ServiceAlias) -> Result<(), Error> {
        kernel::ensure_namespaced(alias)?;
        let service = &alias.spec.service_ref;
        if !service.namespace().is_empty() && service.namespace() != alias.namespace() {
            return Err(Error::validation(format!(
                "alias {} must live in the namespace of service {}",
                alias.id, service
            )));
        }
        Ok(())
    }

    pub async fn validate_references(&self, alias: &ServiceAlias) -> Result<(), Error> {
        kernel::ensure_exists::<Service, R>(self.reader, alias.effective_service_ref().id())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<ServiceAlias> for ServiceAliasValidator<'a, R> {
    async fn validate_for_creation(&self, alias: &ServiceAlias) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<ServiceAlias, R>(self.reader, &alias.id).await?;
        self.validate_fields(alias)?;
        self.validate_references(alias).await
    }

    async fn validate_for_update(
        &self,
        old: &ServiceAlias,
        new: &ServiceAlias,
    ) -> Result<(), Error> {
        kernel::ensure_field_immutable(
            "serviceRef",
            &old.effective_service_ref(),
            &new.effective_service_ref(),
        )?;
        self.validate_fields(new)?;
        self.validate_references(new).await
    }

    async fn validate_for_post_commit(&self, alias: &ServiceAlias) -> Result<(), Error> {
        self.validate_fields(alias)?;
        self.validate_references(alias).await
    }

    /// Rules resolve services through aliases, so an alias referenced by any
    /// rule cannot be deleted.
    async fn check_dependencies(&self, id: &ResourceIdentifier) -> Result<(), Error> {
        let rules: Vec<RuleS2S> = kernel::list_scoped(self.reader, &Scope::All).await?;
        if rules.iter().any(|rule| {
            rule.local_alias_ref().id() == id || rule.target_alias_ref().id() == id
        }) {
            return Err(Error::DependencyExists {
                kind: ServiceAlias::KIND,
                key: id.key(),
                blocking_kind: RuleS2S::KIND,
            });
        }
        Ok(())
    }
}
