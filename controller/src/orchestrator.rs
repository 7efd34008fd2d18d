use crate::batch::{Batch, Mutation, Resource, ResourceKind, ResourceRef};
use netguard_controller_core::resources::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, Network, NetworkBinding,
    RuleS2S, Service, ServiceAlias,
};
use netguard_controller_core::{Condition, Error, Object, ResourceIdentifier};
use netguard_controller_derivation::{DerivationEngine, Touched};
use netguard_controller_store::{
    ReadCollection, Registry, StoreError, SyncOp, WriteCollection, Writer,
};
use netguard_controller_validation::{
    AddressGroupBindingPolicyValidator, AddressGroupBindingValidator, AddressGroupValidator,
    NetworkBindingValidator, NetworkValidator, RuleS2SValidator, ServiceAliasValidator,
    ServiceValidator, Validate,
};
use thiserror::Error as ThisError;

/// Keys the batch committed, in application order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub committed: Vec<ResourceRef>,
}

/// The first failure of a batch, with the offending resource key when one
/// item is to blame.
#[derive(Clone, Debug, ThisError, PartialEq)]
#[error("{}: {error}", .key.as_deref().unwrap_or("batch"))]
pub struct ApplyError {
    pub key: Option<String>,
    pub error: Error,
}

impl ApplyError {
    fn batch(error: impl Into<Error>) -> Self {
        Self {
            key: None,
            error: error.into(),
        }
    }

    fn at(key: String, error: Error) -> Self {
        Self {
            key: Some(key),
            error,
        }
    }
}

/// Applies batches of user mutations as single transactions.
///
/// Contract per batch: validate every item in order against the staged view,
/// stage the writes, rerun the derivation engine over the touched set,
/// re-validate every upserted resource post-commit, stamp Ready conditions
/// and commit. The first failure aborts with nothing committed.
pub struct Orchestrator<S> {
    registry: S,
    engine: DerivationEngine,
}

impl<S: Registry> Orchestrator<S> {
    pub fn new(registry: S) -> Self {
        Self {
            registry,
            engine: DerivationEngine::new(),
        }
    }

    pub fn registry(&self) -> &S {
        &self.registry
    }

    pub async fn apply(&self, batch: Batch) -> Result<ApplyReport, ApplyError> {
        // Derived kinds never reach a validator or the store.
        for item in batch.items() {
            if item.kind().is_derived() {
                return Err(ApplyError::at(
                    item.id().key(),
                    Error::validation(format!(
                        "{} is derived and cannot be mutated directly",
                        item.kind()
                    )),
                ));
            }
        }

        let mut writer = self.registry.writer().await.map_err(ApplyError::batch)?;

        match self.apply_staged(&mut writer, batch).await {
            Ok(report) => {
                writer.commit().await.map_err(ApplyError::batch)?;
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = writer.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed after aborted batch");
                }
                Err(err)
            }
        }
    }

    async fn apply_staged(
        &self,
        writer: &mut S::Writer,
        batch: Batch,
    ) -> Result<ApplyReport, ApplyError> {
        let mut touched = Touched::default();
        let mut upserted = Vec::new();
        let mut committed = Vec::new();

        for item in batch.into_items() {
            match item {
                Mutation::Upsert(mut resource) => {
                    resource.normalize();
                    let target = resource.to_ref();
                    self.stage_upsert(writer, resource, &mut touched)
                        .await
                        .map_err(|error| ApplyError::at(target.key(), error))?;
                    upserted.push(target.clone());
                    committed.push(target);
                }
                Mutation::Delete(target) => {
                    self.stage_delete(writer, &target, &mut touched)
                        .await
                        .map_err(|error| ApplyError::at(target.key(), error))?;
                    committed.push(target);
                }
            }
        }

        self.engine
            .refresh(writer, &touched)
            .await
            .map_err(ApplyError::batch)?;

        for target in &upserted {
            if let Err(error) = self.validate_post_commit(writer, target).await {
                // Record the inconsistency on the resource before giving up;
                // a store without rollback still surfaces the failed state.
                self.stamp_not_ready(writer, target, &error).await;
                return Err(ApplyError::at(target.key(), error));
            }
        }
        for target in &upserted {
            self.stamp_ready(writer, target)
                .await
                .map_err(|error| ApplyError::at(target.key(), error))?;
        }

        tracing::debug!(items = committed.len(), "Batch staged");
        Ok(ApplyReport { committed })
    }

    async fn stage_upsert(
        &self,
        writer: &mut S::Writer,
        resource: Resource,
        touched: &mut Touched,
    ) -> Result<(), Error> {
        match resource {
            Resource::Service(mut service) => {
                let existing = get_opt::<Service, _>(&*writer, &service.id).await?;
                {
                    let validator = ServiceValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &service).await?,
                        None => validator.validate_for_creation(&service).await?,
                    }
                }

                touched.services.insert(service.id.clone());
                for group in &service.spec.address_groups {
                    touched.address_groups.insert(group.id().clone());
                }
                match &existing {
                    Some(old) => {
                        // Groups the service is detached from need a rebuild
                        // too; the engine cannot see them on the new spec.
                        for group in old
                            .spec
                            .address_groups
                            .iter()
                            .chain(&old.aggregated_address_groups)
                        {
                            touched.address_groups.insert(group.id().clone());
                        }
                        service.aggregated_address_groups =
                            old.aggregated_address_groups.clone();
                    }
                    None => service.aggregated_address_groups.clear(),
                }
                writer.sync(SyncOp::Upsert, vec![service]).await?;
            }

            Resource::AddressGroup(mut group) => {
                let existing = get_opt::<AddressGroup, _>(&*writer, &group.id).await?;
                {
                    let validator = AddressGroupValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &group).await?,
                        None => validator.validate_for_creation(&group).await?,
                    }
                }
                touched.address_groups.insert(group.id.clone());
                match &existing {
                    Some(old) => group.networks = old.networks.clone(),
                    None => group.networks.clear(),
                }
                writer.sync(SyncOp::Upsert, vec![group]).await?;
            }

            Resource::AddressGroupBinding(binding) => {
                let existing =
                    get_opt::<AddressGroupBinding, _>(&*writer, &binding.id).await?;
                {
                    let validator = AddressGroupBindingValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &binding).await?,
                        None => validator.validate_for_creation(&binding).await?,
                    }
                }
                touched
                    .services
                    .insert(binding.effective_service_ref().id().clone());
                touched
                    .address_groups
                    .insert(binding.effective_address_group_ref().id().clone());
                writer.sync(SyncOp::Upsert, vec![binding]).await?;
            }

            Resource::AddressGroupBindingPolicy(policy) => {
                let existing =
                    get_opt::<AddressGroupBindingPolicy, _>(&*writer, &policy.id).await?;
                {
                    let validator = AddressGroupBindingPolicyValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &policy).await?,
                        None => validator.validate_for_creation(&policy).await?,
                    }
                }
                // Policies carry no derived state.
                writer.sync(SyncOp::Upsert, vec![policy]).await?;
            }

            Resource::ServiceAlias(alias) => {
                let existing = get_opt::<ServiceAlias, _>(&*writer, &alias.id).await?;
                {
                    let validator = ServiceAliasValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &alias).await?,
                        None => validator.validate_for_creation(&alias).await?,
                    }
                }
                touched.aliases.insert(alias.id.clone());
                writer.sync(SyncOp::Upsert, vec![alias]).await?;
            }

            Resource::RuleS2S(rule) => {
                let existing = get_opt::<RuleS2S, _>(&*writer, &rule.id).await?;
                {
                    let validator = RuleS2SValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &rule).await?,
                        None => validator.validate_for_creation(&rule).await?,
                    }
                }
                touched.rules.insert(rule.id.clone());
                writer.sync(SyncOp::Upsert, vec![rule]).await?;
            }

            Resource::Network(mut network) => {
                let existing = get_opt::<Network, _>(&*writer, &network.id).await?;
                {
                    let validator = NetworkValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &network).await?,
                        None => validator.validate_for_creation(&network).await?,
                    }
                }
                touched.networks.insert(network.id.clone());
                match &existing {
                    Some(old) => network.is_bound = old.is_bound,
                    None => network.is_bound = false,
                }
                writer.sync(SyncOp::Upsert, vec![network]).await?;
            }

            Resource::NetworkBinding(binding) => {
                let existing = get_opt::<NetworkBinding, _>(&*writer, &binding.id).await?;
                {
                    let validator = NetworkBindingValidator::new(&*writer);
                    match &existing {
                        Some(old) => validator.validate_for_update(old, &binding).await?,
                        None => validator.validate_for_creation(&binding).await?,
                    }
                }
                touched
                    .networks
                    .insert(binding.spec.network_ref.id().clone());
                touched
                    .address_groups
                    .insert(binding.spec.address_group_ref.id().clone());
                if let Some(old) = &existing {
                    touched.networks.insert(old.spec.network_ref.id().clone());
                }
                writer.sync(SyncOp::Upsert, vec![binding]).await?;
            }

            Resource::AddressGroupPortMapping(_) | Resource::IEAgAgRule(_) => {
                return Err(Error::validation(
                    "derived resources cannot be staged directly",
                ));
            }
        }

        Ok(())
    }

    async fn stage_delete(
        &self,
        writer: &mut S::Writer,
        target: &ResourceRef,
        touched: &mut Touched,
    ) -> Result<(), Error> {
        match target.kind {
            ResourceKind::Service => {
                {
                    let validator = ServiceValidator::new(&*writer);
                    validator.check_dependencies(&target.id).await?;
                }
                if let Some(existing) = get_opt::<Service, _>(&*writer, &target.id).await? {
                    touched.services.insert(existing.id.clone());
                    for group in existing
                        .spec
                        .address_groups
                        .iter()
                        .chain(&existing.aggregated_address_groups)
                    {
                        touched.address_groups.insert(group.id().clone());
                    }
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::AddressGroup => {
                {
                    let validator = AddressGroupValidator::new(&*writer);
                    validator.check_dependencies(&target.id).await?;
                }
                if let Some(existing) =
                    get_opt::<AddressGroup, _>(&*writer, &target.id).await?
                {
                    touched.address_groups.insert(existing.id.clone());
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::AddressGroupBinding => {
                if let Some(existing) =
                    get_opt::<AddressGroupBinding, _>(&*writer, &target.id).await?
                {
                    touched
                        .services
                        .insert(existing.effective_service_ref().id().clone());
                    touched
                        .address_groups
                        .insert(existing.effective_address_group_ref().id().clone());
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::AddressGroupBindingPolicy => {
                {
                    let validator = AddressGroupBindingPolicyValidator::new(&*writer);
                    validator.check_dependencies(&target.id).await?;
                }
                if let Some(existing) =
                    get_opt::<AddressGroupBindingPolicy, _>(&*writer, &target.id).await?
                {
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::ServiceAlias => {
                {
                    let validator = ServiceAliasValidator::new(&*writer);
                    validator.check_dependencies(&target.id).await?;
                }
                if let Some(existing) =
                    get_opt::<ServiceAlias, _>(&*writer, &target.id).await?
                {
                    touched.aliases.insert(existing.id.clone());
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::RuleS2S => {
                if let Some(existing) = get_opt::<RuleS2S, _>(&*writer, &target.id).await? {
                    touched.rules.insert(existing.id.clone());
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::Network => {
                {
                    let validator = NetworkValidator::new(&*writer);
                    validator.check_dependencies(&target.id).await?;
                }
                if let Some(existing) = get_opt::<Network, _>(&*writer, &target.id).await? {
                    touched.networks.insert(existing.id.clone());
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::NetworkBinding => {
                if let Some(existing) =
                    get_opt::<NetworkBinding, _>(&*writer, &target.id).await?
                {
                    touched
                        .networks
                        .insert(existing.spec.network_ref.id().clone());
                    touched
                        .address_groups
                        .insert(existing.spec.address_group_ref.id().clone());
                    writer.sync(SyncOp::Delete, vec![existing]).await?;
                }
            }

            ResourceKind::AddressGroupPortMapping | ResourceKind::IEAgAgRule => {
                return Err(Error::validation(
                    "derived resources cannot be deleted directly",
                ));
            }
        }

        Ok(())
    }

    async fn validate_post_commit(
        &self,
        writer: &mut S::Writer,
        target: &ResourceRef,
    ) -> Result<(), Error> {
        match target.kind {
            ResourceKind::Service => {
                let Some(current) = get_opt::<Service, _>(&*writer, &target.id).await? else {
                    return Ok(());
                };
                ServiceValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::AddressGroup => {
                let Some(current) =
                    get_opt::<AddressGroup, _>(&*writer, &target.id).await?
                else {
                    return Ok(());
                };
                AddressGroupValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::AddressGroupBinding => {
                let Some(current) =
                    get_opt::<AddressGroupBinding, _>(&*writer, &target.id).await?
                else {
                    return Ok(());
                };
                AddressGroupBindingValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::AddressGroupBindingPolicy => {
                let Some(current) =
                    get_opt::<AddressGroupBindingPolicy, _>(&*writer, &target.id).await?
                else {
                    return Ok(());
                };
                AddressGroupBindingPolicyValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::ServiceAlias => {
                let Some(current) =
                    get_opt::<ServiceAlias, _>(&*writer, &target.id).await?
                else {
                    return Ok(());
                };
                ServiceAliasValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::RuleS2S => {
                let Some(current) = get_opt::<RuleS2S, _>(&*writer, &target.id).await? else {
                    return Ok(());
                };
                RuleS2SValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::Network => {
                let Some(current) = get_opt::<Network, _>(&*writer, &target.id).await? else {
                    return Ok(());
                };
                NetworkValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            ResourceKind::NetworkBinding => {
                let Some(current) =
                    get_opt::<NetworkBinding, _>(&*writer, &target.id).await?
                else {
                    return Ok(());
                };
                NetworkBindingValidator::new(&*writer)
                    .validate_for_post_commit(&current)
                    .await
            }
            // Derived kinds are rebuilt fresh; they have no post-commit
            // validator and cannot appear among the upserts.
            ResourceKind::AddressGroupPortMapping | ResourceKind::IEAgAgRule => Ok(()),
        }
    }

    async fn stamp_ready(
        &self,
        writer: &mut S::Writer,
        target: &ResourceRef,
    ) -> Result<(), Error> {
        match target.kind {
            ResourceKind::Service => stamp_ready_as::<Service, _>(writer, &target.id).await,
            ResourceKind::AddressGroup => {
                stamp_ready_as::<AddressGroup, _>(writer, &target.id).await
            }
            ResourceKind::AddressGroupBinding => {
                stamp_ready_as::<AddressGroupBinding, _>(writer, &target.id).await
            }
            ResourceKind::AddressGroupBindingPolicy => {
                stamp_ready_as::<AddressGroupBindingPolicy, _>(writer, &target.id).await
            }
            ResourceKind::ServiceAlias => {
                stamp_ready_as::<ServiceAlias, _>(writer, &target.id).await
            }
            ResourceKind::RuleS2S => stamp_ready_as::<RuleS2S, _>(writer, &target.id).await,
            ResourceKind::Network => stamp_ready_as::<Network, _>(writer, &target.id).await,
            ResourceKind::NetworkBinding => {
                stamp_ready_as::<NetworkBinding, _>(writer, &target.id).await
            }
            ResourceKind::AddressGroupPortMapping | ResourceKind::IEAgAgRule => Ok(()),
        }
    }

    async fn stamp_not_ready(
        &self,
        writer: &mut S::Writer,
        target: &ResourceRef,
        error: &Error,
    ) {
        let result = match target.kind {
            ResourceKind::Service => {
                stamp_not_ready_as::<Service, _>(writer, &target.id, error).await
            }
            ResourceKind::AddressGroup => {
                stamp_not_ready_as::<AddressGroup, _>(writer, &target.id, error).await
            }
            ResourceKind::AddressGroupBinding => {
                stamp_not_ready_as::<AddressGroupBinding, _>(writer, &target.id, error).await
            }
            ResourceKind::AddressGroupBindingPolicy => {
                stamp_not_ready_as::<AddressGroupBindingPolicy, _>(writer, &target.id, error)
                    .await
            }
            ResourceKind::ServiceAlias => {
                stamp_not_ready_as::<ServiceAlias, _>(writer, &target.id, error).await
            }
            ResourceKind::RuleS2S => {
                stamp_not_ready_as::<RuleS2S, _>(writer, &target.id, error).await
            }
            ResourceKind::Network => {
                stamp_not_ready_as::<Network, _>(writer, &target.id, error).await
            }
            ResourceKind::NetworkBinding => {
                stamp_not_ready_as::<NetworkBinding, _>(writer, &target.id, error).await
            }
            ResourceKind::AddressGroupPortMapping | ResourceKind::IEAgAgRule => Ok(()),
        };
        if let Err(stamp_err) = result {
            tracing::warn!(resource = %target, error = %stamp_err, "Failed to record Ready=False");
        }
    }
}

async fn get_opt<T, R>(reader: &R, id: &ResourceIdentifier) -> Result<Option<T>, Error>
where
    T: Object,
    R: ReadCollection<T> + ?Sized,
{
    match reader.get(id).await {
        Ok(found) => Ok(Some(found)),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn stamp_ready_as<T, W>(writer: &mut W, id: &ResourceIdentifier) -> Result<(), Error>
where
    T: Object,
    W: ReadCollection<T> + WriteCollection<T>,
{
    let Some(mut obj) = get_opt::<T, W>(&*writer, id).await? else {
        return Ok(());
    };
    let generation = obj.meta().generation;
    let meta = obj.meta_mut();
    meta.observed_generation = generation;
    meta.set_condition(Condition::ready(generation));
    writer.sync(SyncOp::Upsert, vec![obj]).await?;
    Ok(())
}

async fn stamp_not_ready_as<T, W>(
    writer: &mut W,
    id: &ResourceIdentifier,
    error: &Error,
) -> Result<(), Error>
where
    T: Object,
    W: ReadCollection<T> + WriteCollection<T>,
{
    let Some(mut obj) = get_opt::<T, W>(&*writer, id).await? else {
        return Ok(());
    };
    obj.meta_mut()
        .set_condition(Condition::not_ready(error.reason(), error.to_string()));
    writer.sync(SyncOp::Upsert, vec![obj]).await?;
    Ok(())
}
