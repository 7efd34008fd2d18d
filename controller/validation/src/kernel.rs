//! Primitives shared by every kind-specific validator.

use netguard_controller_core::{Error, Object, ResourceIdentifier};
use netguard_controller_store::{ReadCollection, Scope, StoreError};
use std::fmt::Debug;
use std::time::Duration;

/// Backoff schedule for transient store errors; exhaustion surfaces
/// [`Error::StoreUnavailable`].
const BACKOFF: [Duration; 3] = [
    Duration::from_millis(10),
    Duration::from_millis(20),
    Duration::from_millis(40),
];

/// Primary-key lookup with bounded retry on transient store errors.
/// `Ok(None)` means the resource does not exist.
pub async fn check_entity_exists<T, R>(
    reader: &R,
    id: &ResourceIdentifier,
) -> Result<Option<T>, Error>
where
    T: Object,
    R: ReadCollection<T> + ?Sized,
{
    let mut attempt = 0;
    loop {
        match reader.get(id).await {
            Ok(found) => return Ok(Some(found)),
            Err(StoreError::NotFound { .. }) => return Ok(None),
            Err(err) if err.is_transient() && attempt < BACKOFF.len() => {
                tracing::debug!(kind = T::KIND, id = %id, %err, attempt, "Store busy; retrying lookup");
                tokio::time::sleep(BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Resolves `id` or fails with [`Error::NotFound`].
pub async fn ensure_exists<T, R>(reader: &R, id: &ResourceIdentifier) -> Result<T, Error>
where
    T: Object,
    R: ReadCollection<T> + ?Sized,
{
    check_entity_exists(reader, id)
        .await?
        .ok_or_else(|| Error::NotFound {
            kind: T::KIND,
            key: id.key(),
        })
}

/// Creation gate: fails with [`Error::AlreadyExists`] when `id` is taken.
pub async fn ensure_absent_for_creation<T, R>(
    reader: &R,
    id: &ResourceIdentifier,
) -> Result<(), Error>
where
    T: Object,
    R: ReadCollection<T> + ?Sized,
{
    match check_entity_exists::<T, R>(reader, id).await? {
        Some(existing) => Err(Error::AlreadyExists {
            kind: T::KIND,
            key: id.key(),
            existing_key: existing.key(),
            suggestion: format!(
                "use a different name or update the existing {} instead",
                T::KIND
            ),
        }),
        None => Ok(()),
    }
}

/// Scoped listing with the same bounded retry as the lookups.
pub async fn list_scoped<T, R>(reader: &R, scope: &Scope) -> Result<Vec<T>, Error>
where
    T: Object,
    R: ReadCollection<T> + ?Sized,
{
    let mut attempt = 0;
    loop {
        match reader.list(scope).await {
            Ok(items) => return Ok(items),
            Err(err) if err.is_transient() && attempt < BACKOFF.len() => {
                tracing::debug!(kind = T::KIND, %err, attempt, "Store busy; retrying listing");
                tokio::time::sleep(BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Most validators require a named, namespaced identity.
pub fn ensure_namespaced<T: Object>(obj: &T) -> Result<(), Error> {
    if obj.name().is_empty() {
        return Err(Error::validation(format!("{} must have a name", T::KIND)));
    }
    if obj.namespace().is_empty() {
        return Err(Error::validation(format!(
            "{} {} must have a namespace",
            T::KIND,
            obj.name()
        )));
    }
    Ok(())
}

/// Message used by every readiness-immutability guard.
pub const SPEC_FROZEN_WHEN_READY: &str = "spec cannot be changed when Ready condition is true";

/// Rejects a spec change once the stored object is Ready. Advisory while the
/// object is not Ready: any change passes.
pub fn ensure_spec_unchanged_when_ready<T, S>(old: &T, old_spec: &S, new_spec: &S) -> Result<(), Error>
where
    T: Object,
    S: PartialEq,
{
    if old.is_ready() && old_spec != new_spec {
        return Err(Error::validation(SPEC_FROZEN_WHEN_READY));
    }
    Ok(())
}

/// Same guard scoped to one named field.
pub fn ensure_field_unchanged_when_ready<T, F>(
    old: &T,
    field: &str,
    old_value: &F,
    new_value: &F,
) -> Result<(), Error>
where
    T: Object,
    F: PartialEq + Debug,
{
    if old.is_ready() && old_value != new_value {
        return Err(Error::validation(format!(
            "field '{}' cannot be changed when Ready condition is true",
            field
        )));
    }
    Ok(())
}

/// Unconditional field immutability, Ready or not.
pub fn ensure_field_immutable<F>(field: &str, old_value: &F, new_value: &F) -> Result<(), Error>
where
    F: PartialEq + Debug,
{
    if old_value != new_value {
        return Err(Error::validation(format!("field '{}' is immutable", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netguard_controller_core::resources::{Service, ServiceSpec};
    use netguard_controller_core::Condition;
    use netguard_controller_store::mem::MemRegistry;
    use netguard_controller_store::{Registry, SyncOp, WriteCollection, Writer};

    fn svc(name: &str) -> Service {
        Service::new(
            ResourceIdentifier::new("ns1", name),
            ServiceSpec::default(),
        )
    }

    async fn seeded() -> MemRegistry {
        let registry = MemRegistry::new();
        let mut writer = registry.writer().await.unwrap();
        writer.sync(SyncOp::Upsert, vec![svc("s")]).await.unwrap();
        writer.commit().await.unwrap();
        registry
    }

    #[tokio::test]
    async fn ensure_exists_finds_committed_resources() {
        let registry = seeded().await;
        let reader = registry.reader().await.unwrap();

        let found: Service = ensure_exists(&reader, &ResourceIdentifier::new("ns1", "s"))
            .await
            .unwrap();
        assert_eq!(found.key(), "ns1/s");

        let err = ensure_exists::<Service, _>(&reader, &ResourceIdentifier::new("ns1", "absent"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotFound {
                kind: "Service",
                key: "ns1/absent".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn creation_gate_reports_the_existing_entity() {
        let registry = seeded().await;
        let reader = registry.reader().await.unwrap();

        let err = ensure_absent_for_creation::<Service, _>(
            &reader,
            &ResourceIdentifier::new("ns1", "s"),
        )
        .await
        .unwrap_err();
        match err {
            Error::AlreadyExists {
                existing_key,
                suggestion,
                ..
            } => {
                assert_eq!(existing_key, "ns1/s");
                assert!(suggestion.contains("update the existing Service"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        ensure_absent_for_creation::<Service, _>(&reader, &ResourceIdentifier::new("ns1", "new"))
            .await
            .unwrap();
    }

    #[test]
    fn spec_guard_is_advisory_until_ready() {
        let mut service = svc("s");
        let old_spec = service.spec.clone();
        let mut new_spec = old_spec.clone();
        new_spec.description = "changed".to_string();

        ensure_spec_unchanged_when_ready(&service, &old_spec, &new_spec).unwrap();

        service.meta.set_condition(Condition::ready(1));
        let err = ensure_spec_unchanged_when_ready(&service, &old_spec, &new_spec).unwrap_err();
        assert_eq!(err, Error::validation(SPEC_FROZEN_WHEN_READY));

        ensure_spec_unchanged_when_ready(&service, &old_spec, &old_spec).unwrap();
    }

    /// Fails lookups with a transient error a fixed number of times.
    struct FlakyReader {
        failures: std::sync::atomic::AtomicUsize,
        item: Service,
    }

    impl FlakyReader {
        fn new(failures: usize, item: Service) -> Self {
            Self {
                failures: std::sync::atomic::AtomicUsize::new(failures),
                item,
            }
        }
    }

    #[async_trait::async_trait]
    impl ReadCollection<Service> for FlakyReader {
        async fn list(&self, _scope: &Scope) -> Result<Vec<Service>, StoreError> {
            Ok(vec![self.item.clone()])
        }

        async fn get(&self, id: &ResourceIdentifier) -> Result<Service, StoreError> {
            use std::sync::atomic::Ordering;
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("conn busy".to_string()));
            }
            if *id == self.item.id {
                Ok(self.item.clone())
            } else {
                Err(StoreError::not_found::<Service>(id))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_retries_transient_errors() {
        let reader = FlakyReader::new(3, svc("s"));
        let found: Service = ensure_exists(&reader, &ResourceIdentifier::new("ns1", "s"))
            .await
            .unwrap();
        assert_eq!(found.key(), "ns1/s");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let reader = FlakyReader::new(10, svc("s"));
        let err = ensure_exists::<Service, _>(&reader, &ResourceIdentifier::new("ns1", "s"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable { .. }));
    }

    #[test]
    fn field_guards_name_the_field() {
        let mut service = svc("s");
        service.meta.set_condition(Condition::ready(1));

        let err =
            ensure_field_unchanged_when_ready(&service, "traffic", &"INGRESS", &"EGRESS")
                .unwrap_err();
        assert_eq!(
            err,
            Error::validation("field 'traffic' cannot be changed when Ready condition is true")
        );

        let err = ensure_field_immutable("serviceRef", &"a", &"b").unwrap_err();
        assert_eq!(err, Error::validation("field 'serviceRef' is immutable"));
    }
}
