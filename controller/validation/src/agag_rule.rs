use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::ports;
use netguard_controller_core::resources::{AddressGroup, IEAgAgRule};
use netguard_controller_core::{Error, ResourceIdentifier};
use netguard_controller_store::Reader;

pub struct IEAgAgRuleValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> IEAgAgRuleValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    pub async fn validate_references(&self, rule: &IEAgAgRule) -> Result<(), Error> {
        kernel::ensure_exists::<AddressGroup, R>(
            self.reader,
            rule.spec.address_group_local.id(),
        )
        .await?;
        kernel::ensure_exists::<AddressGroup, R>(self.reader, rule.spec.address_group.id())
            .await?;
        Ok(())
    }

    fn validate_ports(&self, rule: &IEAgAgRule) -> Result<(), Error> {
        for port in &rule.spec.ports {
            ports::parse_ranges(&port.destination).map_err(|err| {
                Error::validation(format!(
                    "rule {}: destination port {:?}: {}",
                    rule.id, port.destination, err
                ))
            })?;
            if let Some(source) = &port.source {
                ports::parse_ranges(source).map_err(|err| {
                    Error::validation(format!(
                        "rule {}: source port {:?}: {}",
                        rule.id, source, err
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<IEAgAgRule> for IEAgAgRuleValidator<'a, R> {
    async fn validate_for_creation(&self, rule: &IEAgAgRule) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<IEAgAgRule, R>(self.reader, &rule.id).await?;
        kernel::ensure_namespaced(rule)?;
        self.validate_references(rule).await?;
        self.validate_ports(rule)
    }

    async fn validate_for_update(
        &self,
        old: &IEAgAgRule,
        new: &IEAgAgRule,
    ) -> Result<(), Error> {
        kernel::ensure_field_unchanged_when_ready(
            old,
            "transport",
            &old.spec.transport,
            &new.spec.transport,
        )?;
        kernel::ensure_field_unchanged_when_ready(
            old,
            "traffic",
            &old.spec.traffic,
            &new.spec.traffic,
        )?;
        kernel::ensure_field_unchanged_when_ready(
            old,
            "addressGroupLocal",
            &old.spec.address_group_local,
            &new.spec.address_group_local,
        )?;
        kernel::ensure_field_unchanged_when_ready(
            old,
            "addressGroup",
            &old.spec.address_group,
            &new.spec.address_group,
        )?;
        kernel::ensure_field_unchanged_when_ready(
            old,
            "action",
            &old.spec.action,
            &new.spec.action,
        )?;
        self.validate_references(new).await?;
        self.validate_ports(new)
    }

    async fn validate_for_post_commit(&self, rule: &IEAgAgRule) -> Result<(), Error> {
        kernel::ensure_namespaced(rule)?;
        self.validate_references(rule).await?;
        self.validate_ports(rule)
    }

    async fn check_dependencies(&self, _id: &ResourceIdentifier) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, seed};
    use netguard_controller_core::ports::Protocol;
    use netguard_controller_core::resources::{IEAgAgRuleSpec, PortSpec, Traffic};
    use netguard_controller_core::{AddressGroupRef, Condition};
    use netguard_controller_store::Registry;

    fn rule(name: &str, destination: &str) -> IEAgAgRule {
        IEAgAgRule::new(
            testutil::id("ns1", name),
            IEAgAgRuleSpec {
                transport: Protocol::Tcp,
                traffic: Traffic::Ingress,
                address_group_local: AddressGroupRef::new("ns1", "g1"),
                address_group: AddressGroupRef::new("ns1", "g2"),
                ports: vec![PortSpec::destination(destination)],
                ..IEAgAgRuleSpec::default()
            },
        )
    }

    #[tokio::test]
    async fn creation_checks_groups_and_ports() {
        let registry = seed(|stage| {
            stage.group(testutil::group("ns1", "g1"));
            stage.group(testutil::group("ns1", "g2"));
        })
        .await;
        let reader = registry.reader().await.unwrap();
        let validator = IEAgAgRuleValidator::new(&reader);

        validator.validate_for_creation(&rule("r", "443")).await.unwrap();

        let err = validator
            .validate_for_creation(&rule("r", "90-80"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let mut missing = rule("r", "443");
        missing.spec.address_group = AddressGroupRef::new("ns1", "absent");
        let err = validator.validate_for_creation(&missing).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn ready_freezes_the_identity_fields() {
        let registry = seed(|stage| {
            stage.group(testutil::group("ns1", "g1"));
            stage.group(testutil::group("ns1", "g2"));
        })
        .await;
        let reader = registry.reader().await.unwrap();
        let validator = IEAgAgRuleValidator::new(&reader);

        let mut old = rule("r", "443");
        old.meta.set_condition(Condition::ready(1));

        let mut new = rule("r", "443");
        new.spec.traffic = Traffic::Egress;
        let err = validator.validate_for_update(&old, &new).await.unwrap_err();
        assert_eq!(
            err,
            Error::validation("field 'traffic' cannot be changed when Ready condition is true")
        );

        // Ports stay mutable even when Ready.
        let new = rule("r", "443,8443");
        validator.validate_for_update(&old, &new).await.unwrap();
    }
}
