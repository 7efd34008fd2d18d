use crate::{kernel, Validate};
use async_trait::async_trait;
use netguard_controller_core::resources::{RuleS2S, ServiceAlias};
use netguard_controller_core::{ConflictKind, Error, Object, ResourceIdentifier};
use netguard_controller_store::{Reader, Scope};

pub struct RuleS2SValidator<'a, R> {
    reader: &'a R,
}

impl<'a, R: Reader> RuleS2SValidator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    fn validate_fields(&self, rule: &RuleS2S) -> Result<(), Error> {
        kernel::ensure_namespaced(rule)?;
        let local = &rule.spec.service_local_ref;
        if !local.namespace().is_empty() && local.namespace() != rule.namespace() {
            return Err(Error::validation(format!(
                "rule {}: serviceLocalRef must live in the rule's namespace",
                rule.id
            )));
        }
        Ok(())
    }

    pub async fn validate_references(&self, rule: &RuleS2S) -> Result<(), Error> {
        kernel::ensure_exists::<ServiceAlias, R>(self.reader, rule.local_alias_ref().id())
            .await?;
        kernel::ensure_exists::<ServiceAlias, R>(self.reader, rule.target_alias_ref().id())
            .await?;
        Ok(())
    }

    /// `(traffic, local alias, target alias)` is unique across all rules.
    async fn validate_unique(&self, rule: &RuleS2S) -> Result<(), Error> {
        let peers: Vec<RuleS2S> = kernel::list_scoped(self.reader, &Scope::All).await?;
        for peer in peers {
            if peer.id == rule.id {
                continue;
            }
            if peer.spec.traffic == rule.spec.traffic
                && peer.local_alias_ref() == rule.local_alias_ref()
                && peer.target_alias_ref() == rule.target_alias_ref()
            {
                return Err(Error::Conflict {
                    kind: RuleS2S::KIND,
                    key: rule.key(),
                    conflict: ConflictKind::DuplicateRule,
                    details: format!(
                        "rule {} already links {} to {} for {} traffic",
                        peer.id,
                        rule.local_alias_ref(),
                        rule.target_alias_ref(),
                        rule.spec.traffic,
                    ),
                    affected: vec![peer.key()],
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a, R: Reader> Validate<RuleS2S> for RuleS2SValidator<'a, R> {
    async fn validate_for_creation(&self, rule: &RuleS2S) -> Result<(), Error> {
        kernel::ensure_absent_for_creation::<RuleS2S, R>(self.reader, &rule.id).await?;
        self.validate_fields(rule)?;
        self.validate_references(rule).await?;
        self.validate_unique(rule).await
    }

    async fn validate_for_update(&self, old: &RuleS2S, new: &RuleS2S) -> Result<(), Error> {
        kernel::ensure_spec_unchanged_when_ready(old, &old.spec, &new.spec)?;
        self.validate_fields(new)?;
        self.validate_references(new).await?;
        self.validate_unique(new).await
    }

    async fn validate_for_post_commit(&self, rule: &RuleS2S) -> Result<(), Error> {
        self.validate_fields(rule)?;
        self.validate_references(rule).await?;
        self.validate_unique(rule).await
    }

    /// Generated rules are recomputed, so deletion never blocks.
    async fn check_dependencies(&self, _id: &ResourceIdentifier) -> Result<(), Error> {
        Ok(())
    }
}
