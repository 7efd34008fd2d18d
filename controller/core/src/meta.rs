use crate::ResourceIdentifier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Condition type marking a resource whose spec is considered stable.
pub const READY_CONDITION: &str = "Ready";

/// Reason set on `Ready=True` after a successful reconcile.
pub const REASON_RECONCILED: &str = "Reconciled";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionStatus::True => f.write_str("True"),
            ConditionStatus::False => f.write_str("False"),
            ConditionStatus::Unknown => f.write_str("Unknown"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
            observed_generation: None,
        }
    }

    /// `Ready=True` with the generation the reconcile observed.
    pub fn ready(observed_generation: i64) -> Self {
        let mut condition = Condition::new(
            READY_CONDITION,
            ConditionStatus::True,
            REASON_RECONCILED,
            "",
        );
        condition.observed_generation = Some(observed_generation);
        condition
    }

    /// `Ready=False` carrying the failure that blocked the reconcile.
    pub fn not_ready(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Condition::new(READY_CONDITION, ConditionStatus::False, reason, message)
    }
}

/// Metadata every resource carries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(default)]
    pub generation: i64,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Meta {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Replaces the condition of the same type, keeping the previous
    /// transition time when the status did not change.
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.type_ == condition.type_)
        {
            Some(existing) => {
                if existing.status == condition.status {
                    condition.last_transition_time = existing.last_transition_time;
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.condition(READY_CONDITION)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}

/// Uniform access to identity and metadata across all resource kinds.
///
/// The Ready check goes through this trait, so nothing in the control plane
/// ever switches over concrete resource types.
pub trait Object: Clone + PartialEq + Send + Sync + 'static {
    const KIND: &'static str;

    fn id(&self) -> &ResourceIdentifier;
    fn meta(&self) -> &Meta;
    fn meta_mut(&mut self) -> &mut Meta;

    fn key(&self) -> String {
        self.id().key()
    }

    fn name(&self) -> &str {
        &self.id().name
    }

    fn namespace(&self) -> &str {
        &self.id().namespace
    }

    fn is_ready(&self) -> bool {
        self.meta().is_ready()
    }
}
