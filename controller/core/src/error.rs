use std::fmt;
use thiserror::Error;

/// Business conflict classes surfaced by `Error::Conflict`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    PortOverlap,
    DuplicateBinding,
    DuplicatePolicy,
    DuplicateRule,
    CrossNamespaceDenied,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::PortOverlap => f.write_str("port overlap"),
            ConflictKind::DuplicateBinding => f.write_str("duplicate binding"),
            ConflictKind::DuplicatePolicy => f.write_str("duplicate policy"),
            ConflictKind::DuplicateRule => f.write_str("duplicate rule"),
            ConflictKind::CrossNamespaceDenied => f.write_str("cross-namespace binding not allowed"),
        }
    }
}

/// The error taxonomy every validator speaks.
///
/// Callers match on variants, never on message text. Only
/// `StoreUnavailable` is worth retrying at batch granularity; everything
/// else requires the caller to amend the proposed state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("{kind} {key} already exists; {suggestion}")]
    AlreadyExists {
        kind: &'static str,
        key: String,
        existing_key: String,
        suggestion: String,
    },

    #[error("{conflict}: {details}")]
    Conflict {
        kind: &'static str,
        key: String,
        conflict: ConflictKind,
        details: String,
        affected: Vec<String>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("cannot delete {kind} {key}: referenced by {blocking_kind}")]
    DependencyExists {
        kind: &'static str,
        key: String,
        blocking_kind: &'static str,
    },

    #[error("store unavailable: {details}")]
    StoreUnavailable { details: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Short stable identifier of the variant, used as a condition reason.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "NotFound",
            Error::AlreadyExists { .. } => "AlreadyExists",
            Error::Conflict { .. } => "Conflict",
            Error::Validation(_) => "Invalid",
            Error::DependencyExists { .. } => "DependencyExists",
            Error::StoreUnavailable { .. } => "StoreUnavailable",
        }
    }

    /// Whether the caller should retry the whole batch.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::StoreUnavailable { .. })
    }
}
