use netguard_controller_core::{Error, Object, ResourceIdentifier};
use thiserror::Error as ThisError;

/// Failures a store backend can surface.
///
/// `Unavailable` is the typed transient signal; callers retry it with
/// bounded backoff instead of matching on message text.
#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("version conflict on {kind} {key}")]
    VersionConflict { kind: &'static str, key: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found<T: Object>(id: &ResourceIdentifier) -> Self {
        StoreError::NotFound {
            kind: T::KIND,
            key: id.key(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => Error::NotFound { kind, key },
            StoreError::Unavailable(details) => Error::StoreUnavailable { details },
            StoreError::VersionConflict { kind, key } => Error::StoreUnavailable {
                details: format!("version conflict on {} {}", kind, key),
            },
            StoreError::Internal(err) => Error::StoreUnavailable {
                details: err.to_string(),
            },
        }
    }
}
