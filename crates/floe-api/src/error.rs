//! Error types for the facade.

use floe_scheduler::SchedError;
use floe_store::StoreError;

use crate::WalletError;

/// Errors returned by [`FloeApi`](crate::FloeApi) operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `load` named an instance with no persisted record.
    #[error("instance not found")]
    InstanceNotFound,

    /// CID, job, or configuration absent.
    #[error("cid configuration not found")]
    NotFound,

    /// A replace named a source CID with no stored configuration.
    #[error("replaced cid configuration not found")]
    ReplacedCidNotFound,

    /// Remove rejected: the configuration still keeps a tier enabled.
    #[error("cid is active in storage")]
    ActiveInStorage,

    /// `get` on a CID whose configuration disables the hot tier.
    #[error("hot storage is disabled for the cid")]
    HotStorageDisabled,

    /// Push rejected: a configuration already exists and `override` was
    /// not set.
    #[error("configuration unchanged, push with override to modify it")]
    NoChange,

    /// Validation rejected the configuration.
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// Wallet interface failure.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Store-layer failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Scheduler failure without a more specific mapping.
    #[error("scheduler: {0}")]
    Sched(SchedError),
}

impl From<SchedError> for ApiError {
    fn from(e: SchedError) -> Self {
        match e {
            SchedError::NotFound => Self::NotFound,
            SchedError::ReplacedCidNotFound => Self::ReplacedCidNotFound,
            SchedError::ActiveInStorage => Self::ActiveInStorage,
            SchedError::NoChange => Self::NoChange,
            SchedError::HotStorageDisabled => Self::HotStorageDisabled,
            SchedError::Store(e) => Self::Store(e),
            other => Self::Sched(other),
        }
    }
}

impl From<floe_types::ConfigError> for ApiError {
    fn from(e: floe_types::ConfigError) -> Self {
        Self::InvalidConfig(e.0)
    }
}
