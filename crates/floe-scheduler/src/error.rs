//! Error types for the scheduler.

use floe_store::StoreError;
use floe_types::HotError;

/// Errors returned by [`Scheduler`](crate::Scheduler) operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    /// No configuration is stored for the CID.
    #[error("no stored configuration for the cid")]
    NotFound,

    /// A replace named a source CID with no stored configuration.
    #[error("replaced cid has no stored configuration")]
    ReplacedCidNotFound,

    /// Remove rejected: the configuration still keeps a tier enabled.
    #[error("configuration is active in storage")]
    ActiveInStorage,

    /// Push rejected: a configuration already exists and `override` was
    /// not set.
    #[error("configuration unchanged, push with override to modify it")]
    NoChange,

    /// `get` on a CID whose configuration disables the hot tier.
    #[error("hot storage is disabled for the cid")]
    HotStorageDisabled,

    /// Store-layer failure; fatal to the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Hot executor failure surfaced through `get`.
    #[error(transparent)]
    Hot(#[from] HotError),
}
