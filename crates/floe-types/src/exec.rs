//! Executor seams between the scheduler and the two storage tiers.
//!
//! The scheduler drives reconciliation through [`HotStorage`] and
//! [`ColdStorage`]; the hot executor may in turn reach the cold tier
//! through the narrow [`ColdRetriever`] to unfreeze dormant content.
//! All implementations must be `Send + Sync` for use across worker tasks.

use bytes::Bytes;
use cid::Cid;

use crate::config::{FilConfig, HotConfig};
use crate::info::{FilInfo, HotInfo};
use crate::JobId;

/// Errors from the hot tier executor.
#[derive(Debug, thiserror::Error)]
pub enum HotError {
    /// The hot-tier import exceeded the configured deadline.
    #[error("hot import of {cid} timed out after {seconds}s")]
    ImportTimeout {
        /// The CID being imported.
        cid: Cid,
        /// The configured deadline.
        seconds: u64,
    },

    /// The object is not available in the hot tier.
    #[error("{0} not found in hot storage")]
    NotFound(Cid),

    /// Unfreezing produced data that hashes to a different CID.
    #[error("unfreeze of {expected} produced mismatched cid {got}")]
    CidMismatch {
        /// The CID that was requested.
        expected: Cid,
        /// The CID the re-added bytes hashed to.
        got: Cid,
    },

    /// The cold retrieval backing an unfreeze failed.
    #[error("unfreeze retrieval failed: {0}")]
    Unfreeze(#[source] Box<ColdError>),

    /// Hot-tier client failure.
    #[error("hot client: {0}")]
    Client(String),
}

/// Errors from the cold tier executor.
#[derive(Debug, thiserror::Error)]
pub enum ColdError {
    /// The selector cannot satisfy the filter.
    #[error("no miners available satisfying the filter")]
    NoMinersAvailable,

    /// Fewer active deals than the replication factor after a store pass.
    ///
    /// Deals that did activate are in `partial` and must still be
    /// persisted; proposals never shrink.
    #[error("under-replicated: {active} active deals, target {target}")]
    UnderReplicated {
        /// Deal history including any deals made during the failed pass.
        partial: Box<FilInfo>,
        /// Active deal count after the pass.
        active: usize,
        /// The configured replication factor.
        target: usize,
    },

    /// No retrieval offer yielded the data.
    #[error("retrieval of {0} failed: no offer yielded data")]
    RetrievalFailed(Cid),

    /// A proposed deal never reached activation within the polling budget.
    #[error("deal {0} did not activate in time")]
    ActivationTimeout(Cid),

    /// Cold-tier client failure.
    #[error("cold client: {0}")]
    Client(String),
}

/// A cold-tier source the hot executor may unfreeze from.
#[derive(Debug, Clone)]
pub struct UnfreezeSource {
    /// Wallet address paying for the retrieval.
    pub wallet_addr: String,
}

/// Outcome of a renewal pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewalOutcome {
    /// Deal history including any successor deals.
    pub info: FilInfo,
    /// Number of deals renewed in this pass.
    pub renewed: usize,
}

/// Drives the hot tier toward a configured shape for one CID.
#[async_trait::async_trait]
pub trait HotStorage: Send + Sync {
    /// Ensure the object is pinned, within `cfg.ipfs.add_timeout` seconds.
    ///
    /// When the object cannot be fetched from hot peers in time and
    /// `unfreeze` is provided, the executor retrieves the bytes from the
    /// cold tier and pins the result instead.
    async fn pin(
        &self,
        jid: &JobId,
        cid: &Cid,
        cfg: &HotConfig,
        unfreeze: Option<UnfreezeSource>,
    ) -> Result<HotInfo, HotError>;

    /// Remove the pin. Unpinning a CID that is not pinned is not an error.
    async fn unpin(&self, jid: &JobId, cid: &Cid) -> Result<(), HotError>;

    /// Fetch the object's bytes from the hot tier.
    async fn get(&self, cid: &Cid) -> Result<Bytes, HotError>;
}

/// Drives the cold tier toward a configured shape for one CID.
#[async_trait::async_trait]
pub trait ColdStorage: Send + Sync {
    /// Current chain height in epochs, for judging deal activity.
    async fn chain_height(&self) -> Result<u64, ColdError>;

    /// Top up active deals to `cfg.rep_factor`, returning the new history.
    ///
    /// Existing proposals are never removed; reducing the replication
    /// factor leaves them in place.
    async fn store(
        &self,
        jid: &JobId,
        cid: &Cid,
        cfg: &FilConfig,
        info: FilInfo,
    ) -> Result<FilInfo, ColdError>;

    /// Renew deals whose remaining life is at or below the configured
    /// threshold, appending successor proposals.
    async fn ensure_renewals(
        &self,
        jid: &JobId,
        cid: &Cid,
        cfg: &FilConfig,
        info: FilInfo,
    ) -> Result<RenewalOutcome, ColdError>;
}

/// Read-only cold retrieval, handed to the hot executor for unfreezing.
#[async_trait::async_trait]
pub trait ColdRetriever: Send + Sync {
    /// Retrieve the object's bytes from the cold network.
    async fn retrieve(&self, jid: &JobId, cid: &Cid, wallet_addr: &str)
        -> Result<Bytes, ColdError>;
}
