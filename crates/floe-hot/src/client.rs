//! The consumed hot-tier client interface.

use bytes::Bytes;
use cid::Cid;
use floe_types::HotError;

/// An IPFS-like hot-tier node client.
///
/// All implementations must be `Send + Sync` for use across worker
/// tasks. CIDs use the multihash-backed CID v1 encoding.
#[async_trait::async_trait]
pub trait HotClient: Send + Sync {
    /// Fetch the object from the peer network and pin it recursively.
    ///
    /// May block indefinitely while the object is unavailable; callers
    /// bound the wait with their own deadline.
    async fn pin_add(&self, cid: &Cid) -> Result<(), HotError>;

    /// List all pinned CIDs.
    async fn pin_ls(&self) -> Result<Vec<Cid>, HotError>;

    /// Remove a pin. Fails with [`HotError::NotFound`] when not pinned.
    async fn pin_rm(&self, cid: &Cid) -> Result<(), HotError>;

    /// Add raw bytes to the node without pinning; returns their CID.
    async fn add(&self, data: Bytes) -> Result<Cid, HotError>;

    /// Fetch the object's bytes.
    async fn get(&self, cid: &Cid) -> Result<Bytes, HotError>;

    /// Cumulative size of the object in bytes.
    async fn stat(&self, cid: &Cid) -> Result<u64, HotError>;

    /// Drop the object's blocks from the node.
    async fn dag_remove(&self, cid: &Cid) -> Result<(), HotError>;
}
