//! The consumed cold-tier client interface.

use bytes::Bytes;
use cid::Cid;
use floe_types::ColdError;

/// On-chain lifecycle of a proposed deal as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChainStatus {
    /// Proposed, not yet sealed into a sector.
    Pending,
    /// Sealed and active on chain.
    Active,
    /// Rejected or lost.
    Failed,
}

/// Deal state snapshot from the cold network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealInfo {
    /// Current on-chain status.
    pub status: OnChainStatus,
    /// Epoch the deal activated at, once known.
    pub activation_epoch: Option<u64>,
    /// Deal length in epochs.
    pub duration: u64,
}

/// One provider's offer to serve a retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOffer {
    /// Provider address.
    pub miner: String,
    /// Asking price in attoFIL.
    pub min_price: u64,
}

/// A Lotus-like market/chain node client.
///
/// All implementations must be `Send + Sync` for use across worker tasks.
#[async_trait::async_trait]
pub trait ColdClient: Send + Sync {
    /// Propose a storage deal; returns the proposal CID.
    async fn start_deal(
        &self,
        data_cid: &Cid,
        miner: &str,
        epoch_price: u64,
        duration: u64,
        wallet_addr: &str,
    ) -> Result<Cid, ColdError>;

    /// Current state of a proposed deal.
    async fn deal_info(&self, proposal_cid: &Cid) -> Result<DealInfo, ColdError>;

    /// Providers currently offering to serve the data.
    async fn find_data(&self, data_cid: &Cid) -> Result<Vec<RetrievalOffer>, ColdError>;

    /// Retrieve the data through one offer.
    async fn retrieve(
        &self,
        data_cid: &Cid,
        offer: &RetrievalOffer,
        wallet_addr: &str,
    ) -> Result<Bytes, ColdError>;

    /// Current chain height in epochs.
    async fn chain_head(&self) -> Result<u64, ColdError>;

    /// Balance of a wallet address in attoFIL.
    async fn wallet_balance(&self, addr: &str) -> Result<u64, ColdError>;

    /// Create a fresh wallet address.
    async fn wallet_new(&self) -> Result<String, ColdError>;
}
