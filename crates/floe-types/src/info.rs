//! Observed per-CID state.
//!
//! [`CidInfo`] is updated only when a reconciliation job succeeds, and
//! [`FilInfo::proposals`] is monotonic: a deal, once recorded, is
//! historical fact and is never removed.

use cid::Cid;
use serde::{Deserialize, Serialize};

/// Observed state for one CID across both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidInfo {
    /// The CID this record describes.
    pub cid: Cid,
    /// Timestamp (ns since epoch) of the first successful reconciliation.
    pub created: u64,
    /// Hot tier state.
    pub hot: HotInfo,
    /// Cold tier state.
    pub cold: ColdInfo,
}

impl CidInfo {
    /// Empty observed state for a CID with no history.
    pub fn new(cid: Cid) -> Self {
        Self {
            cid,
            created: 0,
            hot: HotInfo::default(),
            cold: ColdInfo {
                filecoin: FilInfo {
                    data_cid: cid,
                    proposals: Vec::new(),
                },
            },
        }
    }
}

/// Hot tier observed state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotInfo {
    /// Whether the object is currently meant to be pinned.
    pub enabled: bool,
    /// Size of the pinned object in bytes.
    pub size: u64,
    /// Present while the object has a hot-tier pin.
    pub ipfs: Option<IpfsHotInfo>,
}

/// Hot-tier pin details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsHotInfo {
    /// When the pin was created (ns since epoch).
    pub created: u64,
}

/// Cold tier observed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdInfo {
    /// Deal history on the cold network.
    pub filecoin: FilInfo,
}

/// Deal history for one CID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilInfo {
    /// The CID the deals cover.
    pub data_cid: Cid,
    /// All deals ever made, in proposal order. Never shrinks.
    pub proposals: Vec<DealProposal>,
}

impl FilInfo {
    /// Count proposals that are active at `height`: unexpired and not made
    /// with an excluded miner.
    pub fn active_count(&self, height: u64, excluded_miners: &[String]) -> usize {
        self.proposals
            .iter()
            .filter(|p| p.is_active(height) && !excluded_miners.contains(&p.miner))
            .count()
    }
}

/// One storage deal with a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealProposal {
    /// Proposal CID on the cold network.
    pub proposal_cid: Cid,
    /// Provider address.
    pub miner: String,
    /// Deal length in epochs.
    pub duration: u64,
    /// Epoch at which the deal activated on chain.
    pub activation_epoch: u64,
    /// Set once a successor deal exists; flips false→true at most once.
    pub renewed: bool,
}

impl DealProposal {
    /// Epoch at which the deal expires.
    pub fn expiry(&self) -> u64 {
        self.activation_epoch + self.duration
    }

    /// Whether the deal is still active at `height`.
    pub fn is_active(&self, height: u64) -> bool {
        self.expiry() > height
    }

    /// Remaining epochs at `height` (zero once expired).
    pub fn remaining(&self, height: u64) -> u64 {
        self.expiry().saturating_sub(height)
    }
}
