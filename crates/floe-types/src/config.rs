//! Desired-state storage configuration.
//!
//! A [`DefaultConfig`] is the instance-level fallback; binding it to a CID
//! with [`DefaultConfig::with_cid`] yields a [`CidConfig`], the unit the
//! scheduler reconciles against. Builder-style `with_*` methods derive
//! variants without mutating the original.

use cid::Cid;
use serde::{Deserialize, Serialize};

/// Default deal length in epochs when none is configured.
pub const DEFAULT_DEAL_DURATION: u64 = 1000;

/// Default hot-tier import timeout in seconds.
pub const DEFAULT_ADD_TIMEOUT: u64 = 10;

/// Validation failure: one aggregated, human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid storage configuration: {0}")]
pub struct ConfigError(pub String);

/// Instance-level fallback configuration, applied when a push names no
/// explicit per-CID config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultConfig {
    /// Hot tier shape.
    pub hot: HotConfig,
    /// Cold tier shape.
    pub cold: ColdConfig,
    /// Whether CIDs pushed with this config join the repair loop.
    pub repairable: bool,
}

impl DefaultConfig {
    /// Bind this default to a concrete CID.
    pub fn with_cid(&self, cid: Cid) -> CidConfig {
        CidConfig {
            cid,
            hot: self.hot.clone(),
            cold: self.cold.clone(),
            repairable: self.repairable,
        }
    }

    /// Structural validation; returns a single aggregated error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_parts(&self.hot, &self.cold)
    }
}

/// Desired state for a single CID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CidConfig {
    /// The CID this configuration applies to.
    pub cid: Cid,
    /// Hot tier shape.
    pub hot: HotConfig,
    /// Cold tier shape.
    pub cold: ColdConfig,
    /// Whether this CID is eligible for the repair loop.
    pub repairable: bool,
}

impl CidConfig {
    /// Structural validation; returns a single aggregated error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_parts(&self.hot, &self.cold)
    }

    /// Whether this config keeps the CID active in storage.
    pub fn is_active(&self) -> bool {
        self.hot.enabled || self.cold.enabled
    }

    /// Rebind this configuration to a different CID.
    pub fn rebind(mut self, cid: Cid) -> Self {
        self.cid = cid;
        self
    }

    pub fn with_repairable(mut self, repairable: bool) -> Self {
        self.repairable = repairable;
        self
    }

    pub fn with_hot_enabled(mut self, enabled: bool) -> Self {
        self.hot.enabled = enabled;
        self
    }

    pub fn with_allow_unfreeze(mut self, allow: bool) -> Self {
        self.hot.allow_unfreeze = allow;
        self
    }

    pub fn with_add_timeout(mut self, seconds: u64) -> Self {
        self.hot.ipfs.add_timeout = seconds;
        self
    }

    pub fn with_cold_enabled(mut self, enabled: bool) -> Self {
        self.cold.enabled = enabled;
        self
    }

    pub fn with_cold_addr(mut self, addr: impl Into<String>) -> Self {
        self.cold.filecoin.addr = addr.into();
        self
    }

    pub fn with_deal_duration(mut self, epochs: u64) -> Self {
        self.cold.filecoin.deal_duration = epochs;
        self
    }

    pub fn with_rep_factor(mut self, rep_factor: usize) -> Self {
        self.cold.filecoin.rep_factor = rep_factor;
        self
    }

    pub fn with_excluded_miners(mut self, miners: Vec<String>) -> Self {
        self.cold.filecoin.excluded_miners = miners;
        self
    }

    pub fn with_country_codes(mut self, codes: Vec<String>) -> Self {
        self.cold.filecoin.country_codes = codes;
        self
    }

    pub fn with_max_price(mut self, atto_fil_per_epoch: u64) -> Self {
        self.cold.filecoin.max_price = Some(atto_fil_per_epoch);
        self
    }

    pub fn with_renew(mut self, enabled: bool, threshold: u64) -> Self {
        self.cold.filecoin.renew = RenewConfig { enabled, threshold };
        self
    }
}

/// Hot tier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotConfig {
    /// Whether the CID should be pinned in the hot tier.
    pub enabled: bool,
    /// Whether a failed hot import may fall back to a cold retrieval.
    pub allow_unfreeze: bool,
    /// Hot-tier client parameters.
    pub ipfs: IpfsConfig,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_unfreeze: false,
            ipfs: IpfsConfig::default(),
        }
    }
}

/// Hot-tier import parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsConfig {
    /// Deadline in seconds for importing the object into the hot tier.
    pub add_timeout: u64,
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            add_timeout: DEFAULT_ADD_TIMEOUT,
        }
    }
}

/// Cold tier configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColdConfig {
    /// Whether the CID should be stored in the cold tier.
    pub enabled: bool,
    /// Deal-making parameters.
    pub filecoin: FilConfig,
}

impl Default for ColdConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filecoin: FilConfig::default(),
        }
    }
}

/// Deal-making parameters for the cold tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilConfig {
    /// Wallet address funding the deals.
    pub addr: String,
    /// Deal length in epochs.
    pub deal_duration: u64,
    /// Desired number of concurrently active deals.
    pub rep_factor: usize,
    /// Providers that must never be selected.
    pub excluded_miners: Vec<String>,
    /// If non-empty, restrict selection to providers in these countries.
    pub country_codes: Vec<String>,
    /// Maximum price in attoFIL per epoch; `None` means unbounded.
    pub max_price: Option<u64>,
    /// Automatic renewal of expiring deals.
    pub renew: RenewConfig,
}

impl Default for FilConfig {
    fn default() -> Self {
        Self {
            addr: String::new(),
            deal_duration: DEFAULT_DEAL_DURATION,
            rep_factor: 1,
            excluded_miners: Vec::new(),
            country_codes: Vec::new(),
            max_price: None,
            renew: RenewConfig::default(),
        }
    }
}

/// Deal renewal policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewConfig {
    /// Whether expiring deals are renewed automatically.
    pub enabled: bool,
    /// Remaining epochs at or below which a deal is considered expiring.
    pub threshold: u64,
}

/// Shared validation used by both config flavors.
///
/// Rules are a table of structural checks; violations aggregate into one
/// error message.
fn validate_parts(hot: &HotConfig, cold: &ColdConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    if hot.enabled && hot.ipfs.add_timeout == 0 {
        problems.push("hot: add timeout must be greater than zero");
    }
    if cold.enabled {
        if cold.filecoin.addr.is_empty() {
            problems.push("cold: wallet address is required");
        }
        if cold.filecoin.rep_factor == 0 {
            problems.push("cold: replication factor must be at least 1");
        }
        if cold.filecoin.deal_duration == 0 {
            problems.push("cold: deal duration must be greater than zero");
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError(problems.join("; ")))
    }
}
