//! Provider selection.

use floe_types::{ColdError, FilConfig};

/// Constraints a selection must satisfy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinerFilter {
    /// Providers that must not be selected.
    pub excluded: Vec<String>,
    /// If non-empty, only providers in these countries qualify.
    pub country_codes: Vec<String>,
    /// Maximum price in attoFIL per epoch; `None` means unbounded.
    pub max_price: Option<u64>,
}

impl MinerFilter {
    /// Derive the filter from a deal configuration.
    pub fn from_config(cfg: &FilConfig) -> Self {
        Self {
            excluded: cfg.excluded_miners.clone(),
            country_codes: cfg.country_codes.clone(),
            max_price: cfg.max_price,
        }
    }

    fn admits(&self, miner: &SelectedMiner) -> bool {
        if self.excluded.contains(&miner.addr) {
            return false;
        }
        if !self.country_codes.is_empty() && !self.country_codes.contains(&miner.country) {
            return false;
        }
        if let Some(max) = self.max_price {
            if miner.epoch_price > max {
                return false;
            }
        }
        true
    }
}

/// One ranked provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMiner {
    /// Provider address.
    pub addr: String,
    /// Provider country.
    pub country: String,
    /// Asking price in attoFIL per epoch.
    pub epoch_price: u64,
}

/// Provider-ranking policy.
///
/// Must return exactly `n` miners when the pool allows it, in an order
/// that is deterministic for a given pool.
pub trait MinerSelector: Send + Sync {
    /// Return `n` providers satisfying `filter`, or fail with
    /// [`ColdError::NoMinersAvailable`].
    fn get_miners(&self, n: usize, filter: &MinerFilter) -> Result<Vec<SelectedMiner>, ColdError>;
}

/// Selector over a fixed provider pool, in pool order.
pub struct FixedMinerSelector {
    miners: Vec<SelectedMiner>,
}

impl FixedMinerSelector {
    /// Create a selector over the given pool.
    pub fn new(miners: Vec<SelectedMiner>) -> Self {
        Self { miners }
    }
}

impl MinerSelector for FixedMinerSelector {
    fn get_miners(&self, n: usize, filter: &MinerFilter) -> Result<Vec<SelectedMiner>, ColdError> {
        let picked: Vec<SelectedMiner> = self
            .miners
            .iter()
            .filter(|m| filter.admits(m))
            .take(n)
            .cloned()
            .collect();
        if picked.len() < n {
            return Err(ColdError::NoMinersAvailable);
        }
        Ok(picked)
    }
}
