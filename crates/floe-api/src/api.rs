//! [`FloeApi`] — the per-instance facade.

use std::sync::Arc;

use bytes::Bytes;
use cid::Cid;
use floe_scheduler::Scheduler;
use floe_store::SchedStore;
use floe_types::{
    AddrInfo, ApiId, CidConfig, CidInfo, DefaultConfig, InstanceRecord, Job, JobId, LogEntry,
};
use tokio::sync::{mpsc, RwLock};
use tracing::info;

use crate::{ApiError, WalletApi};

/// Options for [`FloeApi::push`].
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    config: Option<CidConfig>,
    override_config: bool,
}

impl PushOptions {
    /// Push with the instance default configuration and no override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an explicit per-CID configuration instead of the default.
    pub fn with_config(mut self, config: CidConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Allow overwriting an existing configuration.
    pub fn with_override(mut self, override_config: bool) -> Self {
        self.override_config = override_config;
        self
    }
}

/// Balance of one instance address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceInfo {
    /// The address and its label.
    pub addr: AddrInfo,
    /// Balance in attoFIL.
    pub balance: u64,
}

/// Instance snapshot: identity, balances, and stored CIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Instance identifier.
    pub id: ApiId,
    /// One entry per owned address.
    pub balances: Vec<BalanceInfo>,
    /// CIDs with a stored configuration, in store order.
    pub pins: Vec<Cid>,
}

/// Per-instance facade over the scheduler.
pub struct FloeApi {
    id: ApiId,
    store: Arc<SchedStore>,
    sched: Arc<Scheduler>,
    wallet: Arc<dyn WalletApi>,
    record: RwLock<InstanceRecord>,
}

impl FloeApi {
    /// Provision a fresh instance: create an initial wallet address,
    /// bind it into the default config's cold wallet slot when that
    /// slot is empty, validate, and persist the instance record.
    pub async fn create(
        store: Arc<SchedStore>,
        sched: Arc<Scheduler>,
        wallet: Arc<dyn WalletApi>,
        mut default_config: DefaultConfig,
    ) -> Result<Self, ApiError> {
        let id = ApiId::new();
        let addr = wallet.new_addr().await?;
        if default_config.cold.filecoin.addr.is_empty() {
            default_config.cold.filecoin.addr = addr.clone();
        }
        default_config.validate()?;

        let record = InstanceRecord {
            id: id.clone(),
            default_config,
            addrs: vec![AddrInfo {
                name: "default".to_string(),
                addr,
            }],
        };
        store.put_instance(&record)?;
        info!(api_id = %id, "instance created");

        Ok(Self {
            id,
            store,
            sched,
            wallet,
            record: RwLock::new(record),
        })
    }

    /// Reattach to a persisted instance.
    pub async fn load(
        id: ApiId,
        store: Arc<SchedStore>,
        sched: Arc<Scheduler>,
        wallet: Arc<dyn WalletApi>,
    ) -> Result<Self, ApiError> {
        let record = store
            .get_instance(&id)?
            .ok_or(ApiError::InstanceNotFound)?;
        info!(api_id = %id, "instance loaded");
        Ok(Self {
            id,
            store,
            sched,
            wallet,
            record: RwLock::new(record),
        })
    }

    /// This instance's identifier.
    pub fn id(&self) -> &ApiId {
        &self.id
    }

    /// Replace the instance default configuration.
    pub async fn set_default_config(&self, config: DefaultConfig) -> Result<(), ApiError> {
        config.validate()?;
        let mut record = self.record.write().await;
        record.default_config = config;
        self.store.put_instance(&record)?;
        Ok(())
    }

    /// The instance default configuration.
    pub async fn default_config(&self) -> DefaultConfig {
        self.record.read().await.default_config.clone()
    }

    /// The default configuration bound to a CID.
    pub async fn get_default_cid_config(&self, cid: Cid) -> CidConfig {
        self.record.read().await.default_config.with_cid(cid)
    }

    /// Push a desired configuration for a CID and queue its
    /// reconciliation job.
    pub async fn push(&self, cid: &Cid, opts: PushOptions) -> Result<JobId, ApiError> {
        let config = match opts.config {
            Some(config) => {
                if config.cid != *cid {
                    return Err(ApiError::InvalidConfig(format!(
                        "configuration is bound to {}, not {cid}",
                        config.cid
                    )));
                }
                config
            }
            None => self.get_default_cid_config(*cid).await,
        };
        config.validate()?;
        Ok(self
            .sched
            .push_config(&self.id, config, None, opts.override_config)?)
    }

    /// Push a CID with the instance default configuration.
    pub async fn push_default(&self, cid: &Cid) -> Result<JobId, ApiError> {
        self.push(cid, PushOptions::new()).await
    }

    /// Apply `c1`'s configuration to `c2` and retire `c1`: its hot pin
    /// is removed and its configuration deleted by the queued job. Cold
    /// deals made for `c1` remain historical fact.
    pub async fn replace(&self, c1: &Cid, c2: &Cid) -> Result<JobId, ApiError> {
        let config = match self.sched.get_cid_config(&self.id, c1) {
            Ok(config) => config,
            Err(floe_scheduler::SchedError::NotFound) => {
                return Err(ApiError::ReplacedCidNotFound)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self
            .sched
            .push_config(&self.id, config.rebind(*c2), Some(*c1), true)?)
    }

    /// Delete a CID's configuration; fails while it keeps a tier enabled.
    pub fn remove(&self, cid: &Cid) -> Result<(), ApiError> {
        Ok(self.sched.remove(&self.id, cid)?)
    }

    /// The stored configuration for a CID.
    pub fn get_cid_config(&self, cid: &Cid) -> Result<CidConfig, ApiError> {
        Ok(self.sched.get_cid_config(&self.id, cid)?)
    }

    /// The observed state for a CID.
    pub fn show(&self, cid: &Cid) -> Result<CidInfo, ApiError> {
        Ok(self.sched.cid_info(cid)?)
    }

    /// Instance snapshot: identity, per-address balances, stored CIDs.
    pub async fn info(&self) -> Result<InstanceInfo, ApiError> {
        let record = self.record.read().await;
        let mut balances = Vec::with_capacity(record.addrs.len());
        for addr in &record.addrs {
            let balance = self.wallet.balance(&addr.addr).await?;
            balances.push(BalanceInfo {
                addr: addr.clone(),
                balance,
            });
        }
        Ok(InstanceInfo {
            id: self.id.clone(),
            balances,
            pins: self.sched.list_cids(&self.id)?,
        })
    }

    /// Fetch the object's bytes from the hot tier; honors the stored
    /// configuration's hot flag.
    pub async fn get(&self, cid: &Cid) -> Result<Bytes, ApiError> {
        Ok(self.sched.get_hot(&self.id, cid).await?)
    }

    /// The instance's wallet addresses.
    pub async fn addrs(&self) -> Vec<AddrInfo> {
        self.record.read().await.addrs.clone()
    }

    /// Create a named wallet address; optionally make it the default
    /// for future cold configurations.
    pub async fn new_addr(&self, name: &str, make_default: bool) -> Result<String, ApiError> {
        let addr = self.wallet.new_addr().await?;
        let mut record = self.record.write().await;
        record.addrs.push(AddrInfo {
            name: name.to_string(),
            addr: addr.clone(),
        });
        if make_default {
            record.default_config.cold.filecoin.addr = addr.clone();
        }
        self.store.put_instance(&record)?;
        Ok(addr)
    }

    /// Stream state transitions for the given jobs; see
    /// [`Scheduler::watch_jobs`].
    pub fn watch_jobs(&self, ids: Vec<JobId>) -> mpsc::Receiver<Job> {
        self.sched.watch_jobs(ids)
    }

    /// Stream a CID's log entries; see [`Scheduler::watch_logs`].
    pub fn watch_logs(
        &self,
        cid: &Cid,
        jid_filter: Option<JobId>,
    ) -> Result<mpsc::Receiver<LogEntry>, ApiError> {
        Ok(self.sched.watch_logs(cid, jid_filter)?)
    }
}
