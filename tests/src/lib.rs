//! Shared test harness for floe integration tests.
//!
//! Provides in-process fakes of both consumed networks — [`FakeIpfs`]
//! (hot peer network plus local pin set) and [`Devnet`] (ticking chain,
//! deal table, balances, retrieval offers) — and [`Harness`], which
//! wires store, logger, executors, scheduler, and facade together the
//! way a deployment would.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use floe_api::{FloeApi, WalletApi, WalletError};
use floe_cold::{
    ColdClient, DealInfo, FilCold, FixedMinerSelector, OnChainStatus, RetrievalOffer,
    SelectedMiner,
};
use floe_hot::{HotClient, IpfsHot};
use floe_scheduler::{Scheduler, SchedulerConfig};
use floe_store::{CidLogger, SchedStore};
use floe_types::{CidConfig, ColdError, DefaultConfig, HotError, Job, JobId, JobStatus};
use tokio::time::timeout;

/// Starting balance of every devnet wallet, in attoFIL.
pub const INITIAL_BALANCE: u64 = 4_000_000_000;

static LOG_INIT: Once = Once::new();

/// Initialize a console tracing subscriber once per process.
pub fn init_logging() {
    LOG_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    });
}

/// Deterministic, seed-dependent test data.
pub fn random_bytes(seed: u32, size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed.wrapping_mul(0x9E37_79B9).wrapping_add(0xDEAD_BEEF);
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Content identifier for raw bytes: CID v1 over a BLAKE3 multihash.
pub fn cid_for(data: &[u8]) -> Cid {
    let digest = blake3::hash(data);
    let mh = cid::multihash::Multihash::wrap(0x1e, digest.as_bytes()).unwrap();
    Cid::new_v1(0x55, mh)
}

// =========================================================================
// Fake hot network
// =========================================================================

/// Single-node fake of the hot tier: `blocks` is everything reachable
/// from the peer network, `pins` the local pin set. Pinning an absent
/// object blocks until it appears (or the caller's deadline fires).
#[derive(Default)]
pub struct FakeIpfs {
    blocks: Mutex<HashMap<Cid, Bytes>>,
    pins: Mutex<HashSet<Cid>>,
}

impl FakeIpfs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Seed the network with an object, unpinned; returns its CID.
    pub fn add_file(&self, data: &[u8]) -> Cid {
        let cid = cid_for(data);
        self.blocks
            .lock()
            .unwrap()
            .insert(cid, Bytes::copy_from_slice(data));
        cid
    }

    /// Whether the object is pinned locally.
    pub fn is_pinned(&self, cid: &Cid) -> bool {
        self.pins.lock().unwrap().contains(cid)
    }

    /// Drop the object entirely, pins included (simulates data loss).
    pub fn drop_object(&self, cid: &Cid) {
        self.blocks.lock().unwrap().remove(cid);
        self.pins.lock().unwrap().remove(cid);
    }

    fn lookup(&self, cid: &Cid) -> Option<Bytes> {
        self.blocks.lock().unwrap().get(cid).cloned()
    }
}

#[async_trait]
impl HotClient for FakeIpfs {
    async fn pin_add(&self, cid: &Cid) -> Result<(), HotError> {
        loop {
            if self.blocks.lock().unwrap().contains_key(cid) {
                self.pins.lock().unwrap().insert(*cid);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn pin_ls(&self) -> Result<Vec<Cid>, HotError> {
        Ok(self.pins.lock().unwrap().iter().copied().collect())
    }

    async fn pin_rm(&self, cid: &Cid) -> Result<(), HotError> {
        if self.pins.lock().unwrap().remove(cid) {
            Ok(())
        } else {
            Err(HotError::NotFound(*cid))
        }
    }

    async fn add(&self, data: Bytes) -> Result<Cid, HotError> {
        let cid = cid_for(&data);
        self.blocks.lock().unwrap().insert(cid, data);
        Ok(cid)
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes, HotError> {
        self.lookup(cid).ok_or(HotError::NotFound(*cid))
    }

    async fn stat(&self, cid: &Cid) -> Result<u64, HotError> {
        self.lookup(cid)
            .map(|b| b.len() as u64)
            .ok_or(HotError::NotFound(*cid))
    }

    async fn dag_remove(&self, cid: &Cid) -> Result<(), HotError> {
        self.blocks.lock().unwrap().remove(cid);
        Ok(())
    }
}

// =========================================================================
// Fake cold network
// =========================================================================

struct FakeDeal {
    data_cid: Cid,
    miner: String,
    duration: u64,
    activation: u64,
}

/// In-process devnet: a chain whose height ticks on a timer, a deal
/// table, wallet balances, and retrieval served from bytes snapshotted
/// at deal time (the "import" from the hot tier).
pub struct Devnet {
    ipfs: Arc<FakeIpfs>,
    height: AtomicU64,
    next_id: AtomicU64,
    deals: Mutex<HashMap<Cid, FakeDeal>>,
    stored: Mutex<HashMap<Cid, Bytes>>,
    balances: Mutex<HashMap<String, u64>>,
}

impl Devnet {
    /// Start a devnet whose chain height advances every `block_time`.
    pub fn new(ipfs: Arc<FakeIpfs>, block_time: Duration) -> Arc<Self> {
        let devnet = Arc::new(Self {
            ipfs,
            height: AtomicU64::new(1),
            next_id: AtomicU64::new(0),
            deals: Mutex::new(HashMap::new()),
            stored: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
        });
        let ticker = devnet.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(block_time);
            loop {
                tick.tick().await;
                ticker.height.fetch_add(1, Ordering::SeqCst);
            }
        });
        devnet
    }

    /// Current chain height.
    pub fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn fresh_addr(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let addr = format!("t3addr{n:04}");
        self.balances
            .lock()
            .unwrap()
            .insert(addr.clone(), INITIAL_BALANCE);
        addr
    }

    fn balance_of(&self, addr: &str) -> u64 {
        *self
            .balances
            .lock()
            .unwrap()
            .entry(addr.to_string())
            .or_insert(INITIAL_BALANCE)
    }
}

#[async_trait]
impl ColdClient for Devnet {
    async fn start_deal(
        &self,
        data_cid: &Cid,
        miner: &str,
        epoch_price: u64,
        duration: u64,
        wallet_addr: &str,
    ) -> Result<Cid, ColdError> {
        let data = self
            .ipfs
            .lookup(data_cid)
            .ok_or_else(|| ColdError::Client(format!("{data_cid} not importable from hot tier")))?;

        let cost = epoch_price.saturating_mul(duration);
        {
            let mut balances = self.balances.lock().unwrap();
            let balance = balances
                .entry(wallet_addr.to_string())
                .or_insert(INITIAL_BALANCE);
            if *balance < cost {
                return Err(ColdError::Client("insufficient funds".to_string()));
            }
            *balance -= cost;
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let proposal = cid_for(format!("proposal/{n}").as_bytes());
        let activation = self.height() + 1;
        self.deals.lock().unwrap().insert(
            proposal,
            FakeDeal {
                data_cid: *data_cid,
                miner: miner.to_string(),
                duration,
                activation,
            },
        );
        self.stored.lock().unwrap().insert(*data_cid, data);
        Ok(proposal)
    }

    async fn deal_info(&self, proposal_cid: &Cid) -> Result<DealInfo, ColdError> {
        let deals = self.deals.lock().unwrap();
        let deal = deals
            .get(proposal_cid)
            .ok_or_else(|| ColdError::Client("unknown proposal".to_string()))?;
        let status = if self.height() >= deal.activation {
            OnChainStatus::Active
        } else {
            OnChainStatus::Pending
        };
        Ok(DealInfo {
            status,
            activation_epoch: Some(deal.activation),
            duration: deal.duration,
        })
    }

    async fn find_data(&self, data_cid: &Cid) -> Result<Vec<RetrievalOffer>, ColdError> {
        let deals = self.deals.lock().unwrap();
        let mut offers: Vec<RetrievalOffer> = Vec::new();
        for deal in deals.values() {
            if deal.data_cid == *data_cid && !offers.iter().any(|o| o.miner == deal.miner) {
                offers.push(RetrievalOffer {
                    miner: deal.miner.clone(),
                    min_price: 1,
                });
            }
        }
        Ok(offers)
    }

    async fn retrieve(
        &self,
        data_cid: &Cid,
        _offer: &RetrievalOffer,
        _wallet_addr: &str,
    ) -> Result<Bytes, ColdError> {
        self.stored
            .lock()
            .unwrap()
            .get(data_cid)
            .cloned()
            .ok_or(ColdError::RetrievalFailed(*data_cid))
    }

    async fn chain_head(&self) -> Result<u64, ColdError> {
        Ok(self.height())
    }

    async fn wallet_balance(&self, addr: &str) -> Result<u64, ColdError> {
        Ok(self.balance_of(addr))
    }

    async fn wallet_new(&self) -> Result<String, ColdError> {
        Ok(self.fresh_addr())
    }
}

#[async_trait]
impl WalletApi for Devnet {
    async fn new_addr(&self) -> Result<String, WalletError> {
        Ok(self.fresh_addr())
    }

    async fn balance(&self, addr: &str) -> Result<u64, WalletError> {
        Ok(self.balance_of(addr))
    }
}

// =========================================================================
// Harness
// =========================================================================

/// Countries assigned to the fixed miner pool, in miner order.
const COUNTRIES: [&str; 4] = ["CN", "UY", "BR", "DE"];

/// Fixed miner pool `t01000..`, one country each, 1000 attoFIL/epoch.
pub fn fixed_miners(n: usize) -> Vec<SelectedMiner> {
    (0..n)
        .map(|i| SelectedMiner {
            addr: format!("t0{}", 1000 + i),
            country: COUNTRIES[i % COUNTRIES.len()].to_string(),
            epoch_price: 1000,
        })
        .collect()
}

/// Harness tuning.
#[derive(Clone)]
pub struct HarnessConfig {
    pub num_miners: usize,
    pub block_time: Duration,
    pub renew_interval: Duration,
    pub repair_interval: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            num_miners: 1,
            block_time: Duration::from_millis(50),
            renew_interval: Duration::from_millis(100),
            repair_interval: Duration::from_millis(200),
        }
    }
}

/// A fully wired floe stack over in-process fakes.
pub struct Harness {
    pub ipfs: Arc<FakeIpfs>,
    pub devnet: Arc<Devnet>,
    pub store: Arc<SchedStore>,
    pub sched: Arc<Scheduler>,
    pub api: FloeApi,
    config: HarnessConfig,
}

impl Harness {
    /// In-memory harness with `num_miners` fixed miners.
    pub async fn new(num_miners: usize) -> Self {
        Self::with_config(HarnessConfig {
            num_miners,
            ..HarnessConfig::default()
        })
        .await
    }

    /// In-memory harness with explicit tuning.
    pub async fn with_config(config: HarnessConfig) -> Self {
        init_logging();
        let store = Arc::new(SchedStore::in_memory());
        Self::assemble(store, config).await
    }

    /// Harness over a persistent store path, for reload tests.
    pub async fn persistent(path: &Path, config: HarnessConfig) -> Self {
        init_logging();
        let store = Arc::new(SchedStore::open(path).unwrap());
        Self::assemble(store, config).await
    }

    /// Tear down the scheduler and reattach to the same store path as
    /// the pre-close instance.
    pub async fn reopen(self, path: &Path) -> Self {
        let id = self.api.id().clone();
        let config = self.config.clone();
        let ipfs = self.ipfs.clone();
        let devnet = self.devnet.clone();
        self.sched.close().await;
        drop(self.api);
        drop(self.sched);
        drop(self.store);
        // Give the runtime a beat to drop the store handles.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let store = Arc::new(SchedStore::open(path).unwrap());
        let logger = Arc::new(CidLogger::new(store.clone()));
        let sched = Self::executors(&config, store.clone(), logger, ipfs.clone(), devnet.clone());
        let api = FloeApi::load(id, store.clone(), sched.clone(), devnet.clone())
            .await
            .unwrap();
        Self {
            ipfs,
            devnet,
            store,
            sched,
            api,
            config,
        }
    }

    fn executors(
        config: &HarnessConfig,
        store: Arc<SchedStore>,
        logger: Arc<CidLogger>,
        ipfs: Arc<FakeIpfs>,
        devnet: Arc<Devnet>,
    ) -> Arc<Scheduler> {
        let selector = Arc::new(FixedMinerSelector::new(fixed_miners(config.num_miners)));
        let cold = Arc::new(
            FilCold::new(devnet, selector, logger.clone())
                .with_activation_polling(Duration::from_millis(25), 400),
        );
        let hot = Arc::new(IpfsHot::new(ipfs, logger.clone()).with_retriever(cold.clone()));
        Scheduler::start(
            store,
            logger,
            hot,
            cold,
            SchedulerConfig {
                workers: 4,
                renew_interval: config.renew_interval,
                repair_interval: config.repair_interval,
            },
        )
        .unwrap()
    }

    async fn assemble(store: Arc<SchedStore>, config: HarnessConfig) -> Self {
        let ipfs = FakeIpfs::new();
        let devnet = Devnet::new(ipfs.clone(), config.block_time);
        let logger = Arc::new(CidLogger::new(store.clone()));
        let sched = Self::executors(&config, store.clone(), logger, ipfs.clone(), devnet.clone());

        let default_config = DefaultConfig {
            hot: floe_types::HotConfig {
                enabled: true,
                allow_unfreeze: false,
                ipfs: floe_types::IpfsConfig { add_timeout: 2 },
            },
            cold: floe_types::ColdConfig {
                enabled: true,
                filecoin: floe_types::FilConfig {
                    deal_duration: 1000,
                    rep_factor: 1,
                    ..floe_types::FilConfig::default()
                },
            },
            repairable: false,
        };
        let api = FloeApi::create(store.clone(), sched.clone(), devnet.clone(), default_config)
            .await
            .unwrap();

        Self {
            ipfs,
            devnet,
            store,
            sched,
            api,
            config,
        }
    }

    /// Seed the hot network with 600 deterministic bytes.
    pub fn add_random_file(&self, seed: u32) -> (Cid, Vec<u8>) {
        let data = random_bytes(seed, 600);
        let cid = self.ipfs.add_file(&data);
        (cid, data)
    }
}

/// Wait for a job to reach a terminal state.
pub async fn wait_terminal(api: &FloeApi, jid: &JobId) -> Job {
    let mut rx = api.watch_jobs(vec![jid.clone()]);
    loop {
        match timeout(Duration::from_secs(20), rx.recv()).await {
            Ok(Some(job)) if job.status.is_terminal() => return job,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("job watch channel closed"),
            Err(_) => panic!("timed out waiting for job {jid}"),
        }
    }
}

/// Wait for the job and assert it succeeded.
pub async fn require_success(api: &FloeApi, jid: &JobId) -> Job {
    let job = wait_terminal(api, jid).await;
    assert_eq!(
        job.status,
        JobStatus::Success,
        "job {jid} failed: {:?}",
        job.err_cause
    );
    job
}

/// Wait for the job and assert it failed.
pub async fn require_failed(api: &FloeApi, jid: &JobId) -> Job {
    let job = wait_terminal(api, jid).await;
    assert_eq!(job.status, JobStatus::Failed, "job {jid} should have failed");
    job
}

/// Assert the stored configuration equals `config` (or the instance
/// default bound to the CID when `None`).
pub async fn require_config(api: &FloeApi, cid: &Cid, config: Option<&CidConfig>) {
    let expected = match config {
        Some(c) => c.clone(),
        None => api.get_default_cid_config(*cid).await,
    };
    let stored = api.get_cid_config(cid).unwrap();
    assert_eq!(stored, expected);
}

/// Assert the cold network has (or lacks) retrieval offers for a CID.
pub async fn require_fil_stored(devnet: &Devnet, cid: &Cid, stored: bool) {
    let offers = devnet.find_data(cid).await.unwrap();
    if stored {
        assert!(!offers.is_empty(), "{cid} should have cold-tier offers");
    } else {
        assert!(offers.is_empty(), "{cid} should have no cold-tier offers");
    }
}
