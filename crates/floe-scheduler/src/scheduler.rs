//! The [`Scheduler`] — job lifecycle, execution policy, control loops,
//! and watchable event streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use cid::Cid;
use floe_store::{CidLogger, SchedStore, StoreError};
use floe_types::{
    unix_nanos, Action, ApiId, CidConfig, CidInfo, ColdError, ColdStorage, HotError, HotInfo,
    HotStorage, Job, JobId, JobStatus, LogEntry, UnfreezeSource,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::ring::{WorkItem, WorkRing};
use crate::SchedError;

/// Buffered job events before slow watchers observe a lag signal.
const JOB_CHANNEL_CAPACITY: usize = 256;

/// Per-watcher channel depth.
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Size of the worker pool draining the work ring.
    pub workers: usize,
    /// Cadence of the renewal loop; natural unit is the average block time.
    pub renew_interval: Duration,
    /// Cadence of the repair loop.
    pub repair_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            renew_interval: Duration::from_secs(30),
            repair_interval: Duration::from_secs(30),
        }
    }
}

/// The reconciliation engine: serializes work per CID, drives the tier
/// executors, and runs the background control loops.
pub struct Scheduler {
    store: Arc<SchedStore>,
    logger: Arc<CidLogger>,
    hot: Arc<dyn HotStorage>,
    cold: Arc<dyn ColdStorage>,
    ring: Arc<WorkRing>,
    job_events: broadcast::Sender<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Replay open work from the store and start the worker pool and
    /// control loops. Must be called within a tokio runtime.
    pub fn start(
        store: Arc<SchedStore>,
        logger: Arc<CidLogger>,
        hot: Arc<dyn HotStorage>,
        cold: Arc<dyn ColdStorage>,
        config: SchedulerConfig,
    ) -> Result<Arc<Self>, SchedError> {
        let (job_events, _) = broadcast::channel(JOB_CHANNEL_CAPACITY);
        let sched = Arc::new(Self {
            store,
            logger,
            hot,
            cold,
            ring: Arc::new(WorkRing::new()),
            job_events,
            workers: Mutex::new(Vec::new()),
            loops: Mutex::new(Vec::new()),
        });

        sched.replay()?;

        let mut workers = Vec::new();
        for n in 0..config.workers.max(1) {
            let s = sched.clone();
            workers.push(tokio::spawn(async move { s.run_worker(n).await }));
        }
        *sched.workers.lock().unwrap() = workers;

        let renew = {
            let s = sched.clone();
            tokio::spawn(async move { s.run_renew_loop(config.renew_interval).await })
        };
        let repair = {
            let s = sched.clone();
            tokio::spawn(async move { s.run_repair_loop(config.repair_interval).await })
        };
        *sched.loops.lock().unwrap() = vec![renew, repair];

        info!(workers = config.workers.max(1), "scheduler started");
        Ok(sched)
    }

    /// Stop the control loops and let in-flight workers finish their
    /// current job. Queued work stays persisted for restart recovery.
    pub async fn close(&self) {
        for handle in std::mem::take(&mut *self.loops.lock().unwrap()) {
            handle.abort();
            let _ = handle.await;
        }
        self.ring.shutdown();
        for handle in std::mem::take(&mut *self.workers.lock().unwrap()) {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Persist a desired configuration and queue its reconciliation job.
    ///
    /// When a configuration already exists for the CID the push is
    /// rejected with [`SchedError::NoChange`] unless `override_config`
    /// is set. `replaces` names a CID whose config this push subsumes.
    pub fn push_config(
        &self,
        api_id: &ApiId,
        config: CidConfig,
        replaces: Option<Cid>,
        override_config: bool,
    ) -> Result<JobId, SchedError> {
        let cid = config.cid;
        if let Some(replaced) = &replaces {
            if self.store.get_config(api_id, replaced)?.is_none() {
                return Err(SchedError::ReplacedCidNotFound);
            }
        }
        if !override_config && self.store.get_config(api_id, &cid)?.is_some() {
            return Err(SchedError::NoChange);
        }

        let jid = JobId::new();
        let job = Job::queued(jid.clone(), api_id.clone(), cid);
        let action = Action {
            api_id: api_id.clone(),
            cid,
            jid: jid.clone(),
            config: config.clone(),
            replaced: replaces,
        };

        let mut batch = self.store.batch();
        batch.put_config(api_id, &config)?;
        batch.put_action(&action)?;
        batch.create_job(&job)?;
        batch.commit()?;

        debug!(%cid, %jid, "configuration pushed");
        self.logger.log(&cid, &jid, "configuration saved, job queued");
        self.publish(job);

        if let Some(superseded) = self.ring.push(WorkItem::Reconcile { action }) {
            self.cancel_job(&superseded.jid);
        }
        Ok(jid)
    }

    /// Delete a CID's configuration. Fails while the configuration keeps
    /// any tier enabled; observed history is retained.
    pub fn remove(&self, api_id: &ApiId, cid: &Cid) -> Result<(), SchedError> {
        let config = self
            .store
            .get_config(api_id, cid)?
            .ok_or(SchedError::NotFound)?;
        if config.is_active() {
            return Err(SchedError::ActiveInStorage);
        }
        let mut batch = self.store.batch();
        batch.remove_config(api_id, cid);
        batch.remove_action(api_id, cid);
        batch.commit()?;
        if let Some(job) = self.store.latest_job(api_id, cid)? {
            self.logger.log(cid, &job.id, "configuration removed from instance");
        }
        Ok(())
    }

    /// The stored configuration for a CID.
    pub fn get_cid_config(&self, api_id: &ApiId, cid: &Cid) -> Result<CidConfig, SchedError> {
        self.store
            .get_config(api_id, cid)?
            .ok_or(SchedError::NotFound)
    }

    /// All CIDs with a stored configuration in this instance.
    pub fn list_cids(&self, api_id: &ApiId) -> Result<Vec<Cid>, SchedError> {
        Ok(self
            .store
            .list_configs(api_id)?
            .into_iter()
            .map(|c| c.cid)
            .collect())
    }

    /// The observed state for a CID.
    pub fn cid_info(&self, cid: &Cid) -> Result<CidInfo, SchedError> {
        self.store.get_cid_info(cid)?.ok_or(SchedError::NotFound)
    }

    /// A job by id.
    pub fn get_job(&self, jid: &JobId) -> Result<Job, SchedError> {
        self.store.get_job(jid)?.ok_or(SchedError::NotFound)
    }

    /// Fetch the object's bytes from the hot tier, honoring the stored
    /// configuration: disabled hot storage fails regardless of the
    /// physical pin state.
    pub async fn get_hot(&self, api_id: &ApiId, cid: &Cid) -> Result<Bytes, SchedError> {
        let config = self
            .store
            .get_config(api_id, cid)?
            .ok_or(SchedError::NotFound)?;
        if !config.hot.enabled {
            return Err(SchedError::HotStorageDisabled);
        }
        Ok(self.hot.get(cid).await?)
    }

    /// Stream state transitions for the given jobs. Each job's current
    /// state is delivered first, so a terminal transition is never
    /// missed. Dropping the receiver ends the watch.
    pub fn watch_jobs(&self, ids: Vec<JobId>) -> mpsc::Receiver<Job> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let mut events = self.job_events.subscribe();

        // Snapshot after subscribing: anything that commits in between
        // is also in the event buffer and deduplicated by rank below.
        let mut last_rank: HashMap<JobId, u8> = HashMap::new();
        for id in &ids {
            if let Ok(Some(job)) = self.store.get_job(id) {
                last_rank.insert(id.clone(), job.status.rank());
                let _ = tx.try_send(job);
            }
        }

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(job) => {
                        if !ids.contains(&job.id) {
                            continue;
                        }
                        let rank = job.status.rank();
                        if last_rank.get(&job.id).is_some_and(|r| *r > rank) {
                            continue;
                        }
                        last_rank.insert(job.id.clone(), rank);
                        if tx.send(job).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "job watcher lagged behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        rx
    }

    /// Stream a CID's log: stored entries first, then live appends. An
    /// optional job filter suppresses entries from other jobs. Dropping
    /// the receiver ends the watch.
    pub fn watch_logs(
        &self,
        cid: &Cid,
        jid_filter: Option<JobId>,
    ) -> Result<mpsc::Receiver<LogEntry>, SchedError> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let mut events = self.logger.subscribe();

        let mut last_ts = 0;
        for entry in self.logger.history(cid)? {
            if jid_filter.as_ref().is_some_and(|f| *f != entry.jid) {
                continue;
            }
            last_ts = entry.timestamp;
            let _ = tx.try_send(entry);
        }

        let cid = *cid;
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(entry) => {
                        if entry.cid != cid || entry.timestamp <= last_ts {
                            continue;
                        }
                        if jid_filter.as_ref().is_some_and(|f| *f != entry.jid) {
                            continue;
                        }
                        if tx.send(entry).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "log watcher lagged behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(rx)
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    fn publish(&self, job: Job) {
        let _ = self.job_events.send(job);
    }

    /// Transition a superseded queued job to `Cancelled`.
    fn cancel_job(&self, jid: &JobId) {
        let job = match self.store.get_job(jid) {
            Ok(Some(job)) if !job.status.is_terminal() => job,
            Ok(_) => return,
            Err(e) => {
                error!(%jid, error = %e, "failed to load job for cancellation");
                return;
            }
        };
        let mut job = job;
        job.status = JobStatus::Cancelled;
        if let Err(e) = self.store.save_job(&job) {
            error!(%jid, error = %e, "failed to persist job cancellation");
            return;
        }
        self.logger
            .log(&job.cid, &job.id, "superseded by a newer configuration push");
        self.publish(job);
    }

    /// Requeue open work after a restart. The latest job per `(api, cid)`
    /// pair goes back on the ring; older open jobs are cancelled.
    fn replay(&self) -> Result<(), SchedError> {
        let open = self.store.open_jobs()?;
        let count = open.len();
        for mut job in open {
            let is_latest = self
                .store
                .latest_job(&job.api_id, &job.cid)?
                .is_some_and(|l| l.id == job.id);
            if !is_latest {
                self.cancel_job(&job.id);
                continue;
            }
            if job.status == JobStatus::Executing {
                job.status = JobStatus::Queued;
                self.store.save_job(&job)?;
            }
            let action = match self.store.get_action(&job.api_id, &job.cid)? {
                Some(a) if a.jid == job.id => a,
                // The action was superseded or lost; rebuild the intent
                // from the stored configuration.
                _ => match self.store.get_config(&job.api_id, &job.cid)? {
                    Some(config) => Action {
                        api_id: job.api_id.clone(),
                        cid: job.cid,
                        jid: job.id.clone(),
                        config,
                        replaced: None,
                    },
                    None => {
                        self.cancel_job(&job.id);
                        continue;
                    }
                },
            };
            self.ring.push(WorkItem::Reconcile { action });
        }
        if count > 0 {
            info!(count, "requeued open jobs from the store");
        }
        Ok(())
    }

    async fn run_worker(&self, n: usize) {
        debug!(worker = n, "worker started");
        while let Some((key, item)) = self.ring.next().await {
            match item {
                WorkItem::Reconcile { action } => self.execute_reconcile(action).await,
                WorkItem::Renew { api_id, config } => self.execute_renew(api_id, config).await,
            }
            self.ring.done(&key);
        }
        debug!(worker = n, "worker stopped");
    }

    async fn execute_reconcile(&self, action: Action) {
        let Action {
            api_id,
            cid,
            jid,
            config,
            replaced,
        } = action;

        let mut job = match self.store.get_job(&jid) {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(%jid, %cid, "job record missing for queued action");
                return;
            }
            Err(e) => {
                error!(%jid, %cid, error = %e, "failed to load job");
                return;
            }
        };
        if job.status.is_terminal() {
            return;
        }

        job.status = JobStatus::Executing;
        if let Err(e) = self.store.save_job(&job) {
            error!(%jid, error = %e, "failed to persist job transition");
            return;
        }
        self.logger.log(&cid, &jid, "executing storage configuration");
        self.publish(job.clone());

        let (info, failure) = match self.reconcile(&jid, &cid, &config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Store-layer failure: fatal to the job.
                error!(%jid, %cid, error = %e, "store failure during reconciliation");
                (CidInfo::new(cid), Some(format!("store failure: {e}")))
            }
        };

        let mut info = info;
        if failure.is_none() {
            if info.created == 0 {
                info.created = unix_nanos();
            }
            job.status = JobStatus::Success;
            job.err_cause = None;
        } else {
            job.status = JobStatus::Failed;
            job.err_cause = failure;
        }

        // Partial results are still history: on failure, persist whatever
        // part of the state advanced before it.
        let persist_info = job.status == JobStatus::Success
            || info.created != 0
            || !info.cold.filecoin.proposals.is_empty();

        // Observed state, the terminal transition, and the action
        // removal land as one transaction; a newer action for the pair
        // keeps its own record.
        let committed: Result<(), StoreError> = (|| {
            let mut batch = self.store.batch();
            if persist_info {
                batch.put_cid_info(&info)?;
            }
            batch.save_job(&job)?;
            if let Some(a) = self.store.get_action(&api_id, &cid)? {
                if a.jid == jid {
                    batch.remove_action(&api_id, &cid);
                }
            }
            batch.commit()
        })();
        if let Err(e) = committed {
            error!(%jid, %cid, error = %e, "failed to persist terminal job state");
        }

        if job.status == JobStatus::Success {
            if let Some(rcid) = replaced {
                self.finish_replace(&api_id, &jid, &rcid).await;
            }
        }

        match &job.err_cause {
            None => self.logger.log(&cid, &jid, "job executed successfully"),
            Some(cause) => self
                .logger
                .log(&cid, &jid, format!("job failed: {cause}")),
        }
        info!(%jid, %cid, status = %job.status, "job finished");
        self.publish(job);
    }

    /// Apply the execution policy for one job. Returns the observed
    /// state to persist and the failure cause, if any.
    ///
    /// A hot import timeout with the cold tier enabled does not abort
    /// the cold step — its results are persisted and the job still
    /// fails with the timeout as cause. Any other executor failure
    /// aborts the remaining steps.
    async fn reconcile(
        &self,
        jid: &JobId,
        cid: &Cid,
        config: &CidConfig,
    ) -> Result<(CidInfo, Option<String>), SchedError> {
        let mut info = self
            .store
            .get_cid_info(cid)?
            .unwrap_or_else(|| CidInfo::new(*cid));
        let mut failures: Vec<String> = Vec::new();

        if config.hot.enabled {
            let unfreeze = if config.hot.allow_unfreeze
                && !info.cold.filecoin.proposals.is_empty()
            {
                Some(UnfreezeSource {
                    wallet_addr: config.cold.filecoin.addr.clone(),
                })
            } else {
                None
            };
            match self.hot.pin(jid, cid, &config.hot, unfreeze).await {
                Ok(hot) => info.hot = hot,
                Err(e @ HotError::ImportTimeout { .. }) if config.cold.enabled => {
                    self.logger.log(cid, jid, format!("hot import failed: {e}"));
                    failures.push(e.to_string());
                }
                Err(e) => {
                    self.logger.log(cid, jid, format!("hot import failed: {e}"));
                    return Ok((info, Some(e.to_string())));
                }
            }
        } else if info.hot.enabled {
            match self.hot.unpin(jid, cid).await {
                Ok(()) => {
                    info.hot = HotInfo {
                        enabled: false,
                        size: 0,
                        ipfs: None,
                    };
                }
                Err(e) => {
                    self.logger.log(cid, jid, format!("hot unpin failed: {e}"));
                    return Ok((info, Some(e.to_string())));
                }
            }
        }

        if config.cold.enabled {
            match self
                .cold
                .store(jid, cid, &config.cold.filecoin, info.cold.filecoin.clone())
                .await
            {
                Ok(fil) => info.cold.filecoin = fil,
                Err(ColdError::UnderReplicated {
                    partial,
                    active,
                    target,
                }) => {
                    // Deals that did activate are history regardless.
                    info.cold.filecoin = *partial;
                    let cause = format!("under-replicated: {active} active deals, target {target}");
                    self.logger.log(cid, jid, format!("cold storage failed: {cause}"));
                    failures.push(cause);
                }
                Err(e) => {
                    self.logger.log(cid, jid, format!("cold storage failed: {e}"));
                    failures.push(e.to_string());
                }
            }
        }

        let failure = if failures.is_empty() {
            None
        } else {
            Some(failures.join("; "))
        };
        Ok((info, failure))
    }

    /// Post-success half of a replace: unpin the replaced CID and drop
    /// its configuration. Cold deals for it remain historical fact.
    async fn finish_replace(&self, api_id: &ApiId, jid: &JobId, rcid: &Cid) {
        if let Err(e) = self.hot.unpin(jid, rcid).await {
            warn!(cid = %rcid, error = %e, "failed to unpin replaced cid");
        }
        let mut batch = self.store.batch();
        batch.remove_config(api_id, rcid);
        batch.remove_action(api_id, rcid);
        if let Err(e) = batch.commit() {
            error!(cid = %rcid, error = %e, "failed to retire replaced cid");
        }
    }

    async fn execute_renew(&self, api_id: ApiId, config: CidConfig) {
        let cid = config.cid;
        let info = match self.store.get_cid_info(&cid) {
            Ok(Some(info)) => info,
            Ok(None) => return,
            Err(e) => {
                error!(%cid, error = %e, "failed to load cid info for renewal");
                return;
            }
        };
        if info.cold.filecoin.proposals.is_empty() {
            return;
        }

        let jid = JobId::new();
        match self
            .cold
            .ensure_renewals(&jid, &cid, &config.cold.filecoin, info.cold.filecoin.clone())
            .await
        {
            Ok(outcome) if outcome.renewed > 0 => {
                let mut info = info;
                info.cold.filecoin = outcome.info;
                let mut job = Job::queued(jid.clone(), api_id, cid);
                job.status = JobStatus::Success;
                let committed: Result<(), StoreError> = (|| {
                    let mut batch = self.store.batch();
                    batch.put_cid_info(&info)?;
                    batch.create_job(&job)?;
                    batch.commit()
                })();
                if let Err(e) = committed {
                    error!(%cid, error = %e, "failed to persist renewal");
                    return;
                }
                self.logger.log(
                    &cid,
                    &jid,
                    format!("renewed {} expiring deal(s)", outcome.renewed),
                );
                info!(%cid, %jid, renewed = outcome.renewed, "deals renewed");
                self.publish(job);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%cid, error = %e, "renewal evaluation failed");
            }
        }
    }

    async fn run_renew_loop(&self, period: Duration) {
        let mut tick = interval(period);
        loop {
            tick.tick().await;
            let configs = match self.store.list_all_configs() {
                Ok(configs) => configs,
                Err(e) => {
                    error!(error = %e, "renew loop failed to list configurations");
                    continue;
                }
            };
            for (api_id, config) in configs {
                if config.cold.enabled && config.cold.filecoin.renew.enabled {
                    self.ring.push_if_absent(WorkItem::Renew { api_id, config });
                }
            }
        }
    }

    async fn run_repair_loop(&self, period: Duration) {
        let mut tick = interval(period);
        loop {
            tick.tick().await;
            let configs = match self.store.list_all_configs() {
                Ok(configs) => configs,
                Err(e) => {
                    error!(error = %e, "repair loop failed to list configurations");
                    continue;
                }
            };
            if !configs.iter().any(|(_, c)| c.repairable) {
                continue;
            }
            let height = match self.cold.chain_height().await {
                Ok(height) => height,
                Err(e) => {
                    warn!(error = %e, "repair loop failed to query chain height");
                    continue;
                }
            };
            for (api_id, config) in configs {
                if config.repairable && self.needs_repair(&config, height) {
                    self.enqueue_repair(api_id, config);
                }
            }
        }
    }

    /// Whether a repairable CID's observed active deals are below its
    /// replication factor at the given chain height.
    ///
    /// CIDs with no observed state yet (their first job is still in
    /// flight) and CIDs whose config disables the cold tier have
    /// nothing to repair.
    fn needs_repair(&self, config: &CidConfig, height: u64) -> bool {
        if !config.cold.enabled {
            return false;
        }
        let fil = &config.cold.filecoin;
        match self.store.get_cid_info(&config.cid) {
            Ok(Some(info)) => {
                info.cold.filecoin.active_count(height, &fil.excluded_miners) < fil.rep_factor
            }
            Ok(None) => false,
            Err(e) => {
                error!(cid = %config.cid, error = %e, "failed to load cid info for repair check");
                false
            }
        }
    }

    /// Queue a repair job for an under-replicated CID: an ordinary
    /// reconciliation whose cold store step tops the deals back up.
    fn enqueue_repair(&self, api_id: ApiId, config: CidConfig) {
        let cid = config.cid;
        let jid = JobId::new();
        let action = Action {
            api_id: api_id.clone(),
            cid,
            jid: jid.clone(),
            config,
            replaced: None,
        };
        // Reserve the slot first so a logged repair job always runs.
        if !self
            .ring
            .push_if_absent(WorkItem::Reconcile { action: action.clone() })
        {
            return;
        }
        let job = Job::queued(jid.clone(), api_id.clone(), cid);
        let committed: Result<(), StoreError> = (|| {
            let mut batch = self.store.batch();
            batch.create_job(&job)?;
            batch.put_action(&action)?;
            batch.commit()
        })();
        if let Err(e) = committed {
            error!(%cid, error = %e, "failed to persist repair job");
            return;
        }
        debug!(%cid, %jid, "repair evaluation queued");
        self.publish(job);
        self.logger
            .log(&cid, &jid, format!("{jid} was queued for repair evaluation."));
    }
}
