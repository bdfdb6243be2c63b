//! [`SchedStore`] implementation with Fjall (disk) and in-memory backends.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use cid::Cid;
use fjall::{Database, Keyspace, KeyspaceCreateOptions};
use floe_types::{Action, ApiId, CidConfig, CidInfo, InstanceRecord, Job, JobId, LogEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::StoreError;

type Result<T> = std::result::Result<T, StoreError>;

/// Current on-disk record format version.
const RECORD_VERSION: u8 = 1;

/// Logical namespaces, one keyspace (or map) each.
#[derive(Clone, Copy)]
enum Ns {
    Jobs = 0,
    JobsLatest = 1,
    Actions = 2,
    Configs = 3,
    CidInfo = 4,
    Logs = 5,
    Instances = 6,
}

const NS_NAMES: [&str; 7] = [
    "jobs",
    "jobs_latest",
    "actions",
    "configs",
    "cidinfo",
    "logs",
    "instances",
];

/// Inner backend: either Fjall-backed (disk) or pure in-memory.
enum Backend {
    Fjall {
        #[allow(dead_code)]
        db: Database,
        keyspaces: Vec<Keyspace>,
    },
    Memory(Box<[RwLock<BTreeMap<String, Vec<u8>>>; 7]>),
}

/// Durable scheduler state with Fjall (disk) or pure in-memory backend.
///
/// Every persisted value is a postcard record prefixed with a version
/// tag; readers reject unknown versions instead of misinterpreting data.
pub struct SchedStore {
    backend: Backend,
}

impl SchedStore {
    /// Open a persistent store at the given path (Fjall backend).
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::builder(path).open()?;
        Self::init_fjall(db)
    }

    /// Open a temporary store backed by Fjall (cleaned up on drop).
    pub fn open_temporary() -> Result<Self> {
        let tmp = tempfile::tempdir().map_err(std::io::Error::other)?;
        let db = Database::builder(tmp.path()).temporary(true).open()?;
        Self::init_fjall(db)
    }

    /// Create a pure in-memory store. Zero disk I/O.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Box::new(std::array::from_fn(|_| {
                RwLock::new(BTreeMap::new())
            }))),
        }
    }

    fn init_fjall(db: Database) -> Result<Self> {
        let mut keyspaces = Vec::with_capacity(NS_NAMES.len());
        for name in NS_NAMES {
            keyspaces.push(db.keyspace(name, KeyspaceCreateOptions::default)?);
        }
        Ok(Self {
            backend: Backend::Fjall { db, keyspaces },
        })
    }

    /// Start a transactional write set. Operations are staged on the
    /// batch and applied together by [`WriteBatch::commit`]; dropping
    /// the batch without committing writes nothing.
    pub fn batch(&self) -> WriteBatch<'_> {
        WriteBatch {
            store: self,
            ops: Vec::new(),
        }
    }

    // ----- Jobs -----

    /// Persist a freshly created job and index it as the latest for its
    /// `(api, cid)` pair, in one transaction.
    pub fn create_job(&self, job: &Job) -> Result<()> {
        let mut batch = self.batch();
        batch.create_job(job)?;
        batch.commit()
    }

    /// Persist a job state transition without touching the latest index.
    pub fn save_job(&self, job: &Job) -> Result<()> {
        self.raw_put(Ns::Jobs, job.id.as_str(), &encode(job)?)
    }

    /// Retrieve a job by id.
    pub fn get_job(&self, jid: &JobId) -> Result<Option<Job>> {
        self.raw_get(Ns::Jobs, jid.as_str())?
            .map(|b| decode(&b))
            .transpose()
    }

    /// The most recently created job for an `(api, cid)` pair.
    pub fn latest_job(&self, api_id: &ApiId, cid: &Cid) -> Result<Option<Job>> {
        let Some(raw) = self.raw_get(Ns::JobsLatest, &pair_key(api_id, cid))? else {
            return Ok(None);
        };
        let jid = String::from_utf8(raw)
            .map_err(|e| StoreError::CorruptData(format!("job id is not valid UTF-8: {e}")))?;
        self.get_job(&JobId::from(jid))
    }

    /// All jobs still in a non-terminal state, for startup replay.
    pub fn open_jobs(&self) -> Result<Vec<Job>> {
        let mut open = Vec::new();
        for (_, raw) in self.raw_scan(Ns::Jobs, "")? {
            let job: Job = decode(&raw)?;
            if !job.status.is_terminal() {
                open.push(job);
            }
        }
        Ok(open)
    }

    // ----- Actions -----

    /// Persist the pending action for an `(api, cid)` pair.
    pub fn put_action(&self, action: &Action) -> Result<()> {
        self.raw_put(
            Ns::Actions,
            &pair_key(&action.api_id, &action.cid),
            &encode(action)?,
        )
    }

    /// Retrieve the pending action for an `(api, cid)` pair.
    pub fn get_action(&self, api_id: &ApiId, cid: &Cid) -> Result<Option<Action>> {
        self.raw_get(Ns::Actions, &pair_key(api_id, cid))?
            .map(|b| decode(&b))
            .transpose()
    }

    /// Remove the pending action for an `(api, cid)` pair.
    pub fn remove_action(&self, api_id: &ApiId, cid: &Cid) -> Result<()> {
        self.raw_remove(Ns::Actions, &pair_key(api_id, cid))
    }

    // ----- Desired configurations -----

    /// Persist the desired configuration for a CID.
    pub fn put_config(&self, api_id: &ApiId, config: &CidConfig) -> Result<()> {
        self.raw_put(
            Ns::Configs,
            &pair_key(api_id, &config.cid),
            &encode(config)?,
        )
    }

    /// Retrieve the desired configuration for a CID.
    pub fn get_config(&self, api_id: &ApiId, cid: &Cid) -> Result<Option<CidConfig>> {
        self.raw_get(Ns::Configs, &pair_key(api_id, cid))?
            .map(|b| decode(&b))
            .transpose()
    }

    /// Delete the desired configuration for a CID.
    pub fn remove_config(&self, api_id: &ApiId, cid: &Cid) -> Result<()> {
        self.raw_remove(Ns::Configs, &pair_key(api_id, cid))
    }

    /// All configurations stored for one instance.
    pub fn list_configs(&self, api_id: &ApiId) -> Result<Vec<CidConfig>> {
        let prefix = format!("{api_id}/");
        self.raw_scan(Ns::Configs, &prefix)?
            .into_iter()
            .map(|(_, raw)| decode(&raw))
            .collect()
    }

    /// All configurations across all instances, for the control loops.
    pub fn list_all_configs(&self) -> Result<Vec<(ApiId, CidConfig)>> {
        let mut out = Vec::new();
        for (key, raw) in self.raw_scan(Ns::Configs, "")? {
            let Some((api, _)) = key.split_once('/') else {
                return Err(StoreError::CorruptData(format!(
                    "config key missing separator: {key}"
                )));
            };
            out.push((ApiId::from(api), decode(&raw)?));
        }
        Ok(out)
    }

    // ----- Observed state -----

    /// Persist the observed state for a CID.
    pub fn put_cid_info(&self, info: &CidInfo) -> Result<()> {
        self.raw_put(Ns::CidInfo, &info.cid.to_string(), &encode(info)?)
    }

    /// Retrieve the observed state for a CID.
    pub fn get_cid_info(&self, cid: &Cid) -> Result<Option<CidInfo>> {
        self.raw_get(Ns::CidInfo, &cid.to_string())?
            .map(|b| decode(&b))
            .transpose()
    }

    // ----- Per-CID log -----

    /// Append one log entry. The timestamp doubles as the per-CID
    /// sequence; callers must hand in strictly monotonic values.
    pub fn append_log(&self, entry: &LogEntry) -> Result<()> {
        self.raw_put(
            Ns::Logs,
            &log_key(&entry.cid, entry.timestamp),
            &encode(entry)?,
        )
    }

    /// All log entries for a CID, oldest first.
    pub fn logs_for(&self, cid: &Cid) -> Result<Vec<LogEntry>> {
        let prefix = format!("{cid}/");
        self.raw_scan(Ns::Logs, &prefix)?
            .into_iter()
            .map(|(_, raw)| decode(&raw))
            .collect()
    }

    // ----- Instances -----

    /// Persist an instance record.
    pub fn put_instance(&self, record: &InstanceRecord) -> Result<()> {
        self.raw_put(Ns::Instances, record.id.as_str(), &encode(record)?)
    }

    /// Retrieve an instance record.
    pub fn get_instance(&self, api_id: &ApiId) -> Result<Option<InstanceRecord>> {
        self.raw_get(Ns::Instances, api_id.as_str())?
            .map(|b| decode(&b))
            .transpose()
    }

    // ----- Backend primitives -----

    fn raw_put(&self, ns: Ns, key: &str, value: &[u8]) -> Result<()> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                keyspaces[ns as usize].insert(key.as_bytes(), value)?;
            }
            Backend::Memory(maps) => {
                maps[ns as usize]
                    .write()
                    .unwrap()
                    .insert(key.to_string(), value.to_vec());
            }
        }
        Ok(())
    }

    fn raw_get(&self, ns: Ns, key: &str) -> Result<Option<Vec<u8>>> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                match keyspaces[ns as usize].get(key.as_bytes())? {
                    Some(bytes) => Ok(Some(bytes.to_vec())),
                    None => Ok(None),
                }
            }
            Backend::Memory(maps) => Ok(maps[ns as usize].read().unwrap().get(key).cloned()),
        }
    }

    fn raw_remove(&self, ns: Ns, key: &str) -> Result<()> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                keyspaces[ns as usize].remove(key.as_bytes())?;
            }
            Backend::Memory(maps) => {
                maps[ns as usize].write().unwrap().remove(key);
            }
        }
        Ok(())
    }

    /// Scan a namespace for all entries whose key starts with `prefix`,
    /// in key order.
    fn raw_scan(&self, ns: Ns, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        match &self.backend {
            Backend::Fjall { keyspaces, .. } => {
                let mut out = Vec::new();
                for guard in keyspaces[ns as usize].prefix(prefix.as_bytes()) {
                    let (k, v) = guard.into_inner()?;
                    let key = std::str::from_utf8(&k)
                        .map_err(|e| {
                            StoreError::CorruptData(format!("key is not valid UTF-8: {e}"))
                        })?
                        .to_string();
                    out.push((key, v.to_vec()));
                }
                Ok(out)
            }
            Backend::Memory(maps) => {
                let map = maps[ns as usize].read().unwrap();
                let mut out = Vec::new();
                for (k, v) in map.range(prefix.to_string()..) {
                    if !k.starts_with(prefix) {
                        break;
                    }
                    out.push((k.clone(), v.clone()));
                }
                Ok(out)
            }
        }
    }
}

/// One staged write within a [`WriteBatch`].
enum BatchOp {
    Put(Ns, String, Vec<u8>),
    Remove(Ns, String),
}

/// A set of writes applied as one transaction.
///
/// On the Fjall backend the operations commit through a single database
/// batch, so a crash leaves either all of them or none. The in-memory
/// backend is volatile and applies them in order.
pub struct WriteBatch<'a> {
    store: &'a SchedStore,
    ops: Vec<BatchOp>,
}

impl WriteBatch<'_> {
    /// Stage a freshly created job and its latest-index entry.
    pub fn create_job(&mut self, job: &Job) -> Result<()> {
        self.ops.push(BatchOp::Put(
            Ns::Jobs,
            job.id.as_str().to_string(),
            encode(job)?,
        ));
        self.ops.push(BatchOp::Put(
            Ns::JobsLatest,
            pair_key(&job.api_id, &job.cid),
            job.id.as_str().as_bytes().to_vec(),
        ));
        debug!(jid = %job.id, cid = %job.cid, "staged job creation");
        Ok(())
    }

    /// Stage a job state transition without touching the latest index.
    pub fn save_job(&mut self, job: &Job) -> Result<()> {
        self.ops.push(BatchOp::Put(
            Ns::Jobs,
            job.id.as_str().to_string(),
            encode(job)?,
        ));
        Ok(())
    }

    /// Stage the pending action for an `(api, cid)` pair.
    pub fn put_action(&mut self, action: &Action) -> Result<()> {
        self.ops.push(BatchOp::Put(
            Ns::Actions,
            pair_key(&action.api_id, &action.cid),
            encode(action)?,
        ));
        Ok(())
    }

    /// Stage removal of the pending action for an `(api, cid)` pair.
    pub fn remove_action(&mut self, api_id: &ApiId, cid: &Cid) {
        self.ops
            .push(BatchOp::Remove(Ns::Actions, pair_key(api_id, cid)));
    }

    /// Stage the desired configuration for a CID.
    pub fn put_config(&mut self, api_id: &ApiId, config: &CidConfig) -> Result<()> {
        self.ops.push(BatchOp::Put(
            Ns::Configs,
            pair_key(api_id, &config.cid),
            encode(config)?,
        ));
        Ok(())
    }

    /// Stage removal of the desired configuration for a CID.
    pub fn remove_config(&mut self, api_id: &ApiId, cid: &Cid) {
        self.ops
            .push(BatchOp::Remove(Ns::Configs, pair_key(api_id, cid)));
    }

    /// Stage the observed state for a CID.
    pub fn put_cid_info(&mut self, info: &CidInfo) -> Result<()> {
        self.ops.push(BatchOp::Put(
            Ns::CidInfo,
            info.cid.to_string(),
            encode(info)?,
        ));
        Ok(())
    }

    /// Apply every staged operation as one transaction.
    pub fn commit(self) -> Result<()> {
        match &self.store.backend {
            Backend::Fjall { db, keyspaces } => {
                let mut batch = db.batch();
                for op in self.ops {
                    match op {
                        BatchOp::Put(ns, key, value) => {
                            batch.insert(&keyspaces[ns as usize], key.as_bytes(), value);
                        }
                        BatchOp::Remove(ns, key) => {
                            batch.remove(&keyspaces[ns as usize], key.as_bytes());
                        }
                    }
                }
                batch.commit()?;
            }
            Backend::Memory(maps) => {
                for op in self.ops {
                    match op {
                        BatchOp::Put(ns, key, value) => {
                            maps[ns as usize].write().unwrap().insert(key, value);
                        }
                        BatchOp::Remove(ns, key) => {
                            maps[ns as usize].write().unwrap().remove(&key);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serialize a record with the version tag prefix.
fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct RecordRef<'a, T> {
        version: u8,
        value: &'a T,
    }
    Ok(postcard::to_allocvec(&RecordRef {
        version: RECORD_VERSION,
        value,
    })?)
}

/// Deserialize a record, rejecting unknown versions.
fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    #[derive(serde::Deserialize)]
    struct Record<T> {
        #[allow(dead_code)]
        version: u8,
        value: T,
    }
    match bytes.first() {
        Some(&RECORD_VERSION) => {}
        Some(&v) => {
            return Err(StoreError::CorruptData(format!(
                "unknown record version {v}"
            )))
        }
        None => return Err(StoreError::CorruptData("empty record".to_string())),
    }
    let record: Record<T> = postcard::from_bytes(bytes)?;
    Ok(record.value)
}

/// Storage key for `(api, cid)`-scoped namespaces.
fn pair_key(api_id: &ApiId, cid: &Cid) -> String {
    format!("{api_id}/{cid}")
}

/// Storage key for the log namespace: zero-padded timestamp keeps
/// lexicographic order equal to numeric order (u64 is at most 20 digits).
fn log_key(cid: &Cid, timestamp: u64) -> String {
    format!("{cid}/{timestamp:020}")
}
