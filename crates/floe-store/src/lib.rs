//! Persistence layer for the floe scheduler.
//!
//! [`SchedStore`] provides typed accessors over seven Fjall keyspaces —
//! one per logical namespace — with a parallel pure in-memory backend:
//!
//! - `jobs` — [`JobId`](floe_types::JobId) → serialized [`Job`](floe_types::Job)
//! - `jobs_latest` — `apiid/cid` → latest job id for that pair
//! - `actions` — `apiid/cid` → pending [`Action`](floe_types::Action)
//! - `configs` — `apiid/cid` → desired [`CidConfig`](floe_types::CidConfig)
//! - `cidinfo` — `cid` → observed [`CidInfo`](floe_types::CidInfo)
//! - `logs` — `cid/timestamp` → [`LogEntry`](floe_types::LogEntry), append-only
//! - `instances` — `apiid` → [`InstanceRecord`](floe_types::InstanceRecord)
//!
//! Values are postcard records carrying a version tag; unknown versions
//! are rejected on read rather than misinterpreted. Each write is a
//! single transaction; compound updates (config + action + job, or a
//! terminal job state + action removal) go through [`WriteBatch`] so a
//! crash leaves either all of the writes or none.
//!
//! [`CidLogger`] layers the per-CID user-visible log on top: durable
//! append plus broadcast fan-out to registered watchers.

mod error;
mod logger;
mod store;

pub use error::StoreError;
pub use logger::{CidLogger, MonotonicClock};
pub use store::{SchedStore, WriteBatch};
