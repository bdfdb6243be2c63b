//! Shared types and interfaces for floe.
//!
//! This crate defines everything the rest of the workspace agrees on:
//! identifiers ([`JobId`], [`ApiId`]), desired-state configuration
//! ([`DefaultConfig`], [`CidConfig`]), observed state ([`CidInfo`],
//! [`DealProposal`]), reconciliation jobs ([`Job`], [`JobStatus`]),
//! per-CID log entries ([`LogEntry`]), and the executor seams
//! ([`HotStorage`], [`ColdStorage`], [`ColdRetriever`]).

pub mod config;
pub mod exec;
pub mod info;

use std::fmt::{self, Write as _};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;
use serde::{Deserialize, Serialize};

pub use cid::Cid;

pub use config::{
    CidConfig, ColdConfig, ConfigError, DefaultConfig, FilConfig, HotConfig, IpfsConfig,
    RenewConfig,
};
pub use exec::{
    ColdError, ColdRetriever, ColdStorage, HotError, HotStorage, RenewalOutcome, UnfreezeSource,
};
pub use info::{CidInfo, ColdInfo, DealProposal, FilInfo, HotInfo, IpfsHotInfo};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh random identifier (24 hex chars).
            pub fn new() -> Self {
                let mut bytes = [0u8; 12];
                rand::thread_rng().fill_bytes(&mut bytes);
                let mut s = String::with_capacity(24);
                for b in bytes {
                    let _ = write!(s, "{b:02x}");
                }
                Self(s)
            }

            /// View the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_opaque_id!(
    /// Unique identifier for a reconciliation job.
    JobId
);

define_opaque_id!(
    /// Identifier for a tenant instance; namespaces all per-instance data.
    ApiId
);

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// The unit of reconciliation work: drive one CID's observed state toward
/// its desired configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Owning instance.
    pub api_id: ApiId,
    /// The CID being reconciled.
    pub cid: Cid,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Human-readable failure cause, set only on [`JobStatus::Failed`].
    pub err_cause: Option<String>,
}

impl Job {
    /// Create a job in the initial [`JobStatus::Queued`] state.
    pub fn queued(id: JobId, api_id: ApiId, cid: Cid) -> Self {
        Self {
            id,
            api_id,
            cid,
            status: JobStatus::Queued,
            err_cause: None,
        }
    }
}

/// Job lifecycle: `Queued → Executing → {Success, Failed, Cancelled}`.
///
/// Terminal states are sticky; a job record is never mutated once it
/// reaches one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Created, waiting for a worker.
    Queued,
    /// A worker is reconciling the CID.
    Executing,
    /// Every requested tier operation succeeded.
    Success,
    /// At least one tier operation failed; see `err_cause`.
    Failed,
    /// Superseded by a newer push before execution started.
    Cancelled,
}

impl JobStatus {
    /// Whether this state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Position in the lifecycle, used to drop out-of-order watch events.
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Executing => 1,
            Self::Success | Self::Failed | Self::Cancelled => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Executing => "executing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Per-CID log
// ---------------------------------------------------------------------------

/// One append-only log line in a CID's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The CID this entry belongs to.
    pub cid: Cid,
    /// The job that produced the entry.
    pub jid: JobId,
    /// Strictly monotonic timestamp in nanoseconds since UNIX epoch.
    pub timestamp: u64,
    /// Human-readable message.
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Persisted intents and instance records
// ---------------------------------------------------------------------------

/// Persisted intent to reconcile a CID; replayed on startup to resume
/// interrupted work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Owning instance.
    pub api_id: ApiId,
    /// The CID to reconcile.
    pub cid: Cid,
    /// The job carrying out this intent.
    pub jid: JobId,
    /// The desired configuration.
    pub config: config::CidConfig,
    /// When set, the CID this push replaces: the job unpins it from the
    /// hot tier and deletes its configuration.
    pub replaced: Option<Cid>,
}

/// A named wallet address owned by an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrInfo {
    /// User-chosen label.
    pub name: String,
    /// Wallet address on the cold network.
    pub addr: String,
}

/// Durable per-instance state: the default config and owned addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance identifier.
    pub id: ApiId,
    /// Fallback configuration for pushes without an explicit config.
    pub default_config: config::DefaultConfig,
    /// Wallet addresses owned by the instance.
    pub addrs: Vec<AddrInfo>,
}

/// Current wall-clock time in nanoseconds since UNIX epoch.
pub fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
