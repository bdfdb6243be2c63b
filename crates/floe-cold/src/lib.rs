//! Cold-tier executor for floe.
//!
//! This crate provides:
//!
//! - [`ColdClient`] — the consumed deal-market/chain client interface.
//! - [`MinerSelector`] — the provider-ranking seam, with
//!   [`FixedMinerSelector`] as the deterministic implementation.
//! - [`FilCold`] — the executor implementing
//!   [`ColdStorage`](floe_types::ColdStorage) and
//!   [`ColdRetriever`](floe_types::ColdRetriever): deal top-up with
//!   per-miner failure isolation, offer-by-offer retrieval, and
//!   threshold-driven renewals.

mod client;
mod executor;
mod selector;

pub use client::{ColdClient, DealInfo, OnChainStatus, RetrievalOffer};
pub use executor::{deal_phase, DealPhase, FilCold};
pub use selector::{FixedMinerSelector, MinerFilter, MinerSelector, SelectedMiner};
