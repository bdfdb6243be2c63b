//! Hot-tier executor for floe.
//!
//! This crate provides:
//!
//! - [`HotClient`] — the consumed IPFS-like client interface (pinning,
//!   unixfs add/get, object stat).
//! - [`IpfsHot`] — the executor implementing
//!   [`HotStorage`](floe_types::HotStorage): deadline-bounded pin,
//!   unfreeze via a cold retrieval, idempotent unpin, and get.

mod client;
mod executor;

pub use client::HotClient;
pub use executor::IpfsHot;
