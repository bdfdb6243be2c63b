//! Per-instance facade for floe.
//!
//! A [`FloeApi`] scopes all operations to one tenant instance: it owns
//! the instance's default configuration and wallet addresses, validates
//! pushed configurations, and delegates reconciliation to the
//! scheduler. [`FloeApi::create`] provisions a fresh instance;
//! [`FloeApi::load`] reattaches to a persisted one with identical
//! `info`/`show` results (durability contract).

mod api;
mod error;
mod wallet;

pub use api::{BalanceInfo, FloeApi, InstanceInfo, PushOptions};
pub use error::ApiError;
pub use wallet::{WalletApi, WalletError};
