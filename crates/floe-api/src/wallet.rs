//! The consumed wallet interface.

/// Wallet operation failure.
#[derive(Debug, thiserror::Error)]
#[error("wallet: {0}")]
pub struct WalletError(pub String);

/// Wallet management as consumed by the facade: address creation and
/// balance queries against the cold network.
#[async_trait::async_trait]
pub trait WalletApi: Send + Sync {
    /// Create a fresh wallet address.
    async fn new_addr(&self) -> Result<String, WalletError>;

    /// Balance of an address in attoFIL.
    async fn balance(&self, addr: &str) -> Result<u64, WalletError>;
}
