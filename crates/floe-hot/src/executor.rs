//! [`IpfsHot`] — the hot-tier executor.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cid::Cid;
use floe_store::CidLogger;
use floe_types::{
    unix_nanos, ColdRetriever, HotConfig, HotError, HotInfo, HotStorage, IpfsHotInfo, JobId,
    UnfreezeSource,
};
use tracing::{debug, info, warn};

use crate::HotClient;

/// Hot-tier executor over an IPFS-like client.
///
/// Wire a [`ColdRetriever`] with [`with_retriever`](Self::with_retriever)
/// to enable unfreezing; without one, a pin that misses the deadline
/// fails even when the config allows unfreeze.
pub struct IpfsHot {
    client: Arc<dyn HotClient>,
    logger: Arc<CidLogger>,
    retriever: Option<Arc<dyn ColdRetriever>>,
}

impl IpfsHot {
    /// Create a hot executor over the given client.
    pub fn new(client: Arc<dyn HotClient>, logger: Arc<CidLogger>) -> Self {
        Self {
            client,
            logger,
            retriever: None,
        }
    }

    /// Set the cold-tier retriever used to unfreeze dormant content.
    pub fn with_retriever(mut self, retriever: Arc<dyn ColdRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Retrieve from the cold tier, re-add, verify, and pin.
    async fn unfreeze(
        &self,
        jid: &JobId,
        cid: &Cid,
        source: &UnfreezeSource,
    ) -> Result<u64, HotError> {
        let retriever = self
            .retriever
            .as_ref()
            .ok_or_else(|| HotError::Client("no cold retriever configured".to_string()))?;

        self.logger
            .log(cid, jid, "not reachable from hot peers, unfreezing from cold storage");

        let data = retriever
            .retrieve(jid, cid, &source.wallet_addr)
            .await
            .map_err(|e| HotError::Unfreeze(Box::new(e)))?;
        let size = data.len() as u64;

        let got = self.client.add(data).await?;
        if got != *cid {
            return Err(HotError::CidMismatch {
                expected: *cid,
                got,
            });
        }
        // Data is local now, so the pin completes promptly.
        self.client.pin_add(cid).await?;

        info!(%cid, %jid, size, "unfroze object from cold storage");
        self.logger
            .log(cid, jid, format!("unfroze {size} bytes from cold storage"));
        Ok(size)
    }
}

fn pinned_info(size: u64) -> HotInfo {
    HotInfo {
        enabled: true,
        size,
        ipfs: Some(IpfsHotInfo {
            created: unix_nanos(),
        }),
    }
}

#[async_trait::async_trait]
impl HotStorage for IpfsHot {
    async fn pin(
        &self,
        jid: &JobId,
        cid: &Cid,
        cfg: &HotConfig,
        unfreeze: Option<UnfreezeSource>,
    ) -> Result<HotInfo, HotError> {
        // Fast path: already pinned.
        if self.client.pin_ls().await?.contains(cid) {
            let size = self.client.stat(cid).await?;
            debug!(%cid, size, "already pinned in hot storage");
            self.logger.log(cid, jid, "object already pinned in hot storage");
            return Ok(pinned_info(size));
        }

        let seconds = cfg.ipfs.add_timeout;
        let deadline = Duration::from_secs(seconds);
        let unavailable = match tokio::time::timeout(deadline, self.client.pin_add(cid)).await {
            Ok(Ok(())) => false,
            Ok(Err(HotError::NotFound(_))) => true,
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => true,
        };

        if !unavailable {
            let size = self.client.stat(cid).await?;
            self.logger
                .log(cid, jid, format!("pinned {size} bytes from hot peers"));
            return Ok(pinned_info(size));
        }

        if cfg.allow_unfreeze {
            if let Some(source) = unfreeze {
                let size = self.unfreeze(jid, cid, &source).await?;
                return Ok(pinned_info(size));
            }
        }

        warn!(%cid, %jid, seconds, "hot import timed out");
        Err(HotError::ImportTimeout { cid: *cid, seconds })
    }

    async fn unpin(&self, jid: &JobId, cid: &Cid) -> Result<(), HotError> {
        match self.client.pin_rm(cid).await {
            Ok(()) => {
                self.logger.log(cid, jid, "unpinned from hot storage");
                Ok(())
            }
            // Removing a non-pinned CID is not an error.
            Err(HotError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn get(&self, cid: &Cid) -> Result<Bytes, HotError> {
        self.client.get(cid).await
    }
}
