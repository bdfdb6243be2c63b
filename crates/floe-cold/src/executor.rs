//! [`FilCold`] — the cold-tier executor.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cid::Cid;
use floe_store::CidLogger;
use floe_types::{
    ColdError, ColdRetriever, ColdStorage, DealProposal, FilConfig, FilInfo, JobId, RenewalOutcome,
};
use tracing::{debug, info, warn};

use crate::client::{ColdClient, OnChainStatus};
use crate::selector::{MinerFilter, MinerSelector, SelectedMiner};

/// Default interval between activation polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default polling budget before a proposal is declared lost.
const DEFAULT_MAX_POLLS: u32 = 240;

/// Lifecycle phase of a recorded deal at a given chain height.
///
/// Proposal and activation happen before a deal is recorded; a recorded
/// deal is `Active`, `Expiring` once its remaining life is inside the
/// renewal threshold, and `Expired` past its end epoch. Only `Active`
/// and `Expiring` deals count toward the replication factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealPhase {
    /// Live, outside the renewal threshold.
    Active,
    /// Live, inside the renewal threshold.
    Expiring,
    /// Past its end epoch.
    Expired,
}

/// Classify a recorded deal at `height` against a renewal `threshold`.
pub fn deal_phase(p: &DealProposal, height: u64, threshold: u64) -> DealPhase {
    if !p.is_active(height) {
        DealPhase::Expired
    } else if p.remaining(height) <= threshold {
        DealPhase::Expiring
    } else {
        DealPhase::Active
    }
}

/// Cold-tier executor over a deal-market client and a miner selector.
pub struct FilCold {
    client: Arc<dyn ColdClient>,
    selector: Arc<dyn MinerSelector>,
    logger: Arc<CidLogger>,
    poll_interval: Duration,
    max_polls: u32,
}

impl FilCold {
    /// Create a cold executor with default activation polling.
    pub fn new(
        client: Arc<dyn ColdClient>,
        selector: Arc<dyn MinerSelector>,
        logger: Arc<CidLogger>,
    ) -> Self {
        Self {
            client,
            selector,
            logger,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Override the activation polling cadence and budget.
    pub fn with_activation_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    /// Propose one deal and wait for its on-chain activation.
    async fn propose(
        &self,
        jid: &JobId,
        data_cid: &Cid,
        miner: &SelectedMiner,
        cfg: &FilConfig,
    ) -> Result<DealProposal, ColdError> {
        let proposal_cid = self
            .client
            .start_deal(
                data_cid,
                &miner.addr,
                miner.epoch_price,
                cfg.deal_duration,
                &cfg.addr,
            )
            .await?;
        debug!(%data_cid, %proposal_cid, miner = %miner.addr, "deal proposed");
        self.logger.log(
            data_cid,
            jid,
            format!("proposed deal {proposal_cid} to miner {}", miner.addr),
        );

        let mut polls = 0;
        loop {
            let deal = self.client.deal_info(&proposal_cid).await?;
            match deal.status {
                OnChainStatus::Active => {
                    if let Some(epoch) = deal.activation_epoch {
                        info!(%proposal_cid, miner = %miner.addr, epoch, "deal activated");
                        self.logger.log(
                            data_cid,
                            jid,
                            format!(
                                "deal {proposal_cid} with miner {} active at epoch {epoch}",
                                miner.addr
                            ),
                        );
                        return Ok(DealProposal {
                            proposal_cid,
                            miner: miner.addr.clone(),
                            duration: cfg.deal_duration,
                            activation_epoch: epoch,
                            renewed: false,
                        });
                    }
                }
                OnChainStatus::Failed => {
                    return Err(ColdError::Client(format!(
                        "deal {proposal_cid} with miner {} failed on chain",
                        miner.addr
                    )));
                }
                OnChainStatus::Pending => {}
            }
            polls += 1;
            if polls >= self.max_polls {
                return Err(ColdError::ActivationTimeout(proposal_cid));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// The selection filter for a top-up: the config's constraints plus
    /// the miners already holding an active deal, so new replicas land
    /// on distinct providers.
    fn topup_filter(cfg: &FilConfig, info: &FilInfo, height: u64) -> MinerFilter {
        let mut filter = MinerFilter::from_config(cfg);
        for p in info.proposals.iter().filter(|p| p.is_active(height)) {
            if !filter.excluded.contains(&p.miner) {
                filter.excluded.push(p.miner.clone());
            }
        }
        filter
    }
}

#[async_trait::async_trait]
impl ColdStorage for FilCold {
    async fn chain_height(&self) -> Result<u64, ColdError> {
        self.client.chain_head().await
    }

    async fn store(
        &self,
        jid: &JobId,
        cid: &Cid,
        cfg: &FilConfig,
        mut info: FilInfo,
    ) -> Result<FilInfo, ColdError> {
        info.data_cid = *cid;
        let height = self.client.chain_head().await?;
        let active = info.active_count(height, &cfg.excluded_miners);
        if active >= cfg.rep_factor {
            debug!(%cid, active, target = cfg.rep_factor, "replication target satisfied");
            return Ok(info);
        }

        let deficit = cfg.rep_factor - active;
        self.logger.log(
            cid,
            jid,
            format!("making {deficit} deal(s) to reach replication factor {}", cfg.rep_factor),
        );
        let filter = Self::topup_filter(cfg, &info, height);
        let miners = self.selector.get_miners(deficit, &filter)?;

        // Deals are attempted in selector order; one miner's failure does
        // not abort the others.
        for miner in miners {
            match self.propose(jid, cid, &miner, cfg).await {
                Ok(p) => info.proposals.push(p),
                Err(e) => {
                    warn!(%cid, miner = %miner.addr, error = %e, "deal failed");
                    self.logger.log(
                        cid,
                        jid,
                        format!("deal with miner {} failed: {e}", miner.addr),
                    );
                }
            }
        }

        let height = self.client.chain_head().await?;
        let active = info.active_count(height, &cfg.excluded_miners);
        if active >= cfg.rep_factor {
            Ok(info)
        } else {
            Err(ColdError::UnderReplicated {
                partial: Box::new(info),
                active,
                target: cfg.rep_factor,
            })
        }
    }

    async fn ensure_renewals(
        &self,
        jid: &JobId,
        cid: &Cid,
        cfg: &FilConfig,
        mut info: FilInfo,
    ) -> Result<RenewalOutcome, ColdError> {
        let height = self.client.chain_head().await?;
        let mut active = info
            .proposals
            .iter()
            .filter(|p| p.is_active(height))
            .count();
        let mut renewed = 0;

        for i in 0..info.proposals.len() {
            let p = info.proposals[i].clone();
            if p.renewed || deal_phase(&p, height, cfg.renew.threshold) != DealPhase::Expiring {
                continue;
            }
            // Decreased replication factor: let the excess expire.
            if active > cfg.rep_factor {
                debug!(%cid, proposal = %p.proposal_cid, active, "skipping renewal, above target");
                continue;
            }

            let filter = Self::topup_filter(cfg, &info, height);
            let miner = match self.selector.get_miners(1, &filter) {
                Ok(mut m) => m.remove(0),
                Err(e) => {
                    warn!(%cid, proposal = %p.proposal_cid, error = %e, "renewal skipped");
                    continue;
                }
            };
            match self.propose(jid, cid, &miner, cfg).await {
                Ok(successor) => {
                    self.logger.log(
                        cid,
                        jid,
                        format!(
                            "renewed deal {} with successor {}",
                            p.proposal_cid, successor.proposal_cid
                        ),
                    );
                    info.proposals.push(successor);
                    info.proposals[i].renewed = true;
                    active += 1;
                    renewed += 1;
                }
                Err(e) => {
                    warn!(%cid, proposal = %p.proposal_cid, error = %e, "renewal failed");
                }
            }
        }

        Ok(RenewalOutcome { info, renewed })
    }
}

#[async_trait::async_trait]
impl ColdRetriever for FilCold {
    async fn retrieve(
        &self,
        jid: &JobId,
        cid: &Cid,
        wallet_addr: &str,
    ) -> Result<Bytes, ColdError> {
        let offers = self.client.find_data(cid).await?;
        if offers.is_empty() {
            self.logger.log(cid, jid, "no retrieval offers found");
            return Err(ColdError::RetrievalFailed(*cid));
        }
        for offer in offers {
            self.logger.log(
                cid,
                jid,
                format!("attempting retrieval from miner {}", offer.miner),
            );
            match self.client.retrieve(cid, &offer, wallet_addr).await {
                Ok(data) => {
                    info!(%cid, miner = %offer.miner, bytes = data.len(), "retrieval succeeded");
                    self.logger.log(
                        cid,
                        jid,
                        format!("retrieved {} bytes from miner {}", data.len(), offer.miner),
                    );
                    return Ok(data);
                }
                Err(e) => {
                    warn!(%cid, miner = %offer.miner, error = %e, "retrieval attempt failed");
                    self.logger.log(
                        cid,
                        jid,
                        format!("retrieval from miner {} failed: {e}", offer.miner),
                    );
                }
            }
        }
        Err(ColdError::RetrievalFailed(*cid))
    }
}
