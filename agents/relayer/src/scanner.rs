//! Recovery of pings missed while the relayer was down.
//!
//! The scanner walks every block between the block of the most recently
//! recorded ping and the live ingestion boundary, emitting pings the status
//! store has never seen. It is paced by a [`QuotaBudget`] and survives
//! quota exhaustion and restarts through the progress markers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pingpong_core::{Address, Marker, PingPongChain, StatusStore, H256};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    emitter::{WorkEmitter, WorkSource},
    error::RelayerError,
};

pub use budget::*;

/// Fetches of one block before it is given up on. Quota exhaustion does not
/// count against this.
const BLOCK_FETCH_ATTEMPTS: u32 = 3;

mod budget;
#[cfg(test)]
mod tests;

/// Inclusive block range covered by one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    /// First block
    pub start_block: u64,
    /// Last block
    pub end_block: u64,
}

impl ScanRange {
    /// Number of blocks in the range.
    pub fn block_count(&self) -> u64 {
        self.end_block - self.start_block + 1
    }
}

/// Summary of a completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Blocks visited
    pub blocks_scanned: u64,
    /// Pings emitted
    pub emitted: usize,
    /// Times the quota ran out
    pub cooldowns: usize,
}

/// Scans historical blocks for pings that never made it into the store.
pub struct RecoveryScanner {
    chain: Arc<dyn PingPongChain>,
    store: Arc<dyn StatusStore>,
    emitter: WorkEmitter,
    contract: Address,
    budget: QuotaBudget,
    cooldown: Duration,
    checkpoint_interval: u64,
}

impl RecoveryScanner {
    /// Scan for calls to `contract`, pacing RPC use with `budget`.
    pub fn new(
        chain: Arc<dyn PingPongChain>,
        store: Arc<dyn StatusStore>,
        emitter: WorkEmitter,
        contract: Address,
        budget: QuotaBudget,
        cooldown: Duration,
        checkpoint_interval: u64,
    ) -> Self {
        Self {
            chain,
            store,
            emitter,
            contract,
            budget,
            cooldown,
            checkpoint_interval: checkpoint_interval.max(1),
        }
    }

    /// Run one scan to completion. Quota exhaustion pauses the scan for the
    /// cooldown and resumes it at the same block; any store or queue failure
    /// ends it with an error, leaving the progress markers for the next run.
    #[instrument(skip(self), name = "recovery_scan")]
    pub async fn run(&self) -> Result<ScanReport, RelayerError> {
        let mut report = ScanReport::default();
        let Some(range) = self.resolve_range().await? else {
            return Ok(report);
        };

        let mut index = self
            .store
            .get_marker(Marker::ScanProgress)
            .await?
            .unwrap_or(0);
        let delay = self.budget.iteration_delay();
        let mut attempts = 0;
        info!(
            start_block = range.start_block,
            end_block = range.end_block,
            resume_index = index,
            ?delay,
            "Starting recovery scan"
        );

        while index < range.block_count() {
            sleep(delay).await;
            let number = range.start_block + index;
            match self.scan_block(number).await {
                Ok(emitted) => report.emitted += emitted,
                Err(err) if err.is_quota_exceeded() => {
                    warn!(
                        block = number,
                        index,
                        cooldown = ?self.cooldown,
                        error = %err,
                        "RPC quota exhausted, pausing recovery scan"
                    );
                    self.store.put_marker(Marker::ScanProgress, index).await?;
                    report.cooldowns += 1;
                    attempts = 0;
                    sleep(self.cooldown).await;
                    continue;
                }
                Err(RelayerError::Chain(err)) => {
                    attempts += 1;
                    if attempts < BLOCK_FETCH_ATTEMPTS {
                        warn!(block = number, attempts, error = %err, "Failed to fetch block");
                        continue;
                    }
                    error!(
                        block = number,
                        attempts,
                        error = %err,
                        "Giving up on block, pings in it will not be recovered"
                    );
                }
                Err(err) => return Err(err),
            }

            attempts = 0;
            index += 1;
            report.blocks_scanned += 1;
            if index % self.checkpoint_interval == 0 && index < range.block_count() {
                self.store.put_marker(Marker::ScanProgress, index).await?;
                debug!(index, block = number, "Checkpointed recovery scan");
            }
        }

        self.clear_markers().await?;
        info!(?report, "Recovery scan complete");
        Ok(report)
    }

    /// Work out the blocks to scan, pinning the start block for resumption.
    async fn resolve_range(&self) -> Result<Option<ScanRange>, RelayerError> {
        let boundary = self.store.get_marker(Marker::InitialBlockNumber).await?;
        let Some(start_block) = pin_scan_start(&*self.chain, &*self.store, boundary).await? else {
            return Ok(None);
        };

        let head = self.chain.get_block_number().await?;
        let end_block = match boundary {
            Some(boundary) => head.min(boundary.saturating_sub(1)),
            None => head,
        };

        if start_block > end_block {
            info!(start_block, end_block, "Nothing to recover");
            self.clear_markers().await?;
            return Ok(None);
        }
        Ok(Some(ScanRange {
            start_block,
            end_block,
        }))
    }

    /// Emit the unseen pings of one block, returning how many were emitted.
    async fn scan_block(&self, number: u64) -> Result<usize, RelayerError> {
        let Some(block) = self.chain.get_block(number).await? else {
            debug!(block = number, "Block not found");
            return Ok(0);
        };
        if block.transactions.is_empty() {
            return Ok(0);
        }

        let candidates = self.ping_calls(number, &block.transactions).await?;
        let mut emitted = 0;
        for tx_hash in candidates {
            if self.store.query_latest_by_tx_hash(tx_hash).await?.is_some() {
                debug!(?tx_hash, "Ping already recorded");
                continue;
            }
            self.emitter.emit(tx_hash, WorkSource::Scanner).await?;
            emitted += 1;
        }
        Ok(emitted)
    }

    /// Hashes of the transactions in the block that call `ping()` on the
    /// contract. Lookup and decode failures drop the transaction; quota
    /// exhaustion fails the block.
    async fn ping_calls(
        &self,
        number: u64,
        hashes: &[H256],
    ) -> Result<Vec<H256>, RelayerError> {
        let lookups =
            join_all(hashes.iter().map(|hash| self.chain.get_transaction(*hash))).await;

        let mut pings = Vec::new();
        for (hash, lookup) in hashes.iter().zip(lookups) {
            let tx = match lookup {
                Ok(Some(tx)) => tx,
                Ok(None) => continue,
                Err(err) if err.is_quota_exceeded() => return Err(err.into()),
                Err(err) => {
                    warn!(
                        block = number,
                        tx_hash = ?hash,
                        error = %err,
                        "Failed to fetch transaction, skipping it"
                    );
                    continue;
                }
            };
            if tx.to != Some(self.contract) {
                continue;
            }
            match self.chain.decode_call(&tx.input) {
                Ok(call) if call.is_ping() => pings.push(tx.hash),
                Ok(_) => {}
                Err(err) => debug!(tx_hash = ?hash, error = %err, "Undecodable contract call"),
            }
        }
        Ok(pings)
    }

    async fn clear_markers(&self) -> Result<(), RelayerError> {
        self.store.delete_marker(Marker::ScanProgress).await?;
        self.store.delete_marker(Marker::ScanStartBlock).await?;
        Ok(())
    }
}

/// Pin the first block of the recovery scan to the block after the most
/// recently recorded ping, unless a pin already exists.
///
/// Has to run before live ingestion starts writing records: once it has, the
/// latest record may sit above the live boundary, and a record at or above
/// `boundary` is never used as the starting point.
pub async fn pin_scan_start(
    chain: &dyn PingPongChain,
    store: &dyn StatusStore,
    boundary: Option<u64>,
) -> Result<Option<u64>, RelayerError> {
    if let Some(start_block) = store.get_marker(Marker::ScanStartBlock).await? {
        return Ok(Some(start_block));
    }

    let Some(latest) = store.scan_latest_by_timestamp().await? else {
        info!("No relayed pings recorded yet, nothing to recover");
        return Ok(None);
    };
    let block = chain
        .get_transaction(latest.tx_hash)
        .await?
        .and_then(|tx| tx.block_number);
    let Some(block) = block else {
        warn!(
            tx_hash = ?latest.tx_hash,
            "Latest recorded ping has no known block, skipping recovery"
        );
        return Ok(None);
    };
    if boundary.is_some_and(|boundary| block >= boundary) {
        warn!(
            tx_hash = ?latest.tx_hash,
            block,
            ?boundary,
            "Latest recorded ping came from live ingestion and no scan start was pinned, \
             skipping recovery"
        );
        return Ok(None);
    }

    let start_block = block + 1;
    store.put_marker(Marker::ScanStartBlock, start_block).await?;
    info!(tx_hash = ?latest.tx_hash, block, start_block, "Pinned recovery scan start");
    Ok(Some(start_block))
}
