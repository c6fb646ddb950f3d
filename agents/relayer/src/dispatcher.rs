//! The dispatcher answers each ping exactly once.
//!
//! Every work item is driven by the state freshly read from the status
//! store. A response is persisted as `Sent` before waiting for it to be
//! mined, so a crash or timeout at any point leaves enough information for
//! the next delivery to either finish the relay or re-price the same nonce.

use std::sync::Arc;
use std::time::Duration;

use pingpong_core::{
    PingPongChain, RelayState, SentTx, StatusStore, StoreError, TransactionStatusRecord,
    TxOverrides, TxReceipt, WorkItem, H256,
};
use tracing::{debug, info, instrument, warn};

use crate::{emitter::now_millis, error::RelayerError};

pub use consumer::*;
pub use gas::escalate_gas_price;

mod consumer;
mod gas;

/// What should happen to the queue message once dispatch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A terminal state is recorded; delete the message.
    Acknowledge,
    /// The response is still pending; let the message become visible again.
    Redeliver,
}

/// The relay state machine.
pub struct Dispatcher {
    chain: Arc<dyn PingPongChain>,
    store: Arc<dyn StatusStore>,
    mining_timeout: Duration,
}

impl Dispatcher {
    /// `mining_timeout` bounds how long a single dispatch waits for a
    /// response to be mined. Keep it below the queue's visibility timeout.
    pub fn new(
        chain: Arc<dyn PingPongChain>,
        store: Arc<dyn StatusStore>,
        mining_timeout: Duration,
    ) -> Self {
        Self {
            chain,
            store,
            mining_timeout,
        }
    }

    /// Drive the ping named by `item` as far as it can go.
    ///
    /// On failure the error is recorded on the status record (best effort)
    /// and returned; the caller must not acknowledge the message.
    #[instrument(skip(self, item), fields(tx_hash = ?item.tx_hash))]
    pub async fn dispatch(&self, item: WorkItem) -> Result<DispatchOutcome, RelayerError> {
        let mut record = self.load_or_create(item.tx_hash).await?;
        // latest submission accepted by the node, persisted or not
        let mut submission = None;
        match self.drive(&mut record, &mut submission).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.record_failure(&mut record, submission, &err).await;
                Err(err)
            }
        }
    }

    async fn load_or_create(&self, tx_hash: H256) -> Result<TransactionStatusRecord, RelayerError> {
        if let Some(record) = self.store.query_latest_by_tx_hash(tx_hash).await? {
            return Ok(record);
        }
        warn!("No status record for work item, recording it as received");
        let record = TransactionStatusRecord::received(tx_hash, now_millis());
        self.store.upsert(&record).await?;
        Ok(record)
    }

    async fn drive(
        &self,
        record: &mut TransactionStatusRecord,
        submission: &mut Option<SentTx>,
    ) -> Result<DispatchOutcome, RelayerError> {
        match record.state.clone() {
            RelayState::Mined { response_tx, .. } => {
                debug!(?response_tx, "Response already mined, acknowledging");
                Ok(DispatchOutcome::Acknowledge)
            }
            RelayState::Error {
                retryable: false,
                reason,
                ..
            } => {
                warn!(%reason, "Relay failed permanently, acknowledging without retrying");
                Ok(DispatchOutcome::Acknowledge)
            }
            RelayState::Received | RelayState::Error { last_sent: None, .. } => {
                self.submit(record, submission).await
            }
            RelayState::Sent(sent)
            | RelayState::Error {
                last_sent: Some(sent),
                ..
            } => self.resume(record, sent, submission).await,
        }
    }

    /// First submission of the response.
    async fn submit(
        &self,
        record: &mut TransactionStatusRecord,
        submission: &mut Option<SentTx>,
    ) -> Result<DispatchOutcome, RelayerError> {
        let submitted = self
            .chain
            .submit_pong(record.tx_hash, TxOverrides::default())
            .await?;
        let sent = SentTx::new(submitted.nonce, submitted.gas_price, submitted.hash);
        *submission = Some(sent);
        self.transition(record, RelayState::Sent(sent)).await?;
        self.await_mined(record, submitted.hash).await
    }

    /// A response was submitted before. Find out what became of it and
    /// replace it with a better priced one when it is still pending.
    async fn resume(
        &self,
        record: &mut TransactionStatusRecord,
        sent: SentTx,
        submission: &mut Option<SentTx>,
    ) -> Result<DispatchOutcome, RelayerError> {
        if let Some(receipt) = self.chain.transaction_receipt(sent.response_tx).await? {
            return self.conclude(record, receipt).await;
        }

        let confirmed_nonce = self.chain.confirmed_nonce().await?;
        if confirmed_nonce > sent.nonce {
            // one of the replacements for this nonce got mined, not necessarily the last
            warn!(
                nonce = sent.nonce,
                confirmed_nonce,
                response_tx = ?sent.response_tx,
                "Response nonce already mined without a receipt for the latest submission"
            );
            let mined = RelayState::Mined {
                response_tx: sent.response_tx,
                block_number: None,
            };
            self.transition(record, mined).await?;
            return Ok(DispatchOutcome::Acknowledge);
        }

        let estimated_gas_price = self.chain.gas_price().await?;
        let gas_price = escalate_gas_price(sent.gas_price, estimated_gas_price);
        let overrides = TxOverrides {
            nonce: Some(sent.nonce),
            gas_price: Some(gas_price),
        };
        let submitted = self.chain.submit_pong(record.tx_hash, overrides).await?;
        info!(
            nonce = submitted.nonce,
            old_gas_price = ?sent.gas_price,
            gas_price = ?submitted.gas_price,
            replaced_tx = ?sent.response_tx,
            response_tx = ?submitted.hash,
            "Resubmitted stuck response"
        );
        let resent = SentTx::new(submitted.nonce, submitted.gas_price, submitted.hash);
        *submission = Some(resent);
        self.transition(record, RelayState::Sent(resent)).await?;
        self.await_mined(record, submitted.hash).await
    }

    async fn await_mined(
        &self,
        record: &mut TransactionStatusRecord,
        response_tx: H256,
    ) -> Result<DispatchOutcome, RelayerError> {
        match tokio::time::timeout(self.mining_timeout, self.chain.wait_mined(response_tx)).await {
            Ok(receipt) => self.conclude(record, receipt?).await,
            Err(_elapsed) => {
                info!(
                    ?response_tx,
                    timeout = ?self.mining_timeout,
                    "Response not mined in time, leaving the message for redelivery"
                );
                Ok(DispatchOutcome::Redeliver)
            }
        }
    }

    async fn conclude(
        &self,
        record: &mut TransactionStatusRecord,
        receipt: TxReceipt,
    ) -> Result<DispatchOutcome, RelayerError> {
        if !receipt.succeeded {
            return Err(RelayerError::Reverted {
                ping_tx: record.tx_hash,
                response_tx: receipt.transaction_hash,
            });
        }
        let mined = RelayState::Mined {
            response_tx: receipt.transaction_hash,
            block_number: receipt.block_number,
        };
        self.transition(record, mined).await?;
        Ok(DispatchOutcome::Acknowledge)
    }

    /// Persist `next` and only then adopt it locally.
    async fn transition(
        &self,
        record: &mut TransactionStatusRecord,
        next: RelayState,
    ) -> Result<(), RelayerError> {
        if !record.state.can_transition_to(&next) {
            return Err(RelayerError::InvalidTransition {
                tx_hash: record.tx_hash,
                from: record.state.to_string(),
                to: next.to_string(),
            });
        }
        self.store
            .update_state(record.tx_hash, record.timestamp, &record.state, &next)
            .await?;
        info!(
            tx_hash = ?record.tx_hash,
            previous_state = %record.state,
            next_state = %next,
            "Relay state transition"
        );
        record.state = next;
        Ok(())
    }

    /// `submission` is the latest response the node accepted during this
    /// dispatch. It is kept on the error even when its `Sent` write failed,
    /// so the next delivery re-prices that nonce instead of taking a new one.
    async fn record_failure(
        &self,
        record: &mut TransactionStatusRecord,
        submission: Option<SentTx>,
        err: &RelayerError,
    ) {
        if matches!(err, RelayerError::Store(StoreError::StaleState { .. })) {
            warn!(
                error = %err,
                "Status record changed underneath this dispatch, leaving it as is"
            );
            return;
        }
        let failed = RelayState::Error {
            reason: err.to_string(),
            retryable: err.is_retryable(),
            last_sent: submission.or_else(|| record.state.last_sent()),
        };
        if let Err(record_err) = self.transition(record, failed).await {
            warn!(
                error = %record_err,
                original_error = %err,
                "Could not record relay failure"
            );
        }
    }
}
