use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pingpong_core::{PingEvent, PingPongChain};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::{
    emitter::{WorkEmitter, WorkSource},
    error::RelayerError,
};

const MIN_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Turns live `Ping()` events into work items.
pub struct EventIngestor {
    chain: Arc<dyn PingPongChain>,
    emitter: WorkEmitter,
}

impl EventIngestor {
    /// Ingest events from `chain` through `emitter`.
    pub fn new(chain: Arc<dyn PingPongChain>, emitter: WorkEmitter) -> Self {
        Self { chain, emitter }
    }

    /// Follow the event stream from `start_block` until emitting fails.
    /// A broken or finished subscription is re-established after a backoff,
    /// starting again at the newest block an event was seen in.
    #[instrument(skip(self))]
    pub async fn run(&self, start_block: u64) -> Result<(), RelayerError> {
        let mut from_block = start_block;
        let mut backoff = MIN_BACKOFF;
        loop {
            match self.chain.ping_events(from_block).await {
                Ok(mut events) => {
                    info!(from_block, "Subscribed to ping events");
                    while let Some(event) = events.next().await {
                        match event {
                            Ok(event) => {
                                backoff = MIN_BACKOFF;
                                if let Some(block) = event.block_number {
                                    from_block = from_block.max(block);
                                }
                                self.handle(event).await?;
                            }
                            Err(err) => {
                                warn!(error = %err, from_block, "Ping subscription failed");
                                break;
                            }
                        }
                    }
                }
                Err(err) => warn!(error = %err, from_block, "Failed to subscribe to ping events"),
            }

            debug!(?backoff, from_block, "Resubscribing to ping events");
            sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn handle(&self, event: PingEvent) -> Result<(), RelayerError> {
        let Some(tx_hash) = event.tx_hash else {
            warn!(
                block = ?event.block_number,
                "Ping event without a transaction hash, dropping it"
            );
            return Ok(());
        };
        self.emitter.emit(tx_hash, WorkSource::Ingestor).await?;
        Ok(())
    }
}
