use std::fmt::{Display, Formatter};
use std::sync::Arc;

use pingpong_core::{StatusStore, TransactionStatusRecord, WorkItem, WorkQueue, H256};
use tracing::{debug, info};

use crate::error::RelayerError;

/// Which component found a ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkSource {
    /// Live event subscription
    Ingestor,
    /// Recovery scan over historical blocks
    Scanner,
}

impl Display for WorkSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkSource::Ingestor => f.write_str("ingestor"),
            WorkSource::Scanner => f.write_str("scanner"),
        }
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

/// The one path through which pings become work: record the ping as
/// `Received` and enqueue a [`WorkItem`] for the dispatcher.
#[derive(Clone)]
pub struct WorkEmitter {
    store: Arc<dyn StatusStore>,
    queue: Arc<dyn WorkQueue>,
    group_id: String,
}

impl WorkEmitter {
    /// Emit into `queue` under message group `group_id`.
    pub fn new(store: Arc<dyn StatusStore>, queue: Arc<dyn WorkQueue>, group_id: String) -> Self {
        Self {
            store,
            queue,
            group_id,
        }
    }

    /// Record and enqueue `tx_hash`. An existing record is left untouched;
    /// the work item is enqueued either way. Returns whether a new record
    /// was created.
    pub async fn emit(&self, tx_hash: H256, source: WorkSource) -> Result<bool, RelayerError> {
        let created = match self.store.query_latest_by_tx_hash(tx_hash).await? {
            Some(existing) => {
                debug!(
                    ?tx_hash,
                    %source,
                    state = %existing.state,
                    "Ping already recorded, enqueueing without touching the record"
                );
                false
            }
            None => {
                let record = TransactionStatusRecord::received(tx_hash, now_millis());
                self.store.upsert(&record).await?;
                true
            }
        };

        let body = serde_json::to_string(&WorkItem::new(tx_hash))?;
        self.queue.send(&body, &self.group_id).await?;
        info!(?tx_hash, %source, created, queue = self.queue.name(), "Emitted work item");
        Ok(created)
    }
}

#[cfg(test)]
mod test {
    use pingpong_core::{RelayState, SentTx, U256};
    use pingpong_test::{memory::*, test_utils::tx_hash};

    use super::*;

    fn emitter(store: &Arc<MemoryStatusStore>, queue: &Arc<MemoryWorkQueue>) -> WorkEmitter {
        WorkEmitter::new(store.clone(), queue.clone(), "PingMessages".into())
    }

    #[tokio::test]
    async fn first_sighting_records_received_and_enqueues() {
        let store = Arc::new(MemoryStatusStore::new());
        let queue = Arc::new(MemoryWorkQueue::new("main"));

        assert!(emitter(&store, &queue)
            .emit(tx_hash(0xa), WorkSource::Ingestor)
            .await
            .unwrap());

        let record = store.record(tx_hash(0xa)).unwrap();
        assert_eq!(record.state, RelayState::Received);
        assert!(record.timestamp > 0);
        assert_eq!(
            queue.visible_bodies(),
            vec![serde_json::to_string(&WorkItem::new(tx_hash(0xa))).unwrap()]
        );
        assert_eq!(queue.visible_groups(), vec!["PingMessages".to_owned()]);
    }

    #[tokio::test]
    async fn existing_record_is_not_rewritten() {
        let store = Arc::new(MemoryStatusStore::new());
        let queue = Arc::new(MemoryWorkQueue::new("main"));
        let sent = RelayState::Sent(SentTx::new(3, U256::from(5), tx_hash(0xff)));
        store.insert(TransactionStatusRecord::new(tx_hash(0xa), 42, sent.clone()));

        assert!(!emitter(&store, &queue)
            .emit(tx_hash(0xa), WorkSource::Scanner)
            .await
            .unwrap());

        assert_eq!(store.records().len(), 1);
        assert_eq!(store.record(tx_hash(0xa)).unwrap().state, sent);
        assert_eq!(queue.sent_count(), 1);
    }

    #[tokio::test]
    async fn store_outage_is_propagated() {
        let store = Arc::new(MemoryStatusStore::new());
        let queue = Arc::new(MemoryWorkQueue::new("main"));
        store.set_unavailable(true);

        let err = emitter(&store, &queue)
            .emit(tx_hash(1), WorkSource::Ingestor)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayerError::Store(_)));
        assert_eq!(queue.sent_count(), 0);
    }
}
