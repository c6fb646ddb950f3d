use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use pingpong_core::{QueueMessage, QueueResult, WorkItem, WorkQueue, H256};
use tokio::time::sleep;
use tracing::{error, info_span, warn, Instrument};

use super::{DispatchOutcome, Dispatcher};

const RECEIVE_BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const RECEIVE_BACKOFF_MAX: Duration = Duration::from_secs(60);

/// What happened to one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Dispatched to a terminal state and deleted
    Acknowledged,
    /// Left in flight while the response is pending
    Redeliver,
    /// Left in flight after an error
    Failed,
}

/// Counts of message outcomes for one received batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages acknowledged
    pub acknowledged: usize,
    /// Messages left for redelivery while their response is pending
    pub redeliver: usize,
    /// Messages left for redelivery after an error
    pub failed: usize,
}

impl BatchReport {
    /// Messages received in the batch.
    pub fn received(&self) -> usize {
        self.acknowledged + self.redeliver + self.failed
    }
}

/// Long-polls the main queue and feeds work items to the [`Dispatcher`].
pub struct DispatchConsumer {
    dispatcher: Arc<Dispatcher>,
    queue: Arc<dyn WorkQueue>,
    batch_size: i32,
    wait_seconds: i32,
    concurrency: usize,
}

impl DispatchConsumer {
    /// Consume `queue` in batches of `batch_size`, dispatching at most
    /// `concurrency` items at once.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        queue: Arc<dyn WorkQueue>,
        batch_size: i32,
        wait_seconds: i32,
        concurrency: usize,
    ) -> Self {
        Self {
            dispatcher,
            queue,
            batch_size,
            wait_seconds,
            concurrency: concurrency.max(1),
        }
    }

    /// Consume forever. Receive failures are retried with backoff.
    pub async fn run(self) -> eyre::Result<()> {
        let mut backoff = RECEIVE_BACKOFF_INITIAL;
        loop {
            match self.poll_once().await {
                Ok(_) => backoff = RECEIVE_BACKOFF_INITIAL,
                Err(err) => {
                    warn!(error = %err, ?backoff, "Failed to receive work items");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(RECEIVE_BACKOFF_MAX);
                }
            }
        }
    }

    /// Receive one batch and dispatch every message in it. Messages for the
    /// same ping are handled one after the other, distinct pings run up to
    /// `concurrency` at once.
    pub async fn poll_once(&self) -> QueueResult<BatchReport> {
        let messages = self
            .queue
            .receive(self.batch_size, self.wait_seconds)
            .await?;

        let outcomes: Vec<MessageOutcome> = stream::iter(group_by_ping(messages))
            .map(|group| self.handle_group(group))
            .buffer_unordered(self.concurrency)
            .flat_map(stream::iter)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                MessageOutcome::Acknowledged => report.acknowledged += 1,
                MessageOutcome::Redeliver => report.redeliver += 1,
                MessageOutcome::Failed => report.failed += 1,
            }
        }
        Ok(report)
    }

    async fn handle_group(&self, group: Vec<QueueMessage>) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(group.len());
        for message in group {
            outcomes.push(self.handle(message).await);
        }
        outcomes
    }

    async fn handle(&self, message: QueueMessage) -> MessageOutcome {
        let span = info_span!("work_item", message_id = %message.id);
        async {
            let item: WorkItem = match serde_json::from_str(&message.body) {
                Ok(item) => item,
                Err(err) => {
                    warn!(
                        body = %message.body,
                        error = %err,
                        "Malformed work item, leaving it to the dead-letter policy"
                    );
                    return MessageOutcome::Failed;
                }
            };

            match self.dispatcher.dispatch(item).await {
                Ok(DispatchOutcome::Acknowledge) => {
                    match self.queue.delete(&message.receipt_handle).await {
                        Ok(()) => MessageOutcome::Acknowledged,
                        Err(err) => {
                            warn!(
                                tx_hash = ?item.tx_hash,
                                error = %err,
                                "Failed to acknowledge work item"
                            );
                            MessageOutcome::Failed
                        }
                    }
                }
                Ok(DispatchOutcome::Redeliver) => MessageOutcome::Redeliver,
                Err(err) => {
                    error!(
                        tx_hash = ?item.tx_hash,
                        error = %err,
                        retryable = err.is_retryable(),
                        "Dispatch failed, leaving work item for redelivery"
                    );
                    MessageOutcome::Failed
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Split a batch into per-ping groups, keeping delivery order inside each
/// group. Bodies that are not work items each get a group of their own.
fn group_by_ping(messages: Vec<QueueMessage>) -> Vec<Vec<QueueMessage>> {
    let mut groups: Vec<(Option<H256>, Vec<QueueMessage>)> = Vec::new();
    for message in messages {
        let tx_hash = serde_json::from_str::<WorkItem>(&message.body)
            .ok()
            .map(|item| item.tx_hash);
        let existing = groups
            .iter_mut()
            .find(|(key, _)| tx_hash.is_some() && *key == tx_hash);
        match existing {
            Some((_, group)) => group.push(message),
            None => groups.push((tx_hash, vec![message])),
        }
    }
    groups.into_iter().map(|(_, group)| group).collect()
}

#[cfg(test)]
mod test {
    use async_trait::async_trait;
    use pingpong_core::*;
    use pingpong_test::{memory::*, mocks::MockPingPongChain, test_utils::*};
    use tokio::task::yield_now;

    use super::*;

    /// Delegates to the mock, yielding to the runtime around every
    /// submission and mining wait like a real RPC round trip would.
    struct Yielding(MockPingPongChain);

    #[async_trait]
    impl PingPongChain for Yielding {
        async fn ping_events(&self, from_block: u64) -> ChainResult<PingEventStream> {
            self.0.ping_events(from_block).await
        }
        async fn get_transaction(&self, hash: H256) -> ChainResult<Option<ChainTransaction>> {
            self.0.get_transaction(hash).await
        }
        async fn get_block(&self, number: u64) -> ChainResult<Option<ChainBlock>> {
            self.0.get_block(number).await
        }
        async fn get_block_number(&self) -> ChainResult<u64> {
            self.0.get_block_number().await
        }
        async fn submit_pong(
            &self,
            ping_tx: H256,
            overrides: TxOverrides,
        ) -> ChainResult<SubmittedTx> {
            yield_now().await;
            let submitted = self.0.submit_pong(ping_tx, overrides).await;
            yield_now().await;
            submitted
        }
        async fn wait_mined(&self, hash: H256) -> ChainResult<TxReceipt> {
            yield_now().await;
            self.0.wait_mined(hash).await
        }
        async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TxReceipt>> {
            self.0.transaction_receipt(hash).await
        }
        async fn confirmed_nonce(&self) -> ChainResult<u64> {
            self.0.confirmed_nonce().await
        }
        async fn gas_price(&self) -> ChainResult<U256> {
            self.0.gas_price().await
        }
        fn decode_call(&self, data: &[u8]) -> Result<DecodedCall, ChainCommunicationError> {
            self.0.decode_call(data)
        }
    }

    fn body(n: u64) -> String {
        serde_json::to_string(&WorkItem::new(tx_hash(n))).unwrap()
    }

    fn consumer(
        chain: MockPingPongChain,
        store: &Arc<MemoryStatusStore>,
        queue: &Arc<MemoryWorkQueue>,
        concurrency: usize,
    ) -> DispatchConsumer {
        let dispatcher = Dispatcher::new(
            Arc::new(Yielding(chain)),
            store.clone(),
            Duration::from_secs(270),
        );
        DispatchConsumer::new(Arc::new(dispatcher), queue.clone(), 10, 0, concurrency)
    }

    #[test]
    fn batch_is_grouped_per_ping_in_delivery_order() {
        let messages = vec![
            QueueMessage::new("1".into(), body(0xa), "h1".into()),
            QueueMessage::new("2".into(), body(0xc), "h2".into()),
            QueueMessage::new("3".into(), "junk".into(), "h3".into()),
            QueueMessage::new("4".into(), body(0xa), "h4".into()),
            QueueMessage::new("5".into(), "junk".into(), "h5".into()),
        ];

        let ids: Vec<Vec<String>> = group_by_ping(messages)
            .into_iter()
            .map(|group| group.into_iter().map(|m| m.id).collect())
            .collect();

        assert_eq!(ids, vec![vec!["1", "4"], vec!["2"], vec!["3"], vec!["5"]]);
    }

    #[tokio::test]
    async fn duplicates_in_one_batch_are_answered_once_under_concurrency() {
        let store = Arc::new(MemoryStatusStore::new());
        store.insert(TransactionStatusRecord::received(tx_hash(0xa), 1));
        store.insert(TransactionStatusRecord::received(tx_hash(0xc), 2));
        let queue = Arc::new(MemoryWorkQueue::new("main"));
        for n in [0xa, 0xa, 0xc] {
            queue.send(&body(n), "PingMessages").await.unwrap();
        }

        let mut chain = MockPingPongChain::new();
        chain
            .expect_submit_pong()
            .withf(|ping, _| *ping == tx_hash(0xa))
            .times(1)
            .returning(|_, _| Ok(submitted(tx_hash(0xba), 0, 10)));
        chain
            .expect_submit_pong()
            .withf(|ping, _| *ping == tx_hash(0xc))
            .times(1)
            .returning(|_, _| Ok(submitted(tx_hash(0xbc), 1, 10)));
        chain
            .expect_wait_mined()
            .returning(|hash| Ok(mined(hash, 5)));

        let report = consumer(chain, &store, &queue, 2)
            .poll_once()
            .await
            .unwrap();

        assert_eq!(report.acknowledged, 3);
        assert_eq!(queue.deleted_count(), 3);
        assert_eq!(store.history(tx_hash(0xa)).len(), 3);
        assert!(matches!(
            store.record(tx_hash(0xa)).unwrap().state,
            RelayState::Mined { .. }
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_left_in_flight() {
        let store = Arc::new(MemoryStatusStore::new());
        let queue = Arc::new(MemoryWorkQueue::new("main"));
        queue.send("{\"hash\":1}", "PingMessages").await.unwrap();

        let report = consumer(MockPingPongChain::new(), &store, &queue, 1)
            .poll_once()
            .await
            .unwrap();

        assert_eq!(report, BatchReport { acknowledged: 0, redeliver: 0, failed: 1 });
        assert_eq!(queue.in_flight_len(), 1);
        assert!(store.records().is_empty());
    }
}
