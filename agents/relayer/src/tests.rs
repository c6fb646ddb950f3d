//! End to end scenarios across the emitter, ingestor, dispatcher and
//! redirector, with in-memory queues and store.

use std::sync::Arc;
use std::time::Duration;

use futures::{stream, StreamExt};
use mockall::predicate::eq;
use pingpong_core::*;
use pingpong_test::{memory::*, mocks::MockPingPongChain, test_utils::*};

use crate::*;

const GROUP: &str = "PingMessages";

struct World {
    store: Arc<MemoryStatusStore>,
    main: Arc<MemoryWorkQueue>,
    dead_letters: Arc<MemoryWorkQueue>,
}

impl World {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStatusStore::new()),
            main: Arc::new(MemoryWorkQueue::new("main")),
            dead_letters: Arc::new(MemoryWorkQueue::new("dlq")),
        }
    }

    fn emitter(&self) -> WorkEmitter {
        WorkEmitter::new(self.store.clone(), self.main.clone(), GROUP.into())
    }

    fn consumer(&self, chain: MockPingPongChain) -> DispatchConsumer {
        let dispatcher = Dispatcher::new(
            Arc::new(chain),
            self.store.clone(),
            Duration::from_secs(270),
        );
        DispatchConsumer::new(Arc::new(dispatcher), self.main.clone(), 10, 0, 1)
    }

    fn redirector(&self) -> DeadLetterRedirector {
        DeadLetterRedirector::new(
            self.dead_letters.clone(),
            self.main.clone(),
            GROUP.into(),
            Duration::from_secs(60),
            10,
            0,
        )
    }
}

#[tokio::test(start_paused = true)]
async fn duplicate_event_is_answered_once() {
    let world = World::new();

    let mut events = MockPingPongChain::new();
    events.expect_ping_events().returning(|_| {
        let event = PingEvent::new(Some(tx_hash(0xa)), Some(100));
        Ok(stream::iter(vec![Ok::<_, ChainCommunicationError>(event), Ok(event)])
            .chain(stream::pending())
            .boxed())
    });
    let ingestor = EventIngestor::new(Arc::new(events), world.emitter());
    tokio::select! {
        result = ingestor.run(100) => panic!("ingestor stopped: {result:?}"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }
    assert_eq!(world.store.records().len(), 1);
    assert_eq!(world.main.visible_bodies().len(), 2);

    let mut chain = MockPingPongChain::new();
    chain
        .expect_submit_pong()
        .with(eq(tx_hash(0xa)), eq(TxOverrides::default()))
        .times(1)
        .returning(|_, _| Ok(submitted(tx_hash(0xb0), 0, 1_000_000_000)));
    chain
        .expect_wait_mined()
        .times(1)
        .returning(|hash| Ok(mined(hash, 101)));

    let report = world.consumer(chain).poll_once().await.unwrap();

    assert_eq!(report.acknowledged, 2);
    assert_eq!(world.main.deleted_count(), 2);
    assert_eq!(
        world.store.record(tx_hash(0xa)).unwrap().state,
        RelayState::Mined {
            response_tx: tx_hash(0xb0),
            block_number: Some(101)
        }
    );
}

#[tokio::test]
async fn redelivery_after_crash_finds_the_response_mined() {
    let world = World::new();
    let sent = SentTx::new(7, U256::from(2_000_000_000u64), tx_hash(0xb7));
    world.store.insert(TransactionStatusRecord::new(
        tx_hash(0xa),
        1_700_000_000_000,
        RelayState::Sent(sent),
    ));
    world
        .main
        .send(&serde_json::to_string(&WorkItem::new(tx_hash(0xa))).unwrap(), GROUP)
        .await
        .unwrap();

    let mut chain = MockPingPongChain::new();
    chain
        .expect_transaction_receipt()
        .with(eq(tx_hash(0xb7)))
        .times(1)
        .returning(|hash| Ok(Some(mined(hash, 88))));
    chain.expect_submit_pong().never();

    let report = world.consumer(chain).poll_once().await.unwrap();

    assert_eq!(report.acknowledged, 1);
    assert_eq!(
        world.store.history(tx_hash(0xa)),
        vec![
            RelayState::Sent(sent),
            RelayState::Mined {
                response_tx: tx_hash(0xb7),
                block_number: Some(88)
            },
        ]
    );
}

#[tokio::test]
async fn dead_lettered_mined_ping_is_acknowledged_without_chain_calls() {
    let world = World::new();
    let mined_state = RelayState::Mined {
        response_tx: tx_hash(0xbb),
        block_number: Some(12),
    };
    world.store.insert(TransactionStatusRecord::new(
        tx_hash(0xb),
        1_700_000_000_000,
        mined_state.clone(),
    ));
    let body = serde_json::to_string(&WorkItem::new(tx_hash(0xb))).unwrap();
    world.dead_letters.send(&body, GROUP).await.unwrap();

    let redirected = world.redirector().redirect_batch().await.unwrap();
    assert_eq!(redirected.redirected, 1);
    assert_eq!(world.main.visible_bodies(), vec![body]);

    // no expectations: any chain call fails the test
    let report = world
        .consumer(MockPingPongChain::new())
        .poll_once()
        .await
        .unwrap();

    assert_eq!(report.acknowledged, 1);
    assert_eq!(world.main.deleted_count(), 1);
    assert_eq!(world.dead_letters.deleted_count(), 1);
    assert_eq!(world.store.history(tx_hash(0xb)), vec![mined_state]);
}
