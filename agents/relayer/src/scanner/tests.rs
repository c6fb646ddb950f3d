use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pingpong_core::*;
use pingpong_test::{memory::*, mocks::MockPingPongChain, test_utils::*};

use super::*;

const PING_SELECTOR: [u8; 4] = [0x5c, 0x36, 0xb1, 0x86];
const PONG_SELECTOR: [u8; 4] = [0x05, 0xba, 0x88, 0x5b];
const COOLDOWN: Duration = Duration::from_secs(60 * 60);

fn contract() -> Address {
    Address::from_low_u64_be(0xc0)
}

fn ping(n: u64, block: u64) -> ChainTransaction {
    contract_call(tx_hash(n), block, contract(), &PING_SELECTOR)
}

fn decode(data: &[u8]) -> Result<DecodedCall, ChainCommunicationError> {
    if data.starts_with(&PING_SELECTOR) {
        Ok(DecodedCall::new("ping".into()))
    } else if data.starts_with(&PONG_SELECTOR) {
        Ok(DecodedCall::new("pong".into()))
    } else {
        Err(ChainCommunicationError::DecodeError("unknown selector".into()))
    }
}

/// A fake chain: blocks with their transactions, plus the failures to inject.
#[derive(Default)]
struct Ledger {
    head: u64,
    blocks: BTreeMap<u64, Vec<ChainTransaction>>,
    broken: HashSet<u64>,
    quota_once: Mutex<HashSet<u64>>,
    flaky_once: Mutex<HashSet<u64>>,
    fetched: Mutex<Vec<u64>>,
}

impl Ledger {
    fn new(head: u64) -> Self {
        Self {
            head,
            ..Default::default()
        }
    }

    fn with_block(mut self, number: u64, transactions: Vec<ChainTransaction>) -> Self {
        self.blocks.insert(number, transactions);
        self
    }

    fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }

    fn chain(self: &Arc<Self>) -> MockPingPongChain {
        let mut chain = MockPingPongChain::new();
        let ledger = self.clone();
        chain
            .expect_get_block_number()
            .returning(move || Ok(ledger.head));
        let ledger = self.clone();
        chain.expect_get_block().returning(move |number| {
            ledger.fetched.lock().unwrap().push(number);
            if ledger.quota_once.lock().unwrap().remove(&number) {
                return Err(ChainCommunicationError::QuotaExceeded(
                    "daily request count exceeded".into(),
                ));
            }
            if ledger.broken.contains(&number) || ledger.flaky_once.lock().unwrap().remove(&number)
            {
                return Err(ChainCommunicationError::from_other_str("connection reset"));
            }
            Ok(ledger
                .blocks
                .get(&number)
                .map(|txs| block(number, txs.iter().map(|tx| tx.hash).collect())))
        });
        let ledger = self.clone();
        chain.expect_get_transaction().returning(move |hash| {
            Ok(ledger
                .blocks
                .values()
                .flatten()
                .find(|tx| tx.hash == hash)
                .cloned())
        });
        chain.expect_decode_call().returning(decode);
        chain
    }
}

struct Harness {
    ledger: Arc<Ledger>,
    store: Arc<MemoryStatusStore>,
    queue: Arc<MemoryWorkQueue>,
}

impl Harness {
    /// The latest relayed ping is 0x1 in block 10, so recovery starts at 11.
    fn new(ledger: Ledger) -> Self {
        let ledger = Arc::new(ledger.with_block(10, vec![ping(1, 10)]));
        let store = Arc::new(MemoryStatusStore::new());
        store.insert(TransactionStatusRecord::received(tx_hash(1), 2_000));
        Self {
            ledger,
            store,
            queue: Arc::new(MemoryWorkQueue::new("main")),
        }
    }

    fn scanner(&self, budget: QuotaBudget, checkpoint_interval: u64) -> RecoveryScanner {
        let emitter = WorkEmitter::new(
            self.store.clone(),
            self.queue.clone(),
            "PingMessages".into(),
        );
        RecoveryScanner::new(
            Arc::new(self.ledger.chain()),
            self.store.clone(),
            emitter,
            contract(),
            budget,
            COOLDOWN,
            checkpoint_interval,
        )
    }

    async fn run(&self) -> ScanReport {
        self.scanner(QuotaBudget::new(6_000_000, 0.8, 80, 80), 100)
            .run()
            .await
            .unwrap()
    }

    fn enqueued(&self) -> Vec<H256> {
        self.queue
            .visible_bodies()
            .iter()
            .map(|body| serde_json::from_str::<WorkItem>(body).unwrap().tx_hash)
            .collect()
    }
}

#[tokio::test(start_paused = true)]
async fn emits_only_pings_missing_from_the_store() {
    let mut to_elsewhere = ping(5, 11);
    to_elsewhere.to = Some(Address::from_low_u64_be(0xdead));
    let ledger = Ledger::new(12)
        .with_block(
            11,
            vec![
                ping(2, 11),
                contract_call(tx_hash(4), 11, contract(), &PONG_SELECTOR),
                to_elsewhere,
            ],
        )
        .with_block(12, vec![ping(3, 12)]);
    let harness = Harness::new(ledger);
    // already relayed, but recorded before the latest record
    harness
        .store
        .insert(TransactionStatusRecord::received(tx_hash(3), 1_000));
    harness.store.set_marker(Marker::InitialBlockNumber, 13);

    let report = harness.run().await;

    assert_eq!(report.blocks_scanned, 2);
    assert_eq!(report.emitted, 1);
    assert_eq!(harness.enqueued(), vec![tx_hash(2)]);
    assert_eq!(
        harness.store.record(tx_hash(2)).unwrap().state,
        RelayState::Received
    );
    assert_eq!(harness.store.history(tx_hash(3)), vec![RelayState::Received]);
    assert!(harness.store.record(tx_hash(4)).is_none());
    assert!(harness.store.record(tx_hash(5)).is_none());
}

#[tokio::test(start_paused = true)]
async fn quota_exhaustion_pauses_and_retries_the_same_block() {
    let ledger = Ledger::new(20)
        .with_block(13, vec![ping(2, 13)])
        .with_block(15, vec![ping(3, 15)]);
    ledger.quota_once.lock().unwrap().insert(13);
    let harness = Harness::new(ledger);
    harness.store.set_marker(Marker::InitialBlockNumber, 16);

    let started = tokio::time::Instant::now();
    let report = harness.run().await;

    assert!(started.elapsed() >= COOLDOWN);
    assert_eq!(report.cooldowns, 1);
    assert_eq!(report.blocks_scanned, 5);
    assert_eq!(harness.ledger.fetched(), vec![11, 12, 13, 13, 14, 15]);
    assert_eq!(harness.enqueued(), vec![tx_hash(2), tx_hash(3)]);
    assert!(harness
        .store
        .marker_writes()
        .contains(&(Marker::ScanProgress, Some(2))));
    assert_eq!(harness.store.marker(Marker::ScanProgress), None);
    assert_eq!(harness.store.marker(Marker::ScanStartBlock), None);
}

#[tokio::test(start_paused = true)]
async fn restart_resumes_from_persisted_progress() {
    let ledger = Ledger::new(20)
        .with_block(12, vec![ping(2, 12)])
        .with_block(14, vec![ping(3, 14)]);
    let harness = Harness::new(ledger);
    harness.store.set_marker(Marker::InitialBlockNumber, 16);
    harness.store.set_marker(Marker::ScanStartBlock, 11);
    harness.store.set_marker(Marker::ScanProgress, 3);

    let report = harness.run().await;

    assert_eq!(harness.ledger.fetched(), vec![14, 15]);
    assert_eq!(report.blocks_scanned, 2);
    assert_eq!(harness.enqueued(), vec![tx_hash(3)]);
}

#[tokio::test(start_paused = true)]
async fn progress_is_checkpointed_and_cleared_on_completion() {
    let harness = Harness::new(Ledger::new(15));

    harness
        .scanner(QuotaBudget::new(6_000_000, 0.8, 80, 80), 2)
        .run()
        .await
        .unwrap();

    assert_eq!(
        harness.store.marker_writes(),
        vec![
            (Marker::ScanStartBlock, Some(11)),
            (Marker::ScanProgress, Some(2)),
            (Marker::ScanProgress, Some(4)),
            (Marker::ScanProgress, None),
            (Marker::ScanStartBlock, None),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn scan_stops_below_the_live_boundary() {
    let ledger = Ledger::new(30).with_block(14, vec![ping(2, 14)]);
    let harness = Harness::new(ledger);
    harness.store.set_marker(Marker::InitialBlockNumber, 14);

    let report = harness.run().await;

    assert_eq!(harness.ledger.fetched(), vec![11, 12, 13]);
    assert_eq!(report.emitted, 0);
}

#[tokio::test(start_paused = true)]
async fn a_day_of_scanning_stays_within_the_daily_budget() {
    let harness = Harness::new(Ledger::new(100));
    // ten blocks per day
    let budget = QuotaBudget::new(10, 1.0, 1, 0);
    let scanner = harness.scanner(budget, 100);

    let scan = tokio::spawn(async move { scanner.run().await });
    tokio::time::sleep(BUDGET_WINDOW).await;
    let fetched = harness.ledger.fetched().len() as u64;
    scan.abort();

    assert!(fetched <= budget.blocks_per_window(), "fetched {fetched}");
    assert!(fetched >= budget.blocks_per_window() - 1, "fetched {fetched}");
}

#[tokio::test(start_paused = true)]
async fn empty_store_means_nothing_to_recover() {
    let store = Arc::new(MemoryStatusStore::new());
    let queue = Arc::new(MemoryWorkQueue::new("main"));
    let emitter = WorkEmitter::new(store.clone(), queue.clone(), "PingMessages".into());
    // no expectations: any chain call fails the test
    let scanner = RecoveryScanner::new(
        Arc::new(MockPingPongChain::new()),
        store.clone(),
        emitter,
        contract(),
        QuotaBudget::new(6_000_000, 0.8, 80, 80),
        COOLDOWN,
        100,
    );

    assert_eq!(scanner.run().await.unwrap(), ScanReport::default());
    assert!(store.marker_writes().is_empty());
    assert_eq!(queue.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
#[tracing_test::traced_test]
async fn unreadable_blocks_and_transactions_are_skipped() {
    let mut ledger = Ledger::new(15)
        .with_block(11, vec![])
        .with_block(
            13,
            vec![contract_call(tx_hash(6), 13, contract(), &[0xff, 0xff])],
        )
        .with_block(15, vec![ping(2, 15)]);
    // block 12 is missing, block 14 fails to load
    ledger.broken.insert(14);
    let harness = Harness::new(ledger);

    let report = harness.run().await;

    assert_eq!(report.blocks_scanned, 5);
    assert_eq!(report.cooldowns, 0);
    assert_eq!(harness.enqueued(), vec![tx_hash(2)]);
    assert_eq!(harness.ledger.fetched(), vec![11, 12, 13, 14, 14, 14, 15]);
    assert!(logs_contain("Giving up on block"));
}

#[tokio::test(start_paused = true)]
async fn transient_block_failure_is_retried() {
    let ledger = Ledger::new(13).with_block(12, vec![ping(2, 12)]);
    ledger.flaky_once.lock().unwrap().insert(12);
    let harness = Harness::new(ledger);

    let report = harness.run().await;

    assert_eq!(harness.ledger.fetched(), vec![11, 12, 12, 13]);
    assert_eq!(report.blocks_scanned, 3);
    assert_eq!(harness.enqueued(), vec![tx_hash(2)]);
}

#[tokio::test(start_paused = true)]
async fn live_record_above_the_boundary_is_not_a_scan_start() {
    let ledger = Ledger::new(30).with_block(25, vec![ping(7, 25)]);
    let harness = Harness::new(ledger);
    // written by a live ingestor that started before any scan start was pinned
    harness
        .store
        .insert(TransactionStatusRecord::received(tx_hash(7), 3_000));
    harness.store.set_marker(Marker::InitialBlockNumber, 20);

    let report = harness.run().await;

    assert_eq!(report, ScanReport::default());
    assert!(harness.ledger.fetched().is_empty());
    assert!(harness.store.marker_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn scan_start_pinned_at_startup_survives_live_records() {
    let ledger = Ledger::new(30)
        .with_block(13, vec![ping(2, 13)])
        .with_block(20, vec![ping(7, 20)]);
    let harness = Harness::new(ledger);

    let chain = harness.ledger.chain();
    let pinned = pin_scan_start(&chain, &*harness.store, None).await.unwrap();
    assert_eq!(pinned, Some(11));
    harness.store.set_marker(Marker::InitialBlockNumber, 16);
    harness
        .store
        .insert(TransactionStatusRecord::received(tx_hash(7), 3_000));

    let report = harness.run().await;

    assert_eq!(harness.ledger.fetched(), vec![11, 12, 13, 14, 15]);
    assert_eq!(report.blocks_scanned, 5);
    assert_eq!(harness.enqueued(), vec![tx_hash(2)]);
}

#[tokio::test(start_paused = true)]
async fn existing_pin_is_kept() {
    let harness = Harness::new(Ledger::new(30));
    harness.store.set_marker(Marker::ScanStartBlock, 4);

    // no expectations: the pin is returned without touching the chain
    let pinned = pin_scan_start(&MockPingPongChain::new(), &*harness.store, Some(20))
        .await
        .unwrap();

    assert_eq!(pinned, Some(4));
    assert!(harness.store.marker_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn store_outage_aborts_the_scan_and_keeps_progress() {
    let harness = Harness::new(Ledger::new(15));
    harness.store.set_marker(Marker::ScanStartBlock, 11);
    harness.store.set_marker(Marker::ScanProgress, 2);
    harness.store.set_unavailable(true);

    let err = harness
        .scanner(QuotaBudget::new(6_000_000, 0.8, 80, 80), 100)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, RelayerError::Store(_)));
    assert_eq!(harness.store.marker(Marker::ScanProgress), Some(2));
}
