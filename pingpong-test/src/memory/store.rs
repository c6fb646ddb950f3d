use std::collections::{BTreeMap, HashMap};
use std::io;

use async_trait::async_trait;
use parking_lot::Mutex;
use pingpong_core::*;

#[derive(Debug, Default)]
struct StoreState {
    records: BTreeMap<(H256, u64), TransactionStatusRecord>,
    markers: HashMap<Marker, u64>,
    history: HashMap<H256, Vec<RelayState>>,
    marker_writes: Vec<(Marker, Option<u64>)>,
    unavailable: bool,
    failing_updates: usize,
}

/// A [`StatusStore`] kept in memory that also remembers every state and
/// marker it was asked to write.
#[derive(Debug, Default)]
pub struct MemoryStatusStore {
    inner: Mutex<StoreState>,
}

impl MemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record without going through the trait.
    pub fn insert(&self, record: TransactionStatusRecord) {
        let mut state = self.inner.lock();
        state
            .history
            .entry(record.tx_hash)
            .or_default()
            .push(record.state.clone());
        state
            .records
            .insert((record.tx_hash, record.timestamp), record);
    }

    /// Seed a marker without going through the trait.
    pub fn set_marker(&self, marker: Marker, value: u64) {
        self.inner.lock().markers.insert(marker, value);
    }

    pub fn marker(&self, marker: Marker) -> Option<u64> {
        self.inner.lock().markers.get(&marker).copied()
    }

    pub fn records(&self) -> Vec<TransactionStatusRecord> {
        self.inner.lock().records.values().cloned().collect()
    }

    pub fn record(&self, tx_hash: H256) -> Option<TransactionStatusRecord> {
        self.records().into_iter().find(|r| r.tx_hash == tx_hash)
    }

    /// Every state written for `tx_hash`, oldest first.
    pub fn history(&self, tx_hash: H256) -> Vec<RelayState> {
        self.inner
            .lock()
            .history
            .get(&tx_hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Every marker write (`Some`) and delete (`None`), oldest first.
    pub fn marker_writes(&self) -> Vec<(Marker, Option<u64>)> {
        self.inner.lock().marker_writes.clone()
    }

    /// Make the next `count` state updates fail with `StoreUnavailable`.
    pub fn fail_next_updates(&self, count: usize) {
        self.inner.lock().failing_updates = count;
    }

    /// Make every following call fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.inner.lock().unavailable {
            Err(StoreError::unavailable(
                operation,
                io::Error::new(io::ErrorKind::NotConnected, "store offline"),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn upsert(&self, record: &TransactionStatusRecord) -> StoreResult<()> {
        self.check("upsert")?;
        self.insert(record.clone());
        Ok(())
    }

    async fn get(
        &self,
        tx_hash: H256,
        timestamp: u64,
    ) -> StoreResult<Option<TransactionStatusRecord>> {
        self.check("get")?;
        Ok(self.inner.lock().records.get(&(tx_hash, timestamp)).cloned())
    }

    async fn query_latest_by_tx_hash(
        &self,
        tx_hash: H256,
    ) -> StoreResult<Option<TransactionStatusRecord>> {
        self.check("query_latest_by_tx_hash")?;
        Ok(self
            .inner
            .lock()
            .records
            .range((tx_hash, 0)..=(tx_hash, u64::MAX))
            .next_back()
            .map(|(_, record)| record.clone()))
    }

    async fn scan_latest_by_timestamp(&self) -> StoreResult<Option<TransactionStatusRecord>> {
        self.check("scan_latest_by_timestamp")?;
        Ok(self
            .inner
            .lock()
            .records
            .values()
            .max_by_key(|record| record.timestamp)
            .cloned())
    }

    async fn update_state(
        &self,
        tx_hash: H256,
        timestamp: u64,
        expected: &RelayState,
        state: &RelayState,
    ) -> StoreResult<()> {
        self.check("update_state")?;
        let mut inner = self.inner.lock();
        if inner.failing_updates > 0 {
            inner.failing_updates -= 1;
            return Err(StoreError::unavailable(
                "update_state",
                io::Error::new(io::ErrorKind::TimedOut, "update timed out"),
            ));
        }
        let record = inner
            .records
            .get_mut(&(tx_hash, timestamp))
            .ok_or(StoreError::MissingRecord { tx_hash, timestamp })?;
        if record.state != *expected {
            return Err(StoreError::StaleState {
                tx_hash,
                expected: expected.to_string(),
            });
        }
        record.state = state.clone();
        inner
            .history
            .entry(tx_hash)
            .or_default()
            .push(state.clone());
        Ok(())
    }

    async fn get_marker(&self, marker: Marker) -> StoreResult<Option<u64>> {
        self.check("get_marker")?;
        Ok(self.marker(marker))
    }

    async fn put_marker(&self, marker: Marker, value: u64) -> StoreResult<()> {
        self.check("put_marker")?;
        let mut inner = self.inner.lock();
        inner.markers.insert(marker, value);
        inner.marker_writes.push((marker, Some(value)));
        Ok(())
    }

    async fn delete_marker(&self, marker: Marker) -> StoreResult<()> {
        self.check("delete_marker")?;
        let mut inner = self.inner.lock();
        inner.markers.remove(&marker);
        inner.marker_writes.push((marker, None));
        Ok(())
    }
}
