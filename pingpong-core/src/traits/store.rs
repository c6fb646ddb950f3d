use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{Marker, RelayState, StoreResult, TransactionStatusRecord, H256};

/// Durable relay state: one [`TransactionStatusRecord`] per ping plus the
/// singleton [`Marker`]s. "Not found" is always `Ok(None)`.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait StatusStore: Send + Sync {
    /// Write a whole record.
    async fn upsert(&self, record: &TransactionStatusRecord) -> StoreResult<()>;

    /// Exact key lookup.
    async fn get(&self, tx_hash: H256, timestamp: u64)
        -> StoreResult<Option<TransactionStatusRecord>>;

    /// The record for `tx_hash`, whatever its timestamp.
    async fn query_latest_by_tx_hash(
        &self,
        tx_hash: H256,
    ) -> StoreResult<Option<TransactionStatusRecord>>;

    /// The most recently created record in the table.
    async fn scan_latest_by_timestamp(&self) -> StoreResult<Option<TransactionStatusRecord>>;

    /// Replace only the state of an existing record, provided its stored
    /// state still equals `expected`. Fails with
    /// [`StoreError::MissingRecord`](crate::StoreError::MissingRecord) when
    /// the record does not exist and with
    /// [`StoreError::StaleState`](crate::StoreError::StaleState) when another
    /// writer got there first.
    async fn update_state(
        &self,
        tx_hash: H256,
        timestamp: u64,
        expected: &RelayState,
        state: &RelayState,
    ) -> StoreResult<()>;

    /// Read a marker.
    async fn get_marker(&self, marker: Marker) -> StoreResult<Option<u64>>;

    /// Write a marker.
    async fn put_marker(&self, marker: Marker, value: u64) -> StoreResult<()>;

    /// Remove a marker. Removing an absent marker is not an error.
    async fn delete_marker(&self, marker: Marker) -> StoreResult<()>;
}
