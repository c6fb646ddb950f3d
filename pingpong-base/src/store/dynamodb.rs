use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValuesOnConditionCheckFailure};
use aws_sdk_dynamodb::Client;
use derive_new::new;
use pingpong_core::{
    Marker, RelayState, StatusStore, StoreError, StoreResult, TransactionStatusRecord, H256,
};
use tracing::{debug, instrument};

const TX_HASH: &str = "txHash";
const TIMESTAMP: &str = "timestamp";
const STATE: &str = "state";
const PROP: &str = "prop";
const VALUE: &str = "value";

type Item = HashMap<String, AttributeValue>;

/// [`StatusStore`] backed by two DynamoDB tables: one keyed by
/// (`txHash`, `timestamp`) holding the relay records and one keyed by `prop`
/// holding numeric markers.
#[derive(Debug, Clone, new)]
pub struct DynamoDbStatusStore {
    client: Client,
    status_table: String,
    marker_table: String,
}

fn hash_value(tx_hash: H256) -> AttributeValue {
    AttributeValue::S(format!("{tx_hash:?}"))
}

fn record_key(tx_hash: H256, timestamp: u64) -> Item {
    HashMap::from([
        (TX_HASH.to_owned(), hash_value(tx_hash)),
        (TIMESTAMP.to_owned(), AttributeValue::N(timestamp.to_string())),
    ])
}

fn marker_key(marker: Marker) -> Item {
    HashMap::from([(PROP.to_owned(), AttributeValue::S(marker.prop().to_owned()))])
}

fn decode_record(item: Item) -> StoreResult<TransactionStatusRecord> {
    let key = item
        .get(TX_HASH)
        .and_then(|value| value.as_s().ok())
        .cloned()
        .unwrap_or_else(|| "<unknown>".to_owned());
    serde_dynamo::from_item(item).map_err(|err| StoreError::corrupt(key, err))
}

fn decode_marker(marker: Marker, item: &Item) -> StoreResult<u64> {
    let value = item
        .get(VALUE)
        .ok_or_else(|| StoreError::corrupt(marker, "missing value"))?;
    let number = value
        .as_n()
        .map_err(|_| StoreError::corrupt(marker, "value is not a number"))?;
    number
        .parse::<u64>()
        .map_err(|err| StoreError::corrupt(marker, err))
}

#[async_trait]
impl StatusStore for DynamoDbStatusStore {
    #[instrument(skip_all, fields(tx_hash = ?record.tx_hash))]
    async fn upsert(&self, record: &TransactionStatusRecord) -> StoreResult<()> {
        let item: Item = serde_dynamo::to_item(record)
            .map_err(|err| StoreError::corrupt(format!("{:?}", record.tx_hash), err))?;
        self.client
            .put_item()
            .table_name(&self.status_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|err| StoreError::unavailable("upsert", err))?;
        Ok(())
    }

    async fn get(
        &self,
        tx_hash: H256,
        timestamp: u64,
    ) -> StoreResult<Option<TransactionStatusRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.status_table)
            .set_key(Some(record_key(tx_hash, timestamp)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| StoreError::unavailable("get", err))?;
        output.item.map(decode_record).transpose()
    }

    async fn query_latest_by_tx_hash(
        &self,
        tx_hash: H256,
    ) -> StoreResult<Option<TransactionStatusRecord>> {
        let output = self
            .client
            .query()
            .table_name(&self.status_table)
            .key_condition_expression("#h = :h")
            .expression_attribute_names("#h", TX_HASH)
            .expression_attribute_values(":h", hash_value(tx_hash))
            .scan_index_forward(false)
            .limit(1)
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| StoreError::unavailable("query_latest_by_tx_hash", err))?;
        output
            .items
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(decode_record)
            .transpose()
    }

    async fn scan_latest_by_timestamp(&self) -> StoreResult<Option<TransactionStatusRecord>> {
        let mut latest: Option<TransactionStatusRecord> = None;
        let mut start_key: Option<Item> = None;
        let mut pages = 0usize;
        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.status_table)
                .consistent_read(true)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|err| StoreError::unavailable("scan_latest_by_timestamp", err))?;
            pages += 1;

            for item in output.items.unwrap_or_default() {
                let record = decode_record(item)?;
                if latest
                    .as_ref()
                    .map_or(true, |current| record.timestamp > current.timestamp)
                {
                    latest = Some(record);
                }
            }

            match output.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }
        debug!(pages, found = latest.is_some(), "Scanned status table");
        Ok(latest)
    }

    #[instrument(skip(self, expected, state), fields(expected = %expected, state = %state))]
    async fn update_state(
        &self,
        tx_hash: H256,
        timestamp: u64,
        expected: &RelayState,
        state: &RelayState,
    ) -> StoreResult<()> {
        let encode = |state: &RelayState| -> StoreResult<AttributeValue> {
            serde_dynamo::to_attribute_value(state)
                .map_err(|err| StoreError::corrupt(format!("{tx_hash:?}"), err))
        };
        self.client
            .update_item()
            .table_name(&self.status_table)
            .set_key(Some(record_key(tx_hash, timestamp)))
            .update_expression("SET #s = :s")
            .condition_expression("attribute_exists(#h) AND #s = :expected")
            .expression_attribute_names("#s", STATE)
            .expression_attribute_names("#h", TX_HASH)
            .expression_attribute_values(":s", encode(state)?)
            .expression_attribute_values(":expected", encode(expected)?)
            .return_values_on_condition_check_failure(ReturnValuesOnConditionCheckFailure::AllOld)
            .send()
            .await
            .map_err(|err| {
                // the old item is only returned when the record exists
                let record_exists = match err.as_service_error() {
                    Some(UpdateItemError::ConditionalCheckFailedException(failed)) => {
                        Some(failed.item().is_some())
                    }
                    _ => None,
                };
                match record_exists {
                    Some(true) => StoreError::StaleState {
                        tx_hash,
                        expected: expected.to_string(),
                    },
                    Some(false) => StoreError::MissingRecord { tx_hash, timestamp },
                    None => StoreError::unavailable("update_state", err),
                }
            })?;
        Ok(())
    }

    async fn get_marker(&self, marker: Marker) -> StoreResult<Option<u64>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.marker_table)
            .set_key(Some(marker_key(marker)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|err| StoreError::unavailable("get_marker", err))?;
        output
            .item
            .map(|item| decode_marker(marker, &item))
            .transpose()
    }

    #[instrument(skip(self))]
    async fn put_marker(&self, marker: Marker, value: u64) -> StoreResult<()> {
        let mut item = marker_key(marker);
        item.insert(VALUE.to_owned(), AttributeValue::N(value.to_string()));
        self.client
            .put_item()
            .table_name(&self.marker_table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|err| StoreError::unavailable("put_marker", err))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_marker(&self, marker: Marker) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.marker_table)
            .set_key(Some(marker_key(marker)))
            .send()
            .await
            .map_err(|err| StoreError::unavailable("delete_marker", err))?;
        Ok(())
    }
}
