use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::H256;

/// The body of a queue message asking for a ping to be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Hash of the ping transaction
    pub tx_hash: H256,
}

/// A message received from a [`WorkQueue`](crate::WorkQueue).
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct QueueMessage {
    /// Queue assigned message id
    pub id: String,
    /// Raw message body
    pub body: String,
    /// Handle used to acknowledge (delete) this delivery
    pub receipt_handle: String,
}
