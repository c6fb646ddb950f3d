use async_trait::async_trait;
use auto_impl::auto_impl;

use crate::{QueueMessage, QueueResult};

/// A FIFO, at-least-once queue with visibility timeouts. Messages that are
/// received but not deleted become visible again once the timeout expires.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait WorkQueue: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Publish `body` in message group `group_id`.
    async fn send(&self, body: &str, group_id: &str) -> QueueResult<()>;

    /// Long-poll for up to `max_messages`, waiting at most `wait_seconds`.
    async fn receive(&self, max_messages: i32, wait_seconds: i32)
        -> QueueResult<Vec<QueueMessage>>;

    /// Acknowledge a delivery.
    async fn delete(&self, receipt_handle: &str) -> QueueResult<()>;
}
