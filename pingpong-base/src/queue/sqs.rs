use async_trait::async_trait;
use aws_sdk_sqs::Client;
use pingpong_core::{QueueError, QueueMessage, QueueResult, WorkQueue};
use tracing::{debug, warn};
use uuid::Uuid;

/// [`WorkQueue`] backed by an SQS queue.
///
/// FIFO queues (URL ending in `.fifo`) get the message group from the caller
/// and a random deduplication id, so that a body republished from the
/// dead-letter queue is never swallowed by content based deduplication.
#[derive(Debug, Clone)]
pub struct SqsWorkQueue {
    client: Client,
    queue_url: String,
    fifo: bool,
}

impl SqsWorkQueue {
    /// Wrap the queue at `queue_url`.
    pub fn new(client: Client, queue_url: String) -> Self {
        let fifo = queue_url.ends_with(".fifo");
        Self {
            client,
            queue_url,
            fifo,
        }
    }
}

#[async_trait]
impl WorkQueue for SqsWorkQueue {
    fn name(&self) -> &str {
        &self.queue_url
    }

    async fn send(&self, body: &str, group_id: &str) -> QueueResult<()> {
        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);
        if self.fifo {
            request = request
                .message_group_id(group_id)
                .message_deduplication_id(Uuid::new_v4().to_string());
        }
        let output = request
            .send()
            .await
            .map_err(|err| QueueError::transport(&self.queue_url, "send", err))?;
        debug!(
            queue = %self.queue_url,
            message_id = output.message_id.as_deref(),
            "Sent message"
        );
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> QueueResult<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages)
            .wait_time_seconds(wait_seconds)
            .send()
            .await
            .map_err(|err| QueueError::transport(&self.queue_url, "receive", err))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let id = message.message_id.unwrap_or_default();
                match (message.body, message.receipt_handle) {
                    (Some(body), Some(receipt_handle)) => {
                        Some(QueueMessage::new(id, body, receipt_handle))
                    }
                    _ => {
                        warn!(
                            queue = %self.queue_url,
                            message_id = %id,
                            "Dropping message without body or receipt handle"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|err| QueueError::transport(&self.queue_url, "delete", err))?;
        Ok(())
    }
}
