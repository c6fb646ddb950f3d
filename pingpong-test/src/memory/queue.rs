use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pingpong_core::*;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: String,
    body: String,
    group_id: String,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    visible: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    next_id: u64,
    sent: usize,
    deleted: usize,
    rejected_bodies: HashSet<String>,
    unavailable: bool,
}

/// A FIFO [`WorkQueue`] kept in memory. Received messages stay in flight
/// until deleted or until [`MemoryWorkQueue::expire_visibility`] is called.
#[derive(Debug)]
pub struct MemoryWorkQueue {
    name: String,
    inner: Mutex<QueueState>,
}

impl MemoryWorkQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(QueueState::default()),
        }
    }

    /// Bodies of the messages that can currently be received.
    pub fn visible_bodies(&self) -> Vec<String> {
        self.inner
            .lock()
            .visible
            .iter()
            .map(|m| m.body.clone())
            .collect()
    }

    /// Group ids of the messages that can currently be received.
    pub fn visible_groups(&self) -> Vec<String> {
        self.inner
            .lock()
            .visible
            .iter()
            .map(|m| m.group_id.clone())
            .collect()
    }

    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent
    }

    pub fn deleted_count(&self) -> usize {
        self.inner.lock().deleted
    }

    /// Let every in-flight message become visible again, as if its
    /// visibility timeout ran out.
    pub fn expire_visibility(&self) {
        let mut inner = self.inner.lock();
        let mut expired: Vec<StoredMessage> = inner.in_flight.drain().map(|(_, m)| m).collect();
        expired.sort_by(|a, b| b.id.cmp(&a.id));
        for message in expired {
            inner.visible.push_front(message);
        }
    }

    /// Make `send` fail for this exact body.
    pub fn reject_body(&self, body: impl Into<String>) {
        self.inner.lock().rejected_bodies.insert(body.into());
    }

    /// Make every following call fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    fn check(&self, operation: &'static str) -> QueueResult<()> {
        if self.inner.lock().unavailable {
            Err(self.failure(operation))
        } else {
            Ok(())
        }
    }

    fn failure(&self, operation: &'static str) -> QueueError {
        QueueError::transport(
            &self.name,
            operation,
            io::Error::new(io::ErrorKind::ConnectionRefused, "queue offline"),
        )
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: &str, group_id: &str) -> QueueResult<()> {
        self.check("send")?;
        let mut inner = self.inner.lock();
        if inner.rejected_bodies.contains(body) {
            return Err(self.failure("send"));
        }
        inner.next_id += 1;
        let message = StoredMessage {
            id: format!("{:08}", inner.next_id),
            body: body.to_owned(),
            group_id: group_id.to_owned(),
            deliveries: 0,
        };
        inner.visible.push_back(message);
        inner.sent += 1;
        Ok(())
    }

    async fn receive(
        &self,
        max_messages: i32,
        wait_seconds: i32,
    ) -> QueueResult<Vec<QueueMessage>> {
        self.check("receive")?;
        let received = {
            let mut inner = self.inner.lock();
            let count = usize::try_from(max_messages).unwrap_or_default();
            let mut received = Vec::new();
            while received.len() < count {
                let Some(mut message) = inner.visible.pop_front() else {
                    break;
                };
                message.deliveries += 1;
                let receipt_handle = format!("{}-{}", message.id, message.deliveries);
                received.push(QueueMessage::new(
                    message.id.clone(),
                    message.body.clone(),
                    receipt_handle.clone(),
                ));
                inner.in_flight.insert(receipt_handle, message);
            }
            received
        };

        if received.is_empty() {
            // long poll
            let wait = u64::try_from(wait_seconds).unwrap_or_default();
            if wait > 0 {
                tokio::time::sleep(Duration::from_secs(wait)).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
        Ok(received)
    }

    async fn delete(&self, receipt_handle: &str) -> QueueResult<()> {
        self.check("delete")?;
        let mut inner = self.inner.lock();
        match inner.in_flight.remove(receipt_handle) {
            Some(_) => {
                inner.deleted += 1;
                Ok(())
            }
            None => Err(QueueError::UnknownReceipt {
                queue: self.name.clone(),
                receipt_handle: receipt_handle.to_owned(),
            }),
        }
    }
}
