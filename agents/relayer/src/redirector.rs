use std::sync::Arc;
use std::time::Duration;

use pingpong_core::{QueueMessage, QueueResult, WorkQueue};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Counts for one drained dead-letter batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectReport {
    /// Messages moved back onto the main queue
    pub redirected: usize,
    /// Messages left on the dead-letter queue
    pub failed: usize,
}

/// Moves dead-lettered work items back onto the main queue. Bodies are
/// republished verbatim; the dispatcher decides what is left to do.
pub struct DeadLetterRedirector {
    dead_letters: Arc<dyn WorkQueue>,
    main: Arc<dyn WorkQueue>,
    group_id: String,
    interval: Duration,
    batch_size: i32,
    wait_seconds: i32,
}

impl DeadLetterRedirector {
    /// Drain `dead_letters` into `main` every `interval`.
    pub fn new(
        dead_letters: Arc<dyn WorkQueue>,
        main: Arc<dyn WorkQueue>,
        group_id: String,
        interval: Duration,
        batch_size: i32,
        wait_seconds: i32,
    ) -> Self {
        Self {
            dead_letters,
            main,
            group_id,
            interval,
            batch_size,
            wait_seconds,
        }
    }

    /// Redirect one batch per tick, forever.
    pub async fn run(self) -> eyre::Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.redirect_batch().await {
                Ok(report) if report == RedirectReport::default() => {
                    debug!("Dead-letter queue is empty")
                }
                Ok(report) => info!(?report, "Redirected dead-lettered work items"),
                Err(err) => warn!(error = %err, "Failed to receive dead-lettered work items"),
            }
        }
    }

    /// Receive one batch from the dead-letter queue and redirect each
    /// message. A message that fails stays on the dead-letter queue.
    #[instrument(skip(self), fields(queue = self.dead_letters.name()))]
    pub async fn redirect_batch(&self) -> QueueResult<RedirectReport> {
        let messages = self
            .dead_letters
            .receive(self.batch_size, self.wait_seconds)
            .await?;

        let mut report = RedirectReport::default();
        for message in messages {
            match self.redirect_one(&message).await {
                Ok(()) => report.redirected += 1,
                Err(err) => {
                    warn!(
                        message_id = %message.id,
                        error = %err,
                        "Failed to redirect dead-lettered work item"
                    );
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn redirect_one(&self, message: &QueueMessage) -> QueueResult<()> {
        self.main.send(&message.body, &self.group_id).await?;
        self.dead_letters.delete(&message.receipt_handle).await?;
        debug!(message_id = %message.id, body = %message.body, "Redirected work item");
        Ok(())
    }
}

/// Drop everything on a dead-letter queue without republishing it.
/// Returns the number of messages deleted.
pub async fn purge_dead_letters(
    queue: &dyn WorkQueue,
    batch_size: i32,
    wait_seconds: i32,
) -> QueueResult<usize> {
    let mut purged = 0;
    loop {
        let messages = queue.receive(batch_size, wait_seconds).await?;
        if messages.is_empty() {
            break;
        }
        for message in messages {
            queue.delete(&message.receipt_handle).await?;
            purged += 1;
        }
    }
    info!(queue = queue.name(), purged, "Purged dead-letter queue");
    Ok(purged)
}

#[cfg(test)]
mod test {
    use pingpong_test::memory::MemoryWorkQueue;

    use super::*;

    fn redirector(dlq: &Arc<MemoryWorkQueue>, main: &Arc<MemoryWorkQueue>) -> DeadLetterRedirector {
        DeadLetterRedirector::new(
            dlq.clone(),
            main.clone(),
            "PingMessages".into(),
            Duration::from_secs(60),
            10,
            0,
        )
    }

    #[tokio::test]
    async fn bodies_are_moved_verbatim_onto_the_main_queue() {
        let dlq = Arc::new(MemoryWorkQueue::new("dlq"));
        let main = Arc::new(MemoryWorkQueue::new("main"));
        dlq.send(r#"{"txHash":"0x01"}"#, "other").await.unwrap();
        dlq.send("not json", "other").await.unwrap();

        let report = redirector(&dlq, &main).redirect_batch().await.unwrap();

        assert_eq!(report, RedirectReport { redirected: 2, failed: 0 });
        assert_eq!(
            main.visible_bodies(),
            vec![r#"{"txHash":"0x01"}"#.to_owned(), "not json".to_owned()]
        );
        assert_eq!(main.visible_groups(), vec!["PingMessages"; 2]);
        assert_eq!(dlq.deleted_count(), 2);
        assert_eq!(dlq.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn one_failed_message_does_not_block_the_batch() {
        let dlq = Arc::new(MemoryWorkQueue::new("dlq"));
        let main = Arc::new(MemoryWorkQueue::new("main"));
        for body in ["a", "b", "c"] {
            dlq.send(body, "g").await.unwrap();
        }
        main.reject_body("b");

        let report = redirector(&dlq, &main).redirect_batch().await.unwrap();

        assert_eq!(report, RedirectReport { redirected: 2, failed: 1 });
        assert_eq!(main.visible_bodies(), vec!["a", "c"]);
        // b is still on the dead-letter queue, waiting for its visibility timeout
        assert_eq!(dlq.in_flight_len(), 1);
        dlq.expire_visibility();
        assert_eq!(dlq.visible_bodies(), vec!["b"]);
    }

    #[tokio::test]
    async fn receive_failure_is_returned() {
        let dlq = Arc::new(MemoryWorkQueue::new("dlq"));
        let main = Arc::new(MemoryWorkQueue::new("main"));
        dlq.set_unavailable(true);

        assert!(redirector(&dlq, &main).redirect_batch().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn run_redirects_on_every_tick() {
        let dlq = Arc::new(MemoryWorkQueue::new("dlq"));
        let main = Arc::new(MemoryWorkQueue::new("main"));
        dlq.send("first", "g").await.unwrap();
        let task = tokio::spawn(redirector(&dlq, &main).run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(main.visible_bodies(), vec!["first"]);

        dlq.send("second", "g").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(main.visible_bodies(), vec!["first", "second"]);
        task.abort();
    }

    #[tokio::test]
    async fn purge_deletes_without_republishing() {
        let dlq = Arc::new(MemoryWorkQueue::new("dlq"));
        for n in 0..13 {
            dlq.send(&format!("{n}"), "g").await.unwrap();
        }

        assert_eq!(purge_dead_letters(&*dlq, 10, 0).await.unwrap(), 13);
        assert!(dlq.visible_bodies().is_empty());
        assert_eq!(dlq.deleted_count(), 13);
    }
}
