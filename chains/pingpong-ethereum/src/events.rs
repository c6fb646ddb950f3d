use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ethers::prelude::{Filter, Http, Log, Middleware, Provider};
use futures_util::{stream, StreamExt};
use pingpong_core::{Address, PingEvent, PingEventStream};
use tokio::time::sleep;
use tracing::debug;

use crate::{contract::PING_EVENT_SIGNATURE, error::classify};

struct LogCursor {
    next_block: u64,
    buffered: VecDeque<PingEvent>,
}

fn ping_event(log: Log) -> PingEvent {
    PingEvent::new(log.transaction_hash, log.block_number.map(|n| n.as_u64()))
}

/// Poll `eth_getLogs` for `Ping()` events from `from_block` onwards, one page
/// of at most `page_size` blocks at a time. The stream yields an error and
/// may be dropped whenever the provider fails.
pub(crate) fn poll_ping_events(
    provider: Arc<Provider<Http>>,
    contract: Address,
    from_block: u64,
    page_size: u64,
    interval: Duration,
) -> PingEventStream {
    let filter = Filter::new().address(contract).event(PING_EVENT_SIGNATURE);
    let page_size = page_size.max(1);
    let cursor = LogCursor {
        next_block: from_block,
        buffered: VecDeque::new(),
    };

    stream::unfold(cursor, move |mut cursor| {
        let provider = provider.clone();
        let filter = filter.clone();
        async move {
            loop {
                if let Some(event) = cursor.buffered.pop_front() {
                    return Some((Ok(event), cursor));
                }
                let head = match provider.get_block_number().await {
                    Ok(head) => head.as_u64(),
                    Err(err) => return Some((Err(classify(err)), cursor)),
                };
                if head < cursor.next_block {
                    sleep(interval).await;
                    continue;
                }
                let to = head.min(cursor.next_block.saturating_add(page_size - 1));
                let page = filter.clone().from_block(cursor.next_block).to_block(to);
                let logs = match provider.get_logs(&page).await {
                    Ok(logs) => logs,
                    Err(err) => return Some((Err(classify(err)), cursor)),
                };
                debug!(
                    from = cursor.next_block,
                    to,
                    count = logs.len(),
                    "Polled Ping logs"
                );
                cursor.buffered.extend(logs.into_iter().map(ping_event));
                cursor.next_block = to + 1;
                if cursor.buffered.is_empty() {
                    sleep(interval).await;
                }
            }
        }
    })
    .boxed()
}
