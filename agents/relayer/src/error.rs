use pingpong_core::{ChainCommunicationError, QueueError, StoreError, H256};

/// Errors raised while relaying a ping.
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
    /// Chain RPC failure
    #[error(transparent)]
    Chain(#[from] ChainCommunicationError),
    /// Status store failure
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Queue failure
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The response was mined but its execution reverted
    #[error("Pong {response_tx:?} answering ping {ping_tx:?} reverted")]
    Reverted {
        /// The ping being answered
        ping_tx: H256,
        /// The reverted response
        response_tx: H256,
    },
    /// A write would have moved a record backwards or skipped a state
    #[error("Refusing to move {tx_hash:?} from {from} to {to}")]
    InvalidTransition {
        /// The ping whose record was being updated
        tx_hash: H256,
        /// Current state
        from: String,
        /// Rejected next state
        to: String,
    },
    /// A queue message body is not a work item
    #[error("Malformed work item: {0}")]
    MalformedWorkItem(#[from] serde_json::Error),
}

impl RelayerError {
    /// Whether a later delivery of the same work item may succeed. Reverted
    /// responses and rejected transitions are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayerError::Chain(err) => err.is_retryable(),
            RelayerError::Store(err) => err.is_retryable(),
            RelayerError::Queue(err) => err.is_retryable(),
            RelayerError::Reverted { .. }
            | RelayerError::InvalidTransition { .. }
            | RelayerError::MalformedWorkItem(_) => false,
        }
    }

    /// Whether the chain provider ran out of request quota.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, RelayerError::Chain(err) if err.is_quota_exceeded())
    }
}
