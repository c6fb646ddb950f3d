use std::any::Any;
use std::error::Error as StdError;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;

use crate::H256;

/// The result of interacting with a chain.
pub type ChainResult<T> = Result<T, ChainCommunicationError>;

/// The result of interacting with the status store.
pub type StoreResult<T> = Result<T, StoreError>;

/// The result of interacting with a work queue.
pub type QueueResult<T> = Result<T, QueueError>;

/// An "Any"-typed error.
pub trait PingPongCustomError: StdError + Send + Sync + Any {}

impl<E: StdError + Send + Sync + Any> PingPongCustomError for E {}

/// Thin wrapper around a boxed PingPongCustomError so transport errors from
/// any backend can be carried without leaking their concrete types.
#[repr(transparent)]
pub struct PingPongCustomErrorWrapper(Box<dyn PingPongCustomError>);

impl PingPongCustomErrorWrapper {
    /// Wrap any error.
    pub fn new<E: PingPongCustomError>(err: E) -> Self {
        Self(Box::new(err))
    }
}

impl Debug for PingPongCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", AsRef::<dyn PingPongCustomError>::as_ref(&self))
    }
}

impl Display for PingPongCustomErrorWrapper {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", AsRef::<dyn PingPongCustomError>::as_ref(&self))
    }
}

impl StdError for PingPongCustomErrorWrapper {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl AsRef<dyn PingPongCustomError> for PingPongCustomErrorWrapper {
    fn as_ref(&self) -> &dyn PingPongCustomError {
        self.0.as_ref()
    }
}

impl Deref for PingPongCustomErrorWrapper {
    type Target = Box<dyn PingPongCustomError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
#[repr(transparent)]
struct StringError(String);

impl Display for StringError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for StringError {}

/// ChainCommunicationError contains errors returned when attempting to
/// call a chain or dispatch a transaction
#[derive(Debug, thiserror::Error)]
pub enum ChainCommunicationError {
    /// The RPC provider rejected the request because the account's request
    /// quota is used up
    #[error("RPC quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Call data could not be decoded against the contract ABI
    #[error("Failed to decode call data: {0}")]
    DecodeError(String),
    /// A transaction was dropped from the mempool
    #[error("Transaction dropped from mempool {0:?}")]
    TransactionDropped(H256),
    /// A submitted transaction is missing a field the node should have filled
    #[error("Submitted transaction is missing its {0}")]
    MissingTransactionField(&'static str),
    /// Any other error; does not implement `From` to prevent
    /// conflicting/absorbing other errors.
    #[error(transparent)]
    Other(PingPongCustomErrorWrapper),
}

impl ChainCommunicationError {
    /// Create a chain communication error from any other existing error
    pub fn from_other<E: PingPongCustomError>(err: E) -> Self {
        Self::Other(PingPongCustomErrorWrapper::new(err))
    }

    /// Creates a chain communication error of the other error variant from a string
    pub fn from_other_str(err: impl Into<String>) -> Self {
        Self::from_other(StringError(err.into()))
    }

    /// Whether the provider signalled that the request budget is exhausted.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::DecodeError(_))
    }
}

/// Errors returned by a [`StatusStore`](crate::StatusStore).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the request
    #[error("Status store unavailable during {operation}: {source}")]
    StoreUnavailable {
        /// The store operation that failed
        operation: &'static str,
        /// The underlying transport error
        source: PingPongCustomErrorWrapper,
    },
    /// A stored item could not be decoded
    #[error("Corrupt item {key} in status store: {reason}")]
    Corrupt {
        /// Key of the offending item
        key: String,
        /// Decoder message
        reason: String,
    },
    /// A conditional state update targeted a record that does not exist
    #[error("No status record for {tx_hash:?} at {timestamp}")]
    MissingRecord {
        /// Partition key of the missing record
        tx_hash: H256,
        /// Sort key of the missing record
        timestamp: u64,
    },
    /// A conditional state update found a different state than the one it
    /// was computed from
    #[error("Status record for {tx_hash:?} is no longer {expected}")]
    StaleState {
        /// Partition key of the record
        tx_hash: H256,
        /// The state the writer expected to replace
        expected: String,
    },
}

impl StoreError {
    /// Wrap a transport error raised by `operation`.
    pub fn unavailable<E: PingPongCustomError>(operation: &'static str, err: E) -> Self {
        Self::StoreUnavailable {
            operation,
            source: PingPongCustomErrorWrapper::new(err),
        }
    }

    /// Build a decode error for the item stored under `key`.
    pub fn corrupt(key: impl Display, reason: impl Display) -> Self {
        Self::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Transport failures may clear up and a stale write is redone from the
    /// fresh state; corrupt or missing items will not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::StaleState { .. })
    }
}

/// Errors returned by a [`WorkQueue`](crate::WorkQueue).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue service could not be reached or rejected the request
    #[error("Queue {queue} unavailable during {operation}: {source}")]
    Transport {
        /// Name or URL of the queue
        queue: String,
        /// The queue operation that failed
        operation: &'static str,
        /// The underlying transport error
        source: PingPongCustomErrorWrapper,
    },
    /// A receipt handle was not recognised by the queue
    #[error("Queue {queue} does not know receipt handle {receipt_handle}")]
    UnknownReceipt {
        /// Name or URL of the queue
        queue: String,
        /// The rejected handle
        receipt_handle: String,
    },
}

impl QueueError {
    /// Wrap a transport error raised by `operation` on `queue`.
    pub fn transport<E: PingPongCustomError>(
        queue: impl Into<String>,
        operation: &'static str,
        err: E,
    ) -> Self {
        Self::Transport {
            queue: queue.into(),
            operation,
            source: PingPongCustomErrorWrapper::new(err),
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
