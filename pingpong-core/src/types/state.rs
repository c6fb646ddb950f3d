use std::fmt::{Display, Formatter};

use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::{H256, U256};

/// A response submission that has been handed to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct SentTx {
    /// Account nonce used by the response transaction
    pub nonce: u64,
    /// Gas price the response transaction was signed with
    pub gas_price: U256,
    /// Hash of the response transaction
    pub response_tx: H256,
}

/// Where a ping transaction is in its relay lifecycle.
///
/// States only move forward along `Received -> Sent -> Mined`, or to `Error`
/// from any non-terminal state. `Mined` and non-retryable `Error` are
/// terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum RelayState {
    /// The ping was observed and no response has been submitted yet
    Received,
    /// A response was submitted and is waiting to be mined
    Sent(SentTx),
    /// The response was mined successfully
    #[serde(rename_all = "camelCase")]
    Mined {
        /// Hash of the mined response transaction
        response_tx: H256,
        /// Block the response was included in, when known
        block_number: Option<u64>,
    },
    /// Relaying failed
    #[serde(rename_all = "camelCase")]
    Error {
        /// Human readable cause
        reason: String,
        /// Whether a later delivery of the same work item should try again
        retryable: bool,
        /// The last submission made before the failure, if any
        last_sent: Option<SentTx>,
    },
}

impl RelayState {
    /// No further writes happen once a record reaches a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayState::Mined { .. }
                | RelayState::Error {
                    retryable: false,
                    ..
                }
        )
    }

    /// The submission that is (or was last) in flight for this record.
    pub fn last_sent(&self) -> Option<SentTx> {
        match self {
            RelayState::Sent(sent) => Some(*sent),
            RelayState::Error { last_sent, .. } => *last_sent,
            RelayState::Received | RelayState::Mined { .. } => None,
        }
    }

    /// Short name of the variant, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            RelayState::Received => "Received",
            RelayState::Sent(_) => "Sent",
            RelayState::Mined { .. } => "Mined",
            RelayState::Error { .. } => "Error",
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle forward-only.
    ///
    /// Replacing a `Sent` with another `Sent` is only allowed for the same
    /// nonce, which is how a stuck response is re-priced. A retryable `Error`
    /// sits at the position of the submission it carries.
    pub fn can_transition_to(&self, next: &RelayState) -> bool {
        use RelayState::*;

        match (self, next) {
            (Mined { .. }, _) => false,
            (
                Error {
                    retryable: false, ..
                },
                _,
            ) => false,
            (_, Received) => false,
            (_, Error { .. }) => true,
            (Received, Sent(_)) => true,
            (Received, Mined { .. }) => false,
            (Sent(prev), Sent(next)) => prev.nonce == next.nonce,
            (Sent(_), Mined { .. }) => true,
            (
                Error {
                    last_sent: Some(prev),
                    ..
                },
                Sent(next),
            ) => prev.nonce == next.nonce,
            (Error { last_sent: None, .. }, Sent(_)) => true,
            (Error { last_sent, .. }, Mined { .. }) => last_sent.is_some(),
        }
    }
}

impl Display for RelayState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayState::Received => write!(f, "Received"),
            RelayState::Sent(sent) => write!(
                f,
                "Sent(nonce={}, gas_price={}, response_tx={:?})",
                sent.nonce, sent.gas_price, sent.response_tx
            ),
            RelayState::Mined {
                response_tx,
                block_number,
            } => write!(
                f,
                "Mined(response_tx={response_tx:?}, block_number={block_number:?})"
            ),
            RelayState::Error {
                reason, retryable, ..
            } => write!(f, "Error(retryable={retryable}, reason={reason})"),
        }
    }
}

/// One record per observed ping transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusRecord {
    /// Hash of the ping transaction, the partition key
    pub tx_hash: H256,
    /// Creation time in milliseconds since the Unix epoch, the sort key
    pub timestamp: u64,
    /// Current relay state
    pub state: RelayState,
}

impl TransactionStatusRecord {
    /// A freshly observed ping.
    pub fn received(tx_hash: H256, timestamp: u64) -> Self {
        Self::new(tx_hash, timestamp, RelayState::Received)
    }
}
