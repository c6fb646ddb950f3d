use derive_new::new;

use crate::{Address, H256, U256};

/// A `Ping()` log delivered by the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct PingEvent {
    /// Hash of the transaction that emitted the event. Pending or malformed
    /// logs may not carry one.
    pub tx_hash: Option<H256>,
    /// Block the log was included in
    pub block_number: Option<u64>,
}

/// The subset of a chain transaction the relayer inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    /// Transaction hash
    pub hash: H256,
    /// Including block, `None` while pending
    pub block_number: Option<u64>,
    /// Recipient, `None` for contract creation
    pub to: Option<Address>,
    /// Call data
    pub input: Vec<u8>,
    /// Sender nonce
    pub nonce: u64,
}

/// A block with its transaction hashes.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ChainBlock {
    /// Block number
    pub number: u64,
    /// Hashes of the transactions in the block
    pub transactions: Vec<H256>,
}

/// Optional overrides applied when submitting a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOverrides {
    /// Reuse this nonce instead of the next pending one
    pub nonce: Option<u64>,
    /// Sign with this gas price instead of the node's estimate
    pub gas_price: Option<U256>,
}

/// A response transaction accepted by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct SubmittedTx {
    /// Transaction hash
    pub hash: H256,
    /// Nonce the transaction was signed with
    pub nonce: u64,
    /// Gas price the transaction was signed with
    pub gas_price: U256,
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct TxReceipt {
    /// Transaction hash
    pub transaction_hash: H256,
    /// `false` when execution reverted
    pub succeeded: bool,
    /// Including block
    pub block_number: Option<u64>,
}

/// A contract call recognised by the contract ABI.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct DecodedCall {
    /// Function name, e.g. `ping`
    pub name: String,
}

impl DecodedCall {
    /// Whether this is a call to `ping()`.
    pub fn is_ping(&self) -> bool {
        self.name == "ping"
    }
}
