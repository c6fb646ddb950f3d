//! The chain seam. Everything the relayer needs from the PingPong contract
//! and its node is expressed here, so the relay logic never depends on a
//! concrete RPC library.

use async_trait::async_trait;
use auto_impl::auto_impl;
use futures::stream::BoxStream;

use crate::{
    ChainBlock, ChainCommunicationError, ChainResult, ChainTransaction, DecodedCall, PingEvent,
    SubmittedTx, TxOverrides, TxReceipt, H256, U256,
};

/// Stream of `Ping()` events. An `Err` item means the subscription broke and
/// has to be re-established.
pub type PingEventStream = BoxStream<'static, ChainResult<PingEvent>>;

/// Interface to the PingPong contract and the chain it lives on.
#[async_trait]
#[auto_impl(&, Box, Arc)]
pub trait PingPongChain: Send + Sync {
    /// Subscribe to `Ping()` events emitted at or after `from_block`.
    async fn ping_events(&self, from_block: u64) -> ChainResult<PingEventStream>;

    /// Look up a transaction by hash.
    async fn get_transaction(&self, hash: H256) -> ChainResult<Option<ChainTransaction>>;

    /// Fetch a block with its transaction hashes.
    async fn get_block(&self, number: u64) -> ChainResult<Option<ChainBlock>>;

    /// Latest block number.
    async fn get_block_number(&self) -> ChainResult<u64>;

    /// Submit `pong(ping_tx)` from the relayer account.
    async fn submit_pong(&self, ping_tx: H256, overrides: TxOverrides)
        -> ChainResult<SubmittedTx>;

    /// Wait until `hash` is mined. Fails with
    /// [`ChainCommunicationError::TransactionDropped`] if the node forgets
    /// the transaction.
    async fn wait_mined(&self, hash: H256) -> ChainResult<TxReceipt>;

    /// Receipt of `hash`, `None` if it is not mined yet.
    async fn transaction_receipt(&self, hash: H256) -> ChainResult<Option<TxReceipt>>;

    /// Number of transactions from the relayer account included in the
    /// latest block, i.e. the next nonce that is not yet mined.
    async fn confirmed_nonce(&self) -> ChainResult<u64>;

    /// Current gas price estimate.
    async fn gas_price(&self) -> ChainResult<U256>;

    /// Decode call data against the PingPong ABI.
    fn decode_call(&self, data: &[u8]) -> Result<DecodedCall, ChainCommunicationError>;
}
