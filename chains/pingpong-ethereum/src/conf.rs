use std::time::Duration;

use derive_new::new;
use pingpong_core::Address;

/// How to reach the chain and the PingPong contract.
#[derive(Debug, Clone, new)]
pub struct ConnectionConf {
    /// HTTP JSON-RPC endpoint
    pub url: String,
    /// Hex encoded private key of the relayer account
    pub signer_key: String,
    /// Address of the PingPong contract
    pub contract_address: Address,
    /// Chain id used for signing, fetched from the node when absent
    pub chain_id: Option<u64>,
    /// Interval between RPC polls for new logs and receipts
    pub poll_interval: Duration,
    /// Maximum number of blocks requested per `eth_getLogs` call
    pub event_page_size: u64,
}
