#![allow(missing_docs)]

use ethers::abi::AbiDecode;
use ethers::contract::abigen;
use pingpong_core::{ChainCommunicationError, DecodedCall};

abigen!(
    PingPong,
    r#"[
        function ping() external
        function pong(bytes32 _txHash) external
        function pinger() external view returns (address)
        event Ping()
        event Pong(bytes32 txHash)
    ]"#
);

/// Signature of the event the relayer answers.
pub(crate) const PING_EVENT_SIGNATURE: &str = "Ping()";

/// Decode call data against the PingPong ABI.
pub fn decode_ping_pong_call(data: &[u8]) -> Result<DecodedCall, ChainCommunicationError> {
    let call = PingPongCalls::decode(data)
        .map_err(|err| ChainCommunicationError::DecodeError(err.to_string()))?;
    let name = match call {
        PingPongCalls::Ping(_) => "ping",
        PingPongCalls::Pong(_) => "pong",
        PingPongCalls::Pinger(_) => "pinger",
    };
    Ok(DecodedCall::new(name.to_owned()))
}
