//! The relayer watches the PingPong contract for pings and answers each one
//! with a pong.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use eyre::Result;
use pingpong_base::agent_main;
use relayer::Relayer;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    agent_main::<Relayer>().await
}
