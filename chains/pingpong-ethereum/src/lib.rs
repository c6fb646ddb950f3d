//! Implementation of the PingPong chain traits on top of ethers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use self::{chain::*, conf::*, contract::decode_ping_pong_call, error::quota_exceeded};

mod chain;
mod conf;
mod contract;
mod error;
mod events;
