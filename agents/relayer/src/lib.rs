//! Answers every `ping()` on the PingPong contract with exactly one
//! `pong(txHash)`.
//!
//! Live events and a rate limited recovery scan feed work items into a FIFO
//! queue. The dispatcher drives each item through the relay state machine
//! persisted in the status store, and dead-lettered items are redirected
//! back into the main queue.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::panic))]

mod dispatcher;
mod emitter;
mod error;
mod ingestor;
mod redirector;
mod relayer;
mod scanner;
mod settings;

pub use dispatcher::*;
pub use emitter::*;
pub use error::*;
pub use ingestor::*;
pub use redirector::*;
pub use relayer::*;
pub use scanner::*;
pub use settings::*;

#[cfg(test)]
mod tests;
