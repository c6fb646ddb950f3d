//! This repo contains a simple framework for building the ping/pong relayer
//! agent: settings loading, tracing setup and the AWS backed status store and
//! work queue.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod settings;

mod agent;
pub use agent::*;

mod aws;
pub use aws::*;

mod queue;
pub use queue::*;

mod store;
pub use store::*;
