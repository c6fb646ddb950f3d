//! This crate contains the core primitives, traits, and types for the
//! ping/pong relayer: the relay state machine data model and the seams
//! through which the relayer talks to the chain, the status store and the
//! work queue.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub use ethers_core::types::{Address, H256, U256};

pub use error::*;
pub use traits::*;
pub use types::*;

mod error;
/// Core traits
pub mod traits;
/// Core types
pub mod types;
