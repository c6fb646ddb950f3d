//! Test doubles for the ping/pong relayer: a mockall chain mock and
//! in-memory status store and work queue.

#![allow(missing_docs)]

pub mod memory;
pub mod mocks;
pub mod test_utils;
