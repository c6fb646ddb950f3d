pub use chain::*;
pub use queue::*;
pub use store::*;

mod chain;
mod queue;
mod store;
