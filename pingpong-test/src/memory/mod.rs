pub use queue::*;
pub use store::*;

mod queue;
mod store;
