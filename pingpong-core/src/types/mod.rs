pub use chain::*;
pub use marker::*;
pub use state::*;
pub use work::*;

mod chain;
mod marker;
mod state;
mod work;
