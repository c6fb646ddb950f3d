pub use sqs::*;

mod sqs;
