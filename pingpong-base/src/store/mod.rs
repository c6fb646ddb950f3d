pub use dynamodb::*;

mod dynamodb;
