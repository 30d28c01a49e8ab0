#![forbid(unsafe_code)]

pub mod aggregator;
pub mod error;
pub mod model;
pub mod time;

pub use aggregator::aggregate;
pub use error::ModelError;
pub use time::Clock;
