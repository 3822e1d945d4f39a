#![forbid(unsafe_code)]

pub mod analysis;
pub mod error;
pub mod model;
pub mod ranking;
pub mod stats;
pub mod time;

pub use error::Error;
pub use time::Clock;
