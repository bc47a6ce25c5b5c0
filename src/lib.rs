pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod observer;
pub mod query;
pub mod repository;
pub mod rpc;
pub mod scanner;
pub mod scheduler;
pub mod sink;

pub use error::{CollectorError, Result};
pub use scheduler::{PollScheduler, SweepReport};
