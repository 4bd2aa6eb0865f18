//! Command transports.
//!
//! - **fifo**: named pipe read by a worker the channel spawned itself
//! - **rest**: HTTP POST to an application that is already running

use std::time::Duration;

use async_trait::async_trait;

pub mod fifo;
pub mod rest;

pub use fifo::FifoTransport;
pub use rest::{RestClient, RestConfig, RestError, RestResponse};

/// Anything a stream of commands can be submitted to.
///
/// Lets a command sequence run against either a spawned worker or a REST
/// endpoint without caring which.
#[async_trait]
pub trait CommandSink: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Deliver one command. `wait` bounds how long to collect a reply, for
    /// sinks that can; the returned text is whatever reply was collected.
    async fn submit(
        &mut self,
        command: &serde_json::Value,
        wait: Option<Duration>,
    ) -> Result<String, Self::Error>;
}
