//! daqrepl: drive a long-running DAQ worker over a named pipe.
//!
//! A [`Channel`] spawns the worker, feeds it JSON commands through a fifo and
//! collects its merged stdout/stderr within a caller-chosen budget.

pub mod channel;
pub mod logging;
pub mod output;
pub mod stream;
pub mod transport;
mod version;

pub use channel::{Channel, ChannelConfig, ChannelError, ChannelState, SpawnError};
pub use output::OutputReader;
pub use stream::{StreamError, load_commands, run_commands};
pub use transport::{CommandSink, FifoTransport, RestClient, RestConfig, RestError, RestResponse};
pub use version::DAQREPL_VERSION;
