//! Command sequence files.
//!
//! A sequence file is a JSON array of command objects, submitted in order.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::transport::CommandSink;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} must hold a JSON array of commands", .path.display())]
    NotAnArray { path: PathBuf },
}

pub fn load_commands(path: &Path) -> Result<Vec<serde_json::Value>, StreamError> {
    let text = std::fs::read_to_string(path).map_err(|source| StreamError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| StreamError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        serde_json::Value::Array(commands) => Ok(commands),
        _ => Err(StreamError::NotAnArray {
            path: path.to_path_buf(),
        }),
    }
}

/// Submit each command in order, handing every reply to `on_reply`.
///
/// Stops at the first failure; commands after it are not sent.
pub async fn run_commands<S>(
    sink: &mut S,
    commands: &[serde_json::Value],
    wait: Option<Duration>,
    mut on_reply: impl FnMut(usize, &str),
) -> Result<(), S::Error>
where
    S: CommandSink + ?Sized,
{
    for (index, command) in commands.iter().enumerate() {
        tracing::debug!(index, id = ?command.get("id"), "Submitting command");
        let reply = sink.submit(command, wait).await?;
        on_reply(index, &reply);
    }
    Ok(())
}
