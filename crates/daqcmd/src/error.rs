use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("schema file '{filename}' not found in search path {searched:?}")]
    SchemaNotFound {
        filename: String,
        searched: Vec<PathBuf>,
    },

    #[error("failed to read schema {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse schema {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("type '{0}' is not registered; load its schema into the registry first")]
    NotRegistered(String),
}

pub type Result<T> = std::result::Result<T, CommandError>;
