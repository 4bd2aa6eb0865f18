//! Named-pipe command transport.
//!
//! Path format: `{temp_dir}/{prefix}XXXXXX/{name}`, one fresh directory per
//! transport. The directory outlives the write handle and both are released
//! together by [`FifoTransport::close`].

use std::io;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::unix::pipe;

pub struct FifoTransport {
    path: PathBuf,
    dir: Option<TempDir>,
    sender: Option<pipe::Sender>,
}

impl FifoTransport {
    /// Create a fresh directory and a FIFO named `name` inside it.
    ///
    /// The FIFO is not opened; see [`FifoTransport::try_open`].
    pub fn create(prefix: &str, name: &str) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix(prefix).tempdir()?;
        let dir_path = std::path::absolute(dir.path())?;
        let path = dir_path.join(name);

        mkfifo(path.as_path(), Mode::S_IRWXU).map_err(io::Error::from)?;

        tracing::debug!(path = %path.display(), "Created command fifo");

        Ok(Self {
            path,
            dir: Some(dir),
            sender: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// URI handed to the worker as its command source.
    pub fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_some()
    }

    /// Open the write end without blocking.
    ///
    /// Returns `Ok(false)` while nobody has the FIFO open for reading.
    pub fn try_open(&mut self) -> io::Result<bool> {
        if self.sender.is_some() {
            return Ok(true);
        }
        if self.dir.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "fifo already removed",
            ));
        }

        match pipe::OpenOptions::new().open_sender(&self.path) {
            Ok(sender) => {
                tracing::debug!(path = %self.path.display(), "Opened command fifo for writing");
                self.sender = Some(sender);
                Ok(true)
            }
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write the whole payload and flush it to the reader.
    pub async fn write(&mut self, payload: &[u8]) -> io::Result<()> {
        let sender = self.sender.as_mut().ok_or_else(|| {
            io::Error::new(io::ErrorKind::BrokenPipe, "command fifo is not open")
        })?;
        sender.write_all(payload).await?;
        sender.flush().await?;
        tracing::trace!(payload_bytes = payload.len(), "Wrote command");
        Ok(())
    }

    /// Close the write end only. The reader sees end-of-stream once every
    /// writer is gone.
    pub fn close_writer(&mut self) {
        if self.sender.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Closed command fifo");
        }
    }

    /// Close the write end, then remove the directory and the FIFO in it.
    pub fn close(&mut self) -> io::Result<()> {
        self.close_writer();
        if let Some(dir) = self.dir.take() {
            tracing::debug!(dir = %dir.path().display(), "Removing transport directory");
            dir.close()?;
        }
        Ok(())
    }
}

impl Drop for FifoTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to remove transport directory");
        }
    }
}
