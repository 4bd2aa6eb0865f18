//! Draining the worker's merged stdout/stderr stream.
//!
//! The drain runs against one deadline measured from the start of the call:
//! it keeps collecting complete lines until the deadline passes or the stream
//! ends, so a call never blocks much longer than its budget even while the
//! worker keeps writing. An unterminated line (a prompt, a progress bar) is
//! returned as far as it got when the deadline passes; only a trailing,
//! incomplete UTF-8 sequence is held back for the next call.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::time::Instant;

pub struct OutputReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> OutputReader<R> {
    pub fn new(stream: R) -> Self {
        Self {
            reader: BufReader::new(stream),
            pending: Vec::new(),
            eof: false,
        }
    }

    /// True once the worker side of the stream has been closed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Collect lines until `budget` has elapsed or the stream ends.
    pub async fn drain(&mut self, budget: Duration) -> io::Result<String> {
        let deadline = Instant::now() + budget;
        let mut collected = String::new();

        while !self.eof {
            // read_until appends to `pending` even when the deadline cancels it,
            // so a partially read line survives into the next iteration or call.
            let read = tokio::time::timeout_at(
                deadline,
                self.reader.read_until(b'\n', &mut self.pending),
            )
            .await;

            match read {
                Err(_elapsed) => {
                    self.take_partial(&mut collected);
                    break;
                }
                Ok(Ok(0)) => {
                    self.eof = true;
                    self.take_pending(&mut collected);
                }
                Ok(Ok(_)) => self.take_pending(&mut collected),
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(e)) => return Err(e),
            }
        }

        tracing::trace!(
            output_bytes = collected.len(),
            eof = self.eof,
            "Drained worker output"
        );
        Ok(collected)
    }

    fn take_pending(&mut self, out: &mut String) {
        if !self.pending.is_empty() {
            out.push_str(&String::from_utf8_lossy(&self.pending));
            self.pending.clear();
        }
    }

    fn take_partial(&mut self, out: &mut String) {
        let keep = match std::str::from_utf8(&self.pending) {
            Err(e) if e.error_len().is_none() => self.pending.len() - e.valid_up_to(),
            _ => 0,
        };
        let tail = self.pending.split_off(self.pending.len() - keep);
        self.take_pending(out);
        self.pending = tail;
    }
}
