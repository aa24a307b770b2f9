//! Pull-based reader over a push-based select event stream.

use bytes::{Buf, Bytes};
use tracing::debug;

use bulkcopy_core::{MigrationError, Result};

use crate::store::{SelectEvent, SelectEventSource};

/// Outcome of one [`SelectRecordReader::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadChunk {
    /// Bytes written into the caller's buffer.
    pub bytes: usize,
    /// Set once no more bytes will ever arrive.
    pub eof: bool,
}

/// Adapts select record events into buffer-filling reads.
///
/// Record payloads arrive in arbitrary sizes; whatever does not fit in the
/// caller's buffer is kept and handed out first on the next read. Progress,
/// stats and continuation events are dropped.
pub struct SelectRecordReader {
    source: Box<dyn SelectEventSource>,
    remaining: Bytes,
    finished: bool,
    closed: bool,
}

impl SelectRecordReader {
    pub fn new(source: Box<dyn SelectEventSource>) -> Self {
        Self {
            source,
            remaining: Bytes::new(),
            finished: false,
            closed: false,
        }
    }

    /// Fill `buf` from buffered and incoming record data.
    ///
    /// Returns once `buf` is full or the stream is exhausted. The chunk that
    /// drains the stream carries `eof = true`; any read after that fails with
    /// [`MigrationError::ReaderClosed`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<ReadChunk> {
        if self.closed {
            debug!(remaining = self.remaining.len(), "Read on closed select reader");
            return Err(MigrationError::ReaderClosed);
        }

        let mut filled = 0;
        loop {
            if !self.remaining.is_empty() {
                let n = (buf.len() - filled).min(self.remaining.len());
                buf[filled..filled + n].copy_from_slice(&self.remaining[..n]);
                self.remaining.advance(n);
                filled += n;
            }

            if self.finished && self.remaining.is_empty() {
                self.closed = true;
                return Ok(ReadChunk {
                    bytes: filled,
                    eof: true,
                });
            }
            if filled == buf.len() {
                return Ok(ReadChunk {
                    bytes: filled,
                    eof: false,
                });
            }

            match self.source.next_event().await? {
                Some(SelectEvent::Records(payload)) => self.remaining = payload,
                Some(SelectEvent::End) => {
                    debug!("Select event stream ended");
                    self.finished = true;
                }
                None => {
                    debug!("Select event channel closed");
                    self.finished = true;
                }
                Some(SelectEvent::Progress | SelectEvent::Stats | SelectEvent::Continuation) => {}
            }
        }
    }
}
