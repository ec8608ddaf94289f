//! Manual chunk-by-chunk response reading.

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use crate::engine::{Connection, Event, StreamId, WaitError};
use crate::error::ReceiveError;

/// One manually-pulled body chunk. `fin` marks the last chunk of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub bytes: Bytes,
    pub fin: bool,
}

/// Deferred reader for manual body consumption.
///
/// Returned right after the response head, before any body notification is
/// consumed. Each [`read_chunk`] performs exactly one timeout-bounded wait
/// and consumes exactly one pending data notification, never more. The
/// caller owns pulling the right number of chunks and closing the
/// connection when done (which happens automatically on the final chunk,
/// or on timeout, when the call asked for close-on-completion).
///
/// [`read_chunk`]: ChunkReader::read_chunk
pub struct ChunkReader {
    conn: Option<Connection>,
    stream: StreamId,
    timeout: Duration,
    close_conn: bool,
}

impl ChunkReader {
    pub(crate) fn new(conn: Connection, stream: StreamId, timeout: Duration, close_conn: bool) -> Self {
        Self { conn: Some(conn), stream, timeout, close_conn }
    }

    /// The stream this reader consumes.
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Pulls the next body chunk.
    pub async fn read_chunk(&mut self) -> Result<Chunk, ReceiveError> {
        loop {
            let Some(conn) = self.conn.as_mut() else {
                return Err(ReceiveError::connection_closed("chunk reader already finalized"));
            };

            let stream = self.stream;
            match conn.mailbox_mut().recv(self.timeout, |event| event.concerns(stream)).await {
                Ok(Event::Data { chunk, fin, .. }) => {
                    if fin {
                        trace!(stream = ?stream, "final body chunk read");
                        self.finalize();
                    }
                    return Ok(Chunk { bytes: chunk, fin });
                }
                Ok(Event::Up(_) | Event::Down { .. }) => continue,
                Ok(Event::Response { .. }) => {
                    self.finalize();
                    return Err(ReceiveError::engine("unexpected response head while reading chunks"));
                }
                Ok(Event::Error { reason, .. }) => {
                    self.finalize();
                    return Err(ReceiveError::engine(reason));
                }
                Err(WaitError::Timeout) => {
                    self.finalize();
                    return Err(ReceiveError::Timeout);
                }
                Err(WaitError::Closed) => {
                    self.conn.take();
                    return Err(ReceiveError::connection_closed("engine terminated"));
                }
            }
        }
    }

    /// Releases the underlying connection to the caller, abandoning any
    /// chunks not yet pulled. `None` when it was already closed.
    pub fn into_connection(mut self) -> Option<Connection> {
        self.conn.take()
    }

    /// Explicitly closes the connection, whatever `close_conn` said.
    pub fn close(mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
        }
    }

    fn finalize(&mut self) {
        if self.close_conn {
            if let Some(conn) = self.conn.take() {
                conn.close();
            }
        }
    }
}

impl fmt::Debug for ChunkReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkReader")
            .field("stream", &self.stream)
            .field("close_conn", &self.close_conn)
            .field("finalized", &self.conn.is_none())
            .finish()
    }
}
