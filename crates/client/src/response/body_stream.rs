//! Lazy response body streaming.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame};
use tokio::time::{Sleep, sleep};
use tracing::trace;

use crate::engine::{Connection, Event, StreamId};
use crate::error::ReceiveError;

/// A lazily-evaluated, single-consumption sequence of response body chunks.
///
/// Each pull performs one timeout-bounded wait for the next data
/// notification and yields the chunk without buffering; the sequence ends
/// after the chunk marked final. No size limit applies; the caller bounds
/// consumption. Finalization (normal exhaustion, a terminal error, or
/// dropping the stream early) closes the connection when the call asked for
/// close-on-completion; otherwise the drained connection can be recovered
/// with [`into_connection`] for reuse.
///
/// Implements both [`futures::Stream`] and [`http_body::Body`].
///
/// [`into_connection`]: BodyStream::into_connection
pub struct BodyStream {
    conn: Option<Connection>,
    stream: StreamId,
    timeout: Duration,
    close_conn: bool,
    deadline: Option<Pin<Box<Sleep>>>,
    finished: bool,
}

impl BodyStream {
    pub(crate) fn new(conn: Connection, stream: StreamId, timeout: Duration, close_conn: bool) -> Self {
        Self { conn: Some(conn), stream, timeout, close_conn, deadline: None, finished: false }
    }

    /// Releases the underlying connection.
    ///
    /// Returns `Some` when the stream still holds it: either drained to
    /// completion with `close_conn: false`, or abandoned mid-body (in which
    /// case any undelivered chunks are forfeited). Returns `None` when the
    /// connection was already closed.
    pub fn into_connection(mut self) -> Option<Connection> {
        self.conn.take()
    }

    /// Terminal transition: one of exhaustion, error, or timeout.
    fn finalize(&mut self) {
        self.finished = true;
        self.deadline = None;
        if self.close_conn {
            if let Some(conn) = self.conn.take() {
                conn.close();
            }
        }
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, ReceiveError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            let Some(conn) = this.conn.as_mut() else {
                return Poll::Ready(None);
            };

            let stream = this.stream;
            match conn.mailbox_mut().poll_matching(cx, |event| event.concerns(stream)) {
                Poll::Ready(Some(Event::Data { chunk, fin, .. })) => {
                    this.deadline = None;
                    if fin {
                        trace!(stream = ?stream, "final body chunk received");
                        this.finalize();
                    }
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Poll::Ready(Some(Event::Up(_) | Event::Down { .. })) => continue,
                Poll::Ready(Some(Event::Response { .. })) => {
                    this.finalize();
                    return Poll::Ready(Some(Err(ReceiveError::engine("unexpected response head while receiving body"))));
                }
                Poll::Ready(Some(Event::Error { reason, .. })) => {
                    this.finalize();
                    return Poll::Ready(Some(Err(ReceiveError::engine(reason))));
                }
                Poll::Ready(None) => {
                    this.finalize();
                    return Poll::Ready(Some(Err(ReceiveError::connection_closed("engine terminated"))));
                }
                Poll::Pending => {
                    // one timeout window per pull, armed lazily
                    let deadline = this.deadline.get_or_insert_with(|| Box::pin(sleep(this.timeout)));
                    match deadline.as_mut().poll(cx) {
                        Poll::Ready(()) => {
                            this.finalize();
                            return Poll::Ready(Some(Err(ReceiveError::Timeout)));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

impl Body for BodyStream {
    type Data = Bytes;
    type Error = ReceiveError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx).map(|next| next.map(|chunk| chunk.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }
}

impl fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyStream")
            .field("stream", &self.stream)
            .field("close_conn", &self.close_conn)
            .field("finished", &self.finished)
            .finish()
    }
}
