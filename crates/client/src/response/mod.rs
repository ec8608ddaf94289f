//! Response assembly.
//!
//! A receive loop over the connection's event mailbox drives the response:
//! lifecycle notifications are drained, the response head fixes status and
//! headers, and the body is materialized in one of three modes:
//!
//! - buffered ([`ResponseBody::Full`]): chunks are concatenated under the
//!   size guard until the final chunk arrives
//! - lazy ([`BodyStream`]): a single-consumption stream yielding one chunk
//!   per pull, no buffering, no size limit
//! - manual ([`ChunkReader`]): a deferred token; the caller pulls exactly
//!   one pending chunk per read
//!
//! Every wait is bounded by the per-call timeout; on any terminal failure
//! the connection is closed when the call asked for close-on-completion.

mod body_stream;
mod chunk_reader;

pub use body_stream::BodyStream;
pub use chunk_reader::{Chunk, ChunkReader};

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use tracing::{error, trace};

use crate::engine::{Connection, Event, StreamId, WaitError};
use crate::error::ReceiveError;
use crate::guard;
use crate::options::{BodyAs, CallOptions};

/// The assembled response.
///
/// `connection` carries the open connection back to the caller when the
/// call was made with `close_conn: false` and the body was fully buffered;
/// for streamed and manual bodies the connection rides inside the body
/// value instead.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub connection: Option<Connection>,
}

/// Response body in one of the three materialization modes.
pub enum ResponseBody {
    /// The complete body as one contiguous byte sequence.
    Full(Bytes),
    /// A lazy, single-consumption sequence of chunks.
    Stream(BodyStream),
    /// A deferred reader for manual chunk pulls.
    Reader(ChunkReader),
}

impl ResponseBody {
    /// The buffered bytes, when the body was materialized as `Full`.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn into_stream(self) -> Option<BodyStream> {
        match self {
            Self::Stream(stream) => Some(stream),
            _ => None,
        }
    }

    pub fn into_reader(self) -> Option<ChunkReader> {
        match self {
            Self::Reader(reader) => Some(reader),
            _ => None,
        }
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("ResponseBody::Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("ResponseBody::Stream"),
            Self::Reader(_) => f.write_str("ResponseBody::Reader"),
        }
    }
}

/// The slice of [`CallOptions`] the assembler needs.
pub(crate) struct ReceiveParams {
    pub(crate) timeout: Duration,
    pub(crate) body_as: BodyAs,
    pub(crate) max_body: Option<usize>,
    pub(crate) close_conn: bool,
}

impl ReceiveParams {
    pub(crate) fn from_options(options: &CallOptions) -> Self {
        Self { timeout: options.timeout, body_as: options.body_as, max_body: options.max_body, close_conn: options.close_conn }
    }
}

/// Drives the receive loop for one stream until the response head arrives,
/// then materializes the body per the configured mode.
pub(crate) async fn receive(mut conn: Connection, stream: StreamId, params: ReceiveParams) -> Result<Response, ReceiveError> {
    let (raw_status, raw_headers, fin) = loop {
        match next_event(&mut conn, stream, params.timeout).await {
            Ok(Event::Up(protocol)) => trace!(?protocol, "connection up"),
            Ok(Event::Down { reason }) => trace!(%reason, "connection down, engine may recover"),
            Ok(Event::Response { status, headers, fin, .. }) => break (status, headers, fin),
            Ok(Event::Data { .. }) => {
                return fail(conn, params.close_conn, ReceiveError::engine("data notification before response head"));
            }
            Ok(Event::Error { reason, .. }) => return fail(conn, params.close_conn, ReceiveError::engine(reason)),
            Err(e) => return fail(conn, params.close_conn, e),
        }
    };

    let status = match StatusCode::from_u16(raw_status) {
        Ok(status) => status,
        Err(_) => return fail(conn, params.close_conn, ReceiveError::engine(format!("invalid status {raw_status}"))),
    };
    let headers = match build_headers(raw_headers) {
        Ok(headers) => headers,
        Err(e) => return fail(conn, params.close_conn, e),
    };

    if fin {
        // final headers, no body follows
        let connection = release(conn, params.close_conn);
        return Ok(Response { status, headers, body: ResponseBody::Full(Bytes::new()), connection });
    }

    match params.body_as {
        BodyAs::Plain => buffered(conn, stream, &params, status, headers).await,
        BodyAs::Stream => Ok(Response {
            status,
            headers,
            body: ResponseBody::Stream(BodyStream::new(conn, stream, params.timeout, params.close_conn)),
            connection: None,
        }),
        BodyAs::Chunks => Ok(Response {
            status,
            headers,
            body: ResponseBody::Reader(ChunkReader::new(conn, stream, params.timeout, params.close_conn)),
            connection: None,
        }),
    }
}

/// Buffered mode: concatenate chunks in delivery order under the size
/// guard, stopping at the final chunk.
async fn buffered(
    mut conn: Connection,
    stream: StreamId,
    params: &ReceiveParams,
    status: StatusCode,
    headers: HeaderMap,
) -> Result<Response, ReceiveError> {
    let mut accumulator = BytesMut::new();
    loop {
        match next_event(&mut conn, stream, params.timeout).await {
            Ok(Event::Data { chunk, fin, .. }) => {
                accumulator.extend_from_slice(&chunk);
                if let Err(e) = guard::check_max_body(params.max_body, accumulator.len()) {
                    return fail(conn, params.close_conn, e);
                }
                if fin {
                    break;
                }
            }
            Ok(Event::Up(_) | Event::Down { .. }) => trace!("lifecycle event while receiving body"),
            Ok(Event::Response { .. }) => {
                return fail(conn, params.close_conn, ReceiveError::engine("unexpected response head while receiving body"));
            }
            Ok(Event::Error { reason, .. }) => return fail(conn, params.close_conn, ReceiveError::engine(reason)),
            Err(e) => return fail(conn, params.close_conn, e),
        }
    }

    let connection = release(conn, params.close_conn);
    Ok(Response { status, headers, body: ResponseBody::Full(accumulator.freeze()), connection })
}

async fn next_event(conn: &mut Connection, stream: StreamId, timeout: Duration) -> Result<Event, ReceiveError> {
    conn.mailbox_mut().recv(timeout, |event| event.concerns(stream)).await.map_err(|e| match e {
        WaitError::Timeout => ReceiveError::Timeout,
        WaitError::Closed => ReceiveError::connection_closed("engine terminated"),
    })
}

/// Builds the response header map; `http::HeaderName` lower-cases the keys
/// on the way in, whatever the engine delivered.
fn build_headers(raw: Vec<(String, String)>) -> Result<HeaderMap, ReceiveError> {
    let mut headers = HeaderMap::with_capacity(raw.len());
    for (name, value) in raw {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ReceiveError::engine(format!("invalid header name {name:?}: {e}")))?;
        let value =
            HeaderValue::from_str(&value).map_err(|e| ReceiveError::engine(format!("invalid header value for {name}: {e}")))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Terminal success: close the connection or hand it back to the caller.
fn release(conn: Connection, close_conn: bool) -> Option<Connection> {
    if close_conn {
        conn.close();
        None
    } else {
        Some(conn)
    }
}

/// Terminal failure: surface the error, closing the connection when the
/// call asked for close-on-completion (an unreturned connection is torn
/// down on drop either way, so handles never leak).
fn fail(conn: Connection, close_conn: bool, err: ReceiveError) -> Result<Response, ReceiveError> {
    error!(cause = %err, "response assembly failed");
    if close_conn {
        conn.close();
    }
    Err(err)
}
