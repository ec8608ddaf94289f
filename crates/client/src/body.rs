//! Polymorphic request bodies.
//!
//! A caller may hand the adapter a complete byte sequence, a pre-encoded
//! multipart payload, a chunk stream, or a zero-argument chunk producer.
//! The variants are resolved exactly once at call entry into a normalized
//! send plan ([`ResolvedBody`]) so the transmitter never branches on the
//! caller-facing shape again.

use std::fmt;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::HeaderMap;

use crate::options::SendBody;

/// The request body as supplied by the caller.
pub enum RequestBody {
    /// No body.
    Empty,
    /// A complete byte sequence.
    Full(Bytes),
    /// A pre-encoded multipart payload carrying its own headers.
    Multipart(MultipartPayload),
    /// A single-consumption stream of body chunks. Always transmitted in
    /// streamed mode, regardless of the caller-selected send mode.
    Chunks(BoxStream<'static, Bytes>),
    /// A zero-argument producer yielding chunks until `None`. Always
    /// transmitted in streamed mode.
    Producer(Box<dyn FnMut() -> Option<Bytes> + Send + 'static>),
}

impl RequestBody {
    pub fn chunks<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Bytes> + Send + 'static,
    {
        Self::Chunks(stream.boxed())
    }

    pub fn producer<F>(f: F) -> Self
    where
        F: FnMut() -> Option<Bytes> + Send + 'static,
    {
        Self::Producer(Box::new(f))
    }
}

impl Default for RequestBody {
    fn default() -> Self {
        Self::Empty
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Full(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Full(bytes.into())
    }
}

impl From<&'static str> for RequestBody {
    fn from(str: &'static str) -> Self {
        Self::Full(Bytes::from_static(str.as_bytes()))
    }
}

impl From<String> for RequestBody {
    fn from(str: String) -> Self {
        Self::Full(str.into())
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("RequestBody::Empty"),
            Self::Full(bytes) => f.debug_tuple("RequestBody::Full").field(&bytes.len()).finish(),
            Self::Multipart(payload) => f.debug_tuple("RequestBody::Multipart").field(payload).finish(),
            Self::Chunks(_) => f.write_str("RequestBody::Chunks"),
            Self::Producer(_) => f.write_str("RequestBody::Producer"),
        }
    }
}

/// A multipart payload already encoded by the caller: the encoded bytes
/// plus the headers (content type with boundary, content length) that must
/// accompany them. The headers are appended to the request headers before
/// transmission.
#[derive(Debug, Clone)]
pub struct MultipartPayload {
    pub headers: HeaderMap,
    pub bytes: Bytes,
}

impl MultipartPayload {
    pub fn new(headers: HeaderMap, bytes: Bytes) -> Self {
        Self { headers, bytes }
    }
}

/// The normalized send plan: either one complete payload or a chunk source
/// to drain in streamed mode.
pub(crate) enum ResolvedBody {
    AtOnce(Option<Bytes>),
    Streamed(ChunkSource),
}

/// Source of chunks for a streamed request body.
pub(crate) enum ChunkSource {
    Stream(BoxStream<'static, Bytes>),
    Producer(Box<dyn FnMut() -> Option<Bytes> + Send + 'static>),
}

impl ChunkSource {
    fn once(bytes: Bytes) -> Self {
        Self::Stream(futures::stream::iter([bytes]).boxed())
    }

    pub(crate) async fn next_chunk(&mut self) -> Option<Bytes> {
        match self {
            Self::Stream(stream) => stream.next().await,
            Self::Producer(produce) => produce(),
        }
    }
}

/// Resolves the caller-facing body into a send plan, appending multipart
/// headers to `headers` on the way. Stream-shaped bodies force streamed
/// transmission regardless of `send_body`.
pub(crate) fn resolve(body: RequestBody, send_body: SendBody, headers: &mut HeaderMap) -> ResolvedBody {
    match body {
        RequestBody::Empty => ResolvedBody::AtOnce(None),
        RequestBody::Full(bytes) => resolve_full(bytes, send_body),
        RequestBody::Multipart(payload) => {
            for (name, value) in payload.headers.iter() {
                headers.append(name, value.clone());
            }
            resolve_full(payload.bytes, send_body)
        }
        RequestBody::Chunks(stream) => ResolvedBody::Streamed(ChunkSource::Stream(stream)),
        RequestBody::Producer(produce) => ResolvedBody::Streamed(ChunkSource::Producer(produce)),
    }
}

fn resolve_full(bytes: Bytes, send_body: SendBody) -> ResolvedBody {
    match send_body {
        SendBody::AtOnce => ResolvedBody::AtOnce(Some(bytes)),
        SendBody::Stream => ResolvedBody::Streamed(ChunkSource::once(bytes)),
    }
}
