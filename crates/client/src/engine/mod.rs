//! The backend connection engine contract.
//!
//! The adapter does not speak HTTP on the wire itself. It drives an
//! [`Engine`]: an asynchronous, message-passing backend that opens
//! transports, frames requests, and reports progress as discrete [`Event`]
//! notifications delivered through a per-connection mailbox. This module
//! defines that contract plus the handle types threaded through a call:
//!
//! - [`Engine`]: open / tunnel-connect / request / data-send / close
//! - [`Event`]: the asynchronous notifications an engine delivers
//! - [`ConnId`] / [`StreamId`]: opaque connection and per-request handles
//! - [`Connection`]: an open connection owned by a call (or handed back to
//!   the caller for reuse), bundling the handle with its event mailbox
//!
//! Engines deliver events through the unbounded sender paired with the
//! receiver returned from [`Engine::open`]. Dropping that sender is the
//! engine's way of saying the connection backend is gone; every pending
//! wait then fails with a connection-closed error.

mod mailbox;

pub(crate) use mailbox::{Mailbox, WaitError};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::trace;

use crate::error::EngineError;
use crate::options::{Http2Options, HttpOptions, Protocol, TcpOptions, TlsOptions, Transport};

/// Opaque reference to an established transport session, minted by the
/// engine on [`Engine::open`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ConnId(pub u64);

/// Per-request identifier scoped to one connection, minted by the engine on
/// [`Engine::request`] and [`Engine::connect`]. Consumed by exactly one
/// response assembly, never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

/// Asynchronous notification delivered by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The transport is up and the given protocol was negotiated.
    Up(Protocol),
    /// The transport went down. Lifecycle noise, not terminal: the engine
    /// may bring the connection back up, and signals permanent loss by
    /// closing the mailbox or sending [`Event::Error`].
    Down { reason: String },
    /// Response head for a stream. `fin` set means no body follows.
    Response { stream: StreamId, status: u16, headers: Vec<(String, String)>, fin: bool },
    /// A body chunk for a stream. `fin` marks the last chunk.
    Data { stream: StreamId, chunk: Bytes, fin: bool },
    /// Engine-reported failure, either stream-scoped or (when `stream` is
    /// `None`) connection-scoped.
    Error { stream: Option<StreamId>, reason: String },
}

impl Event {
    /// True for transport lifecycle notifications that every wait drains
    /// and ignores rather than acting on.
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Event::Up(_) | Event::Down { .. })
    }

    /// True when this event belongs to the given stream, or is not scoped
    /// to any stream at all (lifecycle and connection-level errors).
    pub fn concerns(&self, stream: StreamId) -> bool {
        match self {
            Event::Up(_) | Event::Down { .. } => true,
            Event::Response { stream: s, .. } | Event::Data { stream: s, .. } => *s == stream,
            Event::Error { stream: s, .. } => s.is_none() || *s == Some(stream),
        }
    }
}

/// Options handed to [`Engine::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    pub transport: Transport,
    /// Protocols to negotiate; engine default when empty.
    pub protocols: Vec<Protocol>,
    pub http: HttpOptions,
    pub http2: Http2Options,
    pub transport_options: TransportOptions,
}

/// Transport options in either of the two wire shapes engines accept.
///
/// Current engines take the split shape. Engines speaking an older protocol
/// revision reject it with [`EngineError::BadOption`] naming `tcp_opts` or
/// `tls_opts`; the connection manager then retries once with the combined
/// shape carrying the same values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOptions {
    Split { tcp: TcpOptions, tls: TlsOptions },
    Combined { tcp: TcpOptions, tls: TlsOptions },
}

impl TransportOptions {
    /// Re-shapes these options into the legacy combined form.
    pub fn into_combined(self) -> Self {
        match self {
            Self::Split { tcp, tls } | Self::Combined { tcp, tls } => Self::Combined { tcp, tls },
        }
    }
}

/// Target of a proxy CONNECT tunnel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    pub host: String,
    pub port: u16,
    /// Protocols to negotiate inside the tunnel.
    pub protocols: Vec<Protocol>,
    /// TLS parameters for the tunneled leg; `None` keeps the tunnel plain.
    pub tls: Option<TlsOptions>,
}

/// The asynchronous connection engine the adapter drives.
///
/// Progress is reported through the event receiver returned from [`open`],
/// never through the call return values: `request` and `connect` only mint
/// a [`StreamId`], and the response arrives later as [`Event`]s carrying
/// that id. Requests may be issued immediately after `open` returns; the
/// engine queues them until the transport is up and emits [`Event::Up`]
/// once it is.
///
/// [`open`]: Engine::open
#[async_trait]
pub trait Engine: Send + Sync {
    /// Opens a transport to `host:port` and returns the connection handle
    /// together with the receiving half of its event mailbox.
    async fn open(
        &self,
        host: &str,
        port: u16,
        options: EngineOptions,
    ) -> Result<(ConnId, UnboundedReceiver<Event>), EngineError>;

    /// Issues a CONNECT-equivalent tunnel request through an open
    /// connection to a proxy. The tunnel outcome arrives as an
    /// [`Event::Response`] on the returned stream.
    async fn connect(&self, conn: ConnId, target: TunnelTarget) -> Result<StreamId, EngineError>;

    /// Issues a request. `body` of `None` leaves the request body open for
    /// subsequent [`send_data`] frames; `Some` carries the complete body.
    ///
    /// [`send_data`]: Engine::send_data
    async fn request(
        &self,
        conn: ConnId,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<StreamId, EngineError>;

    /// Sends one request body frame. `fin` marks end of body. The returned
    /// ack is synchronous: a send failure aborts the call.
    async fn send_data(&self, conn: ConnId, stream: StreamId, fin: bool, chunk: Bytes) -> Result<(), EngineError>;

    /// Tears the connection down. Fire-and-forget so that it can run from
    /// drop paths; the engine acks internally.
    fn close(&self, conn: ConnId);
}

/// An open connection owned by the current call.
///
/// Bundles the engine handle with the receiving half of the connection's
/// event mailbox. Exactly one `Connection` exists per open transport: the
/// call owns it for its duration, and hands it back to the caller (inside
/// the response, a drained body stream, or a chunk reader) when
/// `close_conn` is false, at which point closing it becomes the caller's
/// job. A `Connection` dropped without an explicit [`close`] still tears
/// the transport down, so handles cannot leak.
///
/// [`close`]: Connection::close
pub struct Connection {
    id: ConnId,
    peer: String,
    engine: Arc<dyn Engine>,
    mailbox: Mailbox,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(id: ConnId, peer: String, engine: Arc<dyn Engine>, events: UnboundedReceiver<Event>) -> Self {
        Self { id, peer, engine, mailbox: Mailbox::new(events), closed: false }
    }

    /// The engine handle of this connection.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// The `host:port` this connection was opened against. Pass this as
    /// `original` when supplying the connection for reuse.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Closes the connection, consuming the handle.
    pub fn close(mut self) {
        trace!(conn = ?self.id, "closing connection");
        self.closed = true;
        self.engine.close(self.id);
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub(crate) fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).field("peer", &self.peer).field("closed", &self.closed).finish()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed {
            trace!(conn = ?self.id, "connection dropped without explicit close, tearing down");
            self.engine.close(self.id);
        }
    }
}
