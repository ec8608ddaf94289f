//! An asynchronous HTTP client adapter over a message-passing connection
//! engine
//!
//! This crate bridges a generic HTTP request/response abstraction to a
//! backend connection engine that reports progress as discrete
//! asynchronous notifications (connection up/down, response head, body
//! chunks, errors) delivered through a per-connection event mailbox
//! rather than as call return values.
//!
//! # Features
//!
//! - Connection reuse across calls, gated on the origin the connection was
//!   opened against
//! - TLS parameterization (SNI, peer verification with bounded chain depth
//!   and hostname matching) resolved from the target URI
//! - HTTP proxy tunneling with a CONNECT-equivalent handshake
//! - Whole-body and streamed request transmission
//! - Three response materialization modes: buffered, lazy stream, manual
//!   chunk reads
//! - Uniform per-wait timeouts and a buffered-body size ceiling
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use courier_client::{CallOptions, Client, Request, RequestBody};
//!
//! let client = Client::new(Arc::new(engine));
//!
//! let request = Request::builder()
//!     .method("GET")
//!     .uri("http://example.com/status")
//!     .body(RequestBody::Empty)?;
//!
//! let response = client.execute(request, CallOptions::default()).await?;
//! assert_eq!(response.status.as_u16(), 200);
//! ```
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`engine`]: The backend contract: the [`Engine`] trait, [`Event`]
//!   notifications, and the [`Connection`] handle
//! - [`options`]: Per-call configuration ([`CallOptions`])
//! - [`body`]: Polymorphic request bodies, resolved once at call entry
//! - [`response`]: The receive-loop state machine and the three body
//!   materialization modes
//! - [`client`]: The [`Client`] entry point
//! - [`error`]: The layered error taxonomy
//!
//! Each call is a single cooperative flow: it suspends only at mailbox
//! waits, acts only on events matching the awaited connection and stream
//! (deferring the rest), and either closes its connection on completion or
//! hands it back to the caller for reuse.

pub mod body;
pub mod client;
pub mod engine;
pub mod error;
pub mod options;
pub mod response;

mod connect;
mod guard;
mod transmit;

pub use body::{MultipartPayload, RequestBody};
pub use client::{Client, Request};
pub use engine::{ConnId, Connection, Engine, EngineOptions, Event, StreamId, TransportOptions, TunnelTarget};
pub use error::{ClientError, ConnectError, EngineError, ReceiveError, TransmitError};
pub use options::{
    BodyAs, CallOptions, DEFAULT_TIMEOUT, Http2Options, HttpOptions, PeerVerification, Protocol, Proxy, SendBody,
    TcpOptions, TlsOptions, Transport,
};
pub use response::{BodyStream, Chunk, ChunkReader, Response, ResponseBody};
