//! Per-call configuration.
//!
//! The adapter is configured through an explicit [`CallOptions`] struct
//! rather than a dynamic options bag: every recognized option is a typed
//! field, so unrecognized options cannot exist at this boundary. All fields
//! have documented defaults and `with_*` builders for the common overrides.

use std::path::PathBuf;
use std::time::Duration;

use crate::engine::Connection;

/// Default bound for every notification wait, overridable per call via
/// [`CallOptions::timeout`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default certificate chain verification depth injected for secure targets.
pub(crate) const DEFAULT_VERIFY_DEPTH: u32 = 20;

/// How the response body is materialized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum BodyAs {
    /// Buffer the whole body into one contiguous byte sequence.
    #[default]
    Plain,
    /// Yield the body lazily, one chunk per pull, without buffering.
    Stream,
    /// Return a [`crate::response::ChunkReader`] and let the caller pull
    /// chunks manually.
    Chunks,
}

/// How the request body is handed to the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SendBody {
    /// Single request call carrying the complete body.
    #[default]
    AtOnce,
    /// Empty initial body followed by explicit data frames and a final
    /// empty end-of-body frame.
    Stream,
}

/// An HTTP proxy to tunnel through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

impl Proxy {
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

/// Transport the engine should open.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Tls,
}

/// Application protocols to negotiate on the connection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Protocol {
    Http1,
    Http2,
}

/// Plain-TCP knobs forwarded to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TcpOptions {
    pub nodelay: Option<bool>,
    pub keepalive: Option<Duration>,
}

/// TLS parameters forwarded to the engine.
///
/// The adapter does not perform handshakes itself; it only resolves these
/// parameters. For a secure target the connection manager fills in
/// `server_name` (SNI) and, when certificate verification is requested,
/// a [`PeerVerification`] matched against the target host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TlsOptions {
    /// Server name sent for SNI and protocol negotiation.
    pub server_name: Option<String>,
    /// Peer certificate verification, `None` disables verification.
    pub verify: Option<PeerVerification>,
}

/// Peer certificate verification parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerVerification {
    /// Trusted CA bundle; `None` means the engine's default trust store.
    pub ca_bundle: Option<PathBuf>,
    /// Maximum certificate chain depth.
    pub depth: u32,
    /// Whether TLS session reuse is allowed.
    pub reuse_sessions: bool,
    /// Hostname the peer certificate must match.
    pub match_host: Option<String>,
}

impl Default for PeerVerification {
    fn default() -> Self {
        Self { ca_bundle: None, depth: DEFAULT_VERIFY_DEPTH, reuse_sessions: false, match_host: None }
    }
}

/// HTTP/1.1 engine knobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpOptions {
    pub keepalive: Option<Duration>,
}

/// HTTP/2 engine knobs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Http2Options {
    pub keepalive: Option<Duration>,
    pub max_concurrent_streams: Option<u32>,
}

/// Options for one request execution.
///
/// `conn` and `original` travel together: a supplied connection is reused
/// only when `original` equals the `host:port` of the target URI. On a
/// mismatch the stale handle is closed and a fresh connection is opened,
/// since a handle left over from a redirect to a different origin must
/// never be reused.
#[derive(Debug)]
pub struct CallOptions {
    /// Bound for every notification wait.
    pub timeout: Duration,
    /// Response body materialization mode.
    pub body_as: BodyAs,
    /// Request body transmission mode.
    pub send_body: SendBody,
    /// Byte ceiling for buffered bodies; unlimited when `None`.
    pub max_body: Option<usize>,
    /// Close the connection when the call completes. When `false`, the
    /// connection is handed back to the caller for reuse.
    pub close_conn: bool,
    /// Existing connection to reuse, together with `original`.
    pub conn: Option<Connection>,
    /// `host:port` the supplied connection was opened against.
    pub original: Option<String>,
    /// Proxy to tunnel through.
    pub proxy: Option<Proxy>,
    /// Explicit transport override; derived from the scheme when `None`.
    pub transport: Option<Transport>,
    pub tcp: TcpOptions,
    pub tls: TlsOptions,
    pub http: HttpOptions,
    pub http2: Http2Options,
    /// Protocols to negotiate; engine default when empty.
    pub protocols: Vec<Protocol>,
    /// Verify the peer certificate chain on secure targets.
    pub certificates_verification: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            body_as: BodyAs::default(),
            send_body: SendBody::default(),
            max_body: None,
            close_conn: true,
            conn: None,
            original: None,
            proxy: None,
            transport: None,
            tcp: TcpOptions::default(),
            tls: TlsOptions::default(),
            http: HttpOptions::default(),
            http2: Http2Options::default(),
            protocols: Vec::new(),
            certificates_verification: false,
        }
    }
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_body_as(mut self, body_as: BodyAs) -> Self {
        self.body_as = body_as;
        self
    }

    pub fn with_send_body(mut self, send_body: SendBody) -> Self {
        self.send_body = send_body;
        self
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = Some(max_body);
        self
    }

    pub fn with_close_conn(mut self, close_conn: bool) -> Self {
        self.close_conn = close_conn;
        self
    }

    /// Supplies an existing connection for reuse, recording the
    /// `host:port` it was opened against.
    pub fn with_conn<S: Into<String>>(mut self, conn: Connection, original: S) -> Self {
        self.conn = Some(conn);
        self.original = Some(original.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Proxy) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_transport(mut self, transport: Transport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_protocols(mut self, protocols: Vec<Protocol>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_certificates_verification(mut self, verify: bool) -> Self {
        self.certificates_verification = verify;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = CallOptions::default();

        assert_eq!(options.timeout, Duration::from_millis(1000));
        assert_eq!(options.body_as, BodyAs::Plain);
        assert_eq!(options.send_body, SendBody::AtOnce);
        assert_eq!(options.max_body, None);
        assert!(options.close_conn);
        assert!(options.conn.is_none());
        assert!(options.original.is_none());
        assert!(options.proxy.is_none());
        assert!(!options.certificates_verification);
    }

    #[test]
    fn builders() {
        let options = CallOptions::new()
            .with_timeout(Duration::from_millis(50))
            .with_body_as(BodyAs::Chunks)
            .with_send_body(SendBody::Stream)
            .with_max_body(4096)
            .with_close_conn(false)
            .with_proxy(Proxy::new("proxy.internal", 3128))
            .with_certificates_verification(true);

        assert_eq!(options.timeout, Duration::from_millis(50));
        assert_eq!(options.body_as, BodyAs::Chunks);
        assert_eq!(options.send_body, SendBody::Stream);
        assert_eq!(options.max_body, Some(4096));
        assert!(!options.close_conn);
        assert_eq!(options.proxy, Some(Proxy::new("proxy.internal", 3128)));
        assert!(options.certificates_verification);
    }

    #[test]
    fn default_verification_depth_is_bounded() {
        let verification = PeerVerification::default();

        assert_eq!(verification.depth, 20);
        assert!(!verification.reuse_sessions);
        assert!(verification.ca_bundle.is_none());
    }
}
