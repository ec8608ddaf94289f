//! Connection establishment: reuse, direct open, and proxy tunneling.
//!
//! Given a target URI and call options this module produces the one
//! [`Connection`] the rest of the call drives. A supplied connection is
//! reused only when it was opened against the exact `host:port` of the
//! target; otherwise it is closed and a fresh connection is opened with
//! transport and TLS parameters resolved from the URI scheme. When a proxy
//! is configured, the connection goes to the proxy instead and a
//! CONNECT-equivalent tunnel handshake must succeed before the connection
//! is handed on.

use std::sync::Arc;

use http::Uri;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};

use crate::engine::{ConnId, Connection, Engine, EngineOptions, Event, StreamId, TransportOptions, TunnelTarget, WaitError};
use crate::error::{ConnectError, EngineError};
use crate::options::{CallOptions, PeerVerification, Protocol, TlsOptions, Transport};

/// Establishes the connection for one call, consuming any supplied
/// connection out of `options`.
pub(crate) async fn establish(
    engine: &Arc<dyn Engine>,
    uri: &Uri,
    options: &mut CallOptions,
) -> Result<Connection, ConnectError> {
    let target = Target::from_uri(uri)?;

    if let Some(conn) = options.conn.take() {
        match options.original.as_deref() {
            Some(original) if original == target.authority() => {
                trace!(conn = ?conn.id(), original, "reusing supplied connection");
                return Ok(conn);
            }
            original => {
                // a handle left over from a redirect to a different origin
                warn!(?original, target = %target.authority(), "supplied connection opened against different origin, discarding");
                conn.close();
            }
        }
    }

    match options.proxy.clone() {
        Some(proxy) => open_via_proxy(engine, &target, options, proxy.host, proxy.port).await,
        None => open_direct(engine, &target, options).await,
    }
}

#[derive(Debug)]
struct Target {
    host: String,
    port: u16,
    secure: bool,
    authority: String,
}

impl Target {
    fn from_uri(uri: &Uri) -> Result<Self, ConnectError> {
        let host = uri.host().ok_or_else(|| ConnectError::invalid_target("missing host"))?.to_string();
        let secure = uri.scheme_str() == Some("https");
        let port = uri.port_u16().unwrap_or(if secure { 443 } else { 80 });
        let authority = format!("{host}:{port}");
        Ok(Self { host, port, secure, authority })
    }

    fn authority(&self) -> &str {
        &self.authority
    }
}

async fn open_direct(engine: &Arc<dyn Engine>, target: &Target, options: &CallOptions) -> Result<Connection, ConnectError> {
    let engine_options = EngineOptions {
        transport: derive_transport(target.secure, target.port, options.transport),
        protocols: options.protocols.clone(),
        http: options.http.clone(),
        http2: options.http2.clone(),
        transport_options: TransportOptions::Split {
            tcp: options.tcp.clone(),
            tls: resolve_tls(target.secure, &target.host, options),
        },
    };

    debug!(host = %target.host, port = target.port, "opening connection");
    let (id, events) = open_with_fallback(engine, &target.host, target.port, engine_options).await?;

    Ok(Connection::new(id, target.authority.clone(), Arc::clone(engine), events))
}

async fn open_via_proxy(
    engine: &Arc<dyn Engine>,
    target: &Target,
    options: &CallOptions,
    proxy_host: String,
    proxy_port: u16,
) -> Result<Connection, ConnectError> {
    let engine_options = EngineOptions {
        transport: Transport::Tcp,
        protocols: vec![Protocol::Http1],
        http: options.http.clone(),
        http2: options.http2.clone(),
        transport_options: TransportOptions::Split { tcp: options.tcp.clone(), tls: TlsOptions::default() },
    };

    debug!(proxy_host = %proxy_host, proxy_port, host = %target.host, port = target.port, "opening proxy tunnel");
    let (id, events) = open_with_fallback(engine, &proxy_host, proxy_port, engine_options).await?;

    // the reusable handle is logically a connection to the tunneled origin
    let mut conn = Connection::new(id, target.authority.clone(), Arc::clone(engine), events);

    await_up(&mut conn, options).await?;

    let tunnel = TunnelTarget {
        host: target.host.clone(),
        port: target.port,
        protocols: if target.secure { vec![Protocol::Http2] } else { options.protocols.clone() },
        tls: target.secure.then(|| resolve_tls(true, &target.host, options)),
    };
    let stream = engine.connect(conn.id(), tunnel).await.map_err(ConnectError::from)?;

    await_tunnel_established(&mut conn, stream, options).await?;

    Ok(conn)
}

/// Opens through the engine, retrying exactly once with the legacy combined
/// transport-options shape when the engine rejects the split shape. This is
/// the only automatic retry in the crate.
async fn open_with_fallback(
    engine: &Arc<dyn Engine>,
    host: &str,
    port: u16,
    options: EngineOptions,
) -> Result<(ConnId, UnboundedReceiver<Event>), ConnectError> {
    match engine.open(host, port, options.clone()).await {
        Ok(opened) => Ok(opened),
        Err(e) if e.is_split_options_rejection() => {
            debug!(cause = %e, "engine rejected split transport options, retrying with combined shape");
            let legacy = EngineOptions { transport_options: options.transport_options.into_combined(), ..options };
            engine.open(host, port, legacy).await.map_err(ConnectError::from)
        }
        Err(e) => Err(e.into()),
    }
}

/// Waits for the proxy connection to come up before the tunnel handshake.
async fn await_up(conn: &mut Connection, options: &CallOptions) -> Result<(), ConnectError> {
    loop {
        match conn.mailbox_mut().recv(options.timeout, is_lifecycle_or_failure).await {
            Ok(Event::Up(protocol)) => {
                trace!(?protocol, "proxy connection up");
                return Ok(());
            }
            Ok(Event::Down { reason }) => trace!(%reason, "proxy connection still down"),
            Ok(Event::Error { reason, .. }) => return Err(EngineError::refused(reason).into()),
            Ok(_) => {}
            Err(WaitError::Timeout) => return Err(ConnectError::Timeout),
            Err(WaitError::Closed) => return Err(EngineError::Closed.into()),
        }
    }
}

/// Requires a 200 tunnel-established response before the connection is
/// treated as ready; any other status fails the open and nothing is
/// transmitted to the target.
async fn await_tunnel_established(conn: &mut Connection, stream: StreamId, options: &CallOptions) -> Result<(), ConnectError> {
    loop {
        match conn.mailbox_mut().recv(options.timeout, |e| e.concerns(stream)).await {
            Ok(Event::Response { status, .. }) => {
                if status == 200 {
                    debug!("proxy tunnel established");
                    return Ok(());
                }
                return Err(ConnectError::tunnel_rejected(status));
            }
            Ok(Event::Up(_) | Event::Down { .. }) => {}
            Ok(Event::Data { .. }) => return Err(EngineError::refused("unexpected data during tunnel handshake").into()),
            Ok(Event::Error { reason, .. }) => return Err(EngineError::refused(reason).into()),
            Err(WaitError::Timeout) => return Err(ConnectError::Timeout),
            Err(WaitError::Closed) => return Err(EngineError::Closed.into()),
        }
    }
}

/// Derives the transport from the scheme: a secure scheme on a non-default
/// port always forces TLS, otherwise an explicit caller transport wins and
/// the scheme picks the default.
fn derive_transport(secure: bool, port: u16, explicit: Option<Transport>) -> Transport {
    if secure && port != 443 {
        Transport::Tls
    } else {
        explicit.unwrap_or(if secure { Transport::Tls } else { Transport::Tcp })
    }
}

/// Resolves the TLS parameters for a target, injecting SNI and, when
/// certificate verification is requested, peer verification with bounded
/// chain depth, disabled session reuse, and hostname matching.
fn resolve_tls(secure: bool, host: &str, options: &CallOptions) -> TlsOptions {
    let mut tls = options.tls.clone();
    if !secure {
        return tls;
    }

    if tls.server_name.is_none() {
        tls.server_name = Some(host.to_string());
    }
    if options.certificates_verification {
        let ca_bundle = tls.verify.as_ref().and_then(|v| v.ca_bundle.clone());
        tls.verify = Some(PeerVerification {
            ca_bundle,
            match_host: Some(host.to_string()),
            ..PeerVerification::default()
        });
    }
    tls
}

fn is_lifecycle_or_failure(event: &Event) -> bool {
    matches!(event, Event::Up(_) | Event::Down { .. } | Event::Error { .. })
}
