//! The request-execution entry point.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::body::{self, RequestBody};
use crate::connect;
use crate::engine::Engine;
use crate::error::ClientError;
use crate::options::CallOptions;
use crate::response::{self, ReceiveParams, Response};
use crate::transmit;

/// A request handed to [`Client::execute`]: the standard `http` request
/// type carrying a fully-qualified URI and a [`RequestBody`].
pub type Request = http::Request<RequestBody>;

/// HTTP client adapter over a message-passing connection [`Engine`].
///
/// Stateless apart from the engine reference: every call is independent,
/// driving exactly one connection-and-stream lifecycle, with any
/// cross-call connection reuse threaded explicitly through
/// [`CallOptions::conn`].
pub struct Client {
    engine: Arc<dyn Engine>,
}

impl Client {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    /// Executes one request: establish (or reuse) a connection, transmit
    /// the request, assemble the response.
    pub async fn execute(&self, request: Request, mut options: CallOptions) -> Result<Response, ClientError> {
        let (parts, request_body) = request.into_parts();
        debug!(method = %parts.method, uri = %parts.uri, "executing request");

        let mut conn = connect::establish(&self.engine, &parts.uri, &mut options).await?;

        let mut headers = parts.headers;
        let resolved = body::resolve(request_body, options.send_body, &mut headers);

        let stream = match transmit::send(&mut conn, &parts.method, &parts.uri, &headers, resolved).await {
            Ok(stream) => stream,
            Err(e) => {
                if options.close_conn {
                    conn.close();
                }
                return Err(e.into());
            }
        };

        let response = response::receive(conn, stream, ReceiveParams::from_options(&options)).await?;
        Ok(response)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}
