//! Request transmission over an established connection.
//!
//! Two transmission modes: at-once hands the complete body to the engine in
//! a single request call; streamed issues the request with an open body and
//! feeds chunks as non-final data frames, closed by exactly one final empty
//! frame. Every data send is synchronously acknowledged by the engine and
//! any reported failure aborts the call.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use tracing::{debug, trace};

use crate::body::ResolvedBody;
use crate::engine::{Connection, StreamId};
use crate::error::TransmitError;

/// Issues the request and returns the stream the response will arrive on.
pub(crate) async fn send(
    conn: &mut Connection,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: ResolvedBody,
) -> Result<StreamId, TransmitError> {
    let path = path_and_query(uri);
    let engine = Arc::clone(conn.engine());

    match body {
        ResolvedBody::AtOnce(payload) => {
            debug!(method = %method, path = %path, "transmitting request");
            Ok(engine.request(conn.id(), method, &path, headers, payload).await?)
        }
        ResolvedBody::Streamed(mut source) => {
            debug!(method = %method, path = %path, "transmitting request with streamed body");
            let stream = engine.request(conn.id(), method, &path, headers, None).await?;

            while let Some(chunk) = source.next_chunk().await {
                trace!(stream = ?stream, len = chunk.len(), "sending body chunk");
                engine.send_data(conn.id(), stream, false, chunk).await?;
            }
            // end-of-body marker
            engine.send_data(conn.id(), stream, true, Bytes::new()).await?;

            Ok(stream)
        }
    }
}

/// Formats the request target from the URI: path plus `?query` when present.
fn path_and_query(uri: &Uri) -> String {
    match uri.path_and_query() {
        Some(path_and_query) if !path_and_query.as_str().is_empty() => path_and_query.as_str().to_string(),
        _ => "/".to_string(),
    }
}
