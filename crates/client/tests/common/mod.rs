//! A scripted in-memory engine: records every outbound call and replays
//! pre-programmed event sequences into the connection mailbox.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use courier_client::{ConnId, Engine, EngineError, EngineOptions, Event, Protocol, StreamId, TunnelTarget};

/// Placeholder stream id in scripted events, rewritten at emission time to
/// the stream the engine actually allocated for the triggering call.
pub const SCRIPT_STREAM: StreamId = StreamId(0);

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub conn: ConnId,
    pub stream: StreamId,
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct RecordedSend {
    pub conn: ConnId,
    pub stream: StreamId,
    pub fin: bool,
    pub chunk: Bytes,
}

#[derive(Default)]
struct State {
    next_conn: u64,
    next_stream: u64,
    opens: Vec<(String, u16, EngineOptions)>,
    connects: Vec<(ConnId, TunnelTarget)>,
    requests: Vec<RecordedRequest>,
    sends: Vec<RecordedSend>,
    closed: Vec<ConnId>,
    senders: HashMap<u64, UnboundedSender<Event>>,
    open_errors: VecDeque<EngineError>,
    send_error: Option<EngineError>,
    on_open: VecDeque<Vec<Event>>,
    on_connect: VecDeque<Vec<Event>>,
    on_request: VecDeque<Vec<Event>>,
}

pub struct ScriptedEngine {
    state: Mutex<State>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(State::default()) })
    }

    /// Events to emit after the next `open`. When nothing is scripted, an
    /// `Up(Http1)` is emitted, matching a transport that comes up cleanly.
    pub fn script_open(&self, events: Vec<Event>) {
        self.state().on_open.push_back(events);
    }

    /// Events to emit after the next `connect` (the tunnel handshake
    /// outcome). [`SCRIPT_STREAM`] ids are rewritten to the tunnel stream.
    pub fn script_connect(&self, events: Vec<Event>) {
        self.state().on_connect.push_back(events);
    }

    /// Events to emit after the next `request`. [`SCRIPT_STREAM`] ids are
    /// rewritten to the allocated request stream.
    pub fn script_request(&self, events: Vec<Event>) {
        self.state().on_request.push_back(events);
    }

    pub fn fail_next_open(&self, error: EngineError) {
        self.state().open_errors.push_back(error);
    }

    pub fn fail_send_data(&self, error: EngineError) {
        self.state().send_error = Some(error);
    }

    pub fn opens(&self) -> Vec<(String, u16, EngineOptions)> {
        self.state().opens.clone()
    }

    pub fn connects(&self) -> Vec<(ConnId, TunnelTarget)> {
        self.state().connects.clone()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    pub fn sends(&self) -> Vec<RecordedSend> {
        self.state().sends.clone()
    }

    pub fn closed(&self) -> Vec<ConnId> {
        self.state().closed.clone()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }
}

fn emit(state: &mut State, conn: ConnId, stream: Option<StreamId>, events: Vec<Event>) {
    let Some(sender) = state.senders.get(&conn.0) else {
        return;
    };
    for event in events {
        let event = match (stream, event) {
            (Some(stream), Event::Response { stream: s, status, headers, fin }) if s == SCRIPT_STREAM => {
                Event::Response { stream, status, headers, fin }
            }
            (Some(stream), Event::Data { stream: s, chunk, fin }) if s == SCRIPT_STREAM => {
                Event::Data { stream, chunk, fin }
            }
            (Some(stream), Event::Error { stream: Some(s), reason }) if s == SCRIPT_STREAM => {
                Event::Error { stream: Some(stream), reason }
            }
            (_, event) => event,
        };
        let _ = sender.send(event);
    }
}

#[async_trait]
impl Engine for ScriptedEngine {
    async fn open(
        &self,
        host: &str,
        port: u16,
        options: EngineOptions,
    ) -> Result<(ConnId, UnboundedReceiver<Event>), EngineError> {
        let mut state = self.state();
        state.opens.push((host.to_string(), port, options));

        if let Some(error) = state.open_errors.pop_front() {
            return Err(error);
        }

        state.next_conn += 1;
        let conn = ConnId(state.next_conn);
        let (tx, rx) = unbounded_channel();
        state.senders.insert(conn.0, tx);

        let events = state.on_open.pop_front().unwrap_or_else(|| vec![Event::Up(Protocol::Http1)]);
        emit(&mut state, conn, None, events);
        Ok((conn, rx))
    }

    async fn connect(&self, conn: ConnId, target: TunnelTarget) -> Result<StreamId, EngineError> {
        let mut state = self.state();
        state.connects.push((conn, target));

        state.next_stream += 1;
        let stream = StreamId(state.next_stream);

        if let Some(events) = state.on_connect.pop_front() {
            emit(&mut state, conn, Some(stream), events);
        }
        Ok(stream)
    }

    async fn request(
        &self,
        conn: ConnId,
        method: &Method,
        path_and_query: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<StreamId, EngineError> {
        let mut state = self.state();

        state.next_stream += 1;
        let stream = StreamId(state.next_stream);
        state.requests.push(RecordedRequest {
            conn,
            stream,
            method: method.clone(),
            path_and_query: path_and_query.to_string(),
            headers: headers.clone(),
            body,
        });

        if let Some(events) = state.on_request.pop_front() {
            emit(&mut state, conn, Some(stream), events);
        }
        Ok(stream)
    }

    async fn send_data(&self, conn: ConnId, stream: StreamId, fin: bool, chunk: Bytes) -> Result<(), EngineError> {
        let mut state = self.state();
        if let Some(error) = state.send_error.take() {
            return Err(error);
        }
        state.sends.push(RecordedSend { conn, stream, fin, chunk });
        Ok(())
    }

    fn close(&self, conn: ConnId) {
        let mut state = self.state();
        state.senders.remove(&conn.0);
        state.closed.push(conn);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
