use std::collections::HashMap;
use std::hint::black_box;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use criterion::{Criterion, criterion_group, criterion_main};
use http::{HeaderMap, Method};
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use courier_client::{
    CallOptions, Client, ConnId, Engine, EngineError, EngineOptions, Event, Protocol, RequestBody, StreamId,
    TunnelTarget,
};

/// Engine that answers every request with a fixed chunked body, straight
/// from memory.
struct ReplayEngine {
    chunks: usize,
    chunk: Bytes,
    state: Mutex<ReplayState>,
}

#[derive(Default)]
struct ReplayState {
    next_conn: u64,
    senders: HashMap<u64, UnboundedSender<Event>>,
}

impl ReplayEngine {
    fn new(chunks: usize) -> Self {
        Self { chunks, chunk: Bytes::from(vec![0x42u8; 1024]), state: Mutex::new(ReplayState::default()) }
    }
}

#[async_trait]
impl Engine for ReplayEngine {
    async fn open(
        &self,
        _host: &str,
        _port: u16,
        _options: EngineOptions,
    ) -> Result<(ConnId, UnboundedReceiver<Event>), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.next_conn += 1;
        let conn = ConnId(state.next_conn);

        let (tx, rx) = unbounded_channel();
        let _ = tx.send(Event::Up(Protocol::Http1));
        state.senders.insert(conn.0, tx);
        Ok((conn, rx))
    }

    async fn connect(&self, _conn: ConnId, _target: TunnelTarget) -> Result<StreamId, EngineError> {
        Err(EngineError::refused("no tunneling in this benchmark"))
    }

    async fn request(
        &self,
        conn: ConnId,
        _method: &Method,
        _path_and_query: &str,
        _headers: &HeaderMap,
        _body: Option<Bytes>,
    ) -> Result<StreamId, EngineError> {
        let state = self.state.lock().unwrap();
        let stream = StreamId(1);

        if let Some(tx) = state.senders.get(&conn.0) {
            let _ = tx.send(Event::Response { stream, status: 200, headers: Vec::new(), fin: false });
            for _ in 0..self.chunks {
                let _ = tx.send(Event::Data { stream, chunk: self.chunk.clone(), fin: false });
            }
            let _ = tx.send(Event::Data { stream, chunk: Bytes::new(), fin: true });
        }
        Ok(stream)
    }

    async fn send_data(&self, _conn: ConnId, _stream: StreamId, _fin: bool, _chunk: Bytes) -> Result<(), EngineError> {
        Ok(())
    }

    fn close(&self, conn: ConnId) {
        self.state.lock().unwrap().senders.remove(&conn.0);
    }
}

fn bench_buffered_assembly(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    for chunks in [1usize, 16, 256] {
        let client = Client::new(Arc::new(ReplayEngine::new(chunks)));

        c.bench_function(&format!("buffered_assembly_{chunks}_chunks"), |b| {
            b.to_async(&rt).iter(|| async {
                let request = http::Request::builder().uri("http://bench.local/").body(RequestBody::Empty).unwrap();
                let response = client.execute(request, CallOptions::default()).await.unwrap();
                black_box(response.body.as_bytes().unwrap().len())
            })
        });
    }
}

criterion_group!(benches, bench_buffered_assembly);
criterion_main!(benches);
