// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! WebSocket live-reload broker.
//!
//! A single [`Broker`] task owns the registry of connected clients. Every
//! mutation arrives as a [`BrokerHandle`] message, so the registry needs no
//! lock and registration, removal and broadcast are totally ordered.
//!
//! ```text
//! ChangeWatcher --broadcast--> Broker --try_send--> client queue --> write loop --> browser
//!                                ^                                                   |
//!                                +------------ unregister <-- read loop <------------+
//! ```
//!
//! Each client has a bounded queue. A client whose queue is full when a
//! broadcast arrives is dropped from the registry instead of slowing down the
//! broadcaster.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{HiveError, Result};

/// Path of the WebSocket endpoint.
pub const RELOAD_PATH: &str = "/reload";
/// Default listen address, independent of the application's own port.
pub const DEFAULT_RELOAD_ADDR: &str = "127.0.0.1:12450";
/// Messages a client may have pending before it counts as too slow.
pub const SEND_QUEUE_CAPACITY: usize = 256;
/// Time allowed to write one frame to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Time a peer is assumed to wait for traffic before dropping us.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Keep-alive ping period; shorter than [`PONG_WAIT`].
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Registry key of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

enum BrokerMsg {
    Register {
        id: ClientId,
        queue: mpsc::Sender<String>,
    },
    Unregister(ClientId),
    Broadcast(String),
    ClientCount(oneshot::Sender<usize>),
}

/// Owns the client registry. Runs until every [`BrokerHandle`] is dropped.
pub struct Broker {
    rx: mpsc::UnboundedReceiver<BrokerMsg>,
    clients: HashMap<ClientId, mpsc::Sender<String>>,
}

impl Broker {
    /// Starts the broker task and returns a handle to it.
    pub fn spawn() -> BrokerHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let broker = Broker {
            rx,
            clients: HashMap::new(),
        };
        tokio::spawn(broker.run());

        BrokerHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                BrokerMsg::Register { id, queue } => {
                    self.clients.insert(id, queue);
                    debug!(client = %id, total = self.clients.len(), "client registered");
                }
                BrokerMsg::Unregister(id) => {
                    // Dropping the sender closes the client's queue.
                    if self.clients.remove(&id).is_some() {
                        debug!(client = %id, total = self.clients.len(), "client unregistered");
                    }
                }
                BrokerMsg::Broadcast(message) => self.broadcast(message),
                BrokerMsg::ClientCount(reply) => {
                    let _ = reply.send(self.clients.len());
                }
            }
        }
        debug!("reload broker stopped");
    }

    fn broadcast(&mut self, message: String) {
        debug!(clients = self.clients.len(), message = %message, "broadcasting reload");
        self.clients
            .retain(|id, queue| match queue.try_send(message.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(client = %id, "client send queue full, disconnecting");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }
}

/// Cheap, clonable access to the broker.
#[derive(Clone)]
pub struct BrokerHandle {
    tx: mpsc::UnboundedSender<BrokerMsg>,
    next_id: Arc<AtomicU64>,
}

impl BrokerHandle {
    /// Registers a new client and returns its id and outbound queue.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (queue, rx) = mpsc::channel(SEND_QUEUE_CAPACITY);
        let _ = self.tx.send(BrokerMsg::Register { id, queue });
        (id, rx)
    }

    /// Removes a client and closes its queue. Unknown ids are ignored.
    pub fn unregister(&self, id: ClientId) {
        let _ = self.tx.send(BrokerMsg::Unregister(id));
    }

    /// Queues `payload` (whitespace-trimmed) for every registered client.
    ///
    /// Never blocks, whatever state the client queues are in.
    pub fn broadcast(&self, payload: &str) {
        let message = payload.trim().to_string();
        if self.tx.send(BrokerMsg::Broadcast(message)).is_err() {
            debug!("reload broker is gone, dropping broadcast");
        }
    }

    /// Number of registered clients, or 0 if the broker has stopped.
    pub async fn client_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(BrokerMsg::ClientCount(reply)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Router exposing the WebSocket endpoint at [`RELOAD_PATH`].
pub fn router(broker: BrokerHandle) -> Router {
    Router::new()
        .route(RELOAD_PATH, get(livereload_handler))
        .with_state(broker)
}

async fn livereload_handler(
    ws: WebSocketUpgrade,
    State(broker): State<BrokerHandle>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| {
        error!(error = %e, "error while upgrading server connection");
    })
    .on_upgrade(move |socket| handle_websocket(socket, broker))
}

/// Drives one client connection until either side gives up.
pub async fn handle_websocket(socket: WebSocket, broker: BrokerHandle) {
    let (id, queue) = broker.register();
    debug!(client = %id, "live-reload client connected");

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(id, sink, queue));

    let writer_finished = tokio::select! {
        _ = read_loop(id, &mut stream) => false,
        _ = &mut writer => true,
    };

    broker.unregister(id);
    if !writer_finished {
        // The closed queue makes the writer send a close frame and exit.
        let _ = writer.await;
    }
    debug!(client = %id, "live-reload client disconnected");
}

/// Reads only to notice the peer going away; client messages are ignored.
async fn read_loop(id: ClientId, stream: &mut SplitStream<WebSocket>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(client = %id, error = %e, "error reading from live-reload client");
                break;
            }
        }
    }
}

/// Joins `first` and every message already waiting in `queue` into one
/// frame, separated by newlines.
fn coalesce(first: String, queue: &mut mpsc::Receiver<String>) -> String {
    let mut frame = first;
    while let Ok(more) = queue.try_recv() {
        frame.push('\n');
        frame.push_str(&more);
    }
    frame
}

async fn write_loop<S>(id: ClientId, mut sink: S, mut queue: mpsc::Receiver<String>)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            next = queue.recv() => match next {
                Some(first) => {
                    let frame = coalesce(first, &mut queue);
                    if !send_frame(id, &mut sink, Message::Text(frame)).await {
                        return;
                    }
                }
                None => {
                    send_frame(id, &mut sink, Message::Close(None)).await;
                    return;
                }
            },
            _ = ping.tick() => {
                if !send_frame(id, &mut sink, Message::Ping(Vec::new())).await {
                    return;
                }
            }
        }
    }
}

async fn send_frame<S>(id: ClientId, sink: &mut S, msg: Message) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    match tokio::time::timeout(WRITE_WAIT, sink.send(msg)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(client = %id, error = %e, "write to live-reload client failed");
            false
        }
        Err(_) => {
            debug!(client = %id, "write to live-reload client timed out");
            false
        }
    }
}

/// A running live-reload endpoint. Dropping it stops the server.
#[derive(Debug)]
pub struct ReloadServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ReloadServer {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for ReloadServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Binds `addr` and serves the reload endpoint in the background.
///
/// Failing to bind is fatal for the caller; errors after that are logged.
pub async fn serve(addr: &str, broker: BrokerHandle) -> Result<ReloadServer> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| HiveError::ReloadServer {
            addr: addr.to_string(),
            source,
        })?;
    let local = listener.local_addr()?;

    let app = router(broker);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "reload server stopped");
        }
    });

    info!("Reload server listening at {}", local);
    Ok(ReloadServer { addr: local, task })
}
