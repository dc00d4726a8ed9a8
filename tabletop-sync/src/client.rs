//! WebSocket transport to the authority.
//!
//! Owns the persistent connection and exposes the two primitives the
//! rest of the engine is built on:
//!
//! - [`SocketClient::request`] — send a named request, suspend until the
//!   single correlated acknowledgment arrives (or times out).
//! - the event channel ([`SocketClient::take_event_rx`]) — connection
//!   lifecycle notifications and decoded server pushes, drained by one
//!   pump task so push handling never races UI-owned state.
//!
//! Reconnection is bounded and fixed-backoff: transient failures move
//! the client into `Reconnecting` silently; only exhaustion surfaces a
//! user-facing notification.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::protocol::{Ack, Frame, RequestBody, ServerPush};

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection attempts per outage before giving up.
    pub reconnect_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnect_delay: Duration,
    /// Upper bound on how long a request waits for its acknowledgment.
    pub request_timeout: Duration,
    /// Event channel capacity (lifecycle + pushes).
    pub event_capacity: usize,
    /// Outgoing frame buffer per connection.
    pub outgoing_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            event_capacity: 256,
            outgoing_capacity: 64,
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the transport, drained by the engine pump.
#[derive(Debug)]
pub enum ClientEvent {
    /// Connection established (initially or after a reconnect).
    Connected,
    /// Connection lost; a reconnect cycle follows unless shut down.
    Disconnected,
    /// Reconnection attempts exhausted.
    ReconnectFailed,
    /// Unsolicited server push, already decoded.
    Push(ServerPush),
}

/// Why a request produced no acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Issued while disconnected — dropped immediately, the only
    /// fire-and-drop behavior in the public surface.
    NotConnected,
    /// The connection went down mid-request; the ack will never arrive.
    ConnectionLost,
    /// No acknowledgment within the configured bound.
    TimedOut,
    /// The request could not be encoded.
    Codec(String),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "not connected"),
            Self::ConnectionLost => write!(f, "connection lost mid-request"),
            Self::TimedOut => write!(f, "request timed out"),
            Self::Codec(e) => write!(f, "encode failed: {e}"),
        }
    }
}

impl std::error::Error for RequestError {}

/// The seam between entity managers and the transport. `SocketClient`
/// is the production implementation; tests script their own.
pub trait Authority: Send + Sync + 'static {
    fn request(
        &self,
        body: RequestBody,
    ) -> impl Future<Output = Result<Ack, RequestError>> + Send;
}

struct Shared {
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    /// Sender for the current connection's writer; `None` while down.
    outgoing: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    /// In-flight requests awaiting their acknowledgment.
    pending: Mutex<HashMap<u64, oneshot::Sender<Ack>>>,
    /// Bumped on every connect/shutdown; stale tasks observe it and exit.
    generation: AtomicU64,
    shutdown: AtomicBool,
    event_tx: mpsc::Sender<ClientEvent>,
}

impl Shared {
    fn stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
            || self.shutdown.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
    }

    fn drop_outgoing(&self) {
        self.outgoing.lock().unwrap().take();
    }

    /// Drop every pending ack sender; waiting callers resolve to
    /// `ConnectionLost`.
    fn fail_pending(&self) {
        self.pending.lock().unwrap().clear();
    }
}

/// WebSocket client with request/acknowledgment correlation.
pub struct SocketClient {
    shared: Arc<Shared>,
    next_request_id: AtomicU64,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
}

impl SocketClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
        Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                outgoing: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                event_tx,
            }),
            next_request_id: AtomicU64::new(0),
            event_rx: Some(event_rx),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ClientConfig::default())
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock().unwrap()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Open a connection to `address` (a `ws://` URL), tearing down any
    /// previous connection first. Runs the bounded reconnect supervisor
    /// in the background; progress is reported on the event channel.
    pub fn connect(&self, address: impl Into<String>) {
        let address = address.into();
        let shared = self.shared.clone();
        // Invalidate the previous connection before dialing the new one.
        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        shared.shutdown.store(false, Ordering::SeqCst);
        shared.drop_outgoing();
        shared.fail_pending();
        shared.set_state(ConnectionState::Connecting);
        log::info!("connecting to {address}");
        tokio::spawn(async move {
            supervise(shared, address, generation).await;
        });
    }

    /// Permanently close the connection. The state machine terminates in
    /// `Disconnected`.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.drop_outgoing();
        self.shared.fail_pending();
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Send a request and suspend until its acknowledgment.
    ///
    /// Issued while disconnected, the request is dropped immediately
    /// (`NotConnected`) — callers treat that as a no-op. Acknowledgments
    /// may resolve in any order relative to issue order.
    pub async fn request(&self, body: RequestBody) -> Result<Ack, RequestError> {
        if self.state() != ConnectionState::Connected {
            log::debug!("{} dropped: not connected", body.name());
            return Err(RequestError::NotConnected);
        }
        let outgoing = match self.shared.outgoing.lock().unwrap().clone() {
            Some(tx) => tx,
            None => return Err(RequestError::NotConnected),
        };

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let name = body.name();
        let bytes = Frame::Request { id, body }
            .encode()
            .map_err(|e| RequestError::Codec(e.to_string()))?;

        let (ack_tx, ack_rx) = oneshot::channel();
        self.shared.pending.lock().unwrap().insert(id, ack_tx);

        if outgoing.send(bytes).await.is_err() {
            self.shared.pending.lock().unwrap().remove(&id);
            return Err(RequestError::NotConnected);
        }

        match tokio::time::timeout(self.shared.config.request_timeout, ack_rx).await {
            Ok(Ok(ack)) => {
                log::debug!("{name} acked, success={}", ack.success);
                Ok(ack)
            }
            Ok(Err(_)) => Err(RequestError::ConnectionLost),
            Err(_) => {
                self.shared.pending.lock().unwrap().remove(&id);
                log::debug!("{name} timed out");
                Err(RequestError::TimedOut)
            }
        }
    }
}

impl Authority for SocketClient {
    fn request(
        &self,
        body: RequestBody,
    ) -> impl Future<Output = Result<Ack, RequestError>> + Send {
        SocketClient::request(self, body)
    }
}

/// Connection supervisor: bounded-attempt dial loop, then the connection
/// itself, then back around after a transient loss.
async fn supervise(shared: Arc<Shared>, address: String, generation: u64) {
    loop {
        let mut attempt = 0u32;
        let stream = loop {
            if shared.stale(generation) {
                return;
            }
            match tokio_tungstenite::connect_async(&address).await {
                Ok((stream, _)) => break stream,
                Err(err) => {
                    attempt += 1;
                    log::debug!("connect attempt {attempt} to {address} failed: {err}");
                    if attempt >= shared.config.reconnect_attempts {
                        shared.set_state(ConnectionState::Disconnected);
                        let _ = shared.event_tx.send(ClientEvent::ReconnectFailed).await;
                        return;
                    }
                    shared.set_state(ConnectionState::Reconnecting);
                    tokio::time::sleep(shared.config.reconnect_delay).await;
                }
            }
        };
        if shared.stale(generation) {
            return;
        }

        shared.set_state(ConnectionState::Connected);
        log::info!("connection established to {address}");
        let _ = shared.event_tx.send(ClientEvent::Connected).await;

        run_connection(&shared, stream, generation).await;

        // A newer connect() owns the shared state now; leave it alone.
        if shared.stale(generation) {
            return;
        }
        // The connection is gone; nothing pending can ever be acked.
        shared.drop_outgoing();
        shared.fail_pending();
        log::info!("connection to {address} lost");
        let _ = shared.event_tx.send(ClientEvent::Disconnected).await;
        shared.set_state(ConnectionState::Reconnecting);
        tokio::time::sleep(shared.config.reconnect_delay).await;
    }
}

/// Drive one established connection until it closes or turns stale.
async fn run_connection(
    shared: &Arc<Shared>,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    generation: u64,
) {
    let (mut writer, mut reader) = stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(shared.config.outgoing_capacity);
    *shared.outgoing.lock().unwrap() = Some(out_tx);

    loop {
        if shared.stale(generation) {
            break;
        }
        tokio::select! {
            outbound = out_rx.recv() => match outbound {
                Some(bytes) => {
                    if writer.send(Message::Binary(bytes.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = reader.next() => match inbound {
                Some(Ok(Message::Binary(data))) => {
                    let bytes: Vec<u8> = data.into();
                    handle_frame(shared, &bytes).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    log::debug!("socket error: {err}");
                    break;
                }
            },
        }
    }
    let _ = writer.close().await;
}

async fn handle_frame(shared: &Arc<Shared>, bytes: &[u8]) {
    let frame = match Frame::decode(bytes) {
        Ok(frame) => frame,
        Err(err) => {
            log::warn!("dropping undecodable frame: {err}");
            return;
        }
    };
    match frame {
        Frame::Ack { id, ack } => {
            let sender = shared.pending.lock().unwrap().remove(&id);
            match sender {
                // The caller may have timed out and gone away; that loss
                // is the caller's to absorb.
                Some(tx) => {
                    let _ = tx.send(ack);
                }
                None => log::debug!("ack for unknown request {id}"),
            }
        }
        Frame::Push { event } => {
            log::debug!("push {}", event.name());
            // Marshaled onto the engine pump — push handlers never run
            // concurrently with manager state mutation.
            if shared.event_tx.send(ClientEvent::Push(event)).await.is_err() {
                log::debug!("push dropped: event channel closed");
            }
        }
        Frame::Request { id, .. } => {
            log::warn!("unexpected request frame {id} from server");
        }
    }
}
