//! WebSocket transport implementation using tokio-tungstenite
//!
//! JSON messages with a `type` discriminator over one persistent connection.
//! Used when QUIC is unavailable or blocked.

use super::pending::PendingRequests;
use super::{unix_millis, Transport, TransportContext};
use crate::codec::PongFrame;
use crate::config::{Protocol, SDK_VERSION};
use crate::error::{Result, SdkError};
use crate::events::TransportEvent;
use crate::types::{
    ConnectionInfo, LatestBlockhash, LatestSlot, LeaderHint, PriorityFee, RateLimitInfo,
    RoutingInfo, StreamType, SubmitOptions, TipInstruction, TransactionError, TransactionResult,
    TransactionStatus, TransactionUpdate,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Heartbeat pings use the upper half of the sequence space, time-sync pings the lower
const HEARTBEAT_SEQ_BASE: u32 = 1 << 31;

/// Silence longer than this many heartbeat intervals means the connection is dead
const MISSED_HEARTBEATS: u32 = 2;

/// WebSocket client message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Connect {
        version: String,
        #[serde(rename = "apiKey")]
        api_key: String,
        features: Vec<String>,
        region: Option<String>,
        tier: String,
    },
    Subscribe {
        stream: String,
    },
    Unsubscribe {
        stream: String,
    },
    SubmitTransaction {
        #[serde(rename = "requestId")]
        request_id: String,
        transaction: String, // base64 encoded
        #[serde(rename = "dedupId", skip_serializing_if = "Option::is_none")]
        dedup_id: Option<String>,
        options: WsSubmitOptions,
    },
    Ping {
        seq: u32,
        client_time: u64,
    },
    Pong {
        timestamp: u64,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct WsSubmitOptions {
    broadcast_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preferred_sender: Option<String>,
    max_retries: u32,
    timeout_ms: u64,
}

impl From<&SubmitOptions> for WsSubmitOptions {
    fn from(options: &SubmitOptions) -> Self {
        Self {
            broadcast_mode: options.broadcast_mode,
            preferred_sender: options.preferred_sender.clone(),
            max_retries: options.max_retries,
            timeout_ms: options.timeout_ms,
        }
    }
}

/// WebSocket server message types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ServerMessage {
    Connected {
        #[serde(alias = "sessionId")]
        session_id: String,
        #[serde(default)]
        region: Option<String>,
        #[serde(default, alias = "serverTime")]
        server_time: u64,
        #[serde(default)]
        features: Vec<String>,
        #[serde(default, alias = "rateLimit")]
        rate_limit: Option<RateLimitInfo>,
    },
    Error {
        #[serde(default)]
        code: String,
        message: String,
        #[serde(default, alias = "requestId")]
        request_id: Option<String>,
    },
    LeaderHint(LeaderHint),
    TipInstruction(TipInstruction),
    PriorityFee(PriorityFee),
    LatestBlockhash(LatestBlockhash),
    LatestSlot(LatestSlot),
    TransactionAccepted {
        #[serde(alias = "requestId")]
        request_id: String,
        #[serde(default, alias = "transactionId")]
        transaction_id: String,
    },
    TransactionUpdate {
        #[serde(alias = "requestId")]
        request_id: String,
        #[serde(default, alias = "transactionId")]
        transaction_id: String,
        status: String,
        #[serde(default)]
        signature: Option<String>,
        #[serde(default)]
        slot: Option<u64>,
    },
    TransactionConfirmed {
        #[serde(alias = "requestId")]
        request_id: String,
        #[serde(default, alias = "transactionId")]
        transaction_id: String,
        signature: String,
        slot: u64,
        #[serde(default)]
        routing: Option<RoutingInfo>,
    },
    TransactionFailed {
        #[serde(alias = "requestId")]
        request_id: String,
        #[serde(default, alias = "transactionId")]
        transaction_id: String,
        error: TransactionError,
    },
    Pong {
        seq: u32,
        #[serde(alias = "clientTime")]
        client_time: u64,
        #[serde(alias = "serverTime")]
        server_time: u64,
    },
    Heartbeat {
        #[serde(default)]
        timestamp: Option<u64>,
    },
}

type WsSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

type WsSink = futures_util::stream::SplitSink<WsSocket, Message>;

type WsStream = futures_util::stream::SplitStream<WsSocket>;

/// Where the current socket is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Socket open; waiting for `connected` or still replaying subscriptions
    Handshaking,
    Connected,
    /// Socket dropped; stays here until the next connect
    Lost,
}

/// State shared between the transport handle and its background tasks
struct Shared {
    ctx: TransportContext,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    connected: AtomicBool,
    /// Set by an explicit disconnect so the reader does not report a loss
    closing: AtomicBool,
    info: RwLock<Option<ConnectionInfo>>,
    handshake: Mutex<Option<oneshot::Sender<Result<ConnectionInfo>>>>,
    phase: Mutex<Phase>,
    /// Bumped per socket so tasks of a replaced socket are ignored
    generation: AtomicU64,
    submissions: PendingRequests<String, TransactionResult>,
    pings: PendingRequests<u32, PongFrame>,
    last_seen: Mutex<Instant>,
}

impl Shared {
    async fn send(&self, msg: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(msg)
            .map_err(|e| SdkError::protocol(format!("Failed to serialize message: {}", e)))?;

        let mut sink_guard = self.sink.lock().await;
        let sink = sink_guard.as_mut().ok_or(SdkError::NotConnected)?;

        sink.send(Message::Text(json))
            .await
            .map_err(|e| SdkError::connection(format!("Failed to send message: {}", e)))
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn silence(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
    }

    fn take_handshake(&self) -> Option<oneshot::Sender<Result<ConnectionInfo>>> {
        self.handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn handle(&self, msg: ServerMessage) {
        match msg {
            ServerMessage::Connected {
                session_id,
                region,
                server_time,
                features,
                rate_limit,
            } => {
                let info = ConnectionInfo {
                    session_id,
                    protocol: Protocol::WebSocket.name().to_string(),
                    region: region.or_else(|| self.ctx.config.region.clone()),
                    server_time,
                    features,
                    rate_limit: rate_limit.unwrap_or(RateLimitInfo { rps: 0, burst: 0 }),
                };
                match self.take_handshake() {
                    Some(tx) => {
                        let _ = tx.send(Ok(info));
                    }
                    None => debug!("Ignoring unsolicited connected message"),
                }
            }
            ServerMessage::Error {
                code,
                message,
                request_id,
            } => {
                if let Some(tx) = self.take_handshake() {
                    let _ = tx.send(Err(SdkError::auth(format!(
                        "Connection rejected: {} - {}",
                        code, message
                    ))));
                    return;
                }
                let err = SdkError::transaction(format!("{}: {}", code, message));
                let settled = request_id
                    .map(|rid| self.submissions.settle(&rid, Err(err.clone())))
                    .unwrap_or(false);
                if !settled {
                    warn!(code = %code, message = %message, "Server reported an error");
                    self.ctx
                        .emit(TransportEvent::Error(SdkError::protocol(format!(
                            "{}: {}",
                            code, message
                        ))));
                }
            }
            ServerMessage::LeaderHint(hint) => {
                self.emit_stream(StreamType::LeaderHints, TransportEvent::LeaderHint(hint))
            }
            ServerMessage::TipInstruction(tip) => {
                self.emit_stream(StreamType::TipInstructions, TransportEvent::TipInstruction(tip))
            }
            ServerMessage::PriorityFee(fee) => {
                self.emit_stream(StreamType::PriorityFees, TransportEvent::PriorityFee(fee))
            }
            ServerMessage::LatestBlockhash(hash) => {
                self.emit_stream(StreamType::LatestBlockhash, TransportEvent::LatestBlockhash(hash))
            }
            ServerMessage::LatestSlot(slot) => {
                self.emit_stream(StreamType::LatestSlot, TransportEvent::LatestSlot(slot))
            }
            ServerMessage::TransactionAccepted {
                request_id,
                transaction_id,
            } => {
                self.resolve(TransactionResult {
                    request_id,
                    transaction_id,
                    signature: None,
                    status: TransactionStatus::Processing,
                    slot: None,
                    timestamp: unix_millis(),
                    routing: None,
                    error: None,
                });
            }
            ServerMessage::TransactionUpdate {
                request_id,
                transaction_id,
                status,
                signature,
                slot,
            } => {
                self.ctx.emit(TransportEvent::TransactionUpdate(TransactionUpdate {
                    request_id,
                    transaction_id,
                    status: TransactionStatus::parse(&status),
                    signature,
                    slot,
                    error: None,
                }));
            }
            ServerMessage::TransactionConfirmed {
                request_id,
                transaction_id,
                signature,
                slot,
                routing,
            } => {
                self.resolve(TransactionResult {
                    request_id,
                    transaction_id,
                    signature: Some(signature),
                    status: TransactionStatus::Confirmed,
                    slot: Some(slot),
                    timestamp: unix_millis(),
                    routing,
                    error: None,
                });
            }
            ServerMessage::TransactionFailed {
                request_id,
                transaction_id,
                error,
            } => {
                self.resolve(TransactionResult {
                    request_id,
                    transaction_id,
                    signature: None,
                    status: TransactionStatus::Failed,
                    slot: None,
                    timestamp: unix_millis(),
                    routing: None,
                    error: Some(error),
                });
            }
            ServerMessage::Pong {
                seq,
                client_time,
                server_time,
            } => {
                self.pings.settle(
                    &seq,
                    Ok(PongFrame {
                        seq,
                        client_send_time: client_time,
                        server_time,
                    }),
                );
            }
            ServerMessage::Heartbeat { .. } => {
                let pong = ClientMessage::Pong {
                    timestamp: unix_millis(),
                };
                if let Err(e) = self.send(&pong).await {
                    debug!(error = %e, "Failed to answer heartbeat");
                }
            }
        }
    }

    /// Settle the pending submission, or report a status change if it already settled
    fn resolve(&self, result: TransactionResult) {
        let key = result.request_id.clone();
        let update = TransactionUpdate {
            request_id: result.request_id.clone(),
            transaction_id: result.transaction_id.clone(),
            status: result.status,
            signature: result.signature.clone(),
            slot: result.slot,
            error: result.error.clone(),
        };
        if !self.submissions.settle(&key, Ok(result)) {
            self.ctx.emit(TransportEvent::TransactionUpdate(update));
        }
    }

    fn emit_stream(&self, stream: StreamType, event: TransportEvent) {
        if self.ctx.subscriptions.contains(stream) {
            self.ctx.emit(event);
        }
    }

    /// Socket `generation` went away without a caller-initiated disconnect.
    /// Safe to call more than once per socket.
    fn on_lost(&self, generation: u64, reason: String) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if generation != self.generation.load(Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = self.take_handshake() {
            let _ = tx.send(Err(SdkError::connection(reason.clone())));
        }

        let current = *phase;
        match current {
            Phase::Handshaking => {
                // connect() sees this and fails instead of reporting success
                *phase = Phase::Lost;
                debug!(reason = %reason, "WebSocket lost during handshake");
            }
            Phase::Connected => {
                *phase = Phase::Lost;
                self.connected.store(false, Ordering::SeqCst);
                drop(phase);
                if self.closing.load(Ordering::SeqCst) {
                    return;
                }

                warn!(reason = %reason, "WebSocket connection lost");
                self.submissions
                    .reject_all(SdkError::connection("connection lost"));
                self.pings.reject_all(SdkError::connection("connection lost"));
                self.ctx.emit(TransportEvent::ConnectionLost {
                    protocol: Protocol::WebSocket,
                    reason,
                });
            }
            Phase::Idle | Phase::Lost => {}
        }
    }

    /// Drop the sink if it still belongs to `generation`
    async fn release_sink(&self, generation: u64) {
        let mut guard = self.sink.lock().await;
        if generation == self.generation.load(Ordering::SeqCst) {
            guard.take();
        }
    }
}

/// WebSocket transport implementation
pub struct WebSocketTransport {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport
    pub fn new(ctx: TransportContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx,
                sink: tokio::sync::Mutex::new(None),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
                info: RwLock::new(None),
                handshake: Mutex::new(None),
                phase: Mutex::new(Phase::Idle),
                generation: AtomicU64::new(0),
                submissions: PendingRequests::new(),
                pings: PendingRequests::new(),
                last_seen: Mutex::new(Instant::now()),
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Parse WebSocket endpoint URL
    fn parse_endpoint(url: &str) -> String {
        // Expected format: ws://host:port/ws or wss://host:port/ws
        let url = url.trim_start_matches("websocket://");
        if url.starts_with("ws://") || url.starts_with("wss://") {
            url.to_string()
        } else if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            format!("wss://{}", url)
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    fn abort_tasks(&self) {
        for handle in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            handle.abort();
        }
    }

    /// Start the message receiving loop
    fn spawn_reader(
        shared: Arc<Shared>,
        generation: u64,
        mut stream: WsStream,
        kill: Arc<Notify>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let reason = loop {
                let next = tokio::select! {
                    next = stream.next() => next,
                    _ = kill.notified() => break "heartbeat timeout".to_string(),
                };

                match next {
                    Some(Ok(Message::Text(text))) => {
                        shared.touch();
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(msg) => shared.handle(msg).await,
                            Err(e) => debug!(error = %e, "Dropping unparseable server message"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        shared.touch();
                        let mut sink_guard = shared.sink.lock().await;
                        if let Some(s) = sink_guard.as_mut() {
                            let _ = s.send(Message::Pong(data)).await;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break "closed by server".to_string(),
                    Some(Ok(_)) => shared.touch(),
                    Some(Err(e)) => break format!("receive error: {}", e),
                    None => break "stream ended".to_string(),
                }
            };

            shared.release_sink(generation).await;
            shared.on_lost(generation, reason);
        })
    }

    /// Ping periodically and declare the connection dead after prolonged silence
    fn spawn_heartbeat(
        shared: Arc<Shared>,
        generation: u64,
        interval: Duration,
        kill: Arc<Notify>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            let mut seq = HEARTBEAT_SEQ_BASE;

            loop {
                ticker.tick().await;
                if !shared.connected.load(Ordering::SeqCst) {
                    break;
                }

                if shared.silence() > interval * MISSED_HEARTBEATS {
                    warn!(
                        silence_ms = shared.silence().as_millis() as u64,
                        "No traffic from server, dropping connection"
                    );
                    // Report the loss here; the reader may be stuck and never get to it
                    shared.release_sink(generation).await;
                    shared.on_lost(generation, "heartbeat timeout".to_string());
                    kill.notify_one();
                    break;
                }

                let ping = ClientMessage::Ping {
                    seq,
                    client_time: unix_millis(),
                };
                seq = seq.wrapping_add(1) | HEARTBEAT_SEQ_BASE;
                if let Err(e) = shared.send(&ping).await {
                    debug!(error = %e, "Heartbeat ping failed");
                }
            }
        })
    }

    /// Tear down socket state after a failed handshake
    async fn abandon(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.set_phase(Phase::Idle);
        self.abort_tasks();
        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<ConnectionInfo> {
        if self.is_connected() {
            if let Some(info) = self.shared.info.read().await.clone() {
                return Ok(info);
            }
        }

        let config = Arc::clone(&self.shared.ctx.config);
        let ws_url = Self::parse_endpoint(&config.get_endpoint(Protocol::WebSocket));
        debug!(endpoint = %ws_url, "Connecting via WebSocket");

        self.abort_tasks();
        self.shared.closing.store(false, Ordering::SeqCst);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (ws_stream, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| SdkError::connection(format!("WebSocket connection failed: {}", e)))?;
        let (sink, stream) = ws_stream.split();

        *self.shared.sink.lock().await = Some(sink);
        self.shared.touch();

        let (tx, rx) = oneshot::channel();
        *self
            .shared
            .handshake
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(tx);
        self.shared.set_phase(Phase::Handshaking);

        let kill = Arc::new(Notify::new());
        self.track(Self::spawn_reader(
            Arc::clone(&self.shared),
            generation,
            stream,
            Arc::clone(&kill),
        ));

        let handshake = async {
            self.shared
                .send(&ClientMessage::Connect {
                    version: SDK_VERSION.to_string(),
                    api_key: config.api_key.clone(),
                    features: config
                        .enabled_streams()
                        .iter()
                        .map(|s| s.name().to_string())
                        .collect(),
                    region: config.region.clone(),
                    tier: config.tier.clone(),
                })
                .await?;

            let info = tokio::time::timeout(config.connection_timeout, rx)
                .await
                .map_err(|_| SdkError::Timeout(config.connection_timeout))?
                .map_err(|_| SdkError::connection("Connection closed before response"))??;

            // Replay desired streams before reporting success
            let replayed = self.shared.ctx.subscriptions.snapshot();
            for stream in &replayed {
                self.shared
                    .send(&ClientMessage::Subscribe {
                        stream: stream.name().to_string(),
                    })
                    .await
                    .map_err(|e| SdkError::connection(format!("Subscription replay failed: {}", e)))?;
                debug!(stream = %stream, "Subscription replayed");
            }
            Ok::<_, SdkError>((info, replayed))
        };

        let (info, replayed) = match handshake.await {
            Ok(done) => done,
            Err(e) => {
                self.abandon().await;
                return Err(e);
            }
        };

        // A loss reported while handshaking leaves the phase at Lost
        let promoted = {
            let mut phase = self
                .shared
                .phase
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *phase == Phase::Handshaking {
                *phase = Phase::Connected;
                self.shared.connected.store(true, Ordering::SeqCst);
                true
            } else {
                false
            }
        };
        if !promoted {
            self.abandon().await;
            return Err(SdkError::connection("connection closed during handshake"));
        }
        *self.shared.info.write().await = Some(info.clone());

        // Streams changed while the replay was in flight
        let current = self.shared.ctx.subscriptions.snapshot();
        for stream in current.iter().filter(|s| !replayed.contains(s)) {
            let msg = ClientMessage::Subscribe {
                stream: stream.name().to_string(),
            };
            if let Err(e) = self.shared.send(&msg).await {
                debug!(stream = %stream, error = %e, "Late subscription not sent");
            }
        }
        for stream in replayed.iter().filter(|s| !current.contains(s)) {
            let msg = ClientMessage::Unsubscribe {
                stream: stream.name().to_string(),
            };
            if let Err(e) = self.shared.send(&msg).await {
                debug!(stream = %stream, error = %e, "Late unsubscribe not sent");
            }
        }

        self.track(Self::spawn_heartbeat(
            Arc::clone(&self.shared),
            generation,
            config.heartbeat_interval,
            kill,
        ));

        info!(
            session_id = %info.session_id,
            region = ?info.region,
            "WebSocket transport connected"
        );
        Ok(info)
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.set_phase(Phase::Idle);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.abort_tasks();

        if let Some(mut sink) = self.shared.sink.lock().await.take() {
            let _ = sink.close().await;
        }
        if let Some(tx) = self.shared.take_handshake() {
            let _ = tx.send(Err(SdkError::connection("disconnected")));
        }
        self.shared
            .submissions
            .reject_all(SdkError::connection("disconnected"));
        self.shared.pings.reject_all(SdkError::connection("disconnected"));
        *self.shared.info.write().await = None;

        debug!("WebSocket transport disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn protocol(&self) -> Protocol {
        Protocol::WebSocket
    }

    async fn submit_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }

        let request_id = uuid::Uuid::new_v4().to_string();
        debug!(
            request_id = %request_id,
            tx_size = transaction.len(),
            "Submitting transaction via WebSocket"
        );

        let pending = self.shared.submissions.register(request_id.clone());
        let msg = ClientMessage::SubmitTransaction {
            request_id,
            transaction: BASE64.encode(transaction),
            dedup_id: options.dedup_id.clone(),
            options: options.into(),
        };
        self.shared.send(&msg).await?;

        pending.wait(options.timeout()).await
    }

    async fn subscribe(&self, stream: StreamType) -> Result<()> {
        self.shared.ctx.subscriptions.insert(stream);
        if !self.is_connected() {
            debug!(stream = %stream, "Not connected, subscription deferred");
            return Ok(());
        }
        self.shared
            .send(&ClientMessage::Subscribe {
                stream: stream.name().to_string(),
            })
            .await
    }

    async fn unsubscribe(&self, stream: StreamType) -> Result<()> {
        self.shared.ctx.subscriptions.remove(stream);
        if !self.is_connected() {
            return Ok(());
        }
        self.shared
            .send(&ClientMessage::Unsubscribe {
                stream: stream.name().to_string(),
            })
            .await
    }

    async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }

        let pending = self.shared.pings.register(seq);
        let msg = ClientMessage::Ping {
            seq,
            client_time: client_send_time,
        };
        self.shared.send(&msg).await?;

        pending.wait(self.shared.ctx.config.time_sync.timeout).await
    }
}
