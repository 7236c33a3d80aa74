//! QUIC transport implementation using quinn
//!
//! This is the primary transport for low-latency connections. Every frame
//! is built and parsed by [`crate::codec`].

use super::{unix_millis, Transport, TransportContext};
use crate::codec::{
    self, AuthRequest, AuthResponse, PingFrame, PongFrame, ResponseStatus, TransactionResponse,
    PONG_FRAME_LEN,
};
use crate::config::{Config, Protocol, SDK_VERSION};
use crate::error::{Result, SdkError};
use crate::events::TransportEvent;
use crate::types::{
    ConnectionInfo, RateLimitInfo, StreamType, SubmitOptions, TransactionError,
    TransactionResult, TransactionStatus,
};
use async_trait::async_trait;
use quinn::{ClientConfig, Connection, Endpoint, RecvStream};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Largest pushed frame the acceptor will buffer
const MAX_PUSH_FRAME: usize = 4096;

/// A push stream that has not finished by then is abandoned
const PUSH_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest transaction response (fixed part + signature + error text)
const MAX_RESPONSE: usize = 4 + 1 + 1 + 64 + 2 + u16::MAX as usize;

/// Largest auth response
const MAX_AUTH_RESPONSE: usize = 256;

/// State shared with the acceptor task
struct Shared {
    ctx: TransportContext,
    connection: RwLock<Option<Connection>>,
    connected: AtomicBool,
    /// Set by an explicit disconnect so the acceptor does not report a loss
    closing: AtomicBool,
}

/// QUIC transport implementation
pub struct QuicTransport {
    shared: Arc<Shared>,
    endpoint: tokio::sync::Mutex<Option<Endpoint>>,
    info: RwLock<Option<ConnectionInfo>>,
    acceptor: Mutex<Option<JoinHandle<()>>>,
    request_counter: AtomicU32,
}

impl QuicTransport {
    /// Create a new QUIC transport
    pub fn new(ctx: TransportContext) -> Self {
        Self {
            shared: Arc::new(Shared {
                ctx,
                connection: RwLock::new(None),
                connected: AtomicBool::new(false),
                closing: AtomicBool::new(false),
            }),
            endpoint: tokio::sync::Mutex::new(None),
            info: RwLock::new(None),
            acceptor: Mutex::new(None),
            request_counter: AtomicU32::new(0),
        }
    }

    /// Generate a unique request ID
    fn next_request_id(&self) -> u32 {
        self.request_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Build QUIC client configuration with custom TLS
    fn build_client_config(config: &Config) -> Result<ClientConfig> {
        // Relay workers present self-signed certificates
        let mut crypto = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth();
        crypto.alpn_protocols = vec![b"slipstream".to_vec()];

        let mut client_config = ClientConfig::new(Arc::new(crypto));

        let mut transport_config = quinn::TransportConfig::default();
        transport_config.keep_alive_interval(Some(config.keep_alive_interval));
        transport_config.max_idle_timeout(Some(
            quinn::IdleTimeout::try_from(config.idle_timeout)
                .map_err(|e| SdkError::config(format!("Invalid idle timeout: {}", e)))?,
        ));
        client_config.transport_config(Arc::new(transport_config));

        Ok(client_config)
    }

    /// Parse endpoint URL to socket address
    fn parse_endpoint(url: &str) -> Result<(SocketAddr, String)> {
        // Expected format: quic://host:port or just host:port
        let url = url.trim_start_matches("quic://").trim_end_matches('/');

        let (host, port) = url
            .rsplit_once(':')
            .ok_or_else(|| SdkError::config("Invalid QUIC endpoint format, expected host:port"))?;
        let port: u16 = port
            .parse()
            .map_err(|_| SdkError::config("Invalid port number"))?;

        let addr_str = format!("{}:{}", host, port);
        let addr: SocketAddr = addr_str.parse().or_else(|_| {
            use std::net::ToSocketAddrs;
            addr_str
                .to_socket_addrs()
                .map_err(|e| SdkError::connection(format!("DNS resolution failed: {}", e)))?
                .next()
                .ok_or_else(|| SdkError::connection("No addresses found"))
        })?;

        Ok((addr, host.to_string()))
    }

    /// Perform authentication on the connection
    async fn authenticate(connection: &Connection, config: &Config) -> Result<String> {
        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .map_err(|e| SdkError::connection(format!("Failed to open auth stream: {}", e)))?;

        let request = AuthRequest::new(&config.api_key, SDK_VERSION, Some(config.tier.clone()));
        send.write_all(&request.encode())
            .await
            .map_err(|e| SdkError::connection(format!("Failed to send auth: {}", e)))?;

        let mut response_buf = [0u8; MAX_AUTH_RESPONSE];
        let n = recv
            .read(&mut response_buf)
            .await
            .map_err(|e| SdkError::connection(format!("Failed to read auth response: {}", e)))?
            .ok_or_else(|| SdkError::auth("Connection closed during authentication"))?;

        let response = AuthResponse::decode(&response_buf[..n])
            .ok_or_else(|| SdkError::auth("Empty auth response"))?;

        if response.success {
            debug!(message = %response.message, "QUIC authentication successful");
            Ok(response.message)
        } else {
            Err(SdkError::auth(response.message))
        }
    }

    /// Send one subscription request on its own uni-stream
    async fn request_stream(connection: &Connection, stream: StreamType) -> Result<()> {
        let mut send = connection
            .open_uni()
            .await
            .map_err(|e| SdkError::connection(format!("Failed to open subscription stream: {}", e)))?;

        send.write_all(&codec::encode_subscription_request(stream))
            .await
            .map_err(|e| SdkError::connection(format!("Failed to send subscription request: {}", e)))?;

        // STOP_SENDING from the server after it read the byte is harmless
        if let Err(e) = send.finish().await {
            debug!(stream = %stream, error = %e, "Subscription stream finish returned error");
        }
        Ok(())
    }

    async fn current_connection(&self) -> Result<Connection> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }
        self.shared
            .connection
            .read()
            .await
            .as_ref()
            .cloned()
            .ok_or(SdkError::NotConnected)
    }

    /// Accept server-initiated uni-streams until the connection ends.
    ///
    /// Each stream carries one frame and is read on its own task, so a
    /// stream that stalls only delays itself.
    fn spawn_acceptor(shared: Arc<Shared>, connection: Connection) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut reads = JoinSet::new();
            let mut frames: u64 = 0;
            let reason = loop {
                tokio::select! {
                    accepted = connection.accept_uni() => match accepted {
                        Ok(recv) => {
                            reads.spawn(Self::read_push(Arc::clone(&shared), recv));
                        }
                        Err(e) => break e.to_string(),
                    },
                    Some(done) = reads.join_next() => {
                        if let Ok(true) = done {
                            frames += 1;
                        }
                    }
                }
            };
            reads.abort_all();

            let was_connected = shared.connected.swap(false, Ordering::SeqCst);
            if !was_connected || shared.closing.load(Ordering::SeqCst) {
                debug!(frames, "QUIC acceptor stopped");
                return;
            }

            warn!(reason = %reason, frames, "QUIC connection lost");
            shared.ctx.emit(TransportEvent::ConnectionLost {
                protocol: Protocol::Quic,
                reason,
            });
        })
    }

    /// Buffer one push stream, decode it by tag and publish it if the
    /// stream is still wanted. Returns whether an event went out.
    async fn read_push(shared: Arc<Shared>, mut recv: RecvStream) -> bool {
        let data = match tokio::time::timeout(PUSH_READ_TIMEOUT, recv.read_to_end(MAX_PUSH_FRAME)).await {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                debug!(error = %e, "Dropping unreadable push stream");
                return false;
            }
            Err(_) => {
                debug!(timeout_ms = PUSH_READ_TIMEOUT.as_millis() as u64, "Dropping stalled push stream");
                return false;
            }
        };

        match codec::decode_push_frame(&data) {
            Some(frame) if shared.ctx.subscriptions.contains(frame.stream_type()) => {
                shared.ctx.emit(TransportEvent::from(frame));
                true
            }
            Some(frame) => {
                debug!(stream = %frame.stream_type(), "Dropping frame for unsubscribed stream");
                false
            }
            None => {
                debug!(
                    len = data.len(),
                    first_byte = data.first().copied().unwrap_or(0),
                    "Dropping undecodable push frame"
                );
                false
            }
        }
    }

    fn stop_acceptor(&self) {
        if let Some(handle) = self
            .acceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn into_result(request_id: u32, response: TransactionResponse) -> TransactionResult {
        let status = response
            .response_status()
            .map(ResponseStatus::transaction_status)
            .unwrap_or(TransactionStatus::Failed);
        let error = (!response.error_message.is_empty()).then(|| TransactionError {
            code: "QUIC_ERROR".to_string(),
            message: response.error_message.clone(),
            details: None,
        });

        TransactionResult {
            request_id: format!("req-{}", response.request_id),
            transaction_id: format!("tx-{}", request_id),
            signature: response.signature_base58(),
            status,
            slot: None,
            timestamp: unix_millis(),
            routing: None,
            error,
        }
    }
}

#[async_trait]
impl Transport for QuicTransport {
    async fn connect(&self) -> Result<ConnectionInfo> {
        // Already connected: hand back the existing session instead of opening a second one
        if self.is_connected() {
            if let Some(info) = self.info.read().await.clone() {
                debug!(session_id = %info.session_id, "QUIC already connected");
                return Ok(info);
            }
        }

        let config = Arc::clone(&self.shared.ctx.config);
        let endpoint_url = config.get_endpoint(Protocol::Quic);
        debug!(endpoint = %endpoint_url, "Connecting via QUIC");

        self.stop_acceptor();
        self.shared.closing.store(false, Ordering::SeqCst);

        let (server_addr, server_name) = Self::parse_endpoint(&endpoint_url)?;
        let client_config = Self::build_client_config(&config)?;

        let mut endpoint = Endpoint::client(SocketAddr::from(([0, 0, 0, 0], 0)))
            .map_err(|e| SdkError::connection(format!("Failed to create endpoint: {}", e)))?;
        endpoint.set_default_client_config(client_config);

        let connection = endpoint
            .connect(server_addr, &server_name)
            .map_err(|e| SdkError::connection(format!("Failed to initiate connection: {}", e)))?
            .await
            .map_err(|e| SdkError::connection(format!("Connection failed: {}", e)))?;

        debug!(remote = %connection.remote_address(), "QUIC connection established");

        let auth_message = match Self::authenticate(&connection, &config).await {
            Ok(message) => message,
            Err(e) => {
                connection.close(0u32.into(), b"auth_failed");
                return Err(e);
            }
        };

        // Replay desired streams before reporting success
        for stream in self.shared.ctx.subscriptions.snapshot() {
            if let Err(e) = Self::request_stream(&connection, stream).await {
                connection.close(0u32.into(), b"subscribe_failed");
                return Err(e);
            }
            debug!(stream = %stream, "Subscription replayed");
        }

        let session_id = match auth_message.strip_prefix("ok:") {
            Some(id) if !id.is_empty() => format!("quic-{}", id),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        let info = ConnectionInfo {
            session_id,
            protocol: Protocol::Quic.name().to_string(),
            region: config.region.clone(),
            server_time: unix_millis(),
            features: vec!["streaming".to_string(), "bidirectional".to_string()],
            rate_limit: RateLimitInfo { rps: 1000, burst: 2000 },
        };

        *self.shared.connection.write().await = Some(connection.clone());
        *self.endpoint.lock().await = Some(endpoint);
        *self.info.write().await = Some(info.clone());
        self.shared.connected.store(true, Ordering::SeqCst);

        let handle = Self::spawn_acceptor(Arc::clone(&self.shared), connection.clone());
        *self.acceptor.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        info!(
            session_id = %info.session_id,
            remote = %connection.remote_address(),
            "QUIC transport connected"
        );
        Ok(info)
    }

    async fn disconnect(&self) -> Result<()> {
        self.shared.closing.store(true, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.stop_acceptor();

        // Closing the connection fails every open stream, so in-flight
        // submissions and pings resolve with a connection error.
        if let Some(conn) = self.shared.connection.write().await.take() {
            conn.close(0u32.into(), b"client_disconnect");
        }
        *self.info.write().await = None;

        if let Some(endpoint) = self.endpoint.lock().await.take() {
            endpoint.wait_idle().await;
        }

        debug!("QUIC transport disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn protocol(&self) -> Protocol {
        Protocol::Quic
    }

    async fn submit_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        let connection = self.current_connection().await?;
        let request_id = self.next_request_id();

        debug!(
            request_id = request_id,
            tx_size = transaction.len(),
            "Submitting transaction via QUIC"
        );

        // One bi-stream per transaction; the stream itself is the correlation
        let exchange = async {
            let (mut send, mut recv) = connection.open_bi().await.map_err(|e| {
                SdkError::connection(format!("Failed to open transaction stream: {}", e))
            })?;

            send.write_all(&codec::encode_transaction_submit(transaction))
                .await
                .map_err(|e| SdkError::connection(format!("Failed to send transaction: {}", e)))?;
            send.finish()
                .await
                .map_err(|e| SdkError::connection(format!("Failed to finish send: {}", e)))?;

            let data = recv
                .read_to_end(MAX_RESPONSE)
                .await
                .map_err(|e| SdkError::connection(format!("Failed to read response: {}", e)))?;

            TransactionResponse::decode(&data)
                .ok_or_else(|| SdkError::protocol("Malformed transaction response"))
        };

        let response = tokio::time::timeout(options.timeout(), exchange)
            .await
            .map_err(|_| SdkError::Timeout(options.timeout()))??;

        Ok(Self::into_result(request_id, response))
    }

    async fn subscribe(&self, stream: StreamType) -> Result<()> {
        self.shared.ctx.subscriptions.insert(stream);
        if !self.is_connected() {
            debug!(stream = %stream, "Not connected, subscription deferred");
            return Ok(());
        }
        let connection = self.current_connection().await?;
        Self::request_stream(&connection, stream).await
    }

    async fn unsubscribe(&self, stream: StreamType) -> Result<()> {
        // No unsubscribe frame exists; later frames for the stream are discarded
        self.shared.ctx.subscriptions.remove(stream);
        Ok(())
    }

    async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame> {
        let connection = self.current_connection().await?;

        let (mut send, mut recv) = connection
            .open_bi()
            .await
            .map_err(|e| SdkError::connection(format!("Failed to open ping stream: {}", e)))?;

        let frame = PingFrame {
            seq,
            client_send_time,
        };
        send.write_all(&frame.encode())
            .await
            .map_err(|e| SdkError::connection(format!("Failed to send ping: {}", e)))?;
        let _ = send.finish().await;

        let mut response = [0u8; PONG_FRAME_LEN];
        recv.read_exact(&mut response)
            .await
            .map_err(|e| SdkError::connection(format!("Failed to read pong: {}", e)))?;

        PongFrame::decode(&response).ok_or_else(|| SdkError::protocol("Malformed pong frame"))
    }
}

/// Certificate verifier that accepts the relay's self-signed certificates
#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FrameTag, LatestSlotFrame, PriorityFeeFrame};

    fn transport() -> QuicTransport {
        let config = Config::builder().api_key("sk_test_12345678").build().unwrap();
        QuicTransport::new(TransportContext::new(config))
    }

    #[test]
    fn test_quic_transport_new() {
        let transport = transport();
        assert!(!transport.is_connected());
        assert_eq!(transport.protocol(), Protocol::Quic);
    }

    #[test]
    fn test_parse_endpoint() {
        let (addr, host) = QuicTransport::parse_endpoint("quic://127.0.0.1:4433").unwrap();
        assert_eq!(addr.port(), 4433);
        assert_eq!(host, "127.0.0.1");

        assert!(QuicTransport::parse_endpoint("127.0.0.1:4433").is_ok());
        assert!(QuicTransport::parse_endpoint("invalid").is_err());
        assert!(QuicTransport::parse_endpoint("127.0.0.1:notaport").is_err());
    }

    #[test]
    fn test_request_id_generation() {
        let transport = transport();
        assert_eq!(transport.next_request_id(), 0);
        assert_eq!(transport.next_request_id(), 1);
    }

    #[test]
    fn test_response_mapping() {
        let response = TransactionResponse {
            request_id: 9,
            status: ResponseStatus::Duplicate as u8,
            signature: Some([1u8; 64]),
            error_message: String::new(),
        };
        let result = QuicTransport::into_result(3, response);
        assert_eq!(result.status, TransactionStatus::Duplicate);
        assert_eq!(result.request_id, "req-9");
        assert_eq!(result.transaction_id, "tx-3");
        assert!(result.signature.is_some());
        assert!(result.error.is_none());

        let response = TransactionResponse {
            request_id: 10,
            status: 0x7f,
            signature: None,
            error_message: "boom".to_string(),
        };
        let result = QuicTransport::into_result(4, response);
        assert_eq!(result.status, TransactionStatus::Failed);
        assert_eq!(result.error.unwrap().message, "boom");
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let transport = transport();
        assert!(matches!(
            transport.ping(0, 0).await,
            Err(SdkError::NotConnected)
        ));
        assert!(matches!(
            transport
                .submit_transaction(&[1], &SubmitOptions::default())
                .await,
            Err(SdkError::NotConnected)
        ));

        transport.subscribe(StreamType::LatestSlot).await.unwrap();
        assert!(transport.shared.ctx.subscriptions.contains(StreamType::LatestSlot));
    }

    /// In-process relay speaking the wire protocol over a self-signed cert
    struct TestRelay {
        addr: SocketAddr,
        /// Subscription request bytes received on uni-streams
        requested: Arc<Mutex<Vec<u8>>>,
        /// Server side of the latest client connection
        client: Arc<Mutex<Option<Connection>>>,
        /// Hold submit streams open without answering
        stall_submits: Arc<AtomicBool>,
        _endpoint: Endpoint,
    }

    fn server_config() -> quinn::ServerConfig {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let chain = vec![rustls::Certificate(cert.cert.der().to_vec())];
        let key = rustls::PrivateKey(cert.key_pair.serialize_der());
        let mut crypto = rustls::ServerConfig::builder()
            .with_safe_defaults()
            .with_no_client_auth()
            .with_single_cert(chain, key)
            .unwrap();
        crypto.alpn_protocols = vec![b"slipstream".to_vec()];
        quinn::ServerConfig::with_crypto(Arc::new(crypto))
    }

    impl TestRelay {
        async fn start(accept_auth: bool) -> Self {
            let endpoint =
                Endpoint::server(server_config(), "127.0.0.1:0".parse().unwrap()).unwrap();
            let addr = endpoint.local_addr().unwrap();
            let requested = Arc::new(Mutex::new(Vec::new()));
            let client = Arc::new(Mutex::new(None));
            let stall_submits = Arc::new(AtomicBool::new(false));

            let (server, requested2, client2, stall) = (
                endpoint.clone(),
                requested.clone(),
                client.clone(),
                stall_submits.clone(),
            );
            tokio::spawn(async move {
                while let Some(connecting) = server.accept().await {
                    let Ok(connection) = connecting.await else {
                        continue;
                    };
                    *client2.lock().unwrap() = Some(connection.clone());
                    tokio::spawn(Self::serve(
                        connection,
                        accept_auth,
                        requested2.clone(),
                        stall.clone(),
                    ));
                }
            });

            Self {
                addr,
                requested,
                client,
                stall_submits,
                _endpoint: endpoint,
            }
        }

        async fn serve(
            connection: Connection,
            accept_auth: bool,
            requested: Arc<Mutex<Vec<u8>>>,
            stall: Arc<AtomicBool>,
        ) {
            let Ok((mut send, mut recv)) = connection.accept_bi().await else {
                return;
            };
            let mut buf = [0u8; 512];
            let n = recv.read(&mut buf).await.unwrap().unwrap_or(0);
            assert!(AuthRequest::decode(&buf[..n]).is_some());
            let response = if accept_auth {
                AuthResponse {
                    success: true,
                    message: "ok:abc".to_string(),
                }
            } else {
                AuthResponse {
                    success: false,
                    message: "invalid api key".to_string(),
                }
            };
            let _ = send.write_all(&response.encode()).await;
            let _ = send.finish().await;
            if !accept_auth {
                return;
            }

            let uni = connection.clone();
            tokio::spawn(async move {
                while let Ok(mut recv) = uni.accept_uni().await {
                    if let Ok(data) = recv.read_to_end(16).await {
                        requested.lock().unwrap().extend_from_slice(&data);
                    }
                }
            });

            while let Ok((mut send, mut recv)) = connection.accept_bi().await {
                let stall = stall.clone();
                tokio::spawn(async move {
                    let Ok(data) = recv.read_to_end(MAX_RESPONSE).await else {
                        return;
                    };
                    let reply = match FrameTag::from_byte(data[0]) {
                        Some(FrameTag::TransactionSubmit) => {
                            if stall.load(Ordering::SeqCst) {
                                std::future::pending::<()>().await;
                            }
                            TransactionResponse {
                                request_id: 77,
                                status: ResponseStatus::Accepted as u8,
                                signature: Some([7u8; 64]),
                                error_message: String::new(),
                            }
                            .encode()
                        }
                        Some(FrameTag::Ping) => {
                            let ping = PingFrame::decode(&data).unwrap();
                            PongFrame {
                                seq: ping.seq,
                                client_send_time: ping.client_send_time,
                                server_time: 1_700_000_000_500,
                            }
                            .encode()
                            .to_vec()
                        }
                        _ => return,
                    };
                    let _ = send.write_all(&reply).await;
                    let _ = send.finish().await;
                });
            }
        }

        fn config(&self) -> Config {
            Config::builder()
                .api_key("sk_test_12345678")
                .endpoint(format!("quic://{}", self.addr))
                .build()
                .unwrap()
        }

        fn server_side(&self) -> Connection {
            self.client.lock().unwrap().clone().unwrap()
        }

        /// Push one frame on a fresh uni-stream
        async fn push(&self, frame: &[u8]) {
            let mut send = self.server_side().open_uni().await.unwrap();
            send.write_all(frame).await.unwrap();
            send.finish().await.unwrap();
        }
    }

    async fn next_event(
        events: &mut tokio::sync::broadcast::Receiver<TransportEvent>,
    ) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("no event")
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejected_auth_fails_connect() {
        let relay = TestRelay::start(false).await;
        let transport = QuicTransport::new(TransportContext::new(relay.config()));

        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, SdkError::Auth(ref msg) if msg.contains("invalid api key")), "{:?}", err);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_submit_and_ping_over_bi_streams() {
        let relay = TestRelay::start(true).await;
        let transport = QuicTransport::new(TransportContext::new(relay.config()));

        let info = transport.connect().await.unwrap();
        assert_eq!(info.session_id, "quic-abc");
        assert_eq!(info.protocol, "quic");

        let result = transport
            .submit_transaction(&[1, 2, 3], &SubmitOptions::default())
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Sent);
        assert_eq!(result.request_id, "req-77");
        assert_eq!(result.signature, Some(codec::encode_base58(&[7u8; 64])));

        let pong = transport.ping(5, 1_000).await.unwrap();
        assert_eq!(pong.seq, 5);
        assert_eq!(pong.client_send_time, 1_000);
        assert_eq!(pong.server_time, 1_700_000_000_500);

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_unanswered_submit_times_out() {
        let relay = TestRelay::start(true).await;
        relay.stall_submits.store(true, Ordering::SeqCst);
        let transport = QuicTransport::new(TransportContext::new(relay.config()));
        transport.connect().await.unwrap();

        let options = SubmitOptions {
            timeout_ms: 200,
            ..SubmitOptions::default()
        };
        let err = transport
            .submit_transaction(&[1, 2, 3], &options)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Timeout(_)), "{:?}", err);

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_acceptor_publishes_only_wanted_frames() {
        let relay = TestRelay::start(true).await;
        let transport = QuicTransport::new(TransportContext::new(relay.config()));
        let mut events = transport.shared.ctx.events.subscribe();

        transport.subscribe(StreamType::LatestSlot).await.unwrap();
        transport.connect().await.unwrap();
        let wanted = codec::encode_subscription_request(StreamType::LatestSlot)[0];
        for _ in 0..200 {
            if relay.requested.lock().unwrap().contains(&wanted) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(*relay.requested.lock().unwrap(), vec![wanted]);

        // Never finished, must not hold up the frames behind it
        let mut stalled = relay.server_side().open_uni().await.unwrap();
        stalled.write_all(&[FrameTag::LatestSlot as u8, 0, 0]).await.unwrap();

        let fee = PriorityFeeFrame {
            micro_lamports_per_cu: 5_000,
            percentile: 50,
            sample_count: 10,
            timestamp: 1,
        };
        relay.push(&fee.encode()).await;
        relay.push(&[0x7e, 1, 2, 3]).await;
        relay
            .push(&LatestSlotFrame { slot: 99, timestamp: 2 }.encode())
            .await;

        match next_event(&mut events).await {
            TransportEvent::LatestSlot(slot) => assert_eq!(slot.slot, 99),
            other => panic!("unexpected event {:?}", other),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
        assert!(transport.is_connected());

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_reports_connection_lost() {
        let relay = TestRelay::start(true).await;
        let transport = QuicTransport::new(TransportContext::new(relay.config()));
        let mut events = transport.shared.ctx.events.subscribe();
        transport.connect().await.unwrap();

        relay.server_side().close(0u32.into(), b"shutdown");

        match next_event(&mut events).await {
            TransportEvent::ConnectionLost { protocol, .. } => assert_eq!(protocol, Protocol::Quic),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.ping(1, 0).await,
            Err(SdkError::NotConnected)
        ));
    }
}
