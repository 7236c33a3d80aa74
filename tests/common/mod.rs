//! Scriptable in-memory transport shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use slipstream_core::codec::PongFrame;
use slipstream_core::{
    Config, ConnectionInfo, Protocol, RateLimitInfo, Result, SdkError, StreamType, SubmitOptions,
    TransactionResult, TransactionStatus, Transport, TransportContext, TransportEvent,
    TransportRegistry,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Knobs and observations for every mock transport built from it
#[derive(Default)]
pub struct MockControl {
    /// `connect()` never resolves
    pub hang_connect: AtomicBool,
    /// `connect()` fails until cleared
    pub fail_connect: AtomicBool,
    /// `submit_transaction()` fails
    pub fail_submit: AtomicBool,
    /// Added to every handshake
    pub connect_delay_ms: AtomicU64,
    /// Added to every submission
    pub submit_delay_ms: AtomicU64,
    pub server_time: AtomicU64,

    pub connect_attempts: AtomicU32,
    pub submits: AtomicU32,
    /// Subscription set replayed by each successful connect
    pub replays: Mutex<Vec<Vec<StreamType>>>,
    /// Subscribe requests sent while connected
    pub live_subscribes: Mutex<Vec<StreamType>>,

    connected: AtomicBool,
    ctx: Mutex<Option<(Protocol, TransportContext)>>,
}

impl MockControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hanging() -> Arc<Self> {
        let control = Self::new();
        control.hang_connect.store(true, Ordering::SeqCst);
        control
    }

    pub fn failing() -> Arc<Self> {
        let control = Self::new();
        control.fail_connect.store(true, Ordering::SeqCst);
        control
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn last_replay(&self) -> Option<Vec<StreamType>> {
        self.replays.lock().unwrap().last().cloned()
    }

    /// Simulate the server dropping the connection
    pub fn drop_connection(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Some((protocol, ctx)) = self.ctx.lock().unwrap().clone() {
            ctx.emit(TransportEvent::ConnectionLost {
                protocol,
                reason: "connection reset by peer".to_string(),
            });
        }
    }

    /// Push an event as if the server sent it
    pub fn push(&self, event: TransportEvent) {
        if let Some((_, ctx)) = self.ctx.lock().unwrap().clone() {
            ctx.emit(event);
        }
    }
}

pub struct MockTransport {
    protocol: Protocol,
    ctx: TransportContext,
    control: Arc<MockControl>,
}

impl MockTransport {
    pub fn new(protocol: Protocol, ctx: TransportContext, control: Arc<MockControl>) -> Self {
        *control.ctx.lock().unwrap() = Some((protocol, ctx.clone()));
        Self {
            protocol,
            ctx,
            control,
        }
    }

    fn region(&self) -> String {
        self.ctx.config.region.clone().unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<ConnectionInfo> {
        let attempt = self.control.connect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.control.connect_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.control.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.control.fail_connect.load(Ordering::SeqCst) {
            return Err(SdkError::connection("connection refused"));
        }

        self.control
            .replays
            .lock()
            .unwrap()
            .push(self.ctx.subscriptions.snapshot());
        self.control.connected.store(true, Ordering::SeqCst);

        Ok(ConnectionInfo {
            session_id: format!("{}-{}", self.protocol.name(), attempt),
            protocol: self.protocol.name().to_string(),
            region: self.ctx.config.region.clone(),
            server_time: 0,
            features: vec![],
            rate_limit: RateLimitInfo { rps: 100, burst: 200 },
        })
    }

    async fn disconnect(&self) -> Result<()> {
        self.control.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.control.is_connected()
    }

    fn protocol(&self) -> Protocol {
        self.protocol
    }

    async fn submit_transaction(
        &self,
        _transaction: &[u8],
        _options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }
        self.control.submits.fetch_add(1, Ordering::SeqCst);

        let delay = self.control.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.control.fail_submit.load(Ordering::SeqCst) {
            return Err(SdkError::transaction(format!("rejected by {}", self.region())));
        }

        Ok(TransactionResult {
            request_id: "req-0".to_string(),
            transaction_id: self.region(),
            signature: None,
            status: TransactionStatus::Sent,
            slot: None,
            timestamp: 0,
            routing: None,
            error: None,
        })
    }

    async fn subscribe(&self, stream: StreamType) -> Result<()> {
        self.ctx.subscriptions.insert(stream);
        if self.is_connected() {
            self.control.live_subscribes.lock().unwrap().push(stream);
        }
        Ok(())
    }

    async fn unsubscribe(&self, stream: StreamType) -> Result<()> {
        self.ctx.subscriptions.remove(stream);
        Ok(())
    }

    async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }
        Ok(PongFrame {
            seq,
            client_send_time,
            server_time: self.control.server_time.load(Ordering::SeqCst),
        })
    }
}

/// Registry with one mock per protocol
pub fn registry(entries: &[(Protocol, Arc<MockControl>)]) -> TransportRegistry {
    let mut registry = TransportRegistry::empty();
    for (protocol, control) in entries {
        let protocol = *protocol;
        let control = Arc::clone(control);
        registry.register(protocol, move |ctx| {
            Arc::new(MockTransport::new(protocol, ctx, Arc::clone(&control))) as Arc<dyn Transport>
        });
    }
    registry
}

/// Registry whose single protocol picks its mock by the connecting region
pub fn regional_registry(
    protocol: Protocol,
    regions: HashMap<String, Arc<MockControl>>,
) -> TransportRegistry {
    let mut registry = TransportRegistry::empty();
    registry.register(protocol, move |ctx| {
        let region = ctx.config.region.clone().unwrap_or_default();
        let control = regions.get(&region).cloned().unwrap_or_else(MockControl::failing);
        Arc::new(MockTransport::new(protocol, ctx, control)) as Arc<dyn Transport>
    });
    registry
}

pub fn config() -> Config {
    Config::builder()
        .api_key("sk_test_12345678")
        .build()
        .unwrap()
}

/// Receive events until one matches, skipping the rest
pub async fn next_matching<F>(
    events: &mut tokio::sync::broadcast::Receiver<TransportEvent>,
    mut pred: F,
) -> TransportEvent
where
    F: FnMut(&TransportEvent) -> bool,
{
    loop {
        let event = events.recv().await.expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}
