//! Connection management and protocol implementations
//!
//! This module provides the transport abstraction, the registry of compiled-in
//! backends and the supervisor that walks the fallback chain.

pub mod http;
pub mod pending;
#[cfg(feature = "quic")]
pub mod quic;
pub mod supervisor;
pub mod websocket;

use crate::codec::PongFrame;
use crate::config::{Config, Protocol};
use crate::error::{Result, SdkError};
use crate::events::{event_channel, TransportEvent};
use crate::types::{ConnectionInfo, StreamType, SubmitOptions, TransactionResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

pub use supervisor::ConnectionSupervisor;

/// Re-export async_trait for Transport implementors
pub use async_trait::async_trait as transport_trait;

/// Transport abstraction for different protocol backends
///
/// Implementations hold their configuration from construction and use
/// interior mutability, so one instance can be shared behind an `Arc` and
/// reconnected in place.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Handshake with the server. Callable again after a disconnect.
    async fn connect(&self) -> Result<ConnectionInfo>;

    /// Tear down the connection, stop background tasks and reject pending requests
    async fn disconnect(&self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Get the protocol type
    fn protocol(&self) -> Protocol;

    /// Submit a transaction
    async fn submit_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult>;

    /// Record interest in a stream and request it if connected
    async fn subscribe(&self, stream: StreamType) -> Result<()>;

    /// Drop interest in a stream
    async fn unsubscribe(&self, stream: StreamType) -> Result<()>;

    /// Send a timing ping and wait for the server's answer
    async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame>;
}

/// Ordered set of streams the caller wants
///
/// Shared between a supervisor and every transport it creates, so the set
/// survives transport replacement and reconnects.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    streams: RwLock<BTreeSet<StreamType>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the stream was not already present
    pub fn insert(&self, stream: StreamType) -> bool {
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(stream)
    }

    /// Returns true if the stream was present
    pub fn remove(&self, stream: StreamType) -> bool {
        self.streams
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&stream)
    }

    pub fn contains(&self, stream: StreamType) -> bool {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&stream)
    }

    /// Current streams in stable order
    pub fn snapshot(&self) -> Vec<StreamType> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.streams.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a transport shares with the supervisor that created it
#[derive(Clone)]
pub struct TransportContext {
    pub config: Arc<Config>,
    pub subscriptions: Arc<SubscriptionSet>,
    pub events: broadcast::Sender<TransportEvent>,
}

impl TransportContext {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            subscriptions: Arc::new(SubscriptionSet::new()),
            events: event_channel(),
        }
    }

    /// Publish an event; having no listeners is not an error
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

/// Builds a transport bound to a context
pub type TransportFactory = Arc<dyn Fn(TransportContext) -> Arc<dyn Transport> + Send + Sync>;

/// Protocol backends available in this build
#[derive(Clone, Default)]
pub struct TransportRegistry {
    factories: Vec<(Protocol, TransportFactory)>,
}

impl TransportRegistry {
    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every backend compiled into this build
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        #[cfg(feature = "quic")]
        registry.register(Protocol::Quic, |ctx| {
            Arc::new(quic::QuicTransport::new(ctx)) as Arc<dyn Transport>
        });

        registry.register(Protocol::WebSocket, |ctx| {
            Arc::new(websocket::WebSocketTransport::new(ctx)) as Arc<dyn Transport>
        });
        registry.register(Protocol::Http, |ctx| {
            Arc::new(http::HttpTransport::new(ctx)) as Arc<dyn Transport>
        });
        registry
    }

    /// Register (or replace) the factory for a protocol
    pub fn register<F>(&mut self, protocol: Protocol, factory: F) -> &mut Self
    where
        F: Fn(TransportContext) -> Arc<dyn Transport> + Send + Sync + 'static,
    {
        self.factories.retain(|(p, _)| *p != protocol);
        self.factories.push((protocol, Arc::new(factory)));
        self
    }

    pub fn is_registered(&self, protocol: Protocol) -> bool {
        self.factories.iter().any(|(p, _)| *p == protocol)
    }

    /// Registered protocols in fallback priority order
    pub fn fallback_order(&self) -> Vec<Protocol> {
        Protocol::fallback_order()
            .iter()
            .copied()
            .filter(|p| self.is_registered(*p))
            .collect()
    }

    /// Instantiate the backend for `protocol`
    pub fn create(&self, protocol: Protocol, ctx: TransportContext) -> Result<Arc<dyn Transport>> {
        self.factories
            .iter()
            .find(|(p, _)| *p == protocol)
            .map(|(_, factory)| factory(ctx))
            .ok_or_else(|| {
                SdkError::config(format!("{} transport is not supported in this build", protocol))
            })
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("protocols", &self.fallback_order())
            .finish()
    }
}

/// Wall-clock unix milliseconds
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
