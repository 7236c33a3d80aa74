//! Connection supervisor
//!
//! Walks the fallback chain with a per-protocol timeout, keeps the active
//! transport, and runs the reconnect loop when a streaming transport drops.

use super::{SubscriptionSet, Transport, TransportContext, TransportRegistry};
use crate::codec::PongFrame;
use crate::config::{Config, Protocol};
use crate::error::{Result, SdkError};
use crate::events::TransportEvent;
use crate::types::{
    ConnectionInfo, ConnectionState, StreamType, SubmitOptions, TransactionResult,
};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Inner {
    ctx: TransportContext,
    registry: TransportRegistry,
    active: RwLock<Option<Arc<dyn Transport>>>,
    info: RwLock<Option<ConnectionInfo>>,
    state: RwLock<ConnectionState>,
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> Option<Arc<dyn Transport>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_info(&self, info: Option<ConnectionInfo>) {
        *self.info.write().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Race one protocol's handshake against its configured timeout
    async fn attempt(&self, transport: &Arc<dyn Transport>) -> Result<ConnectionInfo> {
        let protocol = transport.protocol();
        let timeout = self.ctx.config.protocol_timeouts.for_protocol(protocol);
        debug!(protocol = ?protocol, timeout_ms = timeout.as_millis() as u64, "Attempting protocol");

        match tokio::time::timeout(timeout, transport.connect()).await {
            Ok(Ok(info)) => Ok(info),
            Ok(Err(e)) => {
                let _ = transport.disconnect().await;
                Err(e)
            }
            Err(_) => {
                // The abandoned handshake may have left half-open state behind
                let _ = transport.disconnect().await;
                Err(SdkError::Timeout(timeout))
            }
        }
    }

    /// Reconnect the same transport with exponential backoff.
    ///
    /// Returns false once the policy is exhausted.
    async fn reconnect(&self, transport: &Arc<dyn Transport>) -> bool {
        let policy = self.ctx.config.reconnect.clone();
        self.set_state(ConnectionState::Reconnecting);

        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_for_attempt(attempt);
            info!(
                protocol = ?transport.protocol(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.ctx.emit(TransportEvent::Reconnecting { attempt, delay });
            tokio::time::sleep(delay).await;

            match self.attempt(transport).await {
                Ok(info) => {
                    info!(
                        protocol = ?transport.protocol(),
                        attempt,
                        session_id = %info.session_id,
                        resubscribed = self.ctx.subscriptions.len(),
                        "Reconnected"
                    );
                    self.set_info(Some(info.clone()));
                    self.set_state(ConnectionState::Connected);
                    self.ctx.emit(TransportEvent::Reconnected(info));
                    return true;
                }
                Err(e) => {
                    warn!(protocol = ?transport.protocol(), attempt, error = %e, "Reconnect attempt failed");
                }
            }
        }

        error!(
            attempts = policy.max_attempts,
            "Reconnect attempts exhausted, giving up"
        );
        self.set_info(None);
        self.set_state(ConnectionState::Disconnected);
        self.ctx.emit(TransportEvent::Error(SdkError::AllProtocolsFailed));
        false
    }

    /// Watch for loss of the active transport until closed or exhausted
    async fn monitor(self: Arc<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        loop {
            let lost = match events.recv().await {
                Ok(TransportEvent::ConnectionLost { protocol, reason }) => (protocol, reason),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Supervisor monitor lagged behind event channel");
                    continue;
                }
                Err(RecvError::Closed) => return,
            };

            let (protocol, reason) = lost;
            let transport = match self.active() {
                Some(t) if t.protocol() == protocol => t,
                _ => continue,
            };
            if self.state() == ConnectionState::Closed {
                return;
            }

            warn!(protocol = ?protocol, reason = %reason, "Active transport lost");

            if !self.ctx.config.reconnect.enabled {
                self.set_info(None);
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            if !self.reconnect(&transport).await {
                return;
            }
        }
    }
}

/// Owns the active transport for one endpoint
pub struct ConnectionSupervisor {
    inner: Arc<Inner>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    /// Held for the whole of connect() so concurrent callers share one handshake
    connect_lock: tokio::sync::Mutex<()>,
}

impl ConnectionSupervisor {
    /// Supervisor over every transport compiled into this build
    pub fn new(config: Config) -> Self {
        Self::with_registry(config, TransportRegistry::builtin())
    }

    /// Supervisor over a caller-supplied set of transports
    pub fn with_registry(config: Config, registry: TransportRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: TransportContext::new(config),
                registry,
                active: RwLock::new(None),
                info: RwLock::new(None),
                state: RwLock::new(ConnectionState::Disconnected),
            }),
            monitor: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.ctx.config
    }

    /// Connect through the fallback chain.
    ///
    /// With a preferred protocol only that protocol is tried. Otherwise each
    /// registered protocol is tried in priority order and the first to finish
    /// its handshake within its timeout becomes active.
    pub async fn connect(&self) -> Result<ConnectionInfo> {
        self.inner.ctx.config.validate()?;
        let _guard = self.connect_lock.lock().await;

        if let Some(info) = self.connection_info() {
            if self.is_connected() {
                return Ok(info);
            }
        }

        // Subscribe before any handshake so an early loss is not missed
        let events = self.inner.ctx.events.subscribe();
        self.stop_monitor();
        self.inner.set_state(ConnectionState::Connecting);

        let stale = self
            .inner
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(transport) = stale {
            let _ = transport.disconnect().await;
        }

        let candidates = match self.inner.ctx.config.preferred_protocol {
            Some(preferred) => vec![preferred],
            None => self.inner.registry.fallback_order(),
        };

        let mut last_error = None;
        for protocol in &candidates {
            let transport = match self.inner.registry.create(*protocol, self.inner.ctx.clone()) {
                Ok(t) => t,
                Err(e) => {
                    warn!(protocol = ?protocol, error = %e, "Protocol unavailable, trying next");
                    last_error = Some(e);
                    continue;
                }
            };

            match self.inner.attempt(&transport).await {
                Ok(info) => {
                    info!(
                        protocol = ?protocol,
                        session_id = %info.session_id,
                        degraded = info.is_degraded(),
                        "Connected successfully"
                    );
                    *self
                        .inner
                        .active
                        .write()
                        .unwrap_or_else(PoisonError::into_inner) = Some(transport);
                    self.inner.set_info(Some(info.clone()));
                    self.inner.set_state(ConnectionState::Connected);

                    let handle = tokio::spawn(Arc::clone(&self.inner).monitor(events));
                    *self.monitor.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

                    self.inner.ctx.emit(TransportEvent::Connected(info.clone()));
                    return Ok(info);
                }
                Err(e) => {
                    warn!(protocol = ?protocol, error = %e, "Protocol failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        self.inner.set_state(ConnectionState::Disconnected);
        match last_error {
            Some(e) if candidates.len() == 1 => Err(e),
            _ => Err(SdkError::AllProtocolsFailed),
        }
    }

    /// Stop reconnecting, close the active transport and reject its pending requests
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.set_state(ConnectionState::Closed);
        self.stop_monitor();

        let active = self
            .inner
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.set_info(None);

        if let Some(transport) = active {
            transport.disconnect().await?;
            info!(protocol = ?transport.protocol(), "Disconnected");
        }
        self.inner.ctx.emit(TransportEvent::Disconnected);
        Ok(())
    }

    fn stop_monitor(&self) {
        if let Some(handle) = self
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.inner.active().ok_or(SdkError::NotConnected)
    }

    pub async fn submit_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        self.transport()?
            .submit_transaction(transaction, options)
            .await
    }

    /// Record interest in a stream; sent now if a transport is active,
    /// otherwise replayed on the next connect
    pub async fn subscribe(&self, stream: StreamType) -> Result<()> {
        match self.inner.active() {
            Some(transport) => transport.subscribe(stream).await,
            None => {
                self.inner.ctx.subscriptions.insert(stream);
                Ok(())
            }
        }
    }

    pub async fn unsubscribe(&self, stream: StreamType) -> Result<()> {
        match self.inner.active() {
            Some(transport) => transport.unsubscribe(stream).await,
            None => {
                self.inner.ctx.subscriptions.remove(stream);
                Ok(())
            }
        }
    }

    pub async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame> {
        self.transport()?.ping(seq, client_send_time).await
    }

    /// New receiver on the event channel
    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.ctx.events.subscribe()
    }

    pub fn subscriptions(&self) -> &Arc<SubscriptionSet> {
        &self.inner.ctx.subscriptions
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .active()
            .map(|t| t.is_connected())
            .unwrap_or(false)
    }

    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.inner
            .info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Protocol of the active transport
    pub fn protocol(&self) -> Option<Protocol> {
        self.inner.active().map(|t| t.protocol())
    }

    /// Connected over the request-only fallback, so no streams will arrive
    pub fn is_degraded(&self) -> bool {
        self.connection_info()
            .map(|info| info.is_degraded())
            .unwrap_or(false)
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.stop_monitor();
        let active = self
            .inner
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let (Some(transport), Ok(handle)) = (active, tokio::runtime::Handle::try_current()) {
            handle.spawn(async move {
                let _ = transport.disconnect().await;
            });
        }
    }
}

impl std::fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("state", &self.state())
            .field("protocol", &self.protocol())
            .field("registry", &self.inner.registry)
            .finish()
    }
}
