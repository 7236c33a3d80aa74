//! SlipstreamClient - Main SDK entry point
//!
//! # Example
//!
//! ```rust,no_run
//! use slipstream_core::{Config, SlipstreamClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder()
//!         .api_key("sk_test_12345678")
//!         .region("us-west")
//!         .build()?;
//!
//!     let client = SlipstreamClient::connect(config).await?;
//!
//!     // Subscribe to leader hints
//!     let mut hints = client.subscribe_leader_hints().await?;
//!     while let Some(hint) = hints.recv().await {
//!         println!("Leader hint: {}", hint.preferred_region);
//!     }
//!
//!     Ok(())
//! }
//! ```

use crate::config::Config;
use crate::connection::{ConnectionSupervisor, TransportRegistry};
use crate::error::Result;
use crate::events::TransportEvent;
use crate::time_sync::{LatencyStats, PingTarget, TimeSync};
use crate::types::{
    ConnectionInfo, ConnectionState, LatestBlockhash, LatestSlot, LeaderHint,
    PerformanceMetrics, PingResult, PriorityFee, StreamType, SubmitOptions, TipInstruction,
    TransactionResult,
};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Buffer of each typed stream receiver
const STREAM_BUFFER: usize = 256;

#[derive(Debug, Default)]
struct MetricsRecorder {
    metrics: PerformanceMetrics,
    total_latency_ms: f64,
}

impl MetricsRecorder {
    fn record(&mut self, ok: bool, latency_ms: f64) {
        self.metrics.transactions_submitted += 1;
        if ok {
            self.metrics.transactions_accepted += 1;
        } else {
            self.metrics.transactions_failed += 1;
        }
        self.total_latency_ms += latency_ms;
        self.metrics.average_latency_ms =
            self.total_latency_ms / self.metrics.transactions_submitted as f64;
    }
}

/// Slipstream client for transaction submission and streaming
pub struct SlipstreamClient {
    supervisor: Arc<ConnectionSupervisor>,
    time_sync: Arc<TimeSync>,
    metrics: Mutex<MetricsRecorder>,
}

impl SlipstreamClient {
    /// Connect to Slipstream using the provided configuration
    ///
    /// This will attempt to connect using the protocol fallback chain:
    /// QUIC (2s) -> WebSocket (3s) -> HTTP (5s)
    pub async fn connect(config: Config) -> Result<Self> {
        Self::connect_with_registry(config, TransportRegistry::builtin()).await
    }

    /// Connect using a caller-supplied set of transports
    pub async fn connect_with_registry(config: Config, registry: TransportRegistry) -> Result<Self> {
        config.validate()?;

        info!(
            region = ?config.region,
            endpoint = ?config.endpoint,
            "Connecting to Slipstream"
        );

        let streams = config.enabled_streams();
        let time_sync_config = config.time_sync.clone();
        let supervisor = Arc::new(ConnectionSupervisor::with_registry(config, registry));

        // Recorded before connecting so the handshake replays them
        for stream in streams {
            supervisor.subscribe(stream).await?;
        }

        let connection_info = supervisor.connect().await?;

        let time_sync = TimeSync::new(
            Arc::clone(&supervisor) as Arc<dyn PingTarget>,
            time_sync_config.clone(),
        );
        if time_sync_config.enabled {
            time_sync.start();
        }

        info!(
            session_id = %connection_info.session_id,
            protocol = %connection_info.protocol,
            degraded = connection_info.is_degraded(),
            "Connected to Slipstream"
        );

        Ok(Self {
            supervisor,
            time_sync,
            metrics: Mutex::new(MetricsRecorder::default()),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        self.supervisor.config()
    }

    /// The supervisor behind this client
    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    /// Current connection information, if connected
    pub fn connection_info(&self) -> Option<ConnectionInfo> {
        self.supervisor.connection_info()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Check if the client is connected
    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    /// True when running on the request-only fallback (no streams)
    pub fn is_degraded(&self) -> bool {
        self.supervisor.is_degraded()
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) -> Result<()> {
        self.time_sync.stop();
        self.supervisor.disconnect().await
    }

    /// Submit a transaction
    ///
    /// # Arguments
    ///
    /// * `transaction` - The signed transaction bytes
    ///
    /// # Returns
    ///
    /// Transaction result with signature (if successful) and status
    pub async fn submit_transaction(&self, transaction: &[u8]) -> Result<TransactionResult> {
        self.submit_transaction_with_options(transaction, &SubmitOptions::default())
            .await
    }

    /// Submit a transaction with custom options
    pub async fn submit_transaction_with_options(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        debug!(
            tx_size = transaction.len(),
            broadcast_mode = options.broadcast_mode,
            preferred_sender = ?options.preferred_sender,
            "Submitting transaction"
        );

        let started = Instant::now();
        let result = self
            .supervisor
            .submit_transaction(transaction, options)
            .await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(result.is_ok(), elapsed_ms);
        result
    }

    /// Start a stream; its items arrive on [`events`](Self::events)
    pub async fn subscribe(&self, stream: StreamType) -> Result<()> {
        debug!(stream = %stream, "Subscribing");
        self.supervisor.subscribe(stream).await
    }

    pub async fn unsubscribe(&self, stream: StreamType) -> Result<()> {
        debug!(stream = %stream, "Unsubscribing");
        self.supervisor.unsubscribe(stream).await
    }

    /// All connection and stream events
    pub fn events(&self) -> broadcast::Receiver<TransportEvent> {
        self.supervisor.events()
    }

    /// Subscribe to leader hints stream
    ///
    /// Hints below the configured `min_confidence` are not forwarded.
    pub async fn subscribe_leader_hints(&self) -> Result<mpsc::Receiver<LeaderHint>> {
        let min_confidence = self.config().min_confidence;
        self.typed_stream(StreamType::LeaderHints, move |event| match event {
            TransportEvent::LeaderHint(hint) if hint.confidence >= min_confidence => Some(hint),
            _ => None,
        })
        .await
    }

    /// Subscribe to tip instructions stream
    pub async fn subscribe_tip_instructions(&self) -> Result<mpsc::Receiver<TipInstruction>> {
        self.typed_stream(StreamType::TipInstructions, |event| match event {
            TransportEvent::TipInstruction(tip) => Some(tip),
            _ => None,
        })
        .await
    }

    /// Subscribe to priority fees stream
    pub async fn subscribe_priority_fees(&self) -> Result<mpsc::Receiver<PriorityFee>> {
        self.typed_stream(StreamType::PriorityFees, |event| match event {
            TransportEvent::PriorityFee(fee) => Some(fee),
            _ => None,
        })
        .await
    }

    pub async fn subscribe_latest_blockhash(&self) -> Result<mpsc::Receiver<LatestBlockhash>> {
        self.typed_stream(StreamType::LatestBlockhash, |event| match event {
            TransportEvent::LatestBlockhash(hash) => Some(hash),
            _ => None,
        })
        .await
    }

    pub async fn subscribe_latest_slot(&self) -> Result<mpsc::Receiver<LatestSlot>> {
        self.typed_stream(StreamType::LatestSlot, |event| match event {
            TransportEvent::LatestSlot(slot) => Some(slot),
            _ => None,
        })
        .await
    }

    /// Subscribe to `stream` and forward matching events into a bounded channel.
    ///
    /// The forwarder ends when the receiver is dropped or the client disconnects.
    async fn typed_stream<T, F>(&self, stream: StreamType, select: F) -> Result<mpsc::Receiver<T>>
    where
        T: Send + 'static,
        F: Fn(TransportEvent) -> Option<T> + Send + 'static,
    {
        // Listen first so nothing emitted right after the subscribe is missed
        let mut events = self.supervisor.events();
        self.supervisor.subscribe(stream).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = tx.closed() => return,
                    event = events.recv() => event,
                };
                match event {
                    Ok(TransportEvent::Disconnected) | Err(RecvError::Closed) => return,
                    Ok(event) => {
                        if let Some(item) = select(event) {
                            if tx.send(item).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(stream = %stream, skipped, "Typed stream receiver lagged");
                    }
                }
            }
        });

        Ok(rx)
    }

    /// Latency and clock offset over the time-sync window
    pub fn latency(&self) -> Option<LatencyStats> {
        self.time_sync.stats()
    }

    /// Run one time-sync ping now
    pub async fn ping(&self) -> Result<PingResult> {
        self.time_sync.measure_once().await
    }

    /// Submission counters since connect
    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .metrics
            .clone()
    }
}
