//! Configuration types for the Slipstream SDK

use crate::error::{Result, SdkError};
pub use crate::types::{Protocol, StreamType, WorkerEndpoint};
use std::time::Duration;

/// SDK version reported during the handshake
pub const SDK_VERSION: &str = concat!("rust-sdk-v", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (10 seconds)
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;

/// Protocol timeout defaults
const QUIC_TIMEOUT_MS: u64 = 2_000;
const WEBSOCKET_TIMEOUT_MS: u64 = 3_000;
const HTTP_TIMEOUT_MS: u64 = 5_000;

/// Reconnect defaults
const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Message-transport heartbeat
const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Time sync defaults
const TIME_SYNC_INTERVAL_MS: u64 = 5_000;
const TIME_SYNC_TIMEOUT_MS: u64 = 5_000;
const TIME_SYNC_WINDOW: usize = 10;

/// QUIC transport parameters
const KEEP_ALIVE_INTERVAL_MS: u64 = 5_000;
const IDLE_TIMEOUT_MS: u64 = 30_000;

/// SDK Configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for authentication
    pub api_key: String,

    /// Target region (optional, auto-detect if not set)
    pub region: Option<String>,

    /// Custom endpoint URL (optional, auto-discover if not set)
    pub endpoint: Option<String>,

    /// Discovery service URL
    pub discovery_url: String,

    /// Billing tier (free, standard, pro, enterprise). Default: "pro"
    pub tier: String,

    /// Overall connection timeout used by collaborators (discovery, health checks)
    pub connection_timeout: Duration,

    /// Protocol-specific connect timeouts
    pub protocol_timeouts: ProtocolTimeouts,

    /// Preferred protocol (skips the fallback chain)
    pub preferred_protocol: Option<Protocol>,

    /// Selected worker endpoint (overrides `endpoint`)
    pub selected_worker: Option<WorkerEndpoint>,

    /// Enable leader hints streaming
    pub leader_hints: bool,

    /// Enable tip instruction streaming
    pub stream_tip_instructions: bool,

    /// Enable priority fee streaming
    pub stream_priority_fees: bool,

    /// Enable latest blockhash streaming
    pub stream_latest_blockhash: bool,

    /// Enable latest slot streaming
    pub stream_latest_slot: bool,

    /// Minimum confidence for leader hints forwarded to typed receivers (0-100)
    pub min_confidence: u32,

    /// Reconnection policy for streaming transports
    pub reconnect: ReconnectPolicy,

    /// Heartbeat interval for the message-oriented transport
    pub heartbeat_interval: Duration,

    /// Time synchronization settings
    pub time_sync: TimeSyncConfig,

    /// QUIC keep-alive interval
    pub keep_alive_interval: Duration,

    /// QUIC idle timeout
    pub idle_timeout: Duration,
}

/// Protocol timeout configuration
#[derive(Debug, Clone)]
pub struct ProtocolTimeouts {
    pub quic: Duration,
    pub websocket: Duration,
    pub http: Duration,
}

impl ProtocolTimeouts {
    /// Get the timeout for a protocol
    pub fn for_protocol(&self, protocol: Protocol) -> Duration {
        match protocol {
            Protocol::Quic => self.quic,
            Protocol::WebSocket => self.websocket,
            Protocol::Http => self.http,
        }
    }
}

impl Default for ProtocolTimeouts {
    fn default() -> Self {
        Self {
            quic: Duration::from_millis(QUIC_TIMEOUT_MS),
            websocket: Duration::from_millis(WEBSOCKET_TIMEOUT_MS),
            http: Duration::from_millis(HTTP_TIMEOUT_MS),
        }
    }
}

/// Exponential reconnect backoff
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Reconnect automatically after an unexpected disconnect
    pub enabled: bool,
    /// Delay before the first attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Consecutive attempts before giving up
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): base * 2^(attempt-1), capped
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay.saturating_mul(1u32 << exp);
        delay.min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            base_delay: Duration::from_millis(RECONNECT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(RECONNECT_MAX_DELAY_MS),
            max_attempts: RECONNECT_MAX_ATTEMPTS,
        }
    }
}

/// Time synchronization settings
#[derive(Debug, Clone)]
pub struct TimeSyncConfig {
    /// Run the background ping loop
    pub enabled: bool,
    /// Interval between pings
    pub interval: Duration,
    /// Timeout for a single ping
    pub timeout: Duration,
    /// Number of samples kept in the sliding window
    pub window_size: usize,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(TIME_SYNC_INTERVAL_MS),
            timeout: Duration::from_millis(TIME_SYNC_TIMEOUT_MS),
            window_size: TIME_SYNC_WINDOW,
        }
    }
}

impl Config {
    /// Create a new configuration builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(SdkError::config("api_key is required"));
        }
        if !self.api_key.starts_with("sk_") {
            return Err(SdkError::config("api_key must start with 'sk_'"));
        }
        if self.min_confidence > 100 {
            return Err(SdkError::config("min_confidence must be between 0 and 100"));
        }
        if self.time_sync.window_size == 0 {
            return Err(SdkError::config("time_sync.window_size must be at least 1"));
        }
        if self.reconnect.base_delay > self.reconnect.max_delay {
            return Err(SdkError::config(
                "reconnect.base_delay must not exceed reconnect.max_delay",
            ));
        }
        Ok(())
    }

    /// Streams enabled by the stream toggles, in stable order
    pub fn enabled_streams(&self) -> Vec<StreamType> {
        let mut streams = Vec::new();
        if self.leader_hints {
            streams.push(StreamType::LeaderHints);
        }
        if self.stream_tip_instructions {
            streams.push(StreamType::TipInstructions);
        }
        if self.stream_priority_fees {
            streams.push(StreamType::PriorityFees);
        }
        if self.stream_latest_blockhash {
            streams.push(StreamType::LatestBlockhash);
        }
        if self.stream_latest_slot {
            streams.push(StreamType::LatestSlot);
        }
        streams
    }

    /// Get the endpoint URL with protocol
    pub fn get_endpoint(&self, protocol: Protocol) -> String {
        // 1. Check if we have a resolved worker endpoint
        if let Some(ref worker) = self.selected_worker {
            if let Some(endpoint) = worker.get_endpoint(protocol) {
                return endpoint.to_string();
            }
        }

        // 2. Check for explicit endpoint override
        if let Some(ref endpoint) = self.endpoint {
            return endpoint.clone();
        }

        // 3. Default endpoints based on protocol
        match protocol {
            Protocol::Quic => "quic://localhost:4433".to_string(),
            Protocol::WebSocket => "ws://localhost:9000/ws".to_string(),
            Protocol::Http => "http://localhost:9000".to_string(),
        }
    }

    /// Copy of this configuration pinned to one worker
    pub fn for_worker(&self, worker: &WorkerEndpoint) -> Self {
        let mut config = self.clone();
        config.region = Some(worker.region.clone());
        config.selected_worker = Some(worker.clone());
        config
    }
}

/// Configuration builder for ergonomic config creation
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    api_key: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
    discovery_url: Option<String>,
    tier: Option<String>,
    connection_timeout: Option<Duration>,
    protocol_timeouts: Option<ProtocolTimeouts>,
    preferred_protocol: Option<Protocol>,
    selected_worker: Option<WorkerEndpoint>,
    leader_hints: Option<bool>,
    stream_tip_instructions: Option<bool>,
    stream_priority_fees: Option<bool>,
    stream_latest_blockhash: Option<bool>,
    stream_latest_slot: Option<bool>,
    min_confidence: Option<u32>,
    reconnect: Option<ReconnectPolicy>,
    heartbeat_interval: Option<Duration>,
    time_sync: Option<TimeSyncConfig>,
    keep_alive_interval: Option<Duration>,
    idle_timeout: Option<Duration>,
}

impl ConfigBuilder {
    /// Set the API key (required)
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the target region
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set a custom endpoint URL (overrides discovery)
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set a custom discovery URL
    pub fn discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = Some(url.into());
        self
    }

    /// Set billing tier (free, standard, pro, enterprise)
    pub fn tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    /// Set connection timeout
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Set custom protocol timeouts
    pub fn protocol_timeouts(mut self, timeouts: ProtocolTimeouts) -> Self {
        self.protocol_timeouts = Some(timeouts);
        self
    }

    /// Set preferred protocol (skip fallback chain)
    pub fn preferred_protocol(mut self, protocol: Protocol) -> Self {
        self.preferred_protocol = Some(protocol);
        self
    }

    /// Pin the client to a specific worker
    pub fn selected_worker(mut self, worker: WorkerEndpoint) -> Self {
        self.selected_worker = Some(worker);
        self
    }

    /// Enable/disable leader hints streaming
    pub fn leader_hints(mut self, enabled: bool) -> Self {
        self.leader_hints = Some(enabled);
        self
    }

    /// Enable/disable tip instruction streaming
    pub fn stream_tip_instructions(mut self, enabled: bool) -> Self {
        self.stream_tip_instructions = Some(enabled);
        self
    }

    /// Enable/disable priority fee streaming
    pub fn stream_priority_fees(mut self, enabled: bool) -> Self {
        self.stream_priority_fees = Some(enabled);
        self
    }

    /// Enable/disable latest blockhash streaming
    pub fn stream_latest_blockhash(mut self, enabled: bool) -> Self {
        self.stream_latest_blockhash = Some(enabled);
        self
    }

    /// Enable/disable latest slot streaming
    pub fn stream_latest_slot(mut self, enabled: bool) -> Self {
        self.stream_latest_slot = Some(enabled);
        self
    }

    /// Set minimum confidence threshold for leader hints
    pub fn min_confidence(mut self, confidence: u32) -> Self {
        self.min_confidence = Some(confidence);
        self
    }

    /// Set the reconnect policy
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = Some(policy);
        self
    }

    /// Set the heartbeat interval for the WebSocket transport
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Set time synchronization settings
    pub fn time_sync(mut self, time_sync: TimeSyncConfig) -> Self {
        self.time_sync = Some(time_sync);
        self
    }

    /// Set QUIC keep-alive interval
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = Some(interval);
        self
    }

    /// Set QUIC idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        let config = Config {
            api_key: self.api_key.ok_or_else(|| SdkError::config("api_key is required"))?,
            region: self.region,
            endpoint: self.endpoint,
            discovery_url: self
                .discovery_url
                .unwrap_or_else(|| crate::discovery::DEFAULT_DISCOVERY_URL.to_string()),
            tier: self.tier.unwrap_or_else(|| "pro".to_string()),
            connection_timeout: self
                .connection_timeout
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_CONNECTION_TIMEOUT_MS)),
            protocol_timeouts: self.protocol_timeouts.unwrap_or_default(),
            preferred_protocol: self.preferred_protocol,
            selected_worker: self.selected_worker,
            leader_hints: self.leader_hints.unwrap_or(true),
            stream_tip_instructions: self.stream_tip_instructions.unwrap_or(false),
            stream_priority_fees: self.stream_priority_fees.unwrap_or(false),
            stream_latest_blockhash: self.stream_latest_blockhash.unwrap_or(false),
            stream_latest_slot: self.stream_latest_slot.unwrap_or(false),
            min_confidence: self.min_confidence.unwrap_or(70),
            reconnect: self.reconnect.unwrap_or_default(),
            heartbeat_interval: self
                .heartbeat_interval
                .unwrap_or_else(|| Duration::from_millis(HEARTBEAT_INTERVAL_MS)),
            time_sync: self.time_sync.unwrap_or_default(),
            keep_alive_interval: self
                .keep_alive_interval
                .unwrap_or_else(|| Duration::from_millis(KEEP_ALIVE_INTERVAL_MS)),
            idle_timeout: self
                .idle_timeout
                .unwrap_or_else(|| Duration::from_millis(IDLE_TIMEOUT_MS)),
        };

        config.validate()?;
        Ok(config)
    }
}
