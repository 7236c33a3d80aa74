//! Message types for the Slipstream SDK
//!
//! These types mirror the server-side types for stream messages and transaction results.

use serde::{Deserialize, Serialize};

/// Lamports per SOL
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Approximate slot duration used to turn slot counts into wall-clock windows
pub const SLOT_DURATION_MS: u64 = 400;

/// Leader region hint for routing decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderHint {
    /// Current timestamp (unix millis)
    pub timestamp: u64,
    /// Current slot (0 when the feed only reports slots remaining)
    pub slot: u64,
    /// Slot when this hint expires
    pub expires_at_slot: u64,
    /// Preferred region ID
    pub preferred_region: String,
    /// Backup region IDs
    #[serde(default)]
    pub backup_regions: Vec<String>,
    /// Confidence score (0-100)
    pub confidence: u32,
    /// Leader validator pubkey (optional)
    pub leader_pubkey: Option<String>,
    /// Additional metadata
    #[serde(default)]
    pub metadata: LeaderHintMetadata,
}

impl LeaderHint {
    /// Number of slots this hint remains valid for
    pub fn slots_remaining(&self) -> u64 {
        self.expires_at_slot.saturating_sub(self.slot)
    }

    /// Validity window in milliseconds
    pub fn valid_for_ms(&self) -> u64 {
        self.slots_remaining() * SLOT_DURATION_MS
    }
}

/// Leader hint metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderHintMetadata {
    /// TPU round-trip time in milliseconds (from preferred region)
    #[serde(default)]
    pub tpu_rtt_ms: u32,
    /// Region score
    #[serde(default)]
    pub region_score: f64,
}

/// Tip instruction for transaction building
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipInstruction {
    /// Timestamp (unix millis)
    pub timestamp: u64,
    /// Sender ID
    pub sender: String,
    /// Human-readable sender name
    pub sender_name: String,
    /// Tip wallet address (base58)
    pub tip_wallet_address: String,
    /// Tip amount in lamports
    pub tip_amount_lamports: u64,
    /// Tip tier name
    pub tip_tier: String,
    /// Expected latency in milliseconds
    pub expected_latency_ms: u32,
    /// Confidence score (0-100)
    #[serde(default)]
    pub confidence: u32,
    /// Slot until which this tip is valid
    #[serde(default)]
    pub valid_until_slot: u64,
    /// Alternative sender options
    #[serde(default)]
    pub alternative_senders: Vec<AlternativeSender>,
}

impl TipInstruction {
    /// Tip amount in SOL, for display only
    pub fn tip_amount_sol(&self) -> f64 {
        self.tip_amount_lamports as f64 / LAMPORTS_PER_SOL as f64
    }
}

/// Alternative sender option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeSender {
    /// Sender ID
    pub sender: String,
    /// Tip amount in lamports
    pub tip_amount_lamports: u64,
    /// Confidence score
    pub confidence: u32,
}

/// Priority fee recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityFee {
    /// Timestamp (unix millis)
    pub timestamp: u64,
    /// Fee speed tier (low, medium, high)
    pub speed: String,
    /// Compute unit price in micro-lamports
    pub compute_unit_price: u64,
    /// Compute unit limit
    pub compute_unit_limit: u32,
    /// Percentile of recent fees this price sits at
    #[serde(default)]
    pub percentile: u8,
    /// Number of samples behind the recommendation
    #[serde(default)]
    pub sample_count: u32,
    /// Estimated landing probability (0-100)
    pub landing_probability: u32,
    /// Network congestion level
    pub network_congestion: String,
}

impl PriorityFee {
    /// Estimated total priority fee in lamports for `compute_unit_limit`
    pub fn estimated_cost_lamports(&self) -> u64 {
        self.compute_unit_price
            .saturating_mul(self.compute_unit_limit as u64)
            / 1_000_000
    }
}

/// Latest blockhash update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestBlockhash {
    /// Blockhash (base58)
    pub blockhash: String,
    /// Last block height at which the blockhash is valid
    pub last_valid_block_height: u64,
    /// Timestamp (unix millis)
    pub timestamp: u64,
}

/// Latest slot update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestSlot {
    /// Current slot
    pub slot: u64,
    /// Timestamp (unix millis)
    pub timestamp: u64,
}

/// Transaction submission result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    /// Request ID from submission
    pub request_id: String,
    /// Internal transaction ID
    pub transaction_id: String,
    /// Transaction signature (base58)
    pub signature: Option<String>,
    /// Current status
    pub status: TransactionStatus,
    /// Slot where transaction landed (if confirmed)
    pub slot: Option<u64>,
    /// Timestamp
    pub timestamp: u64,
    /// Routing details (if available)
    pub routing: Option<RoutingInfo>,
    /// Error information (if failed)
    pub error: Option<TransactionError>,
}

/// Status change for a transaction after its submission call already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    /// Request ID from submission
    pub request_id: String,
    /// Internal transaction ID
    pub transaction_id: String,
    /// New status
    pub status: TransactionStatus,
    /// Signature, once known
    pub signature: Option<String>,
    /// Landing slot, once confirmed
    pub slot: Option<u64>,
    /// Error, when the update is a failure
    pub error: Option<TransactionError>,
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Transaction accepted for processing
    Pending,
    /// Transaction being processed
    Processing,
    /// Transaction sent to network
    Sent,
    /// Transaction confirmed on-chain
    Confirmed,
    /// Transaction failed
    Failed,
    /// Duplicate transaction detected
    Duplicate,
    /// Rate limited
    RateLimited,
    /// Insufficient token balance
    InsufficientTokens,
}

impl TransactionStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Confirmed
                | TransactionStatus::Failed
                | TransactionStatus::Duplicate
                | TransactionStatus::RateLimited
                | TransactionStatus::InsufficientTokens
        )
    }

    /// Check if this is a success status
    pub fn is_success(&self) -> bool {
        matches!(self, TransactionStatus::Confirmed)
    }

    /// Parse a status string as sent by the server (case-insensitive)
    pub fn parse(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "pending" => TransactionStatus::Pending,
            "processing" => TransactionStatus::Processing,
            "sent" => TransactionStatus::Sent,
            "confirmed" => TransactionStatus::Confirmed,
            "failed" => TransactionStatus::Failed,
            "duplicate" => TransactionStatus::Duplicate,
            "rate_limited" | "ratelimited" => TransactionStatus::RateLimited,
            "insufficient_tokens" | "insufficienttokens" => TransactionStatus::InsufficientTokens,
            _ => TransactionStatus::Pending,
        }
    }
}

/// Routing information for a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingInfo {
    /// Region used
    pub region: String,
    /// Sender used
    pub sender: String,
    /// Time spent in routing (ms)
    pub routing_latency_ms: u32,
    /// Time spent in sender (ms)
    pub sender_latency_ms: u32,
    /// Total latency (ms)
    pub total_latency_ms: u32,
}

/// Transaction error details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionError {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
    /// Additional details
    pub details: Option<serde_json::Value>,
}

/// Transaction submission options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOptions {
    /// Broadcast to several regions at once (fan-out)
    #[serde(default)]
    pub broadcast_mode: bool,
    /// Preferred sender ID
    #[serde(default)]
    pub preferred_sender: Option<String>,
    /// Maximum retries (forwarded to the server)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Deduplication ID (optional)
    #[serde(default)]
    pub dedup_id: Option<String>,
}

impl SubmitOptions {
    /// Submission timeout as a `Duration`
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            broadcast_mode: false,
            preferred_sender: None,
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            dedup_id: None,
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Connection information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    /// Session ID
    pub session_id: String,
    /// Connected protocol
    pub protocol: String,
    /// Connected region
    pub region: Option<String>,
    /// Server time at connection
    pub server_time: u64,
    /// Available features
    pub features: Vec<String>,
    /// Rate limit information
    pub rate_limit: RateLimitInfo,
}

impl ConnectionInfo {
    /// True when connected through the request-only fallback (no push streams)
    pub fn is_degraded(&self) -> bool {
        self.protocol == Protocol::Http.name()
    }
}

/// Rate limit information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Requests per second
    pub rps: u32,
    /// Burst size
    pub burst: u32,
}

/// Result of a single time-sync ping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResult {
    /// Ping sequence number
    pub seq: u32,
    /// Round-trip time in milliseconds
    pub rtt_ms: u64,
    /// Estimated server clock minus local clock, in milliseconds
    pub clock_offset_ms: i64,
    /// Server time when it answered (unix millis)
    pub server_time: u64,
}

/// Available protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// QUIC - primary low-latency binary protocol
    Quic,
    /// WebSocket - message-oriented streaming fallback
    WebSocket,
    /// HTTP - request/response only, no push streams
    Http,
}

impl Protocol {
    /// Get all protocols in fallback order
    pub fn fallback_order() -> &'static [Protocol] {
        &[Protocol::Quic, Protocol::WebSocket, Protocol::Http]
    }

    /// Wire/reporting name of the protocol
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Quic => "quic",
            Protocol::WebSocket => "websocket",
            Protocol::Http => "http",
        }
    }

    /// Whether the protocol can carry server-pushed streams
    pub fn supports_streaming(&self) -> bool {
        !matches!(self, Protocol::Http)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Push streams a client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    LeaderHints,
    TipInstructions,
    PriorityFees,
    LatestBlockhash,
    LatestSlot,
}

impl StreamType {
    /// All subscribable streams
    pub const ALL: [StreamType; 5] = [
        StreamType::LeaderHints,
        StreamType::TipInstructions,
        StreamType::PriorityFees,
        StreamType::LatestBlockhash,
        StreamType::LatestSlot,
    ];

    /// Stream name used by the message-oriented protocol
    pub fn name(&self) -> &'static str {
        match self {
            StreamType::LeaderHints => "leader_hints",
            StreamType::TipInstructions => "tip_instructions",
            StreamType::PriorityFees => "priority_fees",
            StreamType::LatestBlockhash => "latest_blockhash",
            StreamType::LatestSlot => "latest_slot",
        }
    }

    /// Parse a stream name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl std::fmt::Display for StreamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Connection state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not connected, may reconnect
    Disconnected,
    /// Attempting to connect
    Connecting,
    /// Successfully connected
    Connected,
    /// Connection lost, backoff loop running
    Reconnecting,
    /// Closed by the caller; no further reconnects
    Closed,
}

/// Worker endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerEndpoint {
    /// Unique identifier for this worker
    pub id: String,
    /// Region identifier (e.g., "us-east", "eu-central")
    pub region: String,
    /// QUIC endpoint (host:port)
    pub quic: Option<String>,
    /// WebSocket endpoint (e.g., "ws://10.0.0.1:9000/ws")
    pub websocket: Option<String>,
    /// HTTP endpoint (e.g., "http://10.0.0.1:9000")
    pub http: Option<String>,
}

impl WorkerEndpoint {
    /// Create a new worker endpoint with all protocols at the same IP/host
    /// Uses standard ports: QUIC=4433, WebSocket=9000, HTTP=9000
    pub fn new(id: &str, region: &str, ip: &str) -> Self {
        Self::with_ports(id, region, ip, 4433, 9000, 9000)
    }

    /// Create a worker endpoint with custom ports
    pub fn with_ports(
        id: &str,
        region: &str,
        ip: &str,
        quic_port: u16,
        ws_port: u16,
        http_port: u16,
    ) -> Self {
        Self {
            id: id.to_string(),
            region: region.to_string(),
            quic: Some(format!("{}:{}", ip, quic_port)),
            websocket: Some(format!("ws://{}:{}/ws", ip, ws_port)),
            http: Some(format!("http://{}:{}", ip, http_port)),
        }
    }

    /// Create a worker endpoint with explicit endpoints
    pub fn with_endpoints(
        id: &str,
        region: &str,
        quic: Option<String>,
        websocket: Option<String>,
        http: Option<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            region: region.to_string(),
            quic,
            websocket,
            http,
        }
    }

    /// Get endpoint for a specific protocol
    pub fn get_endpoint(&self, protocol: Protocol) -> Option<&str> {
        match protocol {
            Protocol::Quic => self.quic.as_deref(),
            Protocol::WebSocket => self.websocket.as_deref(),
            Protocol::Http => self.http.as_deref(),
        }
    }
}

// ============================================================================
// Multi-Region Routing Types
// ============================================================================

/// Routing recommendation for leader-aware transaction submission
///
/// Always construct through [`RoutingRecommendation::from_hint`] or
/// [`RoutingRecommendation::new`]: confidence is clamped to 0-100 and the
/// best region is never repeated in `fallback_regions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRecommendation {
    /// Best region for current leader
    pub best_region: String,
    /// Current leader validator pubkey
    pub leader_pubkey: Option<String>,
    /// Current slot
    pub slot: u64,
    /// Confidence in recommendation (0-100)
    pub confidence: u32,
    /// Expected RTT to leader TPU from best region (ms)
    pub expected_rtt_ms: Option<u32>,
    /// Fallback regions in priority order
    pub fallback_regions: Vec<String>,
    /// Fallback strategy recommendation
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
    /// Time until this recommendation expires (ms)
    pub valid_for_ms: u64,
}

impl RoutingRecommendation {
    /// Build a recommendation, enforcing the confidence and fallback invariants
    pub fn new(
        best_region: impl Into<String>,
        confidence: u32,
        fallback_regions: Vec<String>,
        valid_for_ms: u64,
    ) -> Self {
        let best_region = best_region.into();
        let mut seen = std::collections::HashSet::new();
        let fallback_regions = fallback_regions
            .into_iter()
            .filter(|r| *r != best_region && seen.insert(r.clone()))
            .collect();

        Self {
            best_region,
            leader_pubkey: None,
            slot: 0,
            confidence: confidence.min(100),
            expected_rtt_ms: None,
            fallback_regions,
            fallback_strategy: FallbackStrategy::Sequential,
            valid_for_ms,
        }
    }

    /// Derive a recommendation from a leader hint
    pub fn from_hint(hint: &LeaderHint) -> Self {
        let mut rec = Self::new(
            hint.preferred_region.clone(),
            hint.confidence,
            hint.backup_regions.clone(),
            hint.valid_for_ms(),
        );
        rec.leader_pubkey = hint.leader_pubkey.clone();
        rec.slot = hint.slot;
        rec.expected_rtt_ms = Some(hint.metadata.tpu_rtt_ms);
        rec
    }
}

/// Strategy for handling fallback when primary region fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Use next region in fallback list
    #[default]
    Sequential,
    /// Broadcast to several regions simultaneously
    Broadcast,
}

/// Configuration for multi-region client behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiRegionConfig {
    /// Whether to automatically follow leader hints
    #[serde(default = "default_auto_follow")]
    pub auto_follow_leader: bool,
    /// Minimum confidence to switch regions (0-100)
    #[serde(default = "default_min_confidence")]
    pub min_switch_confidence: u32,
    /// Cooldown between region switches (ms)
    #[serde(default = "default_switch_cooldown")]
    pub switch_cooldown_ms: u64,
    /// Maximum regions to use in broadcast mode
    #[serde(default = "default_max_broadcast_regions")]
    pub max_broadcast_regions: usize,
    /// Region used before any hint has been accepted
    #[serde(default)]
    pub default_region: Option<String>,
    /// How a default submission continues once the best region fails
    #[serde(default)]
    pub fallback_strategy: FallbackStrategy,
}

fn default_auto_follow() -> bool {
    true
}

fn default_min_confidence() -> u32 {
    60
}

fn default_switch_cooldown() -> u64 {
    500
}

fn default_max_broadcast_regions() -> usize {
    3
}

impl Default for MultiRegionConfig {
    fn default() -> Self {
        Self {
            auto_follow_leader: default_auto_follow(),
            min_switch_confidence: default_min_confidence(),
            switch_cooldown_ms: default_switch_cooldown(),
            max_broadcast_regions: default_max_broadcast_regions(),
            default_region: None,
            fallback_strategy: FallbackStrategy::Sequential,
        }
    }
}

/// Client-side submission counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Total transactions submitted
    pub transactions_submitted: u64,
    /// Submissions that resolved with a result
    pub transactions_accepted: u64,
    /// Submissions that returned an error
    pub transactions_failed: u64,
    /// Average submission latency in ms
    pub average_latency_ms: f64,
}

impl PerformanceMetrics {
    /// Success rate (0.0 - 1.0)
    pub fn success_rate(&self) -> f64 {
        if self.transactions_submitted == 0 {
            return 0.0;
        }
        self.transactions_accepted as f64 / self.transactions_submitted as f64
    }
}
