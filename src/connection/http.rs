//! HTTP transport implementation using reqwest
//!
//! Request/response only. There is no push channel, so a client on this
//! transport runs in degraded, submit-only mode.

use super::{unix_millis, Transport, TransportContext};
use crate::codec::PongFrame;
use crate::config::Protocol;
use crate::error::{Result, SdkError};
use crate::types::{
    ConnectionInfo, RateLimitInfo, RoutingInfo, StreamType, SubmitOptions, TransactionError,
    TransactionResult, TransactionStatus,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Upper bound for any single HTTP request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP transport implementation
pub struct HttpTransport {
    ctx: TransportContext,
    client: Client,
    base_url: String,
    connected: AtomicBool,
    info: RwLock<Option<ConnectionInfo>>,
    request_counter: AtomicU64,
}

impl HttpTransport {
    /// Create a new HTTP transport
    pub fn new(ctx: TransportContext) -> Self {
        let base_url = ctx
            .config
            .get_endpoint(Protocol::Http)
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            ctx,
            client,
            base_url,
            connected: AtomicBool::new(false),
            info: RwLock::new(None),
            request_counter: AtomicU64::new(0),
        }
    }

    /// Generate a unique request ID
    fn next_request_id(&self) -> String {
        let id = self.request_counter.fetch_add(1, Ordering::Relaxed);
        format!("req-{}", id)
    }

    /// Build authorization header
    fn auth_header(&self) -> String {
        format!("Bearer {}", self.ctx.config.api_key)
    }
}

/// Map a non-success HTTP status to the SDK error taxonomy
fn map_status(status: StatusCode, body: &str) -> SdkError {
    match status {
        StatusCode::UNAUTHORIZED => SdkError::auth("Invalid API key"),
        StatusCode::TOO_MANY_REQUESTS => SdkError::RateLimited(if body.is_empty() {
            "Too many requests".to_string()
        } else {
            body.to_string()
        }),
        other => SdkError::internal(format!("HTTP {}: {}", other.as_u16(), body)),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<ConnectionInfo> {
        // Verify connectivity by calling a health endpoint
        let health_url = format!("{}/health", self.base_url);
        debug!(url = %health_url, "Checking HTTP connectivity");

        let response = self
            .client
            .get(&health_url)
            .send()
            .await
            .map_err(|e| SdkError::connection(format!("HTTP health check failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SdkError::connection(format!(
                "HTTP health check returned status {}",
                response.status()
            )));
        }

        let info = ConnectionInfo {
            session_id: uuid::Uuid::new_v4().to_string(),
            protocol: Protocol::Http.name().to_string(),
            region: self.ctx.config.region.clone(),
            server_time: unix_millis(),
            features: vec!["submit".to_string()],
            rate_limit: RateLimitInfo { rps: 100, burst: 200 },
        };
        *self.info.write().await = Some(info.clone());
        self.connected.store(true, Ordering::SeqCst);

        debug!("HTTP transport connected successfully");
        Ok(info)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        *self.info.write().await = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn protocol(&self) -> Protocol {
        Protocol::Http
    }

    async fn submit_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        if !self.is_connected() {
            return Err(SdkError::NotConnected);
        }

        let request_id = self.next_request_id();
        let submit_url = format!("{}/v1/transactions/submit", self.base_url);

        let request = HttpSubmitRequest {
            request_id: request_id.clone(),
            transaction: BASE64.encode(transaction),
            dedup_id: options.dedup_id.clone(),
            options: HttpSubmitOptions {
                broadcast_mode: options.broadcast_mode,
                preferred_sender: options.preferred_sender.clone(),
                max_retries: options.max_retries,
                timeout_ms: options.timeout_ms,
            },
        };

        debug!(url = %submit_url, request_id = %request_id, "Submitting transaction via HTTP");

        let send = self
            .client
            .post(&submit_url)
            .header("Authorization", self.auth_header())
            .json(&request)
            .send();
        let response = tokio::time::timeout(options.timeout(), send)
            .await
            .map_err(|_| SdkError::Timeout(options.timeout()))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &body));
        }

        let result: HttpSubmitResponse = response.json().await?;
        Ok(TransactionResult {
            request_id: result.request_id.unwrap_or(request_id),
            transaction_id: result.transaction_id,
            signature: result.signature,
            status: TransactionStatus::parse(&result.status),
            slot: result.slot,
            timestamp: result.timestamp.unwrap_or_else(unix_millis),
            routing: result.routing,
            error: result.error,
        })
    }

    async fn subscribe(&self, stream: StreamType) -> Result<()> {
        self.ctx.subscriptions.insert(stream);
        warn!(
            stream = %stream,
            "HTTP transport has no push channel; stream starts once a streaming transport connects"
        );
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

        let url = format!("{}/v1/ping", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("seq", seq as u64), ("client_time", client_send_time)])
            .send()
            .await
            .map_err(|e| SdkError::connection(format!("Ping failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, ""));
        }

        let body: HttpPingResponse = response
            .json()
            .await
            .map_err(|e| SdkError::protocol(format!("Invalid ping response: {}", e)))?;

        Ok(PongFrame {
            seq,
            client_send_time,
            server_time: body.server_time,
        })
    }
}

// Helper types for HTTP requests/responses

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpSubmitRequest {
    request_id: String,
    transaction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dedup_id: Option<String>,
    options: HttpSubmitOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HttpSubmitOptions {
    broadcast_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preferred_sender: Option<String>,
    max_retries: u32,
    timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HttpSubmitResponse {
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    transaction_id: String,
    #[serde(default)]
    signature: Option<String>,
    status: String,
    #[serde(default)]
    slot: Option<u64>,
    #[serde(default)]
    timestamp: Option<u64>,
    #[serde(default)]
    routing: Option<RoutingInfo>,
    #[serde(default)]
    error: Option<TransactionError>,
}

#[derive(Debug, Deserialize)]
struct HttpPingResponse {
    #[serde(alias = "serverTime")]
    server_time: u64,
}
