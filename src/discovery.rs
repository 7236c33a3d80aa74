//! Service discovery for automatic worker endpoint resolution
//!
//! The discovery service lists workers per region; only healthy workers are
//! ever turned into [`WorkerEndpoint`]s.

use crate::config::Config;
use crate::error::{Result, SdkError};
use crate::types::WorkerEndpoint;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default discovery URL
pub const DEFAULT_DISCOVERY_URL: &str = "https://discovery.allenhark.network";

/// Discovery API response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    #[serde(default)]
    pub regions: Vec<DiscoveryRegion>,
    pub workers: Vec<DiscoveryWorker>,
    #[serde(default, alias = "recommended_region")]
    pub recommended_region: Option<String>,
}

/// Region information from discovery
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryRegion {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Worker information from discovery
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryWorker {
    pub id: String,
    pub region: String,
    #[serde(alias = "address")]
    pub ip: String,
    #[serde(default)]
    pub ports: WorkerPorts,
    pub healthy: bool,
    pub version: Option<String>,
}

impl DiscoveryWorker {
    pub fn to_endpoint(&self) -> WorkerEndpoint {
        WorkerEndpoint::with_ports(
            &self.id,
            &self.region,
            &self.ip,
            self.ports.quic,
            self.ports.ws,
            self.ports.http,
        )
    }
}

/// Worker port configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPorts {
    pub quic: u16,
    pub ws: u16,
    pub http: u16,
}

impl Default for WorkerPorts {
    fn default() -> Self {
        Self {
            quic: 4433,
            ws: 9000,
            http: 9000,
        }
    }
}

impl DiscoveryResponse {
    /// Healthy workers for a specific region
    pub fn workers_for_region<'a>(&'a self, region: &str) -> Vec<&'a DiscoveryWorker> {
        self.workers
            .iter()
            .filter(|w| w.region == region && w.healthy)
            .collect()
    }

    /// Use `preferred` if it has a healthy worker, otherwise the server's recommendation
    pub fn best_region(&self, preferred: Option<&str>) -> Option<String> {
        if let Some(pref) = preferred {
            if !self.workers_for_region(pref).is_empty() {
                return Some(pref.to_string());
            }
            warn!(
                preferred = pref,
                "Preferred region has no healthy workers, falling back"
            );
        }

        self.recommended_region.clone().or_else(|| {
            self.workers
                .iter()
                .find(|w| w.healthy)
                .map(|w| w.region.clone())
        })
    }

    /// Healthy workers as endpoints, in discovery order
    pub fn worker_endpoints(&self) -> Vec<WorkerEndpoint> {
        self.workers
            .iter()
            .filter(|w| w.healthy)
            .map(DiscoveryWorker::to_endpoint)
            .collect()
    }
}

/// Group endpoints by region, keeping discovery order within a region
pub fn group_by_region(workers: &[WorkerEndpoint]) -> BTreeMap<String, Vec<WorkerEndpoint>> {
    let mut regions: BTreeMap<String, Vec<WorkerEndpoint>> = BTreeMap::new();
    for worker in workers {
        regions
            .entry(worker.region.clone())
            .or_default()
            .push(worker.clone());
    }
    regions
}

/// Client for the discovery service
pub struct DiscoveryClient {
    http: reqwest::Client,
    url: String,
}

impl DiscoveryClient {
    /// Create a new discovery client
    pub fn new(discovery_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SdkError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: discovery_url.trim_end_matches('/').to_string(),
        })
    }

    /// Discovery client for the URL and timeout in `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.discovery_url, config.connection_timeout)
    }

    /// Fetch available workers and regions from the discovery endpoint
    pub async fn discover(&self) -> Result<DiscoveryResponse> {
        let url = format!("{}/discovery", self.url);
        debug!(url = %url, "Fetching worker discovery");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SdkError::connection(format!("Discovery request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SdkError::connection(format!(
                "Discovery failed (HTTP {}): {}",
                status, body
            )));
        }

        let discovery: DiscoveryResponse = response
            .json()
            .await
            .map_err(|e| SdkError::protocol(format!("Invalid discovery response: {}", e)))?;

        info!(
            regions = discovery.regions.len(),
            workers = discovery.workers.len(),
            recommended = ?discovery.recommended_region,
            "Discovery complete"
        );

        Ok(discovery)
    }
}
