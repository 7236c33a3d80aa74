//! Leader-aware routing across regions
//!
//! [`RegionRouter`] keeps at most one [`ConnectionSupervisor`] per region,
//! follows leader hints from the primary region, and routes each submission
//! to the current best region with sequential or broadcast fallback.
//!
//! # Example
//!
//! ```rust,ignore
//! use slipstream_core::{Config, MultiRegionConfig, RegionRouter, WorkerEndpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::builder().api_key("sk_test_12345678").build()?;
//!
//!     let workers = vec![
//!         WorkerEndpoint::new("w1", "us-west", "203.0.113.10"),
//!         WorkerEndpoint::new("w2", "eu-central", "203.0.113.20"),
//!     ];
//!
//!     let router = RegionRouter::new(config, workers, MultiRegionConfig::default()).await?;
//!     let mut routing_rx = router.subscribe_routing_updates();
//!
//!     let tx_bytes = vec![/* signed transaction bytes */];
//!     let result = router.submit_transaction(&tx_bytes).await?;
//!     Ok(())
//! }
//! ```

use crate::config::Config;
use crate::connection::{ConnectionSupervisor, TransportRegistry};
use crate::discovery::{group_by_region, DiscoveryClient};
use crate::error::{Result, SdkError};
use crate::events::TransportEvent;
use crate::types::{
    FallbackStrategy, LeaderHint, MultiRegionConfig, RoutingRecommendation, StreamType,
    SubmitOptions, TransactionResult, WorkerEndpoint,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::OnceCell;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Capacity of the routing update channel
const ROUTING_CHANNEL_CAPACITY: usize = 16;

/// A recommendation together with when it was accepted
#[derive(Debug, Clone)]
struct ActiveRouting {
    recommendation: RoutingRecommendation,
    accepted_at: Instant,
}

impl ActiveRouting {
    fn is_valid(&self) -> bool {
        self.accepted_at.elapsed() < Duration::from_millis(self.recommendation.valid_for_ms)
    }
}

type RegionSlot = Arc<OnceCell<Arc<ConnectionSupervisor>>>;

struct RouterInner {
    config: Config,
    router_config: MultiRegionConfig,
    registry: TransportRegistry,
    workers: BTreeMap<String, Vec<WorkerEndpoint>>,
    /// Regions in the order their first worker was listed
    region_order: Vec<String>,
    primary: String,
    supervisors: Mutex<HashMap<String, RegionSlot>>,
    routing: RwLock<Option<ActiveRouting>>,
    last_switch: Mutex<Option<Instant>>,
    routing_tx: broadcast::Sender<RoutingRecommendation>,
}

impl RouterInner {
    /// Supervisor for `region`, connecting it on first use
    async fn ensure_region(&self, region: &str) -> Result<Arc<ConnectionSupervisor>> {
        let slot = {
            let mut supervisors = self
                .supervisors
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            Arc::clone(supervisors.entry(region.to_string()).or_default())
        };

        // A failed init leaves the cell empty, so the next call retries
        let supervisor = slot
            .get_or_try_init(|| async {
                let worker = self
                    .workers
                    .get(region)
                    .and_then(|workers| workers.first())
                    .ok_or_else(|| SdkError::config(format!("Unknown region: {}", region)))?;

                debug!(region = %region, worker = %worker.id, "Connecting to region");
                let supervisor = ConnectionSupervisor::with_registry(
                    self.config.for_worker(worker),
                    self.registry.clone(),
                );
                supervisor.connect().await?;
                info!(region = %region, worker = %worker.id, "Connected to region");
                Ok::<_, SdkError>(Arc::new(supervisor))
            })
            .await?;

        Ok(Arc::clone(supervisor))
    }

    async fn submit_to_region(
        &self,
        region: &str,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        let supervisor = self.ensure_region(region).await?;
        supervisor.submit_transaction(transaction, options).await
    }

    fn current_routing(&self) -> Option<RoutingRecommendation> {
        self.routing
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|active| active.is_valid())
            .map(|active| active.recommendation.clone())
    }

    fn default_region(&self) -> String {
        self.router_config
            .default_region
            .clone()
            .filter(|r| self.workers.contains_key(r))
            .unwrap_or_else(|| self.primary.clone())
    }

    fn apply_hint(&self, hint: &LeaderHint) -> Option<RoutingRecommendation> {
        if hint.confidence < self.router_config.min_switch_confidence {
            debug!(
                confidence = hint.confidence,
                threshold = self.router_config.min_switch_confidence,
                "Leader hint below confidence threshold"
            );
            return None;
        }

        let now = Instant::now();
        let cooldown = Duration::from_millis(self.router_config.switch_cooldown_ms);
        let mut last_switch = self
            .last_switch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = *last_switch {
            if now.duration_since(last) < cooldown {
                debug!("Region switch on cooldown");
                return None;
            }
        }

        let mut recommendation = RoutingRecommendation::from_hint(hint);
        recommendation.fallback_strategy = self.router_config.fallback_strategy;
        let mut routing = self.routing.write().unwrap_or_else(PoisonError::into_inner);
        let previous = routing
            .as_ref()
            .filter(|active| active.is_valid())
            .map(|active| active.recommendation.best_region.clone());

        if previous.as_deref() != Some(recommendation.best_region.as_str()) {
            info!(
                old_region = ?previous,
                new_region = %recommendation.best_region,
                confidence = recommendation.confidence,
                valid_for_ms = recommendation.valid_for_ms,
                "Switching routing to new region"
            );
            *last_switch = Some(now);
        }

        *routing = Some(ActiveRouting {
            recommendation: recommendation.clone(),
            accepted_at: now,
        });
        drop(routing);
        drop(last_switch);

        let _ = self.routing_tx.send(recommendation.clone());
        Some(recommendation)
    }

    /// Best region first, then its fallbacks, then every other region; capped
    fn broadcast_regions(&self) -> Vec<String> {
        let (best, fallbacks) = match self.current_routing() {
            Some(r) => (r.best_region, r.fallback_regions),
            None => (self.default_region(), Vec::new()),
        };

        let mut regions: Vec<String> = Vec::new();
        let candidates = std::iter::once(best)
            .chain(fallbacks)
            .chain(self.region_order.iter().cloned());
        for region in candidates {
            if self.workers.contains_key(&region) && !regions.contains(&region) {
                regions.push(region);
            }
        }

        regions.truncate(self.router_config.max_broadcast_regions.max(1));
        regions
    }

    async fn hint_listener(weak: Weak<Self>, mut events: broadcast::Receiver<TransportEvent>) {
        loop {
            match events.recv().await {
                Ok(TransportEvent::LeaderHint(hint)) => {
                    let Some(inner) = weak.upgrade() else {
                        return;
                    };
                    inner.apply_hint(&hint);
                }
                Ok(TransportEvent::Disconnected) | Err(RecvError::Closed) => return,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Leader hint listener lagged");
                }
            }
        }
    }
}

/// Multi-region router for leader-aware transaction routing
pub struct RegionRouter {
    inner: Arc<RouterInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl RegionRouter {
    /// Connect using automatic worker discovery
    pub async fn connect_with_discovery(
        config: Config,
        mut router_config: MultiRegionConfig,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            discovery_url = %config.discovery_url,
            "Discovering workers for region router"
        );

        let discovery = DiscoveryClient::from_config(&config)?;
        let response = discovery.discover().await?;

        let workers = response.worker_endpoints();
        if workers.is_empty() {
            return Err(SdkError::connection("No healthy workers found via discovery"));
        }

        if router_config.default_region.is_none() {
            let preferred = config.region.as_deref();
            router_config.default_region = response.best_region(preferred);
        }

        info!(
            worker_count = workers.len(),
            region_count = response.regions.len(),
            default_region = ?router_config.default_region,
            "Discovered workers for region router"
        );

        Self::new(config, workers, router_config).await
    }

    /// Create a router over an explicit worker list with every built-in transport
    pub async fn new(
        config: Config,
        workers: Vec<WorkerEndpoint>,
        router_config: MultiRegionConfig,
    ) -> Result<Self> {
        Self::with_registry(config, workers, router_config, TransportRegistry::builtin()).await
    }

    /// Create a router whose regions connect through `registry`.
    ///
    /// The primary region (the configured default, else the config's region,
    /// else the first worker's region) connects before this returns.
    pub async fn with_registry(
        config: Config,
        workers: Vec<WorkerEndpoint>,
        router_config: MultiRegionConfig,
        registry: TransportRegistry,
    ) -> Result<Self> {
        config.validate()?;
        if workers.is_empty() {
            return Err(SdkError::config("No workers provided for region router"));
        }

        let mut region_order: Vec<String> = Vec::new();
        for worker in &workers {
            if !region_order.contains(&worker.region) {
                region_order.push(worker.region.clone());
            }
        }
        let grouped = group_by_region(&workers);

        let primary = router_config
            .default_region
            .iter()
            .chain(config.region.iter())
            .find(|r| grouped.contains_key(*r))
            .cloned()
            .unwrap_or_else(|| region_order[0].clone());

        let (routing_tx, _) = broadcast::channel(ROUTING_CHANNEL_CAPACITY);
        let router = Self {
            inner: Arc::new(RouterInner {
                config,
                router_config,
                registry,
                workers: grouped,
                region_order,
                primary: primary.clone(),
                supervisors: Mutex::new(HashMap::new()),
                routing: RwLock::new(None),
                last_switch: Mutex::new(None),
                routing_tx,
            }),
            listener: Mutex::new(None),
        };

        let supervisor = router.inner.ensure_region(&primary).await?;

        if router.inner.router_config.auto_follow_leader {
            let events = supervisor.events();
            supervisor.subscribe(StreamType::LeaderHints).await?;
            let handle = tokio::spawn(RouterInner::hint_listener(
                Arc::downgrade(&router.inner),
                events,
            ));
            *router
                .listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        }

        info!(
            primary_region = %primary,
            regions = router.inner.region_order.len(),
            "Region router initialized"
        );
        Ok(router)
    }

    /// Submit a transaction using leader-aware routing
    pub async fn submit_transaction(&self, transaction: &[u8]) -> Result<TransactionResult> {
        self.submit_transaction_with_options(transaction, &SubmitOptions::default())
            .await
    }

    /// Submit a transaction with custom options
    ///
    /// The best region is tried first, then the recommendation's fallback
    /// regions in order. The last error is returned if every region fails.
    pub async fn submit_transaction_with_options(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        if options.broadcast_mode {
            return self.broadcast_transaction(transaction, options).await;
        }

        // A hint that lands mid-submission only affects later submissions
        let (best_region, fallback_regions, strategy) = match self.inner.current_routing() {
            Some(r) => (r.best_region, r.fallback_regions, r.fallback_strategy),
            None => (
                self.inner.default_region(),
                Vec::new(),
                self.inner.router_config.fallback_strategy,
            ),
        };

        let mut last_error = match self
            .inner
            .submit_to_region(&best_region, transaction, options)
            .await
        {
            Ok(result) => return Ok(result),
            Err(e) => {
                warn!(region = %best_region, error = %e, "Primary region failed");
                e
            }
        };

        match strategy {
            FallbackStrategy::Sequential => {
                for region in fallback_regions {
                    match self
                        .inner
                        .submit_to_region(&region, transaction, options)
                        .await
                    {
                        Ok(result) => return Ok(result),
                        Err(e) => {
                            warn!(region = %region, error = %e, "Fallback region failed");
                            last_error = e;
                        }
                    }
                }
            }
            FallbackStrategy::Broadcast => {
                return self.broadcast_transaction(transaction, options).await;
            }
        }

        Err(last_error)
    }

    /// Fan one submission out to several regions and return the first success
    pub async fn broadcast_transaction(
        &self,
        transaction: &[u8],
        options: &SubmitOptions,
    ) -> Result<TransactionResult> {
        let regions = self.inner.broadcast_regions();
        if regions.is_empty() {
            return Err(SdkError::config("No regions available for broadcast"));
        }
        debug!(regions = ?regions, "Broadcasting transaction");

        let transaction: Arc<[u8]> = Arc::from(transaction);
        let mut set = JoinSet::new();
        for region in &regions {
            let inner = Arc::clone(&self.inner);
            let transaction = Arc::clone(&transaction);
            let options = options.clone();
            let region = region.clone();
            set.spawn(async move {
                let result = inner.submit_to_region(&region, &transaction, &options).await;
                (region, result)
            });
        }

        let mut first_error: Option<SdkError> = None;
        while let Some(joined) = set.join_next().await {
            let error = match joined {
                Ok((region, Ok(result))) => {
                    debug!(region = %region, "Broadcast succeeded");
                    // Dropping the set cancels the slower submissions
                    return Ok(result);
                }
                Ok((region, Err(e))) => {
                    warn!(region = %region, error = %e, "Broadcast region failed");
                    e
                }
                Err(e) => SdkError::internal(format!("Broadcast task failed: {}", e)),
            };
            first_error.get_or_insert(error);
        }

        let first = first_error.unwrap_or(SdkError::AllProtocolsFailed);
        Err(SdkError::transaction(format!(
            "All {} broadcast regions failed; first error: {}",
            regions.len(),
            first
        )))
    }

    /// Apply a leader hint as if it arrived from the primary region.
    ///
    /// Returns the accepted recommendation, or `None` if the confidence or
    /// cooldown gate rejected it.
    pub fn update_routing_from_hint(&self, hint: &LeaderHint) -> Option<RoutingRecommendation> {
        self.inner.apply_hint(hint)
    }

    /// Subscribe to routing recommendation updates
    pub fn subscribe_routing_updates(&self) -> broadcast::Receiver<RoutingRecommendation> {
        self.inner.routing_tx.subscribe()
    }

    /// Current recommendation, if one was accepted and is still valid
    pub fn current_routing(&self) -> Option<RoutingRecommendation> {
        self.inner.current_routing()
    }

    /// Region the next default submission goes to
    pub fn best_region(&self) -> String {
        self.inner
            .current_routing()
            .map(|r| r.best_region)
            .unwrap_or_else(|| self.inner.default_region())
    }

    pub fn primary_region(&self) -> &str {
        &self.inner.primary
    }

    /// Every region with at least one worker, in discovery order
    pub fn regions(&self) -> &[String] {
        &self.inner.region_order
    }

    /// Supervisor for a region, connecting it if needed
    pub async fn region(&self, region: &str) -> Result<Arc<ConnectionSupervisor>> {
        self.inner.ensure_region(region).await
    }

    /// Regions with a live supervisor
    pub fn connected_regions(&self) -> Vec<String> {
        let supervisors = self
            .inner
            .supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut regions: Vec<String> = supervisors
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(region, _)| region.clone())
            .collect();
        regions.sort();
        regions
    }

    /// Disconnect from all regions
    pub async fn disconnect_all(&self) -> Result<()> {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }

        let slots: Vec<(String, RegionSlot)> = self
            .inner
            .supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (region, slot) in slots {
            if let Some(supervisor) = slot.get() {
                debug!(region = %region, "Disconnecting from region");
                if let Err(e) = supervisor.disconnect().await {
                    warn!(region = %region, error = %e, "Error disconnecting");
                }
            }
        }
        Ok(())
    }
}

impl Drop for RegionRouter {
    fn drop(&mut self) {
        if let Some(handle) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}
