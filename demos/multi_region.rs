//! Multi-Region Routing Example
//!
//! Discovers workers, connects the primary region and follows leader hints
//! to move submissions to the region closest to the upcoming leader.
//!
//! ```bash
//! SLIPSTREAM_API_KEY=sk_test_xxx cargo run --example multi_region
//! ```

use slipstream_core::{Config, FallbackStrategy, MultiRegionConfig, RegionRouter, SubmitOptions};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("slipstream_core=info".parse()?))
        .init();

    let api_key = env::var("SLIPSTREAM_API_KEY").unwrap_or_else(|_| "sk_test_12345678".to_string());
    let config = Config::builder().api_key(&api_key).leader_hints(true).build()?;

    let router_config = MultiRegionConfig {
        auto_follow_leader: true,
        min_switch_confidence: 70,
        switch_cooldown_ms: 1_000,
        max_broadcast_regions: 2,
        fallback_strategy: FallbackStrategy::Broadcast,
        ..MultiRegionConfig::default()
    };

    let router = RegionRouter::connect_with_discovery(config, router_config).await?;
    println!("Regions: {:?}", router.regions());
    println!("Primary: {}", router.primary_region());

    let mut updates = router.subscribe_routing_updates();
    let watch = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            println!(
                "Routing -> {} (confidence {}, fallbacks {:?}, valid {}ms)",
                update.best_region, update.confidence, update.fallback_regions, update.valid_for_ms
            );
        }
    });

    tokio::time::sleep(Duration::from_secs(5)).await;
    println!("Best region now: {}", router.best_region());
    if let Some(routing) = router.current_routing() {
        if routing.fallback_strategy == FallbackStrategy::Broadcast {
            println!("Failed submissions fan out to {:?}", routing.fallback_regions);
        }
    }

    let tx = [0u8; 64];
    match router.submit_transaction(&tx).await {
        Ok(result) => println!("Routed: {} ({:?})", result.transaction_id, result.status),
        Err(e) => println!("Routed submission failed: {}", e),
    }

    let options = SubmitOptions {
        broadcast_mode: true,
        ..SubmitOptions::default()
    };
    match router.submit_transaction_with_options(&tx, &options).await {
        Ok(result) => println!("Broadcast: {} ({:?})", result.transaction_id, result.status),
        Err(e) => println!("Broadcast submission failed: {}", e),
    }
    println!("Connected regions: {:?}", router.connected_regions());

    router.disconnect_all().await?;
    watch.abort();
    Ok(())
}
