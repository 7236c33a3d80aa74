//! Basic Connection Example
//!
//! Connects through the protocol fallback chain, prints the session, follows
//! a few leader hints, submits a dummy transaction and disconnects.
//!
//! # Running this example
//!
//! ```bash
//! SLIPSTREAM_API_KEY=sk_test_xxx cargo run --example basic
//! ```

use slipstream_core::{Config, SlipstreamClient, TransportEvent};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("slipstream_core=info".parse()?))
        .init();

    let api_key = env::var("SLIPSTREAM_API_KEY").unwrap_or_else(|_| "sk_test_12345678".to_string());

    let mut builder = Config::builder()
        .api_key(&api_key)
        .leader_hints(true)
        .stream_latest_slot(true)
        .min_confidence(50);
    if let Ok(endpoint) = env::var("SLIPSTREAM_ENDPOINT") {
        builder = builder.endpoint(endpoint);
    }
    let config = builder.build()?;

    let client = SlipstreamClient::connect(config).await?;
    if let Some(info) = client.connection_info() {
        println!("Connected: session={} protocol={} region={:?}", info.session_id, info.protocol, info.region);
        if info.is_degraded() {
            println!("Running in degraded mode: no streaming over HTTP");
        }
    }

    // Connection lifecycle in the background
    let mut events = client.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TransportEvent::Reconnecting { attempt, delay } => {
                    println!("Reconnecting (attempt {}, in {:?})", attempt, delay)
                }
                TransportEvent::Reconnected(info) => println!("Reconnected via {}", info.protocol),
                TransportEvent::Disconnected => break,
                _ => {}
            }
        }
    });

    let mut hints = client.subscribe_leader_hints().await?;
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);
    let mut seen = 0;
    while seen < 5 {
        tokio::select! {
            _ = &mut deadline => break,
            hint = hints.recv() => match hint {
                Some(hint) => {
                    seen += 1;
                    println!(
                        "Leader hint: region={} confidence={} valid_for={}ms",
                        hint.preferred_region,
                        hint.confidence,
                        hint.valid_for_ms()
                    );
                }
                None => break,
            },
        }
    }

    // Not a real transaction; the server is expected to reject it
    match client.submit_transaction(&[0u8; 64]).await {
        Ok(result) => println!("Submitted: {} ({:?})", result.transaction_id, result.status),
        Err(e) => println!("Submission failed: {} [{}]", e, e.code()),
    }

    if let Some(latency) = client.latency() {
        println!(
            "Latency: median rtt={}ms clock offset={}ms over {} samples",
            latency.median_rtt_ms, latency.median_offset_ms, latency.samples
        );
    }
    let metrics = client.metrics();
    println!(
        "Metrics: submitted={} success_rate={:.2}",
        metrics.transactions_submitted,
        metrics.success_rate()
    );

    client.disconnect().await?;
    Ok(())
}
