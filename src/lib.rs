//! slipstream-core - connection and transport core for Slipstream
//!
//! Connects to the relay network over QUIC, WebSocket or HTTP (in that
//! fallback order), keeps the connection alive, tracks latency and clock
//! offset, and routes submissions across regions from leader hints.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use slipstream_core::{Config, SlipstreamClient};
//!
//! # async fn run(tx: Vec<u8>) -> slipstream_core::Result<()> {
//! let config = Config::builder().api_key("sk_live_12345678").build()?;
//! let client = SlipstreamClient::connect(config).await?;
//! let result = client.submit_transaction(&tx).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod events;
pub mod multi_region;
pub mod time_sync;
pub mod types;

pub use client::SlipstreamClient;
pub use config::{Config, ConfigBuilder, ProtocolTimeouts, ReconnectPolicy, TimeSyncConfig};
pub use connection::{
    ConnectionSupervisor, SubscriptionSet, Transport, TransportContext, TransportRegistry,
};
pub use discovery::DiscoveryClient;
pub use error::{Result, SdkError};
pub use events::TransportEvent;
pub use multi_region::RegionRouter;
pub use time_sync::{LatencyStats, TimeSync};
pub use types::*;
