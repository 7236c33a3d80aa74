//! Round-trip latency and clock offset estimation
//!
//! Pings go over whichever transport is active. Each ping yields one
//! [`PingResult`]; the last N results live in a [`LatencyWindow`] and the
//! exposed figures are medians over that window.

use crate::codec::PongFrame;
use crate::config::TimeSyncConfig;
use crate::connection::{unix_millis, ConnectionSupervisor};
use crate::error::{Result, SdkError};
use crate::types::PingResult;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// Sequence numbers used by time sync stay below the heartbeat range
const SEQ_MASK: u32 = 0x7fff_ffff;

/// Anything that can answer a timing ping
#[async_trait]
pub trait PingTarget: Send + Sync {
    async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame>;
}

#[async_trait]
impl PingTarget for ConnectionSupervisor {
    async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame> {
        ConnectionSupervisor::ping(self, seq, client_send_time).await
    }
}

/// Monotonic millisecond clock expressed in unix time.
///
/// Anchored once to the wall clock, then advanced by tokio's `Instant`, so
/// wall-clock steps never produce a negative round trip.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    anchor: Instant,
    anchor_unix_ms: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
            anchor_unix_ms: unix_millis(),
        }
    }

    /// Current time in unix milliseconds
    pub fn now_ms(&self) -> u64 {
        self.anchor_unix_ms + self.anchor.elapsed().as_millis() as u64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn one ping exchange into a sample.
///
/// `offset = server_time - (client_send_time + rtt / 2)`; negative when the
/// server clock is behind ours.
pub fn compute_sample(
    seq: u32,
    client_send_time: u64,
    server_time: u64,
    received_at: u64,
) -> PingResult {
    let rtt_ms = received_at.saturating_sub(client_send_time);
    let midpoint = client_send_time + rtt_ms / 2;
    PingResult {
        seq,
        rtt_ms,
        clock_offset_ms: server_time as i64 - midpoint as i64,
        server_time,
    }
}

/// Fixed-capacity window of the most recent samples
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<PingResult>,
    capacity: usize,
}

impl LatencyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: PingResult) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PingResult> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PingResult> {
        self.samples.iter()
    }

    pub fn median_rtt_ms(&self) -> Option<u64> {
        let values: Vec<i64> = self.samples.iter().map(|s| s.rtt_ms as i64).collect();
        median(values).map(|m| m as u64)
    }

    pub fn median_offset_ms(&self) -> Option<i64> {
        median(self.samples.iter().map(|s| s.clock_offset_ms).collect())
    }
}

/// Median of the values; the mean of the two middle values for even counts
fn median(mut values: Vec<i64>) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]).div_euclid(2))
    }
}

/// Snapshot of the window's statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyStats {
    pub samples: usize,
    pub median_rtt_ms: u64,
    pub median_offset_ms: i64,
    pub last: PingResult,
}

/// Periodic ping loop plus the window it feeds
pub struct TimeSync {
    target: Arc<dyn PingTarget>,
    config: TimeSyncConfig,
    window: Mutex<LatencyWindow>,
    seq: AtomicU32,
    clock: Clock,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TimeSync {
    pub fn new(target: Arc<dyn PingTarget>, config: TimeSyncConfig) -> Arc<Self> {
        Arc::new(Self {
            target,
            window: Mutex::new(LatencyWindow::new(config.window_size)),
            config,
            seq: AtomicU32::new(0),
            clock: Clock::new(),
            task: Mutex::new(None),
        })
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    fn window(&self) -> std::sync::MutexGuard<'_, LatencyWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one ping, record the sample and return it
    pub async fn measure_once(&self) -> Result<PingResult> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) & SEQ_MASK;
        let sent_at = self.clock.now_ms();

        let pong = tokio::time::timeout(self.config.timeout, self.target.ping(seq, sent_at))
            .await
            .map_err(|_| SdkError::Timeout(self.config.timeout))??;
        let received_at = self.clock.now_ms();

        if pong.seq != seq {
            return Err(SdkError::protocol(format!(
                "Pong sequence mismatch: sent {}, got {}",
                seq, pong.seq
            )));
        }

        let sample = compute_sample(seq, sent_at, pong.server_time, received_at);
        trace!(
            seq,
            rtt_ms = sample.rtt_ms,
            offset_ms = sample.clock_offset_ms,
            "Time sync sample"
        );
        self.window().push(sample);
        Ok(sample)
    }

    /// Start the background ping loop; a no-op if it is already running
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            return;
        }

        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.interval;
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(sync) = weak.upgrade() else {
                    return;
                };
                // Best effort: a failed ping just leaves the window as it was
                if let Err(e) = sync.measure_once().await {
                    debug!(error = %e, "Time sync ping failed");
                }
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
    }

    pub fn stats(&self) -> Option<LatencyStats> {
        let window = self.window();
        Some(LatencyStats {
            samples: window.len(),
            median_rtt_ms: window.median_rtt_ms()?,
            median_offset_ms: window.median_offset_ms()?,
            last: *window.latest()?,
        })
    }

    pub fn median_rtt_ms(&self) -> Option<u64> {
        self.window().median_rtt_ms()
    }

    pub fn clock_offset_ms(&self) -> Option<i64> {
        self.window().median_offset_ms()
    }

    /// Local clock corrected by the median offset
    pub fn server_now_ms(&self) -> u64 {
        let now = self.clock.now_ms() as i64;
        (now + self.clock_offset_ms().unwrap_or(0)).max(0) as u64
    }

    pub fn samples(&self) -> Vec<PingResult> {
        self.window().iter().copied().collect()
    }
}

impl Drop for TimeSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Peer that answers with a fixed server time after a fixed one-way delay
    struct DelayedPeer {
        server_time: u64,
        one_way: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PingTarget for DelayedPeer {
        async fn ping(&self, seq: u32, client_send_time: u64) -> Result<PongFrame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.one_way).await;
            let pong = PongFrame {
                seq,
                client_send_time,
                server_time: self.server_time,
            };
            tokio::time::sleep(self.one_way).await;
            Ok(pong)
        }
    }

    struct FailingPeer;

    #[async_trait]
    impl PingTarget for FailingPeer {
        async fn ping(&self, _seq: u32, _client_send_time: u64) -> Result<PongFrame> {
            Err(SdkError::NotConnected)
        }
    }

    fn sample(rtt_ms: u64, clock_offset_ms: i64) -> PingResult {
        PingResult {
            seq: 0,
            rtt_ms,
            clock_offset_ms,
            server_time: 0,
        }
    }

    #[test]
    fn test_compute_sample() {
        let s = compute_sample(1, 1_000, 1_060, 1_100);
        assert_eq!(s.rtt_ms, 100);
        assert_eq!(s.clock_offset_ms, 10);

        // Server behind the client
        let s = compute_sample(2, 1_000, 900, 1_020);
        assert_eq!(s.rtt_ms, 20);
        assert_eq!(s.clock_offset_ms, -110);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = LatencyWindow::new(3);
        for rtt in [100, 1, 2, 3] {
            window.push(sample(rtt, 0));
        }
        assert_eq!(window.len(), 3);
        assert_eq!(
            window.iter().map(|s| s.rtt_ms).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(window.median_rtt_ms(), Some(2));
    }

    #[test]
    fn test_median_resists_spikes() {
        let mut window = LatencyWindow::new(10);
        for rtt in [10, 11, 9, 500, 10] {
            window.push(sample(rtt, -5));
        }
        window.push(sample(10, 4000));
        assert_eq!(window.median_rtt_ms(), Some(10));
        assert_eq!(window.median_offset_ms(), Some(-5));
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(vec![4, 1, 3, 2]), Some(2));
        assert_eq!(median(vec![-3, -1]), Some(-2));
        assert_eq!(median(vec![]), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_converge_on_simulated_peer() {
        let peer = Arc::new(DelayedPeer {
            server_time: 5_000_000_000_000,
            one_way: Duration::from_millis(40),
            calls: AtomicUsize::new(0),
        });
        let sync = TimeSync::new(peer.clone(), TimeSyncConfig::default());

        for _ in 0..12 {
            let sent_at = sync.clock().now_ms();
            let s = sync.measure_once().await.unwrap();
            assert_eq!(s.rtt_ms, 80);
            assert_eq!(
                s.clock_offset_ms,
                5_000_000_000_000i64 - (sent_at as i64 + 40)
            );
        }

        let stats = sync.stats().unwrap();
        assert_eq!(stats.samples, 10);
        assert_eq!(stats.median_rtt_ms, 80);
        assert_eq!(peer.calls.load(Ordering::SeqCst), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_timeout() {
        let peer = Arc::new(DelayedPeer {
            server_time: 0,
            one_way: Duration::from_secs(10),
            calls: AtomicUsize::new(0),
        });
        let sync = TimeSync::new(peer, TimeSyncConfig::default());
        assert!(matches!(
            sync.measure_once().await,
            Err(SdkError::Timeout(_))
        ));
        assert!(sync.stats().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_loop_runs_on_interval() {
        let peer = Arc::new(DelayedPeer {
            server_time: 1,
            one_way: Duration::from_millis(5),
            calls: AtomicUsize::new(0),
        });
        let config = TimeSyncConfig {
            interval: Duration::from_secs(5),
            ..TimeSyncConfig::default()
        };
        let sync = TimeSync::new(peer.clone(), config);
        sync.start();

        // Ticks at 0s, 5s and 10s
        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);

        sync.stop();
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(peer.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failures_are_swallowed() {
        let sync = TimeSync::new(Arc::new(FailingPeer), TimeSyncConfig::default());
        sync.start();
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert!(sync.stats().is_none());
        assert!(sync.task.lock().unwrap().as_ref().map(|h| !h.is_finished()).unwrap());
    }
}
