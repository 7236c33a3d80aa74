mod common;

use common::{config, next_matching, registry, MockControl};
use slipstream_core::{
    Config, ConnectionState, ConnectionSupervisor, Protocol, ReconnectPolicy, SdkError,
    StreamType, SubmitOptions, TransportEvent,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_hanging_quic_falls_back_to_websocket_within_timeout() {
    let quic = MockControl::hanging();
    let ws = MockControl::new();
    let http = MockControl::new();
    let supervisor = ConnectionSupervisor::with_registry(
        config(),
        registry(&[
            (Protocol::Quic, quic.clone()),
            (Protocol::WebSocket, ws.clone()),
            (Protocol::Http, http.clone()),
        ]),
    );

    let started = Instant::now();
    let info = supervisor.connect().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(info.protocol, "websocket");
    assert!(elapsed >= Duration::from_secs(2), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2100), "elapsed {:?}", elapsed);
    assert_eq!(http.attempts(), 0);
    assert_eq!(supervisor.state(), ConnectionState::Connected);
    assert!(!supervisor.is_degraded());
}

#[tokio::test(start_paused = true)]
async fn test_degraded_http_mode_when_streaming_transports_fail() {
    let supervisor = ConnectionSupervisor::with_registry(
        config(),
        registry(&[
            (Protocol::Quic, MockControl::hanging()),
            (Protocol::WebSocket, MockControl::hanging()),
            (Protocol::Http, MockControl::new()),
        ]),
    );

    let started = Instant::now();
    let info = supervisor.connect().await.unwrap();

    assert!(started.elapsed() < Duration::from_millis(5100));
    assert_eq!(info.protocol, "http");
    assert!(supervisor.is_degraded());
    assert_eq!(supervisor.protocol(), Some(Protocol::Http));
}

#[tokio::test(start_paused = true)]
async fn test_every_candidate_failing_reports_all_protocols_failed() {
    let supervisor = ConnectionSupervisor::with_registry(
        config(),
        registry(&[
            (Protocol::Quic, MockControl::failing()),
            (Protocol::WebSocket, MockControl::hanging()),
            (Protocol::Http, MockControl::failing()),
        ]),
    );

    let err = supervisor.connect().await.unwrap_err();
    assert!(matches!(err, SdkError::AllProtocolsFailed));
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_preferred_protocol_skips_chain() {
    let quic = MockControl::new();
    let ws = MockControl::new();
    let config = Config::builder()
        .api_key("sk_test_12345678")
        .preferred_protocol(Protocol::WebSocket)
        .build()
        .unwrap();
    let supervisor = ConnectionSupervisor::with_registry(
        config,
        registry(&[(Protocol::Quic, quic.clone()), (Protocol::WebSocket, ws.clone())]),
    );

    let info = supervisor.connect().await.unwrap();
    assert_eq!(info.protocol, "websocket");
    assert_eq!(quic.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_subscriptions_recorded_before_connect_are_replayed() {
    let ws = MockControl::new();
    let supervisor =
        ConnectionSupervisor::with_registry(config(), registry(&[(Protocol::WebSocket, ws.clone())]));

    supervisor.subscribe(StreamType::PriorityFees).await.unwrap();
    supervisor.subscribe(StreamType::LeaderHints).await.unwrap();
    supervisor.connect().await.unwrap();

    assert_eq!(
        ws.last_replay().unwrap(),
        vec![StreamType::LeaderHints, StreamType::PriorityFees]
    );

    supervisor.subscribe(StreamType::LatestSlot).await.unwrap();
    assert_eq!(*ws.live_subscribes.lock().unwrap(), vec![StreamType::LatestSlot]);
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_and_replays_exact_subscription_set() {
    let ws = MockControl::new();
    let supervisor =
        ConnectionSupervisor::with_registry(config(), registry(&[(Protocol::WebSocket, ws.clone())]));
    let mut events = supervisor.events();

    supervisor.connect().await.unwrap();
    supervisor.subscribe(StreamType::LeaderHints).await.unwrap();
    supervisor.subscribe(StreamType::LatestSlot).await.unwrap();
    supervisor.subscribe(StreamType::LeaderHints).await.unwrap();

    for round in 1..=3u32 {
        ws.drop_connection();

        match next_matching(&mut events, |e| matches!(e, TransportEvent::Reconnecting { .. })).await {
            TransportEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt, 1);
                assert_eq!(delay, Duration::from_secs(1));
            }
            _ => unreachable!(),
        }
        let event =
            next_matching(&mut events, |e| matches!(e, TransportEvent::Reconnected(_))).await;
        let TransportEvent::Reconnected(info) = event else {
            unreachable!()
        };

        assert_eq!(info.session_id, format!("websocket-{}", round + 1));
        assert_eq!(
            ws.last_replay().unwrap(),
            vec![StreamType::LeaderHints, StreamType::LatestSlot]
        );
        assert_eq!(supervisor.state(), ConnectionState::Connected);
        assert!(supervisor.is_connected());
    }

    assert_eq!(ws.attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_is_capped_and_exhaustion_reported_once() {
    let ws = MockControl::new();
    let supervisor =
        ConnectionSupervisor::with_registry(config(), registry(&[(Protocol::WebSocket, ws.clone())]));
    let mut events = supervisor.events();
    supervisor.connect().await.unwrap();

    ws.fail_connect.store(true, std::sync::atomic::Ordering::SeqCst);
    ws.drop_connection();

    let mut delays = Vec::new();
    let mut errors = 0;
    loop {
        match events.recv().await.unwrap() {
            TransportEvent::Reconnecting { delay, .. } => delays.push(delay.as_secs()),
            TransportEvent::Error(SdkError::AllProtocolsFailed) => {
                errors += 1;
                break;
            }
            _ => {}
        }
    }

    assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30, 30, 30]);
    assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(errors, 1);
    assert_eq!(ws.attempts(), 11);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);

    // Nothing further is scheduled
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(ws.attempts(), 11);
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(
            event,
            TransportEvent::Reconnecting { .. } | TransportEvent::Error(_)
        ));
    }
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let ws = MockControl::new();
    let supervisor =
        ConnectionSupervisor::with_registry(config(), registry(&[(Protocol::WebSocket, ws.clone())]));
    let mut events = supervisor.events();
    supervisor.connect().await.unwrap();

    ws.fail_connect.store(true, std::sync::atomic::Ordering::SeqCst);
    ws.drop_connection();
    next_matching(&mut events, |e| matches!(e, TransportEvent::Reconnecting { .. })).await;

    supervisor.disconnect().await.unwrap();
    let attempts = ws.attempts();
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(ws.attempts(), attempts);
    assert_eq!(supervisor.state(), ConnectionState::Closed);
    assert!(matches!(
        supervisor
            .submit_transaction(&[1, 2, 3], &SubmitOptions::default())
            .await,
        Err(SdkError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_disabled_leaves_disconnected() {
    let ws = MockControl::new();
    let config = Config::builder()
        .api_key("sk_test_12345678")
        .reconnect(ReconnectPolicy {
            enabled: false,
            ..ReconnectPolicy::default()
        })
        .build()
        .unwrap();
    let supervisor =
        ConnectionSupervisor::with_registry(config, registry(&[(Protocol::WebSocket, ws.clone())]));
    supervisor.connect().await.unwrap();

    ws.drop_connection();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(ws.attempts(), 1);
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    assert!(supervisor.connection_info().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent_while_connected() {
    let ws = MockControl::new();
    let supervisor =
        ConnectionSupervisor::with_registry(config(), registry(&[(Protocol::WebSocket, ws.clone())]));

    let first = supervisor.connect().await.unwrap();
    let second = supervisor.connect().await.unwrap();
    assert_eq!(first.session_id, second.session_id);
    assert_eq!(ws.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_again_after_disconnect() {
    let ws = MockControl::new();
    let supervisor =
        ConnectionSupervisor::with_registry(config(), registry(&[(Protocol::WebSocket, ws.clone())]));

    supervisor.connect().await.unwrap();
    supervisor.disconnect().await.unwrap();
    assert!(!supervisor.is_connected());

    let info = supervisor.connect().await.unwrap();
    assert_eq!(info.session_id, "websocket-2");
    assert_eq!(supervisor.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_share_one_handshake() {
    let ws = MockControl::new();
    ws.connect_delay_ms.store(100, Ordering::SeqCst);
    let config = Config::builder()
        .api_key("sk_test_12345678")
        .preferred_protocol(Protocol::WebSocket)
        .build()
        .unwrap();
    let supervisor =
        ConnectionSupervisor::with_registry(config, registry(&[(Protocol::WebSocket, ws.clone())]));
    let mut events = supervisor.events();

    let (a, b) = tokio::join!(supervisor.connect(), supervisor.connect());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(ws.attempts(), 1);
    assert_eq!(a.session_id, b.session_id);
    assert!(supervisor.is_connected());

    // Only one Connected event
    assert!(matches!(events.try_recv(), Ok(TransportEvent::Connected(_))));
    assert!(events.try_recv().is_err());
}
