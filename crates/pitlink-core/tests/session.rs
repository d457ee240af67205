mod common;

use common::{snapshot, MockLink};
use pitlink_core::config::{LinkConfig, TransportConfig};
use pitlink_core::demo::SimulatedConnector;
use pitlink_core::prelude::*;
use pitlink_core::telemetry::PollerConfig;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn session(link: &MockLink) -> Session {
    Session::new(link.connector(), PollerConfig::default(), 16)
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_poller_then_disconnects_once() {
    let link = MockLink::new();
    let mut session = session(&link);
    let state = session.connection_state();
    let mut events = session.subscribe();

    session.connect().await.unwrap();
    session.start_polling();
    assert!(session.is_polling());

    link.push_frame(&snapshot(100.0, 40.0, 40.0));
    assert!(matches!(events.recv().await, Ok(LinkEvent::Telemetry(_))));

    session.shutdown().await;
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
    assert_eq!(link.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn drop_disconnects() {
    let link = MockLink::new();
    let mut session = session(&link);
    session.connect().await.unwrap();
    session.start_polling();
    drop(session);
    assert_eq!(link.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn start_polling_is_idempotent() {
    let link = MockLink::new();
    let mut session = session(&link);
    let mut events = session.subscribe();
    session.connect().await.unwrap();
    session.start_polling();
    session.start_polling();

    link.push_frame(&snapshot(100.0, 40.0, 40.0));
    assert!(matches!(events.recv().await, Ok(LinkEvent::Telemetry(_))));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(events.try_recv().is_err());
    assert!(session.is_polling());

    session.stop_polling().await;
    assert!(!session.is_polling());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dispatch_through_session_feeds_alerts() {
    let link = MockLink::new();
    let mut session = session(&link);
    let mut events = session.subscribe();
    session.connect().await.unwrap();

    session
        .dispatch(Command::SetCookTarget(95), TemperatureUnit::Celsius)
        .unwrap();
    assert_eq!(session.targets().cook_c, Some(95.0));
    assert_eq!(link.writes(), vec![vec![2, 0, 95]]);

    session.start_polling();
    link.push_frame(&snapshot(110.0, 95.0, 80.0));

    let mut kinds = Vec::new();
    for _ in 0..2 {
        match events.recv().await.unwrap() {
            LinkEvent::Alert(alert) => kinds.push(alert.kind),
            LinkEvent::Telemetry(_) => {}
        }
    }
    assert_eq!(kinds, vec![AlertKind::CookComplete]);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_connect_reported() {
    let link = MockLink::new();
    link.set_fail_open(true);
    let session = session(&link);
    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, TransportError::ConnectFailed(_)));
    assert!(matches!(session.state(), ConnectionState::Failed(_)));
}

#[tokio::test]
async fn simulated_smoker_streams_telemetry() {
    let connector = SimulatedConnector::new()
        .with_seed(42)
        .with_frame_period(Duration::from_millis(20));
    let config = PollerConfig {
        interval: Duration::from_millis(10),
        ..PollerConfig::default()
    };
    let mut session = Session::new(Arc::new(connector), config, 16);
    let mut events = session.subscribe();
    session.connect().await.unwrap();
    session.start_polling();

    session
        .dispatch(Command::SetChamberTarget(225), TemperatureUnit::Fahrenheit)
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    match event {
        LinkEvent::Telemetry(reading) => {
            assert!(reading.snapshot.chamber_temp_c > 0.0);
            assert!(!reading.snapshot.faults.any());
        }
        other => panic!("unexpected event {:?}", other),
    }
    session.shutdown().await;
}

#[test]
fn from_config_rejects_invalid() {
    let config = LinkConfig {
        event_capacity: 0,
        transport: TransportConfig::Simulated,
        ..LinkConfig::default()
    };
    assert!(Session::from_config(&config).is_err());
}
