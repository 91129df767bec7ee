mod common;

use common::*;
use std::time::Duration;
use tokio::time::timeout;
use txtrader_monitor::{
    callback, Channel, ConnectionState, Monitor, MonitorError, MonitorHandle,
};

#[cfg(test)]
mod session_tests {
    use super::*;

    fn startup_events() -> Vec<Event> {
        vec![
            event(Channel::Status, "reactor startup"),
            state_event(ConnectionState::Connecting),
            state_event(ConnectionState::ConnectPending),
            state_event(ConnectionState::Connected),
        ]
    }

    fn shutdown_events() -> Vec<Event> {
        vec![
            state_event(ConnectionState::DisconnectPending),
            state_event(ConnectionState::Disconnected),
            state_event(ConnectionState::Shutdown),
            event(Channel::Shutdown, "reactor shutdown detected"),
        ]
    }

    #[tokio::test]
    async fn test_handshake_and_channel_routing() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        let script = async move {
            let mut conn = gateway.accept().await;
            let auth = conn.handshake("trader42").await;
            assert_eq!(auth, r#"auth trader s3cret {"execution-data":1}"#);

            conn.send_batch(&[
                "trader42.order.123 {\"status\":\"filled\"}",
                "trader42.open-order.77 pending",
                "trader42.order-data {\"id\":\"77\"}",
                "trader42.time: 2024-01-02 09:30:00",
                "trader42.executions: []",
                "trader42.quote.IBM 125.10 125.20",
                "unexpected line",
            ])
            .await;
            let seen = collect_until(&mut events, |e| e.1 == "unexpected line").await;

            handle.shutdown("done");
            assert_eq!(conn.recv().await.as_deref(), Some("exit done"));
            assert_eq!(conn.recv().await, None);
            (seen, events)
        };

        let (result, (seen, mut events)) =
            timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
                .await
                .expect("session did not finish");
        result.unwrap();

        let mut expected = startup_events();
        expected.extend([
            event(Channel::Status, ".connected to txtrader gateway"),
            event(Channel::Status, ".Authorized trader42 session granted"),
            event(Channel::Order, "123 {\"status\":\"filled\"}"),
            event(Channel::Order, "77 pending"),
            event(Channel::OrderData, "{\"id\":\"77\"}"),
            event(Channel::Time, "2024-01-02 09:30:00"),
            event(Channel::Executions, "[]"),
            event(Channel::Quote, "IBM 125.10 125.20"),
            event(Channel::Status, "unexpected line"),
        ]);
        assert_eq!(seen, expected);
        assert_eq!(drain_events(&mut events), shutdown_events());
        assert_eq!(monitor.connection_state(), ConnectionState::Shutdown);
    }

    #[tokio::test]
    async fn test_repeated_current_account_is_suppressed() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        let script = async move {
            let mut conn = gateway.accept().await;
            conn.handshake("trader42").await;
            conn.send_batch(&[
                "trader42.current-account U1",
                "trader42.current-account U1",
                "trader42.current-account U2",
                "trader42.current-account U1",
                "marker",
            ])
            .await;
            let seen = collect_until(&mut events, |e| e.1 == "marker").await;
            handle.shutdown("done");
            conn.drain().await;
            seen
        };

        let (result, seen) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();

        let accounts: Vec<&str> = seen
            .iter()
            .filter(|(channel, payload)| *channel == Channel::Status && payload.contains("current-account"))
            .map(|(_, payload)| payload.as_str())
            .collect();
        assert_eq!(
            accounts,
            vec![
                "trader42.current-account U1",
                "trader42.current-account U2",
                "trader42.current-account U1",
            ]
        );
    }

    #[tokio::test]
    async fn test_callback_returning_false_shuts_down_once() {
        let gateway = FakeGateway::bind().await;
        let (mut registry, mut events) = recording_registry();
        let orders = {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            registry.set(
                Channel::Order,
                Some(callback(move |channel, payload| {
                    tx.send((channel, payload.to_string())).ok();
                    false
                })),
            );
            rx
        };
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);

        let script = async move {
            let mut conn = gateway.accept().await;
            conn.handshake("trader42").await;
            conn.send_batch(&[
                "trader42.order.1 first",
                "trader42.order.2 second",
                "trader42.time: 10:00:00",
            ])
            .await;
            conn.drain().await
        };

        let (result, frames) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();

        assert_eq!(frames, vec!["exit client request".to_string()]);

        let mut orders = orders;
        assert_eq!(drain_events(&mut orders), vec![event(Channel::Order, "1 first")]);

        let seen = drain_events(&mut events);
        let authorized = seen
            .iter()
            .position(|(_, payload)| payload.starts_with(".Authorized"))
            .expect("authorization delivered");
        assert_eq!(seen[authorized + 1..].to_vec(), shutdown_events());
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        assert!(matches!(monitor.send("accounts"), Err(MonitorError::NotConnected)));
        assert!(matches!(handle.send("accounts"), Err(MonitorError::NotConnected)));

        let script = async move {
            let mut conn = gateway.accept().await;
            conn.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized")).await;

            handle.send("accounts").unwrap();
            handle.send("positions").unwrap();
            assert_eq!(conn.recv().await.as_deref(), Some("accounts"));
            assert_eq!(conn.recv().await.as_deref(), Some("positions"));

            handle.shutdown("done");
            assert_eq!(conn.drain().await, vec!["exit done".to_string()]);
            handle
        };

        let (result, handle) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();
        assert!(matches!(handle.send("accounts"), Err(MonitorError::NotConnected)));
    }

    #[tokio::test]
    async fn test_reconnects_after_connection_lost() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        let script = async move {
            let mut first = gateway.accept().await;
            first.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized trader42")).await;
            drop(first);

            let mut second = gateway.accept().await;
            second.handshake("trader43").await;
            second
                .send_batch(&["trader42.order.8 stale", "trader43.order.9 fresh"])
                .await;
            let seen = collect_until(&mut events, |e| e.0 == Channel::Order).await;

            handle.shutdown("done");
            assert_eq!(second.drain().await, vec!["exit done".to_string()]);
            seen
        };

        let (result, seen) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();

        assert_eq!(
            seen,
            vec![
                state_event(ConnectionState::Disconnected),
                state_event(ConnectionState::Connecting),
                state_event(ConnectionState::ConnectPending),
                state_event(ConnectionState::Connected),
                event(Channel::Status, ".connected to txtrader gateway"),
                event(Channel::Status, ".Authorized trader43 session granted"),
                event(Channel::Status, "trader42.order.8 stale"),
                event(Channel::Order, "9 fresh"),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_while_connected_is_noop() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        let script = async move {
            let mut conn = gateway.accept().await;
            conn.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized")).await;

            handle.connect();
            handle.send("ping").unwrap();
            assert_eq!(conn.recv().await.as_deref(), Some("ping"));
            assert!(gateway
                .try_accept(Duration::from_millis(200))
                .await
                .is_none());
            assert!(drain_events(&mut events).is_empty());
            assert_eq!(handle.connection_state(), ConnectionState::Connected);

            handle.shutdown("done");
            conn.drain().await;
        };

        let (result, ()) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_suppresses_reconnect_until_connect() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        let script = async move {
            let mut first = gateway.accept().await;
            first.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized")).await;

            handle.disconnect();
            assert_eq!(first.recv().await, None);
            assert_eq!(
                collect_until(&mut events, |e| *e == state_event(ConnectionState::Disconnected)).await,
                vec![
                    state_event(ConnectionState::DisconnectPending),
                    state_event(ConnectionState::Disconnected),
                ]
            );
            assert!(gateway
                .try_accept(Duration::from_millis(300))
                .await
                .is_none());

            handle.connect();
            let mut second = gateway.accept().await;
            second.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized")).await;

            handle.shutdown("done");
            assert_eq!(second.drain().await, vec!["exit done".to_string()]);
        };

        let (result, ()) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();
    }

    #[tokio::test]
    async fn test_stop_halts_without_exit_frame() {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();
        assert!(!handle.is_running());

        let script = async move {
            let mut conn = gateway.accept().await;
            conn.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized")).await;
            assert!(handle.is_running());

            handle.stop();
            assert!(conn.drain().await.is_empty());
            (handle, events)
        };

        let (result, (handle, mut events)) =
            timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
                .await
                .expect("session did not finish");
        result.unwrap();

        assert!(!handle.is_running());
        assert_eq!(
            drain_events(&mut events),
            vec![
                state_event(ConnectionState::Shutdown),
                event(Channel::Shutdown, "reactor shutdown detected"),
            ]
        );
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    async fn refused_port() -> u16 {
        let gateway = FakeGateway::bind().await;
        gateway.port()
    }

    fn is_state(e: &Event, state: ConnectionState) -> bool {
        *e == state_event(state)
    }

    async fn assert_corrupt_frame_reconnects(garbage: &[u8]) {
        let gateway = FakeGateway::bind().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(gateway.port()), registry);
        let handle = monitor.handle();

        let script = async move {
            let mut first = gateway.accept().await;
            first.handshake("trader42").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized")).await;

            first.send_raw(garbage).await;
            let seen = collect_until(&mut events, |e| is_state(e, ConnectionState::Connected)).await;
            assert_eq!(
                seen,
                vec![
                    state_event(ConnectionState::Disconnected),
                    state_event(ConnectionState::Connecting),
                    state_event(ConnectionState::ConnectPending),
                    state_event(ConnectionState::Connected),
                ]
            );
            assert_eq!(first.recv().await, None);

            let mut second = gateway.accept().await;
            second.handshake("trader43").await;
            collect_until(&mut events, |e| e.1.starts_with(".Authorized trader43")).await;

            handle.shutdown("done");
            assert_eq!(second.drain().await, vec!["exit done".to_string()]);
        };

        let (result, ()) = timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
            .await
            .expect("session did not finish");
        result.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_connection_and_reconnects() {
        assert_corrupt_frame_reconnects(b"x5:hello,").await;
    }

    #[tokio::test]
    async fn test_oversize_frame_drops_connection_and_reconnects() {
        assert_corrupt_frame_reconnects(b"99999999:").await;
    }

    #[tokio::test]
    async fn test_failed_connects_are_retried() {
        let port = refused_port().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(test_config(port), registry);
        let handle = monitor.handle();

        let script = async move {
            let first = collect_until(&mut events, |e| is_state(e, ConnectionState::ConnectFailed)).await;
            let second = collect_until(&mut events, |e| is_state(e, ConnectionState::ConnectFailed)).await;
            handle.shutdown("giving up");
            (first, second, events)
        };

        let (result, (first, second, mut events)) =
            timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
                .await
                .expect("session did not finish");
        result.unwrap();

        assert_eq!(
            first,
            vec![
                event(Channel::Status, "reactor startup"),
                state_event(ConnectionState::Connecting),
                state_event(ConnectionState::ConnectPending),
                state_event(ConnectionState::ConnectFailed),
            ]
        );
        assert_eq!(
            second,
            vec![
                state_event(ConnectionState::Connecting),
                state_event(ConnectionState::ConnectPending),
                state_event(ConnectionState::ConnectFailed),
            ]
        );

        let rest = drain_events(&mut events);
        assert_eq!(
            rest.last(),
            Some(&event(Channel::Shutdown, "reactor shutdown detected"))
        );
        assert!(rest
            .iter()
            .all(|(channel, _)| matches!(channel, Channel::Connection | Channel::Shutdown)));
    }

    #[tokio::test]
    async fn test_ticks_are_delivered_until_shutdown() {
        let port = refused_port().await;
        let (registry, mut events) = recording_registry();
        let mut monitor = Monitor::with_callbacks(
            test_config(port).with_reconnect(
                txtrader_monitor::ReconnectConfig::default().with_enabled(false),
            ),
            registry,
        );
        let fast = monitor.set_tick_interval(Duration::from_millis(30)).unwrap();
        assert!(monitor.set_tick_interval(Duration::ZERO).is_err());
        let handle: MonitorHandle = monitor.handle();

        let script = async move {
            let mut ticks = Vec::new();
            while ticks.len() < 3 {
                let seen = collect_until(&mut events, |e| e.0 == Channel::Tick).await;
                if let Some((_, payload)) = seen.last() {
                    ticks.push(payload.clone());
                }
            }
            handle.stop_ticker(fast);
            handle.shutdown("done");
            (ticks, events)
        };

        let (result, (ticks, mut events)) =
            timeout(SESSION_TIMEOUT, async { tokio::join!(monitor.run(), script) })
                .await
                .expect("session did not finish");
        result.unwrap();

        for payload in &ticks {
            let seconds: f64 = payload.parse().expect("tick payload is a timestamp");
            assert!(seconds > 1_600_000_000.0);
            assert_eq!(payload.split('.').nth(1).map(str::len), Some(3));
        }
        assert_eq!(
            drain_events(&mut events).last(),
            Some(&event(Channel::Shutdown, "reactor shutdown detected"))
        );
    }

    #[test]
    fn test_unknown_callback_name_is_rejected() {
        let mut monitor = Monitor::new(test_config(1));
        let result = monitor.set_callback_by_name("BOGUS", None);
        assert!(matches!(result, Err(MonitorError::InvalidChannel(name)) if name == "BOGUS"));

        let result = monitor.set_callbacks([("*", None), ("NOPE", None)]);
        assert!(matches!(result, Err(MonitorError::InvalidChannel(_))));
        monitor.set_callbacks([("*", None), ("status", None)]).unwrap();
    }
}
