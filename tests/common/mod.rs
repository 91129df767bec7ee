#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use txtrader_monitor::core::kernel::NetstringCodec;
use txtrader_monitor::{
    callback, Callback, CallbackRegistry, Channel, ConnectionState, MonitorConfig, ReconnectConfig,
};

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(15);

pub type Event = (Channel, String);

/// Loopback stand-in for the trading gateway
pub struct FakeGateway {
    listener: TcpListener,
}

impl FakeGateway {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind loopback listener");
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().expect("local addr").port()
    }

    pub async fn accept(&self) -> GatewayConnection {
        self.try_accept(STEP_TIMEOUT)
            .await
            .expect("monitor did not connect")
    }

    pub async fn try_accept(&self, within: Duration) -> Option<GatewayConnection> {
        let (stream, _) = timeout(within, self.listener.accept()).await.ok()?.ok()?;
        Some(GatewayConnection::new(stream))
    }
}

/// Server side of one monitor connection
pub struct GatewayConnection {
    framed: Framed<TcpStream, NetstringCodec>,
}

impl GatewayConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, NetstringCodec::new()),
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.framed.send(line.as_bytes()).await.expect("gateway send");
    }

    /// Queue several frames and write them out together
    pub async fn send_batch(&mut self, lines: &[&str]) {
        for line in lines {
            self.framed.feed(line.as_bytes()).await.expect("gateway feed");
        }
        SinkExt::<&[u8]>::flush(&mut self.framed)
            .await
            .expect("gateway flush");
    }

    /// Write bytes straight to the socket, bypassing the framing
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.expect("gateway raw write");
        stream.flush().await.expect("gateway raw flush");
    }

    /// Next frame from the monitor; `None` once it closed the socket
    pub async fn recv(&mut self) -> Option<String> {
        let next = timeout(STEP_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a frame from the monitor");
        match next {
            Some(Ok(payload)) => Some(String::from_utf8(payload.to_vec()).expect("utf-8 frame")),
            Some(Err(_)) | None => None,
        }
    }

    /// Every remaining frame until the monitor closes the socket
    pub async fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(frame) = self.recv().await {
            frames.push(frame);
        }
        frames
    }

    /// Greet, read the `auth` command, grant `session`; returns the auth frame
    pub async fn handshake(&mut self, session: &str) -> String {
        self.send(".connected to txtrader gateway").await;
        let auth = self.recv().await.expect("auth frame");
        self.send(&format!(".Authorized {} session granted", session))
            .await;
        auth
    }
}

pub fn test_config(port: u16) -> MonitorConfig {
    MonitorConfig::new("127.0.0.1", port, "trader", "s3cret")
        .with_options(json!({"execution-data": 1}))
        .expect("object options")
        .with_reconnect(
            ReconnectConfig::default()
                .with_initial_delay(Duration::from_millis(20))
                .with_max_delay(Duration::from_millis(100)),
        )
        .with_connect_timeout(Duration::from_secs(2))
}

pub fn recorder(events: mpsc::UnboundedSender<Event>) -> Callback {
    callback(move |channel, payload| {
        events.send((channel, payload.to_string())).ok();
        true
    })
}

/// Registry forwarding every channel's events to the returned receiver
pub fn recording_registry() -> (CallbackRegistry, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let registry = CallbackRegistry::with_default(|| recorder(tx.clone()));
    (registry, rx)
}

pub fn event(channel: Channel, payload: &str) -> Event {
    (channel, payload.to_string())
}

pub fn state_event(state: ConnectionState) -> Event {
    event(Channel::Connection, state.as_str())
}

/// Collect events up to and including the first one matching `done`
pub async fn collect_until<F>(events: &mut mpsc::UnboundedReceiver<Event>, done: F) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut seen = Vec::new();
    loop {
        let next = timeout(STEP_TIMEOUT, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for event; seen so far: {:?}", seen))
            .expect("event channel closed");
        let finished = done(&next);
        seen.push(next);
        if finished {
            return seen;
        }
    }
}

/// Everything already delivered
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut seen = Vec::new();
    while let Ok(next) = events.try_recv() {
        seen.push(next);
    }
    seen
}
