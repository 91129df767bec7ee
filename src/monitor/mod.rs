//! The session controller.
//!
//! A [`Monitor`] owns the configuration, the callback registry, the tickers
//! and the single gateway connection. [`Monitor::run`] drives everything from
//! one cooperative loop: socket reads, connection attempts, reconnect backoff,
//! timers, queued [`MonitorHandle`] requests and termination signals. Callbacks
//! run synchronously on that loop, so a slow callback stalls all of them.
//!
//! Shutdown has a single entry point. A callback returning `false`, a signal,
//! or [`MonitorHandle::shutdown`] all mark the session as ending, cancel the
//! tickers, send `exit <reason>` if connected and close the socket; the loop
//! then winds down once no transport remains.

pub mod handle;
mod signals;
pub mod ticker;

use crate::core::callbacks::{CallbackRegistry, Callback};
use crate::core::config::MonitorConfig;
use crate::core::errors::MonitorError;
use crate::core::kernel::codec::NetstringCodec;
use crate::core::kernel::reconnect::ReconnectPolicy;
use crate::core::kernel::router::{Router, RouterAction};
use crate::core::kernel::transport::{TcpTransport, Transport};
use crate::core::types::{Channel, ConnectionState};
use futures_util::future::BoxFuture;
use handle::{validate_period, Command, Shared};
use secrecy::ExposeSecret;
use signals::TerminationSignals;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use ticker::{TickerId, Tickers};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

pub use handle::MonitorHandle;

type ConnectFuture = BoxFuture<'static, Result<Box<dyn Transport>, MonitorError>>;

/// One open gateway connection and the routing state that lives with it
struct Connection {
    transport: Box<dyn Transport>,
    router: Router,
}

impl Connection {
    fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            router: Router::new(),
        }
    }
}

enum LoopEvent {
    Signal(&'static str),
    Command(Command),
    Tick(TickerId),
    Connected(Result<Box<dyn Transport>, MonitorError>),
    Frame(Option<Result<String, MonitorError>>),
    Retry,
}

/// Persistent client session for the gateway status feed
pub struct Monitor {
    config: MonitorConfig,
    callbacks: CallbackRegistry,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: mpsc::UnboundedReceiver<Command>,
    shared: Arc<Shared>,
    tickers: Tickers,
    reconnect: ReconnectPolicy,
    connection: Option<Connection>,
    connecting: Option<ConnectFuture>,
    retry_at: Option<Instant>,
    // cleared by an explicit disconnect, restored by connect
    auto_reconnect: bool,
    shutdown_pending: bool,
    exit_reason: Option<String>,
    stop_requested: bool,
}

impl Monitor {
    /// Create a monitor whose channels all print to stdout
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_callbacks(config, CallbackRegistry::new())
    }

    pub fn with_callbacks(config: MonitorConfig, callbacks: CallbackRegistry) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(ConnectionState::Initializing);
        let reconnect = ReconnectPolicy::new(config.reconnect.clone());
        debug!(?config, "monitor created");

        Self {
            config,
            callbacks,
            state: ConnectionState::Initializing,
            state_tx,
            commands_tx,
            commands_rx,
            shared: Arc::new(Shared::default()),
            tickers: Tickers::default(),
            reconnect,
            connection: None,
            connecting: None,
            retry_at: None,
            auto_reconnect: true,
            shutdown_pending: false,
            exit_reason: None,
            stop_requested: false,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_shutdown_pending(&self) -> bool {
        self.shutdown_pending
    }

    /// A handle for use inside callbacks or from other tasks
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle::new(
            self.commands_tx.clone(),
            self.state_tx.subscribe(),
            Arc::clone(&self.shared),
        )
    }

    /// Replace every handler from named entries (`*` sets the default)
    pub fn set_callbacks<I, K>(&mut self, entries: I) -> Result<(), MonitorError>
    where
        I: IntoIterator<Item = (K, Option<Callback>)>,
        K: AsRef<str>,
    {
        self.callbacks = CallbackRegistry::from_entries(entries)?;
        Ok(())
    }

    pub fn set_callback_registry(&mut self, callbacks: CallbackRegistry) {
        self.callbacks = callbacks;
    }

    /// Set or suppress (`None`) the handler for one channel
    pub fn set_callback(&mut self, channel: Channel, handler: Option<Callback>) {
        self.callbacks.set(channel, handler);
    }

    pub fn set_callback_by_name(
        &mut self,
        name: &str,
        handler: Option<Callback>,
    ) -> Result<(), MonitorError> {
        self.callbacks.set_by_name(name, handler)
    }

    /// Start a timer delivering `TICK` events every `period`
    pub fn set_tick_interval(&mut self, period: Duration) -> Result<TickerId, MonitorError> {
        validate_period(period)?;
        let id = self.shared.next_ticker_id();
        self.tickers.insert(id, period);
        Ok(id)
    }

    /// Cancel a timer; `false` if it was not running
    pub fn stop_ticker(&mut self, id: TickerId) -> bool {
        self.tickers.remove(id)
    }

    /// Queue `command` for the current connection
    pub fn send(&self, command: impl Into<String>) -> Result<(), MonitorError> {
        self.handle().send(command)
    }

    /// Begin shutdown; completes inside [`run`](Self::run)
    pub fn shutdown(&mut self, reason: impl Into<String>) {
        self.request_shutdown(reason.into());
    }

    /// Run the session until shutdown, a termination signal or `stop`
    pub async fn run(&mut self) -> Result<(), MonitorError> {
        let mut signals = TerminationSignals::install()?;
        self.shared.running.store(true, Ordering::Release);
        self.stop_requested = false;
        self.tickers.activate();
        debug!("event loop started");

        self.dispatch(Channel::Status, "reactor startup");
        self.connect();

        let mut aborted = false;
        loop {
            // a signal arriving while shutdown is already under way stops at once
            tokio::select! {
                biased;
                name = signals.recv(), if self.shutdown_pending => {
                    warn!(signal = name, "signal received during shutdown; stopping immediately");
                    aborted = true;
                    break;
                }
                _ = self.finish_shutdown() => {}
            }
            if self.should_stop() {
                break;
            }

            let event = tokio::select! {
                name = signals.recv() => LoopEvent::Signal(name),
                Some(command) = self.commands_rx.recv() => LoopEvent::Command(command),
                id = self.tickers.next_tick() => LoopEvent::Tick(id),
                result = poll_connecting(&mut self.connecting) => LoopEvent::Connected(result),
                frame = next_frame(&mut self.connection) => LoopEvent::Frame(frame),
                _ = sleep_until(self.retry_at) => LoopEvent::Retry,
            };

            if let LoopEvent::Signal(name) = event {
                if self.shutdown_pending {
                    warn!(signal = name, "signal received during shutdown; stopping immediately");
                    aborted = true;
                    break;
                }
                warn!(signal = name, "signal received; attempting graceful shutdown");
                self.request_shutdown(format!("received {}", name));
                self.stop_requested = true;
                continue;
            }
            self.handle_event(event).await;
        }

        if aborted {
            self.exit_reason = None;
            self.connection = None;
        } else {
            self.finish_shutdown().await;
            self.close_transport().await;
        }
        self.connecting = None;
        self.retry_at = None;
        self.tickers.clear();
        self.shared.running.store(false, Ordering::Release);
        debug!("event loop stopped");

        self.shutdown_pending = true;
        self.set_connection_state(ConnectionState::Shutdown);
        self.dispatch(Channel::Shutdown, "reactor shutdown detected");
        Ok(())
    }

    fn should_stop(&self) -> bool {
        self.stop_requested
            || (self.shutdown_pending && self.connection.is_none() && self.connecting.is_none())
    }

    async fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Signal(_) => {}
            LoopEvent::Command(command) => self.handle_command(command).await,
            LoopEvent::Tick(id) => {
                trace!(%id, "tick");
                let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
                self.dispatch(Channel::Tick, &format!("{:.3}", now));
            }
            LoopEvent::Connected(result) => {
                self.connecting = None;
                match result {
                    Ok(transport) => self.connected(transport).await,
                    Err(e) => {
                        error!(error = %e, address = %self.config.address(), "connection failed");
                        self.set_connection_state(ConnectionState::ConnectFailed);
                        self.schedule_retry();
                    }
                }
            }
            LoopEvent::Frame(Some(Ok(data))) => self.handle_frame(data).await,
            LoopEvent::Frame(Some(Err(e))) => {
                error!(error = %e, "connection corrupted; dropping");
                self.connection_lost();
            }
            LoopEvent::Frame(None) => {
                info!("connection closed by gateway");
                self.connection_lost();
            }
            LoopEvent::Retry => {
                self.retry_at = None;
                self.connect();
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send(frame) => self.send_frame(&frame).await,
            Command::Connect => {
                self.auto_reconnect = true;
                self.connect();
            }
            Command::Disconnect => self.disconnect().await,
            Command::Shutdown(reason) => self.request_shutdown(reason),
            Command::Stop => self.stop_requested = true,
            Command::StartTicker(id, period) => {
                if self.shutdown_pending {
                    debug!(%id, "ignoring ticker start during shutdown");
                } else {
                    self.tickers.insert(id, period);
                }
            }
            Command::StopTicker(id) => {
                self.tickers.remove(id);
            }
        }
    }

    fn set_connection_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "connection state");
        self.state = state;
        self.state_tx.send_replace(state);
        self.dispatch(Channel::Connection, state.as_str());
    }

    fn connect(&mut self) {
        if self.connection.is_some() {
            error!("connect requested while already connected");
            return;
        }
        if self.connecting.is_some() {
            error!("connect requested while a connection attempt is in progress");
            return;
        }
        if self.shutdown_pending {
            warn!("connect requested during shutdown");
            return;
        }

        self.retry_at = None;
        self.set_connection_state(ConnectionState::Connecting);

        let address = self.config.address();
        let timeout = self.config.connect_timeout;
        debug!(%address, "connecting");
        let attempt: ConnectFuture = Box::pin(async move {
            let transport = TcpTransport::connect(&address, timeout, NetstringCodec::new()).await?;
            Ok::<_, MonitorError>(Box::new(transport) as Box<dyn Transport>)
        });
        self.connecting = Some(attempt);
        self.set_connection_state(ConnectionState::ConnectPending);
    }

    async fn connected(&mut self, mut transport: Box<dyn Transport>) {
        if self.shutdown_pending || !self.auto_reconnect {
            debug!("discarding connection opened after disconnect was requested");
            transport.close().await.ok();
            self.set_connection_state(ConnectionState::Disconnected);
            return;
        }
        self.reconnect.reset();
        self.connection = Some(Connection::new(transport));
        self.set_connection_state(ConnectionState::Connected);
    }

    fn connection_lost(&mut self) {
        self.connection = None;
        self.set_connection_state(ConnectionState::Disconnected);
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        if self.shutdown_pending || !self.auto_reconnect || !self.reconnect.is_enabled() {
            return;
        }
        let delay = self.reconnect.next_delay();
        info!(
            attempt = self.reconnect.attempts(),
            delay_ms = delay.as_millis() as u64,
            "reconnecting after delay"
        );
        self.retry_at = Some(Instant::now() + delay);
    }

    /// Application-initiated close; no automatic reconnect follows
    async fn disconnect(&mut self) {
        self.auto_reconnect = false;
        self.retry_at = None;
        if self.connection.is_none() && self.connecting.is_none() {
            error!(state = %self.state, "disconnect requested while not connected");
            return;
        }

        self.set_connection_state(ConnectionState::DisconnectPending);
        self.connecting = None;
        self.close_transport().await;
        self.set_connection_state(ConnectionState::Disconnected);
    }

    async fn close_transport(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.transport.close().await {
                debug!(error = %e, "error closing transport");
            }
        }
    }

    async fn handle_frame(&mut self, data: String) {
        info!("RX: {}", data);
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let actions = connection.router.route(&data);

        for action in actions {
            match action {
                RouterAction::Deliver { channel, payload } => self.dispatch(channel, &payload),
                RouterAction::Authenticate => self.authenticate().await,
            }
        }
    }

    async fn authenticate(&mut self) {
        if self.shutdown_pending {
            return;
        }
        let command = self.config.auth_command();
        info!("TX: {}", self.config.auth_command_redacted());
        self.write(command.expose_secret()).await;
    }

    async fn send_frame(&mut self, frame: &str) {
        if self.connection.is_none() {
            warn!(frame, "dropping command queued while not connected");
            return;
        }
        info!("TX: {}", frame);
        self.write(frame).await;
    }

    async fn write(&mut self, frame: &str) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        if let Err(e) = connection.transport.send(frame).await {
            error!(error = %e, "send failed; dropping connection");
            self.connection_lost();
        }
    }

    /// Deliver one event, turning a `false` from the handler into shutdown
    fn dispatch(&mut self, channel: Channel, payload: &str) {
        if self.shutdown_pending && !matches!(channel, Channel::Connection | Channel::Shutdown) {
            debug!(%channel, "dropping event during shutdown");
            return;
        }
        if !self.callbacks.dispatch(channel, payload) {
            self.request_shutdown("client request".to_string());
        }
    }

    fn request_shutdown(&mut self, reason: String) {
        if self.shutdown_pending {
            return;
        }
        info!(%reason, "shutdown requested");
        self.shutdown_pending = true;
        if !self.tickers.is_empty() {
            let cancelled = self.tickers.clear();
            debug!(cancelled, "tickers cancelled");
        }
        self.retry_at = None;
        self.exit_reason = Some(reason);
    }

    // Second half of shutdown: tell the gateway and close the socket.
    async fn finish_shutdown(&mut self) {
        let Some(reason) = self.exit_reason.take() else {
            return;
        };
        if self.connection.is_some() {
            let frame = format!("exit {}", reason);
            info!("TX: {}", frame);
            self.write(&frame).await;
        }
        if self.connection.is_some() || self.connecting.is_some() {
            self.disconnect().await;
        }
    }
}

async fn poll_connecting(
    connecting: &mut Option<ConnectFuture>,
) -> Result<Box<dyn Transport>, MonitorError> {
    match connecting.as_mut() {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

async fn next_frame(connection: &mut Option<Connection>) -> Option<Result<String, MonitorError>> {
    match connection.as_mut() {
        Some(connection) => connection.transport.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
