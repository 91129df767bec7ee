use crate::core::config::ConfigError;
use crate::core::errors::MonitorError;
use crate::core::types::ConnectionState;
use crate::monitor::ticker::TickerId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Requests queued for the monitor's event loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Send(String),
    Connect,
    Disconnect,
    Shutdown(String),
    Stop,
    StartTicker(TickerId, Duration),
    StopTicker(TickerId),
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub running: AtomicBool,
    next_ticker: AtomicU64,
}

impl Shared {
    pub fn next_ticker_id(&self) -> TickerId {
        TickerId(self.next_ticker.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Cloneable control surface for a running [`Monitor`](crate::Monitor)
///
/// Handles can be moved into callbacks (to answer a status line with a
/// command, for instance) or into other tasks. Every request is queued and
/// executed by the monitor's event loop in order.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    shared: Arc<Shared>,
}

impl MonitorHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        state: watch::Receiver<ConnectionState>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            commands,
            state,
            shared,
        }
    }

    /// Current connection state as last published by the event loop
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Queue `command` as a frame on the current connection
    ///
    /// Fails with [`MonitorError::NotConnected`] unless the session is
    /// `CONNECTED`.
    pub fn send(&self, command: impl Into<String>) -> Result<(), MonitorError> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(MonitorError::NotConnected);
        }
        self.enqueue(Command::Send(command.into()))
            .map_err(|_| MonitorError::NotConnected)
    }

    /// Open the connection (re-enables automatic reconnection)
    pub fn connect(&self) {
        self.enqueue(Command::Connect).ok();
    }

    /// Close the connection without reconnecting
    pub fn disconnect(&self) {
        self.enqueue(Command::Disconnect).ok();
    }

    /// End the session: stop tickers, send `exit <reason>`, disconnect
    pub fn shutdown(&self, reason: impl Into<String>) {
        self.enqueue(Command::Shutdown(reason.into())).ok();
    }

    /// Halt the event loop; does nothing when it is not running
    pub fn stop(&self) {
        if self.is_running() {
            self.enqueue(Command::Stop).ok();
        }
    }

    /// Start a timer delivering `TICK` events every `period`
    pub fn set_tick_interval(&self, period: Duration) -> Result<TickerId, MonitorError> {
        validate_period(period)?;
        let id = self.shared.next_ticker_id();
        self.enqueue(Command::StartTicker(id, period))
            .map_err(|_| MonitorError::NetworkError("monitor event loop is gone".to_string()))?;
        Ok(id)
    }

    /// Cancel a timer; unknown or already stopped ids are ignored
    pub fn stop_ticker(&self, id: TickerId) {
        self.enqueue(Command::StopTicker(id)).ok();
    }

    fn enqueue(&self, command: Command) -> Result<(), mpsc::error::SendError<Command>> {
        self.commands.send(command)
    }
}

pub(crate) fn validate_period(period: Duration) -> Result<(), MonitorError> {
    if period.is_zero() {
        return Err(ConfigError::InvalidConfiguration("tick interval must be positive".to_string()).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_with_state(
        state: ConnectionState,
    ) -> (MonitorHandle, mpsc::UnboundedReceiver<Command>, watch::Sender<ConnectionState>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(state);
        let handle = MonitorHandle::new(tx, state_rx, Arc::new(Shared::default()));
        (handle, rx, state_tx)
    }

    #[test]
    fn test_send_requires_connected() {
        let (handle, mut rx, state_tx) = handle_with_state(ConnectionState::ConnectPending);
        assert!(matches!(handle.send("help"), Err(MonitorError::NotConnected)));
        assert!(rx.try_recv().is_err());

        state_tx.send_replace(ConnectionState::Connected);
        handle.send("help").unwrap();
        assert_eq!(rx.try_recv().unwrap(), Command::Send("help".to_string()));
    }

    #[test]
    fn test_stop_ignored_when_not_running() {
        let (handle, mut rx, _state_tx) = handle_with_state(ConnectionState::Initializing);
        handle.stop();
        assert!(rx.try_recv().is_err());

        handle.shared.running.store(true, Ordering::Release);
        handle.stop();
        assert_eq!(rx.try_recv().unwrap(), Command::Stop);
    }

    #[test]
    fn test_ticker_ids_are_unique() {
        let (handle, mut rx, _state_tx) = handle_with_state(ConnectionState::Connected);
        let first = handle.set_tick_interval(Duration::from_secs(1)).unwrap();
        let second = handle.clone().set_tick_interval(Duration::from_secs(5)).unwrap();
        assert_ne!(first, second);
        assert_eq!(
            rx.try_recv().unwrap(),
            Command::StartTicker(first, Duration::from_secs(1))
        );
        assert!(handle.set_tick_interval(Duration::ZERO).is_err());
    }
}
