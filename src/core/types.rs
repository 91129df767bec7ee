use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
    #[error("Unknown connection state: {0}")]
    UnknownConnectionState(String),
}

/// Logical message category the gateway can emit
///
/// The set is closed: every routed frame, timer tick and lifecycle
/// notification is tagged with exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Status,
    Error,
    Time,
    Order,
    OrderData,
    Orders,
    Ticket,
    TicketData,
    Execution,
    ExecutionData,
    Executions,
    Quote,
    Trade,
    Tick,
    Connection,
    Symbol,
    SymbolData,
    Shutdown,
}

impl Channel {
    pub const COUNT: usize = 18;

    /// All channels in declaration order
    pub const ALL: [Self; Self::COUNT] = [
        Self::Status,
        Self::Error,
        Self::Time,
        Self::Order,
        Self::OrderData,
        Self::Orders,
        Self::Ticket,
        Self::TicketData,
        Self::Execution,
        Self::ExecutionData,
        Self::Executions,
        Self::Quote,
        Self::Trade,
        Self::Tick,
        Self::Connection,
        Self::Symbol,
        Self::SymbolData,
        Self::Shutdown,
    ];

    /// Protocol name of the channel, e.g. `ORDER_DATA`
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "STATUS",
            Self::Error => "ERROR",
            Self::Time => "TIME",
            Self::Order => "ORDER",
            Self::OrderData => "ORDER_DATA",
            Self::Orders => "ORDERS",
            Self::Ticket => "TICKET",
            Self::TicketData => "TICKET_DATA",
            Self::Execution => "EXECUTION",
            Self::ExecutionData => "EXECUTION_DATA",
            Self::Executions => "EXECUTIONS",
            Self::Quote => "QUOTE",
            Self::Trade => "TRADE",
            Self::Tick => "TICK",
            Self::Connection => "CONNECTION",
            Self::Symbol => "SYMBOL",
            Self::SymbolData => "SYMBOL_DATA",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// Dense index into per-channel tables
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = TypesError;

    /// Accepts the protocol name in any case (`order_data`, `ORDER_DATA`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| TypesError::UnknownChannel(s.to_string()))
    }
}

/// Lifecycle of the single TCP session owned by a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Initializing,
    Connecting,
    ConnectPending,
    Connected,
    ConnectFailed,
    DisconnectPending,
    Disconnected,
    Shutdown,
}

impl ConnectionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Connecting => "CONNECTING",
            Self::ConnectPending => "CONNECT_PENDING",
            Self::Connected => "CONNECTED",
            Self::ConnectFailed => "CONNECT_FAILED",
            Self::DisconnectPending => "DISCONNECT_PENDING",
            Self::Disconnected => "DISCONNECTED",
            Self::Shutdown => "SHUTDOWN",
        }
    }

    /// Whether a transport is open or being opened
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::ConnectPending | Self::Connected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionState {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let state = match s.to_ascii_uppercase().as_str() {
            "INITIALIZING" => Self::Initializing,
            "CONNECTING" => Self::Connecting,
            "CONNECT_PENDING" => Self::ConnectPending,
            "CONNECTED" => Self::Connected,
            "CONNECT_FAILED" => Self::ConnectFailed,
            "DISCONNECT_PENDING" => Self::DisconnectPending,
            "DISCONNECTED" => Self::Disconnected,
            "SHUTDOWN" => Self::Shutdown,
            _ => return Err(TypesError::UnknownConnectionState(s.to_string())),
        };
        Ok(state)
    }
}
