//! Demultiplexes gateway frames into channels.
//!
//! A [`Router`] lives exactly as long as one TCP connection. It answers the
//! `.connected` greeting with the `auth` command, learns the session name from
//! `.Authorized`, and from then on maps `<session>.<suffix>` prefixes onto
//! channels. Anything it cannot place is reported on [`Channel::Status`].

use crate::core::types::Channel;
use tracing::{debug, warn};

/// Channel prefixes, relative to the session name, in match order
pub const CHANNEL_SUFFIXES: [(&str, Channel); 15] = [
    (".time: ", Channel::Time),
    (".error: ", Channel::Error),
    (".order.", Channel::Order),
    (".order-data ", Channel::OrderData),
    (".orders: ", Channel::Orders),
    (".ticket.", Channel::Ticket),
    (".ticket-data ", Channel::TicketData),
    (".open-order.", Channel::Order),
    (".execution.", Channel::Execution),
    (".executions: ", Channel::Executions),
    (".execution-data ", Channel::ExecutionData),
    (".symbol: ", Channel::Symbol),
    (".symbol-data: ", Channel::SymbolData),
    (".quote.", Channel::Quote),
    (".trade.", Channel::Trade),
];

const CURRENT_ACCOUNT_SUFFIX: &str = ".current-account";

/// What the monitor should do in response to a frame, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterAction {
    /// Hand `payload` to the handler registered for `channel`
    Deliver { channel: Channel, payload: String },
    /// Answer the greeting with the `auth` command
    Authenticate,
}

impl RouterAction {
    fn deliver(channel: Channel, payload: impl Into<String>) -> Self {
        Self::Deliver {
            channel,
            payload: payload.into(),
        }
    }
}

/// Per-connection routing state
#[derive(Debug, Default)]
pub struct Router {
    session: Option<String>,
    prefixes: Vec<(String, Channel)>,
    account_prefix: Option<String>,
    last_account: String,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session name granted by the server, once authorized
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn is_authorized(&self) -> bool {
        self.session.is_some()
    }

    /// Classify one decoded frame
    pub fn route(&mut self, data: &str) -> Vec<RouterAction> {
        if data.starts_with('.') {
            return self.route_status(data);
        }

        if let Some(action) = self.match_prefix(data) {
            return vec![action];
        }

        if let Some(account_prefix) = &self.account_prefix {
            if data.starts_with(account_prefix.as_str()) {
                if self.last_account == data {
                    debug!("suppressing repeated current-account notification");
                    return Vec::new();
                }
                self.last_account = data.to_string();
            }
        }

        vec![RouterAction::deliver(Channel::Status, data)]
    }

    fn route_status(&mut self, data: &str) -> Vec<RouterAction> {
        let mut actions = vec![RouterAction::deliver(Channel::Status, data)];

        if starts_with_ignore_case(data, ".connected") {
            actions.push(RouterAction::Authenticate);
        } else if starts_with_ignore_case(data, ".authorized") {
            match data.split_whitespace().nth(1) {
                Some(session) => self.authorize(session),
                None => warn!(line = data, "authorization line without session name"),
            }
        }

        actions
    }

    fn authorize(&mut self, session: &str) {
        debug!(session, "session authorized; building channel map");
        self.prefixes = CHANNEL_SUFFIXES
            .iter()
            .map(|(suffix, channel)| (format!("{}{}", session, suffix), *channel))
            .collect();
        self.account_prefix = Some(format!("{}{}", session, CURRENT_ACCOUNT_SUFFIX));
        self.last_account.clear();
        self.session = Some(session.to_string());
    }

    fn match_prefix(&self, data: &str) -> Option<RouterAction> {
        self.prefixes.iter().find_map(|(prefix, channel)| {
            data.strip_prefix(prefix.as_str())
                .map(|rest| RouterAction::deliver(*channel, rest))
        })
    }
}

fn starts_with_ignore_case(data: &str, prefix: &str) -> bool {
    data.len() >= prefix.len()
        && data.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
