use crate::core::errors::MonitorError;
use crate::core::types::Channel;
use std::fmt;

/// Application handler for one channel
///
/// Receives the channel and its payload; returning `false` ends the session.
pub type Callback = Box<dyn FnMut(Channel, &str) -> bool + Send>;

/// Key selecting the handler used for every channel not listed explicitly
pub const DEFAULT_KEY: &str = "*";

/// Default handler: prints `<channel>: <payload>` to stdout
pub fn print_callback() -> Callback {
    Box::new(|channel: Channel, payload: &str| {
        println!("{}: {}", channel, payload);
        true
    })
}

/// Wrap a closure as a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: FnMut(Channel, &str) -> bool + Send + 'static,
{
    Box::new(f)
}

/// Total map from [`Channel`] to an optional handler
///
/// Every channel always has an entry; `None` means the channel is suppressed
/// (events are dropped and the session continues).
pub struct CallbackRegistry {
    entries: Vec<Option<Callback>>,
}

impl CallbackRegistry {
    /// Every channel prints
    pub fn new() -> Self {
        Self::with_default(print_callback)
    }

    /// Every channel suppressed
    pub fn silent() -> Self {
        Self {
            entries: Channel::ALL.iter().map(|_| None).collect(),
        }
    }

    /// Every channel gets a handler produced by `make`
    pub fn with_default<F>(mut make: F) -> Self
    where
        F: FnMut() -> Callback,
    {
        Self {
            entries: Channel::ALL.iter().map(|_| Some(make())).collect(),
        }
    }

    /// Build from named entries
    ///
    /// Keys are channel names in any case, plus `*` for the default applied to
    /// every channel not listed. Without `*` unlisted channels print.
    pub fn from_entries<I, K>(entries: I) -> Result<Self, MonitorError>
    where
        I: IntoIterator<Item = (K, Option<Callback>)>,
        K: AsRef<str>,
    {
        let mut explicit: Vec<Option<Option<Callback>>> = Channel::ALL.iter().map(|_| None).collect();
        let mut default: Option<Option<Callback>> = None;

        for (key, handler) in entries {
            let key = key.as_ref();
            if key == DEFAULT_KEY {
                default = Some(handler);
                continue;
            }
            let channel = parse_channel(key)?;
            explicit[channel.index()] = Some(handler);
        }

        // no `*` key: unlisted channels print
        let default_is_print = default.is_none();
        let mut shared_default = default.flatten().map(SharedCallback::new);

        let entries = explicit
            .into_iter()
            .map(|entry| match entry {
                Some(handler) => handler,
                None if default_is_print => Some(print_callback()),
                None => shared_default.as_mut().map(SharedCallback::handle),
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn set(&mut self, channel: Channel, handler: Option<Callback>) {
        self.entries[channel.index()] = handler;
    }

    pub fn set_by_name(&mut self, name: &str, handler: Option<Callback>) -> Result<(), MonitorError> {
        let channel = parse_channel(name)?;
        self.set(channel, handler);
        Ok(())
    }

    /// Whether events on `channel` reach a handler
    pub fn is_active(&self, channel: Channel) -> bool {
        self.entries[channel.index()].is_some()
    }

    /// Invoke the handler for `channel`
    ///
    /// Returns `false` only if a handler ran and asked to stop.
    pub fn dispatch(&mut self, channel: Channel, payload: &str) -> bool {
        match self.entries[channel.index()].as_mut() {
            Some(handler) => handler(channel, payload),
            None => true,
        }
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for channel in Channel::ALL {
            let state = if self.is_active(channel) { "handler" } else { "suppressed" };
            map.entry(&channel.as_str(), &state);
        }
        map.finish()
    }
}

fn parse_channel(name: &str) -> Result<Channel, MonitorError> {
    name.parse::<Channel>()
        .map_err(|_| MonitorError::InvalidChannel(name.to_string()))
}

// One `*` handler shared by all channels it covers. Dispatch is single-threaded,
// so the mutex is never contended.
struct SharedCallback(std::sync::Arc<std::sync::Mutex<Callback>>);

impl SharedCallback {
    fn new(handler: Callback) -> Self {
        Self(std::sync::Arc::new(std::sync::Mutex::new(handler)))
    }

    fn handle(&mut self) -> Callback {
        let shared = std::sync::Arc::clone(&self.0);
        Box::new(move |channel: Channel, payload: &str| match shared.lock() {
            Ok(mut handler) => (*handler)(channel, payload),
            Err(poisoned) => {
                let mut handler = poisoned.into_inner();
                (*handler)(channel, payload)
            }
        })
    }
}
