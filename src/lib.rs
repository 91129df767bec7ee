pub mod core;
pub mod monitor;

pub use crate::core::{
    callbacks::{callback, print_callback, Callback, CallbackRegistry},
    config::{ConfigError, MonitorConfig},
    errors::MonitorError,
    kernel::ReconnectConfig,
    types::{Channel, ConnectionState},
};
pub use monitor::{ticker::TickerId, Monitor, MonitorHandle};
