use crate::core::kernel::reconnect::ReconnectConfig;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value};
use std::env;
use std::fmt;
use std::time::Duration;

pub const HOST_VAR: &str = "TXTRADER_HOST";
pub const PORT_VAR: &str = "TXTRADER_TCP_PORT";
pub const USERNAME_VAR: &str = "TXTRADER_USERNAME";
pub const PASSWORD_VAR: &str = "TXTRADER_PASSWORD";

const REDACTED: &str = "********";

/// Connection parameters for one monitor session
///
/// Read-only once the monitor owns it. The password is kept behind
/// [`Secret`] and never appears in `Debug` output or logs.
#[derive(Clone)]
pub struct MonitorConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret<String>,
    /// Sent verbatim as JSON in the `auth` command
    pub options: Map<String, Value>,
    pub reconnect: ReconnectConfig,
    pub connect_timeout: Duration,
}

impl fmt::Debug for MonitorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &REDACTED)
            .field("options", &self.options)
            .field("reconnect", &self.reconnect)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl MonitorConfig {
    /// Create a configuration with explicit credentials and no options
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: Secret::new(password.into()),
            options: Map::new(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Start a builder whose omitted fields fall back to `TXTRADER_*` variables
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `TXTRADER_HOST`
    /// - `TXTRADER_TCP_PORT`
    /// - `TXTRADER_USERNAME`
    /// - `TXTRADER_PASSWORD`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Replace the auth options; anything but a JSON object is rejected
    pub fn with_options(mut self, options: Value) -> Result<Self, ConfigError> {
        self.options = options_from_value(options)?;
        Ok(self)
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` as passed to the socket connect
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get password (use carefully - exposes secret)
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }

    /// The `auth` command sent after `.connected`
    pub fn auth_command(&self) -> Secret<String> {
        Secret::new(self.format_auth(self.password()))
    }

    /// The `auth` command with the password masked, for logs
    pub fn auth_command_redacted(&self) -> String {
        self.format_auth(REDACTED)
    }

    fn format_auth(&self, password: &str) -> String {
        format!(
            "auth {} {} {}",
            self.username,
            password,
            Value::Object(self.options.clone())
        )
    }
}

fn options_from_value(options: Value) -> Result<Map<String, Value>, ConfigError> {
    match options {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(ConfigError::InvalidOptions(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Builder for [`MonitorConfig`]
///
/// Any connection parameter left unset is looked up in the environment when
/// [`build`](Self::build) runs.
#[derive(Debug, Default, Clone)]
pub struct MonitorConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<Secret<String>>,
    options: Option<Value>,
    reconnect: Option<ReconnectConfig>,
    connect_timeout: Option<Duration>,
}

impl MonitorConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password.into()));
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = Some(reconnect);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Load variables from a `.env` file before building
    ///
    /// A missing file is fine; existing process variables are not overridden.
    #[cfg(feature = "env-file")]
    pub fn load_env_file(self, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }
        Ok(self)
    }

    /// Build, reading omitted parameters from the process environment
    pub fn build(self) -> Result<MonitorConfig, ConfigError> {
        self.build_with_env(|key| env::var(key).ok())
    }

    /// Build, reading omitted parameters through `lookup`
    pub fn build_with_env<F>(self, lookup: F) -> Result<MonitorConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |value: Option<String>, var: &str| -> Result<String, ConfigError> {
            value
                .or_else(|| lookup(var))
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvironmentVariable(var.to_string()))
        };

        let host = required(self.host, HOST_VAR)?;
        let port = match self.port {
            Some(port) => port,
            None => {
                let raw = required(None, PORT_VAR)?;
                raw.trim().parse::<u16>().map_err(|_| {
                    ConfigError::InvalidConfiguration(format!("{} is not a valid port: {}", PORT_VAR, raw))
                })?
            }
        };
        let username = required(self.username, USERNAME_VAR)?;
        let password = match self.password {
            Some(password) => password,
            None => Secret::new(required(None, PASSWORD_VAR)?),
        };
        let options = options_from_value(self.options.unwrap_or(Value::Null))?;

        Ok(MonitorConfig {
            host,
            port,
            username,
            password,
            options,
            reconnect: self.reconnect.unwrap_or_default(),
            connect_timeout: self.connect_timeout.unwrap_or(Duration::from_secs(30)),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
