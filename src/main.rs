use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::Level;
use txtrader_monitor::{Monitor, MonitorConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "UPPER")]
enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warning => Self::WARN,
            LogLevel::Error | LogLevel::Critical => Self::ERROR,
        }
    }
}

#[derive(Parser)]
#[command(name = "txtrader_monitor", about = "Print the TxTrader gateway status feed")]
struct Args {
    /// Gateway host
    #[arg(long, env = "TXTRADER_HOST")]
    host: Option<String>,

    /// Gateway TCP port
    #[arg(long, env = "TXTRADER_TCP_PORT")]
    port: Option<u16>,

    /// Account username
    #[arg(long, env = "TXTRADER_USERNAME")]
    username: Option<String>,

    /// Account password
    #[arg(long, env = "TXTRADER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Session options sent with `auth`, as a JSON object
    #[arg(long)]
    options: Option<String>,

    /// Log verbosity
    #[arg(short = 'l', long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value = "WARNING")]
    log_level: LogLevel,
}

fn load_config(args: Args) -> Result<MonitorConfig> {
    let mut builder = MonitorConfig::builder();
    if let Some(host) = args.host {
        builder = builder.host(host);
    }
    if let Some(port) = args.port {
        builder = builder.port(port);
    }
    if let Some(username) = args.username {
        builder = builder.username(username);
    }
    if let Some(password) = args.password {
        builder = builder.password(password);
    }
    if let Some(options) = args.options {
        let options = serde_json::from_str(&options).context("--options is not valid JSON")?;
        builder = builder.options(options);
    }
    Ok(builder.build()?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    #[cfg(feature = "env-file")]
    dotenv::dotenv().ok();

    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(Level::from(args.log_level))
        .with_target(false)
        .init();

    let config = load_config(args)?;
    tracing::info!("Monitoring gateway at {}", config.address());

    let mut monitor = Monitor::new(config);
    monitor.run().await?;
    Ok(())
}
