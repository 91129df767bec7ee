//! Print gateway time updates and a local heartbeat every five seconds.
//!
//! Connection parameters come from the `TXTRADER_*` environment variables
//! (or a `.env` file). The session ends after twenty heartbeats.

use anyhow::Result;
use std::time::Duration;
use txtrader_monitor::{callback, Callback, Monitor, MonitorConfig};

fn printer() -> Callback {
    callback(|channel, data| {
        println!("{}: {}", channel, data);
        true
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).init();

    let config = MonitorConfig::builder().load_env_file(".env")?.build()?;
    let mut monitor = Monitor::new(config);
    let handle = monitor.handle();

    let mut beats = 0u32;
    monitor.set_callbacks([
        ("*", None),
        ("TIME", Some(printer())),
        (
            "STATUS",
            Some(callback(move |channel, data| {
                println!("{}: {}", channel, data);
                if data.starts_with(".Authorized") {
                    if let Err(e) = handle.send("accounts") {
                        eprintln!("accounts request failed: {}", e);
                    }
                }
                true
            })),
        ),
        (
            "TICK",
            Some(callback(move |channel, data| {
                beats += 1;
                println!("{} #{}: {}", channel, beats, data);
                beats < 20
            })),
        ),
    ])?;

    monitor.set_tick_interval(Duration::from_secs(5))?;
    monitor.run().await?;
    Ok(())
}
