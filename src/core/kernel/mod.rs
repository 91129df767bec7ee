/// Monitor kernel - transport layer for the gateway session
///
/// This module holds everything below the session controller: how bytes
/// become frames, how frames become channel events, and how a lost connection
/// is retried. Nothing here invokes application callbacks or owns the
/// connection state.
///
/// # Architecture
///
/// ## Transport Layer
/// - `NetstringCodec`: `<len>:<payload>,` framing with a maximum frame length
/// - `Transport`: frame-level session trait
/// - `TcpTransport`: netstring transport over a TCP socket
///
/// ## Connection Recovery
/// - `ReconnectPolicy`: capped exponential backoff, reset on success
///
/// ## Message Handling
/// - `Router`: per-connection prefix table turning frames into channel events
///
/// # Usage
///
/// ```rust,no_run
/// use txtrader_monitor::core::kernel::*;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut transport =
///     TcpTransport::connect("127.0.0.1:50090", Duration::from_secs(30), NetstringCodec::new())
///         .await?;
/// let mut router = Router::new();
///
/// while let Some(frame) = transport.next_frame().await {
///     for action in router.route(&frame?) {
///         match action {
///             RouterAction::Deliver { channel, payload } => println!("{}: {}", channel, payload),
///             RouterAction::Authenticate => transport.send("auth user secret {}").await?,
///         }
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod reconnect;
pub mod router;
pub mod transport;

// Re-export key types for convenience
pub use codec::{FrameError, NetstringCodec, DEFAULT_MAX_FRAME_LENGTH};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use router::{Router, RouterAction, CHANNEL_SUFFIXES};
pub use transport::{ConnectionStats, TcpTransport, Transport};
