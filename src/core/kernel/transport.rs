use crate::core::errors::MonitorError;
use crate::core::kernel::codec::{payload_to_string, NetstringCodec};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

/// Frame-level session trait - pure transport layer
#[async_trait]
pub trait Transport: Send {
    /// Send one frame
    async fn send(&mut self, frame: &str) -> Result<(), MonitorError>;

    /// Receive the next frame
    ///
    /// `None` means the peer closed the connection cleanly. A framing or I/O
    /// error leaves the transport closed.
    async fn next_frame(&mut self) -> Option<Result<String, MonitorError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), MonitorError>;

    /// Check if the connection is alive
    fn is_connected(&self) -> bool;
}

/// Netstring transport over a plain TCP socket
pub struct TcpTransport {
    framed: Option<Framed<TcpStream, NetstringCodec>>,
    peer: String,
    connection_stats: ConnectionStats,
}

/// Traffic counters for one connection
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl TcpTransport {
    /// Open a TCP connection to `address`
    ///
    /// # Arguments
    /// * `address` - `host:port` of the gateway
    /// * `connect_timeout` - Upper bound for the TCP handshake
    /// * `codec` - Framing codec, carrying the maximum frame length
    #[instrument(skip(codec), fields(peer = %address))]
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        codec: NetstringCodec,
    ) -> Result<Self, MonitorError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| MonitorError::ConnectionTimeout(format!("connecting to {}", address)))?
            .map_err(|e| MonitorError::NetworkError(format!("connect to {} failed: {}", address, e)))?;
        stream.set_nodelay(true)?;
        debug!("tcp connection established");

        Ok(Self::from_stream(stream, address.to_string(), codec))
    }

    pub fn from_stream(stream: TcpStream, peer: String, codec: NetstringCodec) -> Self {
        Self {
            framed: Some(Framed::new(stream, codec)),
            peer,
            connection_stats: ConnectionStats::default(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Get connection statistics
    pub fn stats(&self) -> &ConnectionStats {
        &self.connection_stats
    }
}

#[async_trait]
impl Transport for TcpTransport {
    #[instrument(skip(self, frame), fields(peer = %self.peer, len = frame.len()))]
    async fn send(&mut self, frame: &str) -> Result<(), MonitorError> {
        let framed = self.framed.as_mut().ok_or(MonitorError::NotConnected)?;
        if let Err(e) = framed.send(frame.as_bytes()).await {
            self.framed = None;
            return Err(e.into());
        }
        self.connection_stats.frames_sent += 1;
        self.connection_stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<String, MonitorError>> {
        let framed = self.framed.as_mut()?;
        let result = match framed.next().await {
            Some(Ok(payload)) => {
                self.connection_stats.frames_received += 1;
                self.connection_stats.bytes_received += payload.len() as u64;
                payload_to_string(payload).map_err(MonitorError::from)
            }
            Some(Err(e)) => Err(e.into()),
            None => {
                self.framed = None;
                return None;
            }
        };
        if result.is_err() {
            self.framed = None;
        }
        Some(result)
    }

    async fn close(&mut self) -> Result<(), MonitorError> {
        if let Some(mut framed) = self.framed.take() {
            framed.get_mut().shutdown().await?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.framed.is_some()
    }
}
