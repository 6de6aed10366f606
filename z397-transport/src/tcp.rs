//! TCP data link

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};
use z397_core::constants::DEFAULT_TIMEOUT;

use crate::error::*;

/// Connector for the converter's data channel
///
/// A successful [`connect`](Self::connect) yields independent read and write
/// halves, so one task can read while others send.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    addr: String,
    port: u16,
    socket_addr: Option<SocketAddr>,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create new TCP transport
    pub fn new(addr: impl Into<String>, port: u16) -> Self {
        Self {
            addr: addr.into(),
            port,
            socket_addr: None,
            connect_timeout: Duration::from_secs(DEFAULT_TIMEOUT),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve address to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.socket_addr {
            return Ok(addr);
        }

        let addr = crate::resolve(&self.addr, self.port).await?;
        self.socket_addr = Some(addr);
        Ok(addr)
    }

    /// Open the link
    pub async fn connect(&mut self) -> Result<(TcpReader, TcpWriter)> {
        let addr = self.resolve_addr().await?;

        debug!("Connecting to {}...", addr);

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(Error::Io)?;

        // Frames are small and latency bound
        stream.set_nodelay(true)?;

        debug!("Connected to {}", addr);

        let (read, write) = stream.into_split();
        Ok((
            TcpReader {
                half: read,
                peer: addr,
                buf: BytesMut::with_capacity(1024),
            },
            TcpWriter {
                half: Some(write),
                peer: addr,
            },
        ))
    }

    pub fn remote_addr(&self) -> String {
        self.socket_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| format!("{}:{}", self.addr, self.port))
    }
}

/// Read half of a link
#[derive(Debug)]
pub struct TcpReader {
    half: OwnedReadHalf,
    peer: SocketAddr,
    buf: BytesMut,
}

impl TcpReader {
    /// Wait for the next chunk of bytes
    ///
    /// Chunk boundaries carry no meaning. Returns `ConnectionClosed` once the
    /// peer has closed the stream.
    pub async fn receive(&mut self) -> Result<BytesMut> {
        self.buf.reserve(1024);

        let n = self.half.read_buf(&mut self.buf).await?;
        if n == 0 {
            return Err(Error::ConnectionClosed);
        }

        trace!(peer = %self.peer, n, data = hex::encode(&self.buf), "Received bytes");

        Ok(self.buf.split())
    }
}

/// Write half of a link
#[derive(Debug)]
pub struct TcpWriter {
    half: Option<OwnedWriteHalf>,
    peer: SocketAddr,
}

impl TcpWriter {
    /// Send raw bytes
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        let half = self.half.as_mut().ok_or(Error::NotConnected)?;

        trace!(peer = %self.peer, n = data.len(), data = hex::encode(data), "Sending bytes");

        half.write_all(data).await?;
        half.flush().await?;

        Ok(())
    }

    /// Close the write direction; later sends fail with `NotConnected`
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(mut half) = self.half.take() {
            debug!("Disconnecting from {}...", self.peer);
            half.shutdown().await?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.half.is_some()
    }
}
