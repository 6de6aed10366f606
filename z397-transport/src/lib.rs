//! Transport layer for the Z397 converter
//!
//! Provides the TCP data link and the Telnet reset side channel.

pub mod error;
pub mod tcp;
pub mod telnet;

pub use error::{Error, Result};
pub use tcp::{TcpReader, TcpTransport, TcpWriter};
pub use telnet::TelnetReset;

use std::net::SocketAddr;

/// Resolve `host:port` to the first socket address
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addr_str = format!("{}:{}", host, port);

    let mut addrs = tokio::net::lookup_host(&addr_str)
        .await
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", addr_str, e)))?;

    addrs
        .next()
        .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", addr_str)))
}
