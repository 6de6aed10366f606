//! Telnet reset side channel
//!
//! The converter's service console on port 23 accepts the device key and a
//! `rst` command. The exchange is driven by counting read fragments: the key
//! goes out on the 2nd fragment if it is the prompt, `rst` on the 4th.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace};
use z397_core::constants::{
    DEFAULT_REQUEST_TIMEOUT_MS, RESET_GRACE_MS, TELNET_EXTRA_TIMEOUT_MS, TELNET_PORT,
    TELNET_PROMPT, TELNET_RESET_COMMAND,
};

use crate::error::*;

const KEY_FRAGMENT: usize = 2;
const RESET_FRAGMENT: usize = 4;

/// Reboots a converter over its Telnet console
#[derive(Debug, Clone)]
pub struct TelnetReset {
    host: String,
    port: u16,
    key: String,
    timeout: Duration,
    grace: Duration,
}

impl TelnetReset {
    /// Create a reset for `host` using the device key
    pub fn new(host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: TELNET_PORT,
            key: key.into(),
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS + TELNET_EXTRA_TIMEOUT_MS),
            grace: Duration::from_millis(RESET_GRACE_MS),
        }
    }

    /// Set the console port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bound the whole exchange
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the delay between sending `rst` and reporting the reset
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Send the reset command
    ///
    /// Resolves once `rst` was written and the grace delay has passed. The
    /// converter is not confirmed to have rebooted.
    ///
    /// # Errors
    ///
    /// - `TelnetResetTimedOut` if the console did not reach the reset prompt in time
    /// - `TelnetResetFailed` on socket errors or if the console closed first
    pub async fn run(&self) -> Result<()> {
        debug!(host = %self.host, port = self.port, "Starting Telnet reset");

        timeout(self.timeout, self.exchange())
            .await
            .map_err(|_| Error::TelnetResetTimedOut)??;

        info!(host = %self.host, "Reset command sent");

        sleep(self.grace).await;
        Ok(())
    }

    async fn exchange(&self) -> Result<()> {
        let addr = crate::resolve(&self.host, self.port).await?;
        let mut stream = TcpStream::connect(addr).await.map_err(failed)?;

        let mut buf = [0u8; 512];
        let mut fragments = 0;

        loop {
            let n = stream.read(&mut buf).await.map_err(failed)?;
            if n == 0 {
                return Err(Error::TelnetResetFailed(
                    "console closed before the reset command".into(),
                ));
            }

            fragments += 1;
            let fragment = &buf[..n];
            trace!(fragments, data = %String::from_utf8_lossy(fragment), "Console fragment");

            if fragment != TELNET_PROMPT.as_bytes() {
                continue;
            }

            match fragments {
                KEY_FRAGMENT => {
                    stream
                        .write_all(format!("{}\r\n", self.key).as_bytes())
                        .await
                        .map_err(failed)?;
                }
                RESET_FRAGMENT => {
                    stream
                        .write_all(format!("{}\r\n", TELNET_RESET_COMMAND).as_bytes())
                        .await
                        .map_err(failed)?;
                    // The converter drops the console while rebooting
                    let _ = stream.shutdown().await;
                    return Ok(());
                }
                _ => {}
            }
        }
    }
}

fn failed(error: std::io::Error) -> Error {
    Error::TelnetResetFailed(error.to_string())
}
