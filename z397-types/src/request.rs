//! Request envelope

use std::fmt;
use std::ops::RangeInclusive;

use crate::command::CommandKind;
use crate::error::Result;

/// Controller addresses that can appear on the bus (0x02..=0x69)
pub const ADDRESS_RANGE: RangeInclusive<u32> = 0x02..=0x69;

/// A request as handed to the converter client
///
/// `id` and `addr` are wider than the wire allows so that out-of-range
/// values coming from callers can be reported instead of truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Correlation ID (valid range 0..=255)
    pub id: u32,

    /// Controller address on the bus
    pub addr: Option<u32>,

    /// Command to run
    pub command: CommandKind,
}

impl Request {
    /// Create a request without an address
    pub fn new(id: u32, command: CommandKind) -> Self {
        Self {
            id,
            addr: None,
            command,
        }
    }

    /// Create a request addressed to a controller
    pub fn addressed(id: u32, addr: u32, command: CommandKind) -> Self {
        Self {
            id,
            addr: Some(addr),
            command,
        }
    }

    /// Build a request from its textual command name
    ///
    /// # Examples
    ///
    /// ```
    /// use z397_types::{CommandKind, Request};
    ///
    /// let request = Request::parse(7, Some(2), "get_sn").unwrap();
    /// assert_eq!(request.command, CommandKind::GetSn);
    /// ```
    pub fn parse(id: u32, addr: Option<u32>, command: &str) -> Result<Self> {
        Ok(Self {
            id,
            addr,
            command: command.parse()?,
        })
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.addr {
            Some(addr) => write!(f, "Request[{}](id={}, addr={})", self.command, self.id, addr),
            None => write!(f, "Request[{}](id={})", self.command, self.id),
        }
    }
}
