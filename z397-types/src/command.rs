//! Logical commands accepted by the converter client

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Command named in a request envelope
///
/// The first three drive the connection itself; the rest travel over the bus
/// and are correlated by request ID.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Connect,
    Disconnect,
    Reset,
    Scan,
    GetSn,
    GetTime,
    SetTime,
    Open,
}

impl CommandKind {
    /// Every command, in wire-table order
    pub const ALL: [CommandKind; 8] = [
        Self::Connect,
        Self::Disconnect,
        Self::Reset,
        Self::Scan,
        Self::GetSn,
        Self::GetTime,
        Self::SetTime,
        Self::Open,
    ];

    /// Envelope name of the command
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Reset => "reset",
            Self::Scan => "scan",
            Self::GetSn => "get_sn",
            Self::GetTime => "get_time",
            Self::SetTime => "set_time",
            Self::Open => "open",
        }
    }
}

impl FromStr for CommandKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnknownCommand(s.to_string()))
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
