//! Response envelope and payloads

use std::fmt;

use chrono::NaiveDateTime;

use crate::command::CommandKind;

/// Connection state of a converter link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket (initial and terminal state)
    Disconnected,

    /// Socket is being opened
    Connecting,

    /// Socket open and mode-enable frame sent
    Connected,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Data carried by a successful response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseData {
    /// Result of connect/disconnect
    Connection(ConnectionState),

    /// Reboot command was handed to the converter
    ResetInitiated,

    /// Controller addresses found by a bus scan
    Addresses(Vec<u8>),

    /// Controller serial number
    SerialNumber(u16),

    /// Controller clock (the device keeps no time zone)
    Time(NaiveDateTime),

    /// Command acknowledged
    Ok,
}

impl ResponseData {
    /// Command kind this data answers, for bus commands
    ///
    /// Lifecycle data is shared by several commands and returns `None`.
    pub fn bus_command(&self) -> Option<CommandKind> {
        match self {
            Self::Addresses(_) => Some(CommandKind::Scan),
            Self::SerialNumber(_) => Some(CommandKind::GetSn),
            Self::Time(_) => Some(CommandKind::GetTime),
            Self::Ok | Self::Connection(_) | Self::ResetInitiated => None,
        }
    }
}

impl fmt::Display for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(state) => write!(f, "{}", state),
            Self::ResetInitiated => f.write_str("reset initiated"),
            Self::Addresses(addrs) => write!(f, "{:?}", addrs),
            Self::SerialNumber(sn) => write!(f, "{}", sn),
            Self::Time(time) => write!(f, "{}", time),
            Self::Ok => f.write_str("ok"),
        }
    }
}

/// Response to a [`Request`](crate::Request)
///
/// Failures are reported through `Result::Err` rather than an error slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Correlation ID copied from the request
    pub id: u32,

    /// Controller address reported by the device, if any
    pub addr: Option<u8>,

    /// Command that was answered
    pub command: CommandKind,

    /// Payload
    pub data: ResponseData,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Response[{}](id={}", self.command, self.id)?;
        if let Some(addr) = self.addr {
            write!(f, ", addr={}", addr)?;
        }
        write!(f, ", data={})", self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_data_display() {
        assert_eq!(ResponseData::Ok.to_string(), "ok");
        assert_eq!(ResponseData::ResetInitiated.to_string(), "reset initiated");
        assert_eq!(
            ResponseData::Connection(ConnectionState::Connected).to_string(),
            "connected"
        );
        assert_eq!(ResponseData::Addresses(vec![2, 9]).to_string(), "[2, 9]");
    }

    #[test]
    fn test_response_display() {
        let response = Response {
            id: 4,
            addr: Some(2),
            command: CommandKind::GetSn,
            data: ResponseData::SerialNumber(4660),
        };
        assert_eq!(response.to_string(), "Response[get_sn](id=4, addr=2, data=4660)");
    }

    #[test]
    fn test_bus_command() {
        assert_eq!(ResponseData::Addresses(vec![]).bus_command(), Some(CommandKind::Scan));
        assert_eq!(ResponseData::Ok.bus_command(), None);
    }
}
