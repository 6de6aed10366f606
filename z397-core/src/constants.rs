//! Protocol constants

/// Telnet port of the converter's service console
pub const TELNET_PORT: u16 = 23;

/// Default connection timeout (seconds)
pub const DEFAULT_TIMEOUT: u64 = 5;

/// Default time to wait for a reply (milliseconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 2000;

/// Extra time the Telnet reset exchange gets on top of the request timeout (milliseconds)
pub const TELNET_EXTRA_TIMEOUT_MS: u64 = 2000;

/// Delay after `rst` is sent before a reset is reported (milliseconds)
pub const RESET_GRACE_MS: u64 = 3000;

/// License byte that opens every outgoing payload
pub const LICENSE: u8 = 0x08;

/// Frame terminator
pub const TERMINATOR: u8 = 0x0d;

/// Bytes that may open a frame
pub const START_BYTES: [u8; 4] = [0x1e, 0x20, 0x1f, 0x02];

/// Switches the converter into advanced mode; sent verbatim right after connect
pub const MODE_ENABLE_FRAME: [u8; 10] = [0xff, 0xfa, 0x2c, 0x01, 0x00, 0x03, 0x84, 0x00, 0xff, 0xf0];

/// Offsets inside a decoded packet
pub mod offsets {
    pub const CHECKSUM: usize = 0;
    pub const LENGTH: usize = 1;
    pub const LICENSE: usize = 2;
    pub const ID: usize = 3;
    pub const OPCODE: usize = 4;
    pub const ADDRESS: usize = 5;
}

/// Controller clock location in memory
pub mod clock {
    /// Memory bank number
    pub const BANK: u8 = 0x00;

    /// Bank type holding the clock registers
    pub const BANK_TYPE: u8 = 0xd0;

    /// Clock registers: sec, min, hour, weekday, day, month, year
    pub const LENGTH: u8 = 0x07;
}

/// Bytes of the scan bitmap that map onto bus addresses (0x02..=0x69)
pub const SCAN_BITMAP_LEN: usize = 13;

/// Lowest acknowledgement marker in write/open replies
pub const ACK_MARKER: u8 = 0x55;

/// Telnet prompt fragment
pub const TELNET_PROMPT: &str = "> ";

/// Telnet command that reboots the converter
pub const TELNET_RESET_COMMAND: &str = "rst";
