//! # z397
//!
//! Rust client for the Z397 access-control bus converter.
//!
//! ## Features
//!
//! - Async/await API using Tokio
//! - Pipelined requests matched to replies by ID
//! - Per-request timeouts and connection-wide cancellation
//! - Converter reset over the Telnet console
//!
//! ## Quick Start
//!
//! ```no_run
//! use z397::Converter;
//!
//! #[tokio::main]
//! async fn main() -> z397::Result<()> {
//!     // Connect to converter
//!     let converter = Converter::new("192.168.1.50", z397::DEFAULT_PORT);
//!     converter.connect().await?;
//!
//!     // Read a controller clock
//!     let time = converter.get_time(2).await?;
//!     println!("{}", time);
//!
//!     // Disconnect
//!     converter.disconnect().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod converter;
pub mod error;
pub mod event;
pub mod registry;

// Re-exports
pub use converter::Converter;
pub use error::{Error, Result};
pub use event::Event;

// Re-export types
pub use z397_core::{DeviceError, DEFAULT_PORT};
pub use z397_types::{CommandKind, ConnectionState, Request, Response, ResponseData};
