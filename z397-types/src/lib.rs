//! Type definitions for z397
//!
//! The caller-facing request/response envelope shared by every crate in the
//! workspace.

pub mod command;
pub mod error;
pub mod request;
pub mod response;

pub use command::CommandKind;
pub use error::{Error, Result};
pub use request::Request;
pub use response::{ConnectionState, Response, ResponseData};
