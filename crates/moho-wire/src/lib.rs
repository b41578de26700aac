//! # moho-wire
//!
//! Shared wire messages for the Moho seismic middleware.
//!
//! Every message — the broadcast data packet, the packet-cache requests and
//! responses — carries a type identifier, a version string, and inverse
//! CBOR `encode`/`decode` operations.
//!
//! ## Crate structure
//!
//! - [`packet`] — the data packet broadcast by field sensor feeds
//! - [`request`] — packet-cache request messages
//! - [`response`] — packet-cache response messages and return codes
//! - [`message`] — the common message trait and CBOR codec
//! - [`error`] — the error kinds surfaced across the core

pub mod error;
pub mod message;
pub mod packet;
pub mod request;
pub mod response;

pub use error::{Error, Result};
pub use message::Message;
pub use packet::Packet;
pub use request::{BulkDataRequest, DataRequest, SensorRequest};
pub use response::{BulkDataResponse, DataResponse, Failure, ReturnCode, SensorResponse};
