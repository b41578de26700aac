//! # Wire Message Trait
//!
//! Every wire message has a globally unique type identifier, a version
//! string, and inverse `encode`/`decode` operations. The encoding is CBOR —
//! a self-describing binary object format that maps 1:1 onto JSON — so every
//! payload also has a pretty-printed JSON rendering for debugging.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};

/// A typed wire message.
pub trait Message: Sized {
    /// Globally unique message type identifier, e.g. `"DataRequest"`.
    const MESSAGE_TYPE: &'static str;
    /// Message format version.
    const MESSAGE_VERSION: &'static str = "1.0.0";

    /// Serialize to the CBOR wire form.
    fn encode(&self) -> Result<Bytes>;

    /// Deserialize from the CBOR wire form.
    ///
    /// Fails with [`Error::InvalidMessage`] when the bytes do not parse or
    /// when the declared message type does not match `Self`.
    fn decode(bytes: &[u8]) -> Result<Self>;

    /// Pretty-printed JSON rendering of the wire form.
    fn to_json_pretty(&self) -> Result<String>;
}

/// Encode a serde value as CBOR.
pub(crate) fn to_cbor<T: Serialize>(value: &T) -> Result<Bytes> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| Error::AlgorithmicFailure(format!("CBOR encode failed: {e}")))?;
    Ok(Bytes::from(buf))
}

/// Decode CBOR bytes into a serde value.
pub(crate) fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.is_empty() {
        return Err(Error::InvalidMessage("message is empty".into()));
    }
    ciborium::from_reader(bytes)
        .map_err(|e| Error::InvalidMessage(format!("CBOR decode failed: {e}")))
}

/// Render a serde value as indented JSON.
pub(crate) fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::AlgorithmicFailure(format!("JSON encode failed: {e}")))
}

/// Reject a decoded message whose declared type is not the expected one.
pub(crate) fn check_message_type(declared: &str, expected: &'static str) -> Result<()> {
    if declared != expected {
        return Err(Error::InvalidMessage(format!(
            "message type {declared} does not match {expected}"
        )));
    }
    Ok(())
}
