//! # Transport Seams
//!
//! The middleware consumes, but does not implement, a zero-copy messaging
//! library offering pub/sub subscription and router/dealer request/reply
//! with per-request client correlation. These traits state exactly the
//! capabilities the core relies on; [`crate::memory`] provides an
//! in-process implementation for tests and single-process wiring.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bytes::Bytes;

use moho_wire::{Packet, Result};

/// Pub/sub subscriber yielding one decoded packet at a time.
pub trait PacketSubscriber: Send {
    /// Block up to the configured receive timeout for the next packet.
    /// `Ok(None)` means the timeout elapsed with nothing to deliver.
    fn receive(&mut self) -> Result<Option<Packet>>;
}

/// Handles one decoded request and produces exactly one reply.
pub trait RequestHandler: Send + Sync {
    /// `message_type` names the request's wire type; the return value is
    /// the reply's wire type plus its encoded body.
    ///
    /// Implementations never fail: undecodable or unknown requests still
    /// produce a reply, preserving the socket's one-reply-per-request
    /// invariant.
    fn handle(&self, message_type: &str, payload: &[u8]) -> (String, Bytes);
}

/// Router/dealer reply server. The transport owns client correlation and
/// guarantees one reply per request.
pub trait ReplyTransport: Send {
    /// Serve requests through `handler` until `running` clears.
    ///
    /// Implementations poll with a finite timeout so a stop propagates
    /// within one polling interval.
    fn serve(&mut self, running: Arc<AtomicBool>, handler: Arc<dyn RequestHandler>)
        -> Result<()>;
}

/// Router/dealer request client.
pub trait RequestTransport {
    /// Send one encoded request and block up to the configured receive
    /// timeout for the typed reply `(message_type, body)`.
    fn request(&mut self, message_type: &str, payload: Bytes) -> Result<(String, Bytes)>;
}
