//! # Loopback Transport
//!
//! In-process pub/sub and router/dealer built on bounded channels,
//! implementing the seams in [`crate::transport`]. Payloads cross the
//! channels in wire form so the codec is exercised exactly as it would be
//! over the real transport.

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};

use moho_wire::{Error, Message, Packet, Result};

use crate::transport::{PacketSubscriber, ReplyTransport, RequestHandler, RequestTransport};

fn channel<T>(high_water_mark: usize) -> (Sender<T>, Receiver<T>) {
    if high_water_mark == 0 {
        unbounded()
    } else {
        bounded(high_water_mark)
    }
}

// ─── Pub/sub ────────────────────────────────────────────────────────────────

/// Publisher side of the loopback broadcast; fans encoded packets out to
/// every live subscriber.
#[derive(Clone)]
pub struct LoopbackBroadcast {
    subscribers: Arc<Mutex<Vec<Sender<Bytes>>>>,
    high_water_mark: usize,
}

impl LoopbackBroadcast {
    /// Broadcast hub with a per-subscriber receive high-water mark; zero
    /// means unbounded.
    pub fn new(high_water_mark: usize) -> Self {
        LoopbackBroadcast {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            high_water_mark,
        }
    }

    /// Attach a subscriber with the given receive timeout.
    pub fn subscribe(&self, timeout: Duration) -> LoopbackSubscriber {
        let (tx, rx) = channel(self.high_water_mark);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        LoopbackSubscriber { receiver: rx, timeout }
    }

    /// Publish one packet to every live subscriber. A full subscriber queue
    /// blocks the publisher — that is the backpressure signal.
    pub fn publish(&self, packet: &Packet) -> Result<()> {
        let payload = packet.encode()?;
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
        Ok(())
    }
}

/// Subscriber endpoint of the loopback broadcast.
pub struct LoopbackSubscriber {
    receiver: Receiver<Bytes>,
    timeout: Duration,
}

impl PacketSubscriber for LoopbackSubscriber {
    fn receive(&mut self) -> Result<Option<Packet>> {
        match self.receiver.recv_timeout(self.timeout) {
            Ok(payload) => Packet::decode(&payload).map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::TransportFailure("broadcast closed".into()))
            }
        }
    }
}

// ─── Request/reply ──────────────────────────────────────────────────────────

struct RequestEnvelope {
    message_type: String,
    payload: Bytes,
    reply_tx: Sender<(String, Bytes)>,
}

/// Server side of the loopback router/dealer.
pub struct LoopbackReplier {
    requests: Receiver<RequestEnvelope>,
    polling_timeout: Duration,
}

/// Connection point handed to clients of a [`LoopbackReplier`].
#[derive(Clone)]
pub struct LoopbackEndpoint {
    requests: Sender<RequestEnvelope>,
}

/// Create a reply server plus the endpoint clients connect through.
/// `high_water_mark` bounds the pending-request queue; zero means
/// unbounded.
pub fn loopback_replier(
    polling_timeout: Duration,
    high_water_mark: usize,
) -> (LoopbackReplier, LoopbackEndpoint) {
    let (tx, rx) = channel(high_water_mark);
    (
        LoopbackReplier {
            requests: rx,
            polling_timeout,
        },
        LoopbackEndpoint { requests: tx },
    )
}

impl ReplyTransport for LoopbackReplier {
    fn serve(
        &mut self,
        running: Arc<AtomicBool>,
        handler: Arc<dyn RequestHandler>,
    ) -> Result<()> {
        while running.load(Ordering::Relaxed) {
            match self.requests.recv_timeout(self.polling_timeout) {
                Ok(envelope) => {
                    let (reply_type, body) =
                        handler.handle(&envelope.message_type, &envelope.payload);
                    // A requestor that gave up is its own problem.
                    let _ = envelope.reply_tx.send((reply_type, body));
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }
}

impl LoopbackEndpoint {
    /// Connect a requestor with the given receive timeout.
    pub fn connect(&self, receive_timeout: Duration) -> LoopbackRequestor {
        LoopbackRequestor {
            requests: self.requests.clone(),
            receive_timeout,
        }
    }
}

/// Client side of the loopback router/dealer.
pub struct LoopbackRequestor {
    requests: Sender<RequestEnvelope>,
    receive_timeout: Duration,
}

impl RequestTransport for LoopbackRequestor {
    fn request(&mut self, message_type: &str, payload: Bytes) -> Result<(String, Bytes)> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(RequestEnvelope {
                message_type: message_type.to_string(),
                payload,
                reply_tx,
            })
            .map_err(|_| Error::TransportFailure("reply server is gone".into()))?;
        match reply_rx.recv_timeout(self.receive_timeout) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => Err(Error::TransportFailure(
                "timed out waiting for reply".into(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(Error::TransportFailure(
                "reply server dropped the request".into(),
            )),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
