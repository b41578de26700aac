//! # Packet Cache Service
//!
//! Wires the capped collection to the outside world. One service instance
//! runs three threads sharing a single collection:
//!
//! 1. **Feeder** — pulls packets off the pub/sub broadcast into a bounded
//!    queue (blocking on a full queue is the backpressure signal).
//! 2. **Drainer** — pops the queue, runs the sanitizer, and files admitted
//!    packets into the collection.
//! 3. **Replier** — serves data and sensor queries through the reply
//!    transport's callback.
//!
//! Shutdown is cooperative: a shared flag clears, every loop observes it at
//! its next bounded wait, and the threads are joined. The reply handler
//! never lets an error escape to the transport — every request produces a
//! reply carrying a typed return code.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use moho_cache::{CappedCollection, PacketSanitizer};
use moho_wire::{
    BulkDataRequest, BulkDataResponse, DataRequest, DataResponse, Failure, Message, Packet,
    Result, ReturnCode, SensorRequest, SensorResponse,
};

use crate::config::ServiceConfig;
use crate::transport::{PacketSubscriber, ReplyTransport, RequestHandler};

/// Bounded wait used by the drainer so a stop propagates promptly.
const QUEUE_POP_TIMEOUT: Duration = Duration::from_millis(10);

// ─── Reply handler ──────────────────────────────────────────────────────────

/// Reply-side dispatcher over one capped collection.
pub struct CacheHandler {
    collection: Arc<CappedCollection>,
}

impl CacheHandler {
    /// Handler serving queries from `collection`.
    pub fn new(collection: Arc<CappedCollection>) -> Self {
        CacheHandler { collection }
    }

    fn perform_data_request(&self, request: &DataRequest) -> DataResponse {
        let mut response = DataResponse::default();
        response.identifier = request.identifier;
        let name = request.name();
        if !self.collection.have_sensor(&name) {
            response.return_code = ReturnCode::NoSensor;
            return response;
        }
        let queried = self.collection.get_packets(
            &name,
            request.query_start_time_us,
            request.query_end_time_us,
        );
        match queried.and_then(|packets| response.set_packets(packets)) {
            Ok(()) => {}
            Err(e) => {
                error!(channel = %name, error = %e, "query failed");
                response.return_code = ReturnCode::AlgorithmicFailure;
            }
        }
        response
    }

    fn encode_reply<M: Message>(message: &M) -> (String, Bytes) {
        match message.encode() {
            Ok(body) => (M::MESSAGE_TYPE.to_string(), body),
            Err(e) => {
                error!(error = %e, "failed to encode reply");
                let failure = Failure {
                    details: format!("failed to encode reply: {e}"),
                };
                (
                    Failure::MESSAGE_TYPE.to_string(),
                    failure.encode().unwrap_or_default(),
                )
            }
        }
    }
}

impl RequestHandler for CacheHandler {
    fn handle(&self, message_type: &str, payload: &[u8]) -> (String, Bytes) {
        debug!(message_type, "request received");
        match message_type {
            DataRequest::MESSAGE_TYPE => {
                let request = match DataRequest::decode(payload) {
                    Ok(request) => request,
                    Err(e) => {
                        error!(error = %e, "received invalid data request");
                        let mut response = DataResponse::default();
                        response.return_code = ReturnCode::InvalidMessage;
                        return Self::encode_reply(&response);
                    }
                };
                let response = self.perform_data_request(&request);
                debug!("replying to data request");
                Self::encode_reply(&response)
            }
            BulkDataRequest::MESSAGE_TYPE => {
                let request = match BulkDataRequest::decode(payload) {
                    Ok(request) => request,
                    Err(e) => {
                        error!(error = %e, "received invalid bulk data request");
                        let mut response = BulkDataResponse::default();
                        response.return_code = ReturnCode::InvalidMessage;
                        return Self::encode_reply(&response);
                    }
                };
                let mut response = BulkDataResponse::default();
                response.identifier = request.identifier;
                for sub_request in request.requests() {
                    response.add_response(self.perform_data_request(sub_request));
                }
                debug!("replying to bulk data request");
                Self::encode_reply(&response)
            }
            SensorRequest::MESSAGE_TYPE => {
                let request = match SensorRequest::decode(payload) {
                    Ok(request) => request,
                    Err(e) => {
                        error!(error = %e, "received invalid sensor request");
                        let response = SensorResponse {
                            return_code: ReturnCode::InvalidMessage,
                            ..Default::default()
                        };
                        return Self::encode_reply(&response);
                    }
                };
                let response = SensorResponse {
                    names: self.collection.sensor_names(),
                    identifier: request.identifier,
                    return_code: ReturnCode::Success,
                };
                debug!("replying to sensor request");
                Self::encode_reply(&response)
            }
            other => {
                // Reply anyway so the client is not left waiting forever.
                error!(message_type = other, "unhandled message type");
                Self::encode_reply(&Failure {
                    details: format!("unhandled message type {other}"),
                })
            }
        }
    }
}

// ─── Service runtime ────────────────────────────────────────────────────────

/// Running packet cache service instance.
///
/// Dropping the service stops the threads cooperatively and joins them.
pub struct CacheService {
    running: Arc<AtomicBool>,
    collection: Arc<CappedCollection>,
    feeder: Option<JoinHandle<()>>,
    drainer: Option<JoinHandle<()>>,
    replier: Option<JoinHandle<()>>,
}

impl CacheService {
    /// Start the ingest pipeline and the reply handler.
    pub fn start(
        config: &ServiceConfig,
        subscriber: Box<dyn PacketSubscriber>,
        mut reply: Box<dyn ReplyTransport>,
    ) -> Result<Self> {
        let collection = Arc::new(CappedCollection::new(
            config.cache.max_packets,
            &config.cache.blacklist,
        )?);
        let sanitizer = Arc::new(PacketSanitizer::new(config.sanitizer.clone())?);
        let running = Arc::new(AtomicBool::new(true));
        let (queue_tx, queue_rx) = crossbeam_channel::bounded(config.packet_queue_depth);

        info!(
            max_packets = config.cache.max_packets,
            queue_depth = config.packet_queue_depth,
            "starting packet cache service"
        );
        debug!("starting packet feeder thread");
        let feeder = {
            let running = running.clone();
            thread::Builder::new()
                .name("packet-feeder".into())
                .spawn(move || feeder_loop(running, subscriber, queue_tx))
                .expect("failed to spawn packet feeder")
        };
        debug!("starting queue to packet cache thread");
        let drainer = {
            let running = running.clone();
            let collection = collection.clone();
            thread::Builder::new()
                .name("packet-drainer".into())
                .spawn(move || drainer_loop(running, queue_rx, sanitizer, collection))
                .expect("failed to spawn packet drainer")
        };
        debug!("starting replier thread");
        let replier = {
            let running = running.clone();
            let handler: Arc<dyn RequestHandler> =
                Arc::new(CacheHandler::new(collection.clone()));
            thread::Builder::new()
                .name("cache-replier".into())
                .spawn(move || {
                    if let Err(e) = reply.serve(running, handler) {
                        error!(error = %e, "reply loop failed");
                    }
                    debug!("replier thread has exited");
                })
                .expect("failed to spawn replier")
        };
        Ok(CacheService {
            running,
            collection,
            feeder: Some(feeder),
            drainer: Some(drainer),
            replier: Some(replier),
        })
    }

    /// The collection every thread serves from.
    pub fn collection(&self) -> Arc<CappedCollection> {
        self.collection.clone()
    }

    /// Total packet count across every cached channel.
    pub fn total_number_of_packets(&self) -> usize {
        self.collection.total_number_of_packets()
    }

    /// True until [`stop`](CacheService::stop) is called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Cooperative shutdown; idempotent. Blocks until all threads join.
    pub fn stop(&mut self) {
        debug!("stopping packet cache service");
        self.running.store(false, Ordering::Relaxed);
        for handle in [
            self.feeder.take(),
            self.drainer.take(),
            self.replier.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }
    }
}

impl Drop for CacheService {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Ingest threads ─────────────────────────────────────────────────────────

fn feeder_loop(
    running: Arc<AtomicBool>,
    mut subscriber: Box<dyn PacketSubscriber>,
    queue: Sender<Packet>,
) {
    while running.load(Ordering::Relaxed) {
        match subscriber.receive() {
            Ok(Some(packet)) => {
                if queue.send(packet).is_err() {
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                // A bad packet or transport hiccup never stops the feed.
                error!(error = %e, "error receiving packet");
                continue;
            }
        }
    }
    debug!("packet feeder thread has exited");
}

fn drainer_loop(
    running: Arc<AtomicBool>,
    queue: Receiver<Packet>,
    sanitizer: Arc<PacketSanitizer>,
    collection: Arc<CappedCollection>,
) {
    while running.load(Ordering::Relaxed) {
        let packet = match queue.recv_timeout(QUEUE_POP_TIMEOUT) {
            Ok(packet) => packet,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        if packet.sample_count() == 0 {
            continue;
        }
        match sanitizer.admit(&packet) {
            Ok(true) => {
                if let Err(e) = collection.add_packet(packet) {
                    error!(error = %e, "failed to add packet");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "sanitizer could not classify packet"),
        }
    }
    debug!("queue to packet cache thread has exited");
}

// ─── Tests ──────────────────────────────────────────────────────────────────
