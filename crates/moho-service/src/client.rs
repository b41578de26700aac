//! # Cache Requestor
//!
//! Typed client for the packet cache's reply surface. Sends one encoded
//! request over the request transport, blocks for the reply, and decodes it
//! by message type. A generic `Failure` reply — the service's answer to a
//! request it cannot classify — surfaces as [`Error::TransportFailure`].

use moho_wire::{
    BulkDataRequest, BulkDataResponse, DataRequest, DataResponse, Error, Failure, Message,
    Result, SensorRequest, SensorResponse,
};

use crate::transport::RequestTransport;

/// Typed requestor over any request transport.
pub struct CacheClient<T: RequestTransport> {
    transport: T,
}

impl<T: RequestTransport> CacheClient<T> {
    /// Client speaking through `transport`.
    pub fn new(transport: T) -> Self {
        CacheClient { transport }
    }

    /// Issue a single-channel window query.
    pub fn request_data(&mut self, request: &DataRequest) -> Result<DataResponse> {
        self.round_trip(request)
    }

    /// Issue a batch of window queries evaluated sequentially by the
    /// service.
    pub fn request_bulk_data(&mut self, request: &BulkDataRequest) -> Result<BulkDataResponse> {
        self.round_trip(request)
    }

    /// Enumerate every channel the cache currently holds.
    pub fn request_sensors(&mut self, request: &SensorRequest) -> Result<SensorResponse> {
        self.round_trip(request)
    }

    fn round_trip<Q: Message, R: Message>(&mut self, request: &Q) -> Result<R> {
        let payload = request.encode()?;
        let (reply_type, body) = self.transport.request(Q::MESSAGE_TYPE, payload)?;
        if reply_type == R::MESSAGE_TYPE {
            return R::decode(&body);
        }
        if reply_type == Failure::MESSAGE_TYPE {
            let failure = Failure::decode(&body)?;
            return Err(Error::TransportFailure(format!(
                "service replied with failure: {}",
                failure.details
            )));
        }
        Err(Error::InvalidMessage(format!(
            "unexpected reply type {reply_type}"
        )))
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
