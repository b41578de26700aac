//! # Cache Request Messages
//!
//! Requests accepted by the packet cache's router/dealer reply surface:
//! a single-channel window query, a bulk aggregation of those, and a sensor
//! enumeration. Each carries a client correlation identifier which the
//! service echoes on the response.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::{self, Message};

// ─── DataRequest ────────────────────────────────────────────────────────────

/// Single-channel window query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    /// Network code, e.g. `UU`.
    pub network: String,
    /// Station name, e.g. `ARUT`.
    pub station: String,
    /// Channel code, e.g. `EHZ`.
    pub channel: String,
    /// Location code, e.g. `01`.
    pub location_code: String,
    /// Window start, microseconds since the epoch.
    pub query_start_time_us: i64,
    /// Window end, microseconds since the epoch. `i64::MAX` keeps the window
    /// open — everything the cache holds from the start time forward.
    pub query_end_time_us: i64,
    /// Client correlation identifier, echoed on the response.
    pub identifier: u64,
}

impl Default for DataRequest {
    fn default() -> Self {
        DataRequest {
            network: String::new(),
            station: String::new(),
            channel: String::new(),
            location_code: String::new(),
            query_start_time_us: 0,
            query_end_time_us: i64::MAX,
            identifier: 0,
        }
    }
}

impl DataRequest {
    /// Channel name in `network.station.channel.location_code` form.
    pub fn name(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.channel, self.location_code
        )
    }

    fn wire(&self) -> DataRequestWire {
        DataRequestWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            network: self.network.clone(),
            station: self.station.clone(),
            channel: self.channel.clone(),
            location_code: self.location_code.clone(),
            query_start_time: self.query_start_time_us,
            query_end_time: self.query_end_time_us,
            identifier: self.identifier,
        }
    }

    fn from_wire(wire: DataRequestWire) -> Self {
        DataRequest {
            network: wire.network,
            station: wire.station,
            channel: wire.channel,
            location_code: wire.location_code,
            query_start_time_us: wire.query_start_time,
            query_end_time_us: wire.query_end_time,
            identifier: wire.identifier,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DataRequestWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "Network")]
    network: String,
    #[serde(rename = "Station")]
    station: String,
    #[serde(rename = "Channel")]
    channel: String,
    #[serde(rename = "LocationCode")]
    location_code: String,
    #[serde(rename = "QueryStartTime")]
    query_start_time: i64,
    #[serde(rename = "QueryEndTime")]
    query_end_time: i64,
    #[serde(rename = "Identifier")]
    identifier: u64,
}

impl Message for DataRequest {
    const MESSAGE_TYPE: &'static str = "DataRequest";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: DataRequestWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        Ok(Self::from_wire(wire))
    }

    fn to_json_pretty(&self) -> Result<String> {
        message::to_json_pretty(&self.wire())
    }
}

// ─── BulkDataRequest ────────────────────────────────────────────────────────

/// An ordered batch of [`DataRequest`]s evaluated sequentially by the
/// service, each sub-response carrying its own return code.
///
/// Sub-requests are de-duplicated by identifier, not by content: clients
/// must use distinct identifiers even for identical sub-requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDataRequest {
    requests: Vec<DataRequest>,
    /// Client correlation identifier for the batch as a whole.
    pub identifier: u64,
}

impl BulkDataRequest {
    /// Append a sub-request. Fails with [`Error::InvalidArgument`] when a
    /// sub-request with the same identifier is already present.
    pub fn add_request(&mut self, request: DataRequest) -> Result<()> {
        if self
            .requests
            .iter()
            .any(|r| r.identifier == request.identifier)
        {
            return Err(Error::InvalidArgument(format!(
                "data request with identifier {} already exists",
                request.identifier
            )));
        }
        self.requests.push(request);
        Ok(())
    }

    /// The sub-requests in insertion order.
    pub fn requests(&self) -> &[DataRequest] {
        &self.requests
    }

    /// Number of sub-requests.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    fn wire(&self) -> BulkDataRequestWire {
        BulkDataRequestWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            number_of_requests: self.requests.len(),
            requests: (!self.requests.is_empty())
                .then(|| self.requests.iter().map(DataRequest::wire).collect()),
            identifier: self.identifier,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct BulkDataRequestWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "NumberOfRequests")]
    number_of_requests: usize,
    #[serde(rename = "Requests")]
    requests: Option<Vec<DataRequestWire>>,
    #[serde(rename = "Identifier")]
    identifier: u64,
}

impl Message for BulkDataRequest {
    const MESSAGE_TYPE: &'static str = "BulkDataRequest";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: BulkDataRequestWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        let requests: Vec<DataRequest> = wire
            .requests
            .unwrap_or_default()
            .into_iter()
            .map(DataRequest::from_wire)
            .collect();
        if requests.len() != wire.number_of_requests {
            return Err(Error::InvalidMessage(format!(
                "bulk request declares {} sub-requests but carries {}",
                wire.number_of_requests,
                requests.len()
            )));
        }
        Ok(BulkDataRequest {
            requests,
            identifier: wire.identifier,
        })
    }

    fn to_json_pretty(&self) -> Result<String> {
        message::to_json_pretty(&self.wire())
    }
}

// ─── SensorRequest ──────────────────────────────────────────────────────────

/// Asks the service to enumerate every channel currently in the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorRequest {
    /// Client correlation identifier, echoed on the response.
    pub identifier: u64,
}

impl SensorRequest {
    fn wire(&self) -> SensorRequestWire {
        SensorRequestWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            identifier: self.identifier,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SensorRequestWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "Identifier")]
    identifier: u64,
}

impl Message for SensorRequest {
    const MESSAGE_TYPE: &'static str = "SensorRequest";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: SensorRequestWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        Ok(SensorRequest {
            identifier: wire.identifier,
        })
    }

    fn to_json_pretty(&self) -> Result<String> {
        message::to_json_pretty(&self.wire())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_request_roundtrip() {
        let request = DataRequest {
            network: "UU".into(),
            station: "ARUT".into(),
            channel: "EHZ".into(),
            location_code: "01".into(),
            query_start_time_us: 1_629_737_861_000_000,
            query_end_time_us: 1_629_737_865_000_000,
            identifier: 400_038,
        };
        let bytes = request.encode().unwrap();
        let back = DataRequest::decode(&bytes).unwrap();
        assert_eq!(back, request);
        assert_eq!(back.name(), "UU.ARUT.EHZ.01");
    }

    #[test]
    fn data_request_defaults_to_open_window() {
        let request = DataRequest::default();
        assert_eq!(request.query_end_time_us, i64::MAX);
    }

    #[test]
    fn bulk_request_roundtrip() {
        let mut bulk = BulkDataRequest {
            identifier: 400_038,
            ..Default::default()
        };
        for (i, channel) in ["EHZ", "EHN", "EHE"].iter().enumerate() {
            bulk.add_request(DataRequest {
                network: "UU".into(),
                station: "ARUT".into(),
                channel: (*channel).into(),
                location_code: "01".into(),
                query_start_time_us: 1_629_737_861_000_000,
                query_end_time_us: 1_629_737_865_000_000,
                identifier: 400_038 + i as u64,
            })
            .unwrap();
        }
        assert_eq!(bulk.request_count(), 3);

        let bytes = bulk.encode().unwrap();
        let back = BulkDataRequest::decode(&bytes).unwrap();
        assert_eq!(back, bulk);
        assert_eq!(back.requests()[1].channel, "EHN");
    }

    #[test]
    fn bulk_request_rejects_duplicate_identifier() {
        let mut bulk = BulkDataRequest::default();
        let request = DataRequest {
            identifier: 7,
            ..Default::default()
        };
        bulk.add_request(request.clone()).unwrap();
        // Duplicate identifiers are rejected even for different content.
        let mut other = request;
        other.channel = "EHN".into();
        assert!(bulk.add_request(other).is_err());
        assert_eq!(bulk.request_count(), 1);
    }

    #[test]
    fn sensor_request_roundtrip() {
        let request = SensorRequest {
            identifier: 600_238,
        };
        let bytes = request.encode().unwrap();
        assert_eq!(SensorRequest::decode(&bytes).unwrap(), request);
    }

    #[test]
    fn decode_rejects_mismatched_type() {
        let bytes = SensorRequest { identifier: 1 }.encode().unwrap();
        assert!(DataRequest::decode(&bytes).is_err());
        assert!(BulkDataRequest::decode(&bytes).is_err());
    }
}
