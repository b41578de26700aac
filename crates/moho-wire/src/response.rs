//! # Cache Response Messages
//!
//! Responses produced by the packet cache's reply surface. Every response
//! echoes the client's correlation identifier and carries a typed return
//! code; the service never leaves a request without a reply.
//!
//! The [`DataResponse`] wire form states the channel identity once and the
//! per-packet payload as `{StartTime, SamplingRate, Data}` triples, since
//! every packet in a response shares one channel name.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::message::{self, Message};
use crate::packet::Packet;

// ─── Return code ────────────────────────────────────────────────────────────

/// Outcome carried on every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(i32)]
pub enum ReturnCode {
    /// The request was served.
    #[default]
    Success = 0,
    /// The received message type is not supported.
    InvalidMessageType = 1,
    /// The request body failed to decode.
    InvalidMessage = 2,
    /// The queried channel is not in the cache.
    NoSensor = 3,
    /// Unexpected internal error while serving a valid request.
    AlgorithmicFailure = 4,
}

impl ReturnCode {
    fn from_i32(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ReturnCode::Success),
            1 => Ok(ReturnCode::InvalidMessageType),
            2 => Ok(ReturnCode::InvalidMessage),
            3 => Ok(ReturnCode::NoSensor),
            4 => Ok(ReturnCode::AlgorithmicFailure),
            other => Err(Error::InvalidMessage(format!(
                "unknown return code {other}"
            ))),
        }
    }
}

// ─── DataResponse ───────────────────────────────────────────────────────────

/// Ordered packet list for one channel plus a return code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataResponse {
    packets: Vec<Packet>,
    /// Correlation identifier echoed from the request.
    pub identifier: u64,
    /// Outcome of the query.
    pub return_code: ReturnCode,
}

impl DataResponse {
    /// Store the packet list, sorting by start time only when the input is
    /// not already sorted (packets sharing a start time keep their order).
    ///
    /// Every packet must carry the full channel name and a sampling rate;
    /// a name mismatch fails with [`Error::InconsistentPackets`].
    pub fn set_packets(&mut self, mut packets: Vec<Packet>) -> Result<()> {
        check_packet_identity(&packets)?;
        if !packets.is_sorted_by_key(|p| p.start_time_us) {
            packets.sort_by_key(|p| p.start_time_us);
        }
        self.packets = packets;
        Ok(())
    }

    /// The packets, sorted ascending by start time.
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Number of packets in the response.
    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    fn wire(&self) -> DataResponseWire {
        let first = self.packets.first();
        DataResponseWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            number_of_packets: self.packets.len(),
            network: first.map(|p| p.network.clone()),
            station: first.map(|p| p.station.clone()),
            channel: first.map(|p| p.channel.clone()),
            location_code: first.map(|p| p.location_code.clone()),
            packets: (!self.packets.is_empty()).then(|| {
                self.packets
                    .iter()
                    .map(|p| PacketBody {
                        start_time: p.start_time_us,
                        sampling_rate: p.sampling_rate,
                        data: (!p.data.is_empty()).then(|| p.data.clone()),
                    })
                    .collect()
            }),
            identifier: self.identifier,
            return_code: self.return_code as i32,
        }
    }

    fn from_wire(wire: DataResponseWire) -> Result<Self> {
        let mut response = DataResponse {
            packets: Vec::new(),
            identifier: wire.identifier,
            return_code: ReturnCode::from_i32(wire.return_code)?,
        };
        if wire.number_of_packets > 0 {
            let missing =
                || Error::InvalidMessage("data response is missing channel identity".into());
            let network = wire.network.ok_or_else(missing)?;
            let station = wire.station.ok_or_else(missing)?;
            let channel = wire.channel.ok_or_else(missing)?;
            let location_code = wire.location_code.ok_or_else(missing)?;
            let bodies = wire
                .packets
                .ok_or_else(|| Error::InvalidMessage("data response carries no packets".into()))?;
            if bodies.len() != wire.number_of_packets {
                return Err(Error::InvalidMessage(format!(
                    "data response declares {} packets but carries {}",
                    wire.number_of_packets,
                    bodies.len()
                )));
            }
            let packets = bodies
                .into_iter()
                .map(|body| Packet {
                    network: network.clone(),
                    station: station.clone(),
                    channel: channel.clone(),
                    location_code: location_code.clone(),
                    sampling_rate: body.sampling_rate,
                    start_time_us: body.start_time,
                    data: body.data.unwrap_or_default(),
                })
                .collect();
            response.set_packets(packets)?;
        }
        Ok(response)
    }
}

fn check_packet_identity(packets: &[Packet]) -> Result<()> {
    let mut name: Option<String> = None;
    for packet in packets {
        if packet.network.is_empty()
            || packet.station.is_empty()
            || packet.channel.is_empty()
            || packet.location_code.is_empty()
        {
            return Err(Error::InvalidArgument(
                "packet is missing a channel name component".into(),
            ));
        }
        if packet.sampling_rate <= 0.0 {
            return Err(Error::InvalidArgument(
                "packet is missing a sampling rate".into(),
            ));
        }
        let packet_name = packet.name();
        match &name {
            Some(existing) if *existing != packet_name => {
                return Err(Error::InconsistentPackets(format!(
                    "{packet_name} does not match {existing}"
                )));
            }
            Some(_) => {}
            None => name = Some(packet_name),
        }
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct PacketBody {
    #[serde(rename = "StartTime")]
    start_time: i64,
    #[serde(rename = "SamplingRate")]
    sampling_rate: f64,
    #[serde(rename = "Data")]
    data: Option<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct DataResponseWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "NumberOfPackets")]
    number_of_packets: usize,
    #[serde(rename = "Network")]
    network: Option<String>,
    #[serde(rename = "Station")]
    station: Option<String>,
    #[serde(rename = "Channel")]
    channel: Option<String>,
    #[serde(rename = "LocationCode")]
    location_code: Option<String>,
    #[serde(rename = "Packets")]
    packets: Option<Vec<PacketBody>>,
    #[serde(rename = "Identifier")]
    identifier: u64,
    #[serde(rename = "ReturnCode")]
    return_code: i32,
}

impl Message for DataResponse {
    const MESSAGE_TYPE: &'static str = "DataResponse";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: DataResponseWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        Self::from_wire(wire)
    }

    fn to_json_pretty(&self) -> Result<String> {
        message::to_json_pretty(&self.wire())
    }
}

// ─── BulkDataResponse ───────────────────────────────────────────────────────

/// Ordered list of [`DataResponse`]s answering a bulk request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkDataResponse {
    responses: Vec<DataResponse>,
    /// Correlation identifier echoed from the bulk request.
    pub identifier: u64,
    /// Outcome for the batch as a whole; sub-responses carry their own.
    pub return_code: ReturnCode,
}

impl BulkDataResponse {
    /// Append a sub-response.
    pub fn add_response(&mut self, response: DataResponse) {
        self.responses.push(response);
    }

    /// The sub-responses in request order.
    pub fn responses(&self) -> &[DataResponse] {
        &self.responses
    }

    /// Number of sub-responses.
    pub fn response_count(&self) -> usize {
        self.responses.len()
    }

    fn wire(&self) -> BulkDataResponseWire {
        BulkDataResponseWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            number_of_responses: self.responses.len(),
            responses: (!self.responses.is_empty())
                .then(|| self.responses.iter().map(DataResponse::wire).collect()),
            identifier: self.identifier,
            return_code: self.return_code as i32,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct BulkDataResponseWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "NumberOfResponses")]
    number_of_responses: usize,
    #[serde(rename = "Responses")]
    responses: Option<Vec<DataResponseWire>>,
    #[serde(rename = "Identifier")]
    identifier: u64,
    #[serde(rename = "ReturnCode")]
    return_code: i32,
}

impl Message for BulkDataResponse {
    const MESSAGE_TYPE: &'static str = "BulkDataResponse";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: BulkDataResponseWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        let bodies = wire.responses.unwrap_or_default();
        if bodies.len() != wire.number_of_responses {
            return Err(Error::InvalidMessage(format!(
                "bulk response declares {} sub-responses but carries {}",
                wire.number_of_responses,
                bodies.len()
            )));
        }
        let responses = bodies
            .into_iter()
            .map(DataResponse::from_wire)
            .collect::<Result<Vec<_>>>()?;
        Ok(BulkDataResponse {
            responses,
            identifier: wire.identifier,
            return_code: ReturnCode::from_i32(wire.return_code)?,
        })
    }

    fn to_json_pretty(&self) -> Result<String> {
        message::to_json_pretty(&self.wire())
    }
}

// ─── SensorResponse ─────────────────────────────────────────────────────────

/// Enumeration of every channel name currently held by the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorResponse {
    /// Channel names formatted `network.station.channel.location_code`.
    pub names: BTreeSet<String>,
    /// Correlation identifier echoed from the request.
    pub identifier: u64,
    /// Outcome of the enumeration.
    pub return_code: ReturnCode,
}

impl SensorResponse {
    fn wire(&self) -> SensorResponseWire {
        SensorResponseWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            names: (!self.names.is_empty()).then(|| self.names.clone()),
            identifier: self.identifier,
            return_code: self.return_code as i32,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SensorResponseWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "Names")]
    names: Option<BTreeSet<String>>,
    #[serde(rename = "Identifier")]
    identifier: u64,
    #[serde(rename = "ReturnCode")]
    return_code: i32,
}

impl Message for SensorResponse {
    const MESSAGE_TYPE: &'static str = "SensorResponse";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: SensorResponseWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        Ok(SensorResponse {
            names: wire.names.unwrap_or_default(),
            identifier: wire.identifier,
            return_code: ReturnCode::from_i32(wire.return_code)?,
        })
    }

    fn to_json_pretty(&self) -> Result<String> {
        message::to_json_pretty(&self.wire())
    }
}

// ─── Failure ────────────────────────────────────────────────────────────────

/// Generic failure reply for requests the service cannot classify. Sending
/// one preserves the reply socket's one-reply-per-request invariant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Failure {
    /// Human-readable diagnostic.
    pub details: String,
}

impl Failure {
    fn wire(&self) -> FailureWire {
        FailureWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            details: self.details.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct FailureWire {
    #[serde(rename = "MessageType")]
    message_type: String,
    #[serde(rename = "MessageVersion")]
    message_version: String,
    #[serde(rename = "Details")]
    details: String,
}

impl Message for Failure {
    const MESSAGE_TYPE: &'static str = "Failure";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: FailureWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        Ok(Failure {
            details: wire.details,
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

    fn make_packet(channel: &str, start_time_us: i64, n_samples: usize) -> Packet {
        Packet {
            network: "UU".into(),
            station: "VRUT".into(),
            channel: channel.into(),
            location_code: "01".into(),
            sampling_rate: 100.0,
            start_time_us,
            data: vec![n_samples as f64; n_samples],
        }
    }

    fn make_packets(channel: &str) -> Vec<Packet> {
        // 100/200/100/200-sample packets laid head to tail at 100 Hz.
        let mut packets = Vec::new();
        let mut t = 0i64;
        for n in [100usize, 200, 100, 200] {
            let packet = make_packet(channel, t, n);
            t = packet.end_time_us() + 10_000;
            packets.push(packet);
        }
        packets
    }

    #[test]
    fn data_response_roundtrip() {
        let packets = make_packets("EHZ");
        let mut response = DataResponse {
            identifier: 594_382,
            return_code: ReturnCode::InvalidMessage,
            ..Default::default()
        };
        response.set_packets(packets.clone()).unwrap();

        let bytes = response.encode().unwrap();
        let back = DataResponse::decode(&bytes).unwrap();
        assert_eq!(back.identifier, 594_382);
        assert_eq!(back.return_code, ReturnCode::InvalidMessage);
        assert_eq!(back.packets(), &packets[..]);
    }

    #[test]
    fn set_packets_sorts_reversed_input() {
        let packets = make_packets("EHZ");
        let mut reversed = packets.clone();
        reversed.reverse();
        let mut response = DataResponse::default();
        response.set_packets(reversed).unwrap();
        assert_eq!(response.packets(), &packets[..]);
    }

    #[test]
    fn set_packets_keeps_order_of_equal_start_times() {
        let mut packets = make_packets("EHZ");
        packets[0].start_time_us = 0;
        packets[1].start_time_us = 0;
        let mut response = DataResponse::default();
        response.set_packets(packets.clone()).unwrap();
        // Already sorted (non-strictly): no resort, order preserved.
        assert_eq!(response.packets(), &packets[..]);
    }

    #[test]
    fn set_packets_rejects_mixed_channels() {
        let mut packets = make_packets("EHZ");
        packets[2].channel = "EHN".into();
        let mut response = DataResponse::default();
        assert!(matches!(
            response.set_packets(packets),
            Err(Error::InconsistentPackets(_))
        ));
    }

    #[test]
    fn empty_data_response_roundtrip() {
        let response = DataResponse::default();
        let bytes = response.encode().unwrap();
        let back = DataResponse::decode(&bytes).unwrap();
        assert_eq!(back.packet_count(), 0);
        assert_eq!(back.return_code, ReturnCode::Success);
        assert_eq!(back.identifier, 0);
    }

    #[test]
    fn bulk_response_roundtrip() {
        let mut bulk = BulkDataResponse {
            identifier: 594_382,
            return_code: ReturnCode::NoSensor,
            ..Default::default()
        };
        for (i, channel) in ["EHZ", "EHN", "EHE"].iter().enumerate() {
            let mut response = DataResponse {
                identifier: 594_383 + i as u64,
                return_code: ReturnCode::InvalidMessage,
                ..Default::default()
            };
            response.set_packets(make_packets(channel)).unwrap();
            bulk.add_response(response);
        }
        assert_eq!(bulk.response_count(), 3);

        let bytes = bulk.encode().unwrap();
        let back = BulkDataResponse::decode(&bytes).unwrap();
        assert_eq!(back, bulk);
        assert_eq!(back.responses()[2].packets()[0].channel, "EHE");
    }

    #[test]
    fn sensor_response_roundtrip() {
        let names: BTreeSet<String> = [
            "UU.FORK.HHN.01",
            "UU.FORK.HHE.01",
            "UU.FORK.HHZ.01",
            "WY.YFT.EHZ.01",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let response = SensorResponse {
            names: names.clone(),
            identifier: 600_238,
            return_code: ReturnCode::InvalidMessage,
        };
        let bytes = response.encode().unwrap();
        let back = SensorResponse::decode(&bytes).unwrap();
        assert_eq!(back.names, names);
        assert_eq!(back.identifier, 600_238);

        // No names serializes as null and decodes back empty.
        let empty = SensorResponse::default();
        let back = SensorResponse::decode(&empty.encode().unwrap()).unwrap();
        assert!(back.names.is_empty());
        assert_eq!(back.return_code, ReturnCode::Success);
    }

    #[test]
    fn failure_roundtrip() {
        let failure = Failure {
            details: "unhandled message type".into(),
        };
        let back = Failure::decode(&failure.encode().unwrap()).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn return_code_rejects_unknown_value() {
        assert!(ReturnCode::from_i32(99).is_err());
    }
}
