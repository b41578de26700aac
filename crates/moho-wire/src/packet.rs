//! # Data Packet
//!
//! Immutable value representing one contiguous block of regularly sampled
//! waveform data for one channel. The channel is named by the 4-tuple
//! `network.station.channel.location_code`, e.g. `UU.FORK.HHZ.01`.
//!
//! The end time is derived, not stored: for `n ≥ 1` samples at `rate` Hz the
//! last sample falls `round((n-1)·1e6/rate)` microseconds after the first.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{self, Message};

/// One contiguous block of samples for one channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packet {
    /// Network code, e.g. `UU`.
    pub network: String,
    /// Station name, e.g. `FORK`.
    pub station: String,
    /// Channel code, e.g. `HHZ`.
    pub channel: String,
    /// Location code, e.g. `01`.
    pub location_code: String,
    /// Sampling rate in Hz. Must be positive for a valid packet.
    pub sampling_rate: f64,
    /// UTC time of the first sample, microseconds since the epoch.
    pub start_time_us: i64,
    /// The waveform samples.
    pub data: Vec<f64>,
}

impl Packet {
    /// Channel name in `network.station.channel.location_code` form.
    pub fn name(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            self.network, self.station, self.channel, self.location_code
        )
    }

    /// Number of samples in the packet.
    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    /// UTC time of the last sample, microseconds since the epoch.
    ///
    /// Falls back to the start time when the packet has no samples or no
    /// sampling rate.
    pub fn end_time_us(&self) -> i64 {
        if self.data.is_empty() || self.sampling_rate <= 0.0 {
            return self.start_time_us;
        }
        let duration_us = ((self.data.len() as f64 - 1.0) / self.sampling_rate * 1.0e6).round();
        self.start_time_us + duration_us as i64
    }

    /// All name components present, a positive sampling rate, and at least
    /// one sample.
    pub fn is_valid(&self) -> bool {
        !self.network.trim().is_empty()
            && !self.station.trim().is_empty()
            && !self.channel.trim().is_empty()
            && !self.location_code.trim().is_empty()
            && self.sampling_rate > 0.0
            && !self.data.is_empty()
    }

    fn wire(&self) -> PacketWire {
        let have_end = !self.data.is_empty() && self.sampling_rate > 0.0;
        PacketWire {
            message_type: Self::MESSAGE_TYPE.to_string(),
            message_version: Self::MESSAGE_VERSION.to_string(),
            network: self.network.clone(),
            station: self.station.clone(),
            channel: self.channel.clone(),
            location_code: self.location_code.clone(),
            start_time: self.start_time_us,
            sampling_rate: self.sampling_rate,
            end_time: have_end.then(|| self.end_time_us()),
            data: (!self.data.is_empty()).then(|| self.data.clone()),
        }
    }
}

// ─── Wire form ──────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct PacketWire {
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
    #[serde(rename = "StartTime")]
    start_time: i64,
    #[serde(rename = "SamplingRate")]
    sampling_rate: f64,
    #[serde(rename = "EndTime")]
    end_time: Option<i64>,
    #[serde(rename = "Data")]
    data: Option<Vec<f64>>,
}

impl Message for Packet {
    const MESSAGE_TYPE: &'static str = "DataPacket";

    fn encode(&self) -> Result<Bytes> {
        message::to_cbor(&self.wire())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let wire: PacketWire = message::from_cbor(bytes)?;
        message::check_message_type(&wire.message_type, Self::MESSAGE_TYPE)?;
        Ok(Packet {
            network: wire.network,
            station: wire.station,
            channel: wire.channel,
            location_code: wire.location_code,
            sampling_rate: wire.sampling_rate,
            start_time_us: wire.start_time,
            data: wire.data.unwrap_or_default(),
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

    fn sample_packet() -> Packet {
        Packet {
            network: "UU".into(),
            station: "FORK".into(),
            channel: "HHZ".into(),
            location_code: "01".into(),
            sampling_rate: 100.0,
            start_time_us: 1_644_516_968_000_000,
            data: (0..100).map(f64::from).collect(),
        }
    }

    #[test]
    fn name_joins_components() {
        assert_eq!(sample_packet().name(), "UU.FORK.HHZ.01");
    }

    #[test]
    fn end_time_spans_n_minus_one_periods() {
        let p = sample_packet();
        // 100 samples at 100 Hz -> 99 periods of 10 ms.
        assert_eq!(p.end_time_us(), p.start_time_us + 990_000);
    }

    #[test]
    fn end_time_of_empty_packet_is_start_time() {
        let mut p = sample_packet();
        p.data.clear();
        assert_eq!(p.end_time_us(), p.start_time_us);
    }

    #[test]
    fn end_time_rounds_at_packet_level() {
        let mut p = sample_packet();
        p.sampling_rate = 40.01;
        p.data = vec![0.0; 2];
        // One period of 1e6/40.01 us = 24993.75..., rounded once.
        assert_eq!(p.end_time_us(), p.start_time_us + 24_994);
    }

    #[test]
    fn validity_requires_all_fields() {
        assert!(sample_packet().is_valid());
        let mut p = sample_packet();
        p.network.clear();
        assert!(!p.is_valid());
        let mut p = sample_packet();
        p.sampling_rate = 0.0;
        assert!(!p.is_valid());
        let mut p = sample_packet();
        p.data.clear();
        assert!(!p.is_valid());
    }

    #[test]
    fn cbor_roundtrip() {
        let p = sample_packet();
        let bytes = p.encode().unwrap();
        let back = Packet::decode(&bytes).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn roundtrip_preserves_empty_data_as_null() {
        let mut p = sample_packet();
        p.data.clear();
        let bytes = p.encode().unwrap();
        let back = Packet::decode(&bytes).unwrap();
        assert!(back.data.is_empty());
        let json = p.to_json_pretty().unwrap();
        assert!(json.contains("\"Data\": null"));
        assert!(json.contains("\"EndTime\": null"));
    }

    #[test]
    fn decode_rejects_wrong_message_type() {
        use crate::request::SensorRequest;
        let bytes = SensorRequest { identifier: 1 }.encode().unwrap();
        assert!(Packet::decode(&bytes).is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Packet::decode(b"not cbor").is_err());
        assert!(Packet::decode(b"").is_err());
    }
}
