//! # Channel Ring
//!
//! Bounded history of data packets for one channel, kept strictly sorted by
//! start time. Telemetry feeds deliver almost everything in order, so the
//! push-back path is the hot path; out-of-order arrivals back-fill in sorted
//! position, a packet older than everything in a full ring is dropped, and a
//! packet sharing a start time with a stored one replaces it.

use std::collections::VecDeque;

use moho_wire::{Error, Packet, Result};

/// Bounded sorted history of packets for one channel.
#[derive(Debug, Clone)]
pub struct ChannelRing {
    network: String,
    station: String,
    channel: String,
    location_code: String,
    name: String,
    capacity: usize,
    packets: VecDeque<Packet>,
}

impl ChannelRing {
    /// Create an empty ring for one channel.
    ///
    /// Fails with [`Error::InvalidArgument`] when any name component is
    /// empty or when `capacity` is zero.
    pub fn new(
        network: &str,
        station: &str,
        channel: &str,
        location_code: &str,
        capacity: usize,
    ) -> Result<Self> {
        for (field, value) in [
            ("network", network),
            ("station", station),
            ("channel", channel),
            ("location code", location_code),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidArgument(format!("{field} is empty")));
            }
        }
        if capacity < 1 {
            return Err(Error::InvalidArgument(format!(
                "capacity {capacity} must be positive"
            )));
        }
        Ok(ChannelRing {
            network: network.to_string(),
            station: station.to_string(),
            channel: channel.to_string(),
            location_code: location_code.to_string(),
            name: format!("{network}.{station}.{channel}.{location_code}"),
            capacity,
            packets: VecDeque::new(),
        })
    }

    /// Network code the ring was created for.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Station name the ring was created for.
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Channel code the ring was created for.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Location code the ring was created for.
    pub fn location_code(&self) -> &str {
        &self.location_code
    }

    /// Channel name in `network.station.channel.location_code` form.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a packet, keeping the ring sorted by start time.
    ///
    /// The packet must be valid and belong to this ring's channel. A packet
    /// strictly older than everything in a full ring is dropped silently; a
    /// packet sharing a start time with a stored one overwrites it; a
    /// push-back past capacity evicts the oldest packet.
    pub fn add_packet(&mut self, packet: Packet) -> Result<()> {
        if !packet.is_valid() {
            return Err(Error::InvalidArgument("packet is invalid".into()));
        }
        let packet_name = packet.name();
        if packet_name != self.name {
            return Err(Error::InvalidArgument(format!(
                "packet for {packet_name} does not belong in ring for {}",
                self.name
            )));
        }
        if self.packets.is_empty() {
            self.packets.push_back(packet);
            return Ok(());
        }
        let t0 = packet.start_time_us;
        // New data at the end is the common case.
        if t0 > self.packets.back().unwrap().start_time_us {
            if self.packets.len() == self.capacity {
                self.packets.pop_front();
            }
            self.packets.push_back(packet);
            return Ok(());
        }
        // Too old to keep?
        if t0 < self.packets.front().unwrap().start_time_us && self.packets.len() == self.capacity
        {
            return Ok(());
        }
        // Back-fill: find the first stored packet at or after this start.
        let index = self.packets.partition_point(|p| p.start_time_us < t0);
        if index < self.packets.len() && self.packets[index].start_time_us == t0 {
            self.packets[index] = packet;
            return Ok(());
        }
        self.packets.insert(index, packet);
        if self.packets.len() > self.capacity {
            self.packets.pop_front();
        }
        debug_assert!(self
            .packets
            .iter()
            .zip(self.packets.iter().skip(1))
            .all(|(a, b)| a.start_time_us < b.start_time_us));
        Ok(())
    }

    /// Full sorted snapshot.
    pub fn packets(&self) -> Vec<Packet> {
        self.packets.iter().cloned().collect()
    }

    /// All packets whose extent overlaps `[t0, +inf)`.
    pub fn packets_from(&self, t0_us: i64) -> Vec<Packet> {
        self.window(t0_us, i64::MAX)
    }

    /// All packets whose `[start_time, end_time]` extent overlaps `[t0, t1]`.
    ///
    /// A packet ending before `t0` or starting after `t1` is excluded; a
    /// packet straddling either endpoint is included. Fails with
    /// [`Error::InvalidArgument`] when `t1 ≤ t0`.
    pub fn packets_window(&self, t0_us: i64, t1_us: i64) -> Result<Vec<Packet>> {
        if t1_us <= t0_us {
            return Err(Error::InvalidArgument(format!(
                "t0 = {t0_us} must be less than t1 = {t1_us}"
            )));
        }
        Ok(self.window(t0_us, t1_us))
    }

    fn window(&self, t0_us: i64, t1_us: i64) -> Vec<Packet> {
        if self.packets.is_empty() {
            return Vec::new();
        }
        let mut i0 = self.packets.partition_point(|p| p.start_time_us < t0_us);
        // The preceding packet may straddle the window start.
        if i0 > 0 && self.packets[i0 - 1].end_time_us() >= t0_us {
            i0 -= 1;
        }
        let i1 = self.packets.partition_point(|p| p.start_time_us <= t1_us);
        self.packets
            .iter()
            .skip(i0)
            .take(i1.saturating_sub(i0))
            .cloned()
            .collect()
    }

    /// Start time of the oldest stored packet. Fails with [`Error::Empty`]
    /// when the ring holds nothing.
    pub fn earliest_start_time(&self) -> Result<i64> {
        self.packets
            .front()
            .map(|p| p.start_time_us)
            .ok_or(Error::Empty)
    }

    /// Number of stored packets.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// True when no packets are stored.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Maximum number of packets the ring can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every stored packet.
    pub fn clear(&mut self) {
        self.packets.clear();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
