//! # Capped Collection
//!
//! Thread-safe dictionary from channel name to [`ChannelRing`] with a uniform
//! per-channel capacity and a blacklist of glob patterns over the channel
//! component. Rings are created lazily on the first admitted packet for a
//! channel and only destroyed by [`CappedCollection::clear`], so every ring
//! in the collection is non-empty.
//!
//! One internal mutex guards the map and the blacklist; the ingest drainer
//! and the reply handler serialize through it with short, bounded holds.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use moho_wire::{Error, Packet, Result};

use crate::ring::ChannelRing;

/// Dictionary of channel rings plus a channel blacklist.
pub struct CappedCollection {
    inner: Mutex<Inner>,
}

struct Inner {
    rings: HashMap<String, ChannelRing>,
    blacklist: GlobSet,
    max_packets: usize,
}

impl CappedCollection {
    /// Create an empty collection.
    ///
    /// `max_packets` is the uniform per-channel ring capacity. `blacklist`
    /// holds shell-style glob patterns (`*` any run, `?` any one character)
    /// matched against the channel component only.
    pub fn new(max_packets: usize, blacklist: &[String]) -> Result<Self> {
        if max_packets < 1 {
            return Err(Error::InvalidArgument(format!(
                "max packets {max_packets} must be positive"
            )));
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in blacklist {
            let glob = Glob::new(pattern).map_err(|e| {
                Error::InvalidArgument(format!("bad blacklist pattern {pattern}: {e}"))
            })?;
            builder.add(glob);
        }
        let blacklist = builder
            .build()
            .map_err(|e| Error::InvalidArgument(format!("cannot build blacklist: {e}")))?;
        Ok(CappedCollection {
            inner: Mutex::new(Inner {
                rings: HashMap::new(),
                blacklist,
                max_packets,
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Route a packet to its channel's ring, creating the ring on first
    /// contact.
    ///
    /// A packet whose channel matches the blacklist is dropped silently; an
    /// invalid packet fails with [`Error::InvalidArgument`].
    pub fn add_packet(&self, packet: Packet) -> Result<()> {
        let mut inner = self.lock();
        if inner.blacklist.is_match(&packet.channel) {
            return Ok(());
        }
        if !packet.is_valid() {
            return Err(Error::InvalidArgument("packet is invalid".into()));
        }
        let name = packet.name();
        if let Some(ring) = inner.rings.get_mut(&name) {
            return ring.add_packet(packet);
        }
        debug!(channel = %name, "tracking new channel");
        let mut ring = ChannelRing::new(
            &packet.network,
            &packet.station,
            &packet.channel,
            &packet.location_code,
            inner.max_packets,
        )?;
        ring.add_packet(packet)?;
        inner.rings.insert(name, ring);
        Ok(())
    }

    /// True when the channel name is in the collection.
    pub fn have_sensor(&self, name: &str) -> bool {
        self.lock().rings.contains_key(name)
    }

    /// Every channel name currently tracked.
    pub fn sensor_names(&self) -> BTreeSet<String> {
        self.lock().rings.keys().cloned().collect()
    }

    /// All packets for `name` whose extent overlaps `[t0, +inf)`.
    pub fn get_packets_from(&self, name: &str, t0_us: i64) -> Result<Vec<Packet>> {
        let inner = self.lock();
        let ring = inner
            .rings
            .get(name)
            .ok_or_else(|| Error::UnknownSensor(name.to_string()))?;
        Ok(ring.packets_from(t0_us))
    }

    /// All packets for `name` whose extent overlaps `[t0, t1]`.
    ///
    /// Fails with [`Error::UnknownSensor`] when the channel is not tracked
    /// and with [`Error::InvalidArgument`] when `t1 ≤ t0`.
    pub fn get_packets(&self, name: &str, t0_us: i64, t1_us: i64) -> Result<Vec<Packet>> {
        let inner = self.lock();
        let ring = inner
            .rings
            .get(name)
            .ok_or_else(|| Error::UnknownSensor(name.to_string()))?;
        ring.packets_window(t0_us, t1_us)
    }

    /// Start time of the oldest packet cached for `name`.
    pub fn earliest_start_time(&self, name: &str) -> Result<i64> {
        let inner = self.lock();
        let ring = inner
            .rings
            .get(name)
            .ok_or_else(|| Error::UnknownSensor(name.to_string()))?;
        ring.earliest_start_time()
    }

    /// Total packet count across every channel.
    pub fn total_number_of_packets(&self) -> usize {
        self.lock().rings.values().map(ChannelRing::len).sum()
    }

    /// Uniform per-channel ring capacity.
    pub fn max_packets(&self) -> usize {
        self.lock().max_packets
    }

    /// Drop every ring.
    pub fn clear(&self) {
        self.lock().rings.clear();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
