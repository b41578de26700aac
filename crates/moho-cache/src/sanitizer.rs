//! # Packet Sanitizer
//!
//! Stateful admission filter sitting between the pub/sub feed and the cache.
//! It rejects empty, expired, future-dated, duplicate, and GPS-slipped
//! packets, keeping per-channel rings of packet *headers* (not samples) that
//! cover roughly three maximum-latency windows of history.
//!
//! Field digitizers re-send packets after telemetry hiccups and step their
//! clocks after GPS loss, so the filter has to distinguish a legitimate
//! back-fill (older data landing in a hole) from a re-send (a start time
//! within tolerance of one already seen) and from a timing slip (an extent
//! overlapping data already seen).

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use moho_wire::{Error, Packet, Result};

// ─── Options ────────────────────────────────────────────────────────────────

/// Sanitizer tuning options.
#[derive(Debug, Clone)]
pub struct SanitizerOptions {
    /// Oldest admissible data age in seconds; must be positive.
    pub max_latency_s: i64,
    /// How far past the wall clock a packet may end, in seconds; non-negative.
    pub max_future_time_s: i64,
    /// Seconds between bad-data report passes; zero or negative disables
    /// periodic reporting.
    pub bad_data_logging_interval_s: i64,
}

impl Default for SanitizerOptions {
    fn default() -> Self {
        SanitizerOptions {
            max_latency_s: 500,
            max_future_time_s: 0,
            bad_data_logging_interval_s: 3600,
        }
    }
}

impl SanitizerOptions {
    fn validate(&self) -> Result<()> {
        if self.max_latency_s <= 0 {
            return Err(Error::InvalidArgument(format!(
                "maximum latency {} s must be positive",
                self.max_latency_s
            )));
        }
        if self.max_future_time_s < 0 {
            return Err(Error::InvalidArgument(format!(
                "maximum future time {} s cannot be negative",
                self.max_future_time_s
            )));
        }
        Ok(())
    }
}

// ─── Rejection categories ───────────────────────────────────────────────────

/// Why a packet was turned away; used for periodic bad-data reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BadDataCategory {
    /// Packet ends past the wall clock plus the future allowance.
    Future,
    /// Start time within tolerance of a header already seen.
    Duplicate,
    /// Extent overlaps data already seen — evidence of a GPS slip.
    BadTiming,
    /// Packet ends before the latency horizon.
    Expired,
    /// Packet carries no samples.
    Empty,
}

// ─── Packet headers ─────────────────────────────────────────────────────────

/// Timing summary of one packet; the sanitizer never stores samples.
#[derive(Debug, Clone)]
struct PacketHeader {
    name: String,
    start_time_us: i64,
    end_time_us: i64,
    /// Observed rates wobble around a nominal rate, so classify on the
    /// rounded value.
    nominal_rate: i32,
    sample_count: usize,
}

impl PacketHeader {
    fn from_packet(packet: &Packet) -> Result<Self> {
        if packet.network.is_empty() || packet.station.is_empty() || packet.channel.is_empty() {
            return Err(Error::InvalidArgument(
                "packet is missing a channel name component".into(),
            ));
        }
        if packet.sampling_rate <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "sampling rate not set for {}",
                packet.name()
            )));
        }
        let mut name = format!(
            "{}.{}.{}",
            packet.network, packet.station, packet.channel
        );
        if !packet.location_code.is_empty() {
            name.push('.');
            name.push_str(&packet.location_code);
        }
        Ok(PacketHeader {
            name,
            start_time_us: packet.start_time_us,
            end_time_us: packet.end_time_us(),
            nominal_rate: packet.sampling_rate.round() as i32,
            sample_count: packet.data.len(),
        })
    }
}

/// Two headers within this start-time tolerance are one packet re-sent.
fn duplicate_tolerance_us(nominal_rate: i32) -> Result<i64> {
    if nominal_rate < 105 {
        Ok(15_000)
    } else if nominal_rate < 255 {
        Ok(4_500)
    } else if nominal_rate < 505 {
        Ok(2_500)
    } else if nominal_rate < 1005 {
        Ok(1_500)
    } else {
        Err(Error::UnknownRate(nominal_rate))
    }
}

fn is_duplicate(existing: &PacketHeader, header: &PacketHeader) -> Result<bool> {
    if existing.nominal_rate != header.nominal_rate {
        return Err(Error::AlgorithmicFailure(format!(
            "inconsistent sampling rates for {}",
            header.name
        )));
    }
    let tolerance = duplicate_tolerance_us(header.nominal_rate)?;
    Ok((existing.start_time_us - header.start_time_us).abs() < tolerance)
}

/// Headers to retain so the ring covers the memory window.
fn estimate_capacity(header: &PacketHeader, memory: Duration) -> usize {
    let duration_s = ((header.sample_count as f64 - 1.0)
        / f64::from(header.nominal_rate.max(1)))
    .round()
    .max(0.0);
    // Sub-second packets divide to infinity; the cast saturates and the ring
    // is effectively unbounded for them.
    let windows = (memory.as_secs_f64() / duration_s) as usize;
    windows.max(1000).saturating_add(1)
}

// ─── Per-channel history ────────────────────────────────────────────────────

#[derive(Debug)]
struct ChannelHistory {
    capacity: usize,
    headers: VecDeque<PacketHeader>,
}

impl ChannelHistory {
    fn push_back(&mut self, header: PacketHeader) {
        if self.headers.len() == self.capacity {
            self.headers.pop_front();
        }
        self.headers.push_back(header);
    }

    fn insert_sorted(&mut self, header: PacketHeader) {
        if self.headers.len() == self.capacity {
            self.headers.pop_front();
        }
        let index = self
            .headers
            .partition_point(|h| h.start_time_us < header.start_time_us);
        self.headers.insert(index, header);
    }
}

// ─── Sanitizer ──────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SanitizerState {
    channels: HashMap<String, ChannelHistory>,
    future: BTreeSet<String>,
    duplicate: BTreeSet<String>,
    bad_timing: BTreeSet<String>,
    expired: BTreeSet<String>,
    empty: BTreeSet<String>,
    last_log_time_s: i64,
}

impl SanitizerState {
    fn log_bad_data(&mut self, now_us: i64, interval_s: i64) {
        if interval_s <= 0 {
            return;
        }
        let now_s = now_us / 1_000_000;
        if now_s <= self.last_log_time_s + interval_s {
            return;
        }
        if !self.future.is_empty() {
            info!(channels = ?self.future, "future data detected");
            self.future.clear();
        }
        if !self.duplicate.is_empty() {
            info!(channels = ?self.duplicate, "duplicate data detected");
            self.duplicate.clear();
        }
        if !self.bad_timing.is_empty() {
            info!(channels = ?self.bad_timing, "bad timing data detected");
            self.bad_timing.clear();
        }
        if !self.expired.is_empty() {
            info!(channels = ?self.expired, "expired data detected");
            self.expired.clear();
        }
        if !self.empty.is_empty() {
            info!(channels = ?self.empty, "empty packets detected");
            self.empty.clear();
        }
        self.last_log_time_s = now_s;
    }
}

/// Admission filter for the ingest pipeline.
pub struct PacketSanitizer {
    options: SanitizerOptions,
    /// History span per channel — three maximum-latency windows.
    memory: Duration,
    state: Mutex<SanitizerState>,
}

impl PacketSanitizer {
    /// Create a sanitizer with the given options.
    pub fn new(options: SanitizerOptions) -> Result<Self> {
        options.validate()?;
        info!(
            max_latency_s = options.max_latency_s,
            max_future_time_s = options.max_future_time_s,
            "packet sanitizer configured"
        );
        let memory = Duration::from_secs(3 * options.max_latency_s as u64);
        Ok(PacketSanitizer {
            options,
            memory,
            state: Mutex::new(SanitizerState::default()),
        })
    }

    /// Decide whether a packet may pass to the cache and downstream
    /// broadcast. `Ok(true)` admits.
    ///
    /// An unclassifiable sampling rate (≥ 1005 Hz) raises
    /// [`Error::UnknownRate`] to the caller — that is a configuration
    /// problem, not a data problem.
    pub fn admit(&self, packet: &Packet) -> Result<bool> {
        let now_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        self.admit_at(packet, now_us)
    }

    fn admit_at(&self, packet: &Packet, now_us: i64) -> Result<bool> {
        let header = match PacketHeader::from_packet(packet) {
            Ok(header) => header,
            Err(e) => {
                warn!(error = %e, "failed to unpack packet header; not allowing");
                return Ok(false);
            }
        };
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if header.sample_count == 0 {
            debug!(channel = %header.name, "empty packet detected");
            state.empty.insert(header.name);
            return Ok(false);
        }
        state.log_bad_data(now_us, self.options.bad_data_logging_interval_s);
        let earliest_us = now_us - self.options.max_latency_s * 1_000_000;
        if header.end_time_us < earliest_us {
            debug!(channel = %header.name, "data has expired; skipping");
            state.expired.insert(header.name);
            return Ok(false);
        }
        let latest_us = now_us + self.options.max_future_time_s * 1_000_000;
        if header.end_time_us > latest_us {
            debug!(channel = %header.name, "data is from the future; skipping");
            state.future.insert(header.name);
            return Ok(false);
        }
        let SanitizerState {
            channels,
            duplicate,
            bad_timing,
            ..
        } = &mut *state;
        let Some(history) = channels.get_mut(&header.name) else {
            // First observation for this channel.
            let capacity = estimate_capacity(&header, self.memory);
            info!(channel = %header.name, capacity, "creating timing history");
            let mut headers = VecDeque::new();
            let name = header.name.clone();
            headers.push_back(header);
            channels.insert(name, ChannelHistory { capacity, headers });
            return Ok(true);
        };
        for existing in &history.headers {
            if is_duplicate(existing, &header)? {
                debug!(channel = %header.name, "detected duplicate");
                duplicate.insert(header.name);
                return Ok(false);
            }
        }
        // New data at the end is the common path.
        if header.start_time_us > history.headers.back().unwrap().start_time_us {
            history.push_back(header);
            return Ok(true);
        }
        // The packet is old; overlap with anything already seen means the
        // field clock stepped.
        for existing in &history.headers {
            let start_inside = header.start_time_us >= existing.start_time_us
                && header.start_time_us <= existing.end_time_us;
            let end_inside = header.end_time_us >= existing.start_time_us
                && header.end_time_us <= existing.end_time_us;
            if start_inside || end_inside {
                debug!(channel = %header.name, "detected possible timing slip");
                bad_timing.insert(header.name);
                return Ok(false);
            }
        }
        // Legitimate back-fill.
        debug!(channel = %header.name, "inserting back-fill into timing history");
        history.insert_sorted(header);
        Ok(true)
    }

    /// Snapshot of the channels accumulated under one rejection category
    /// since the last report pass.
    pub fn bad_channels(&self, category: BadDataCategory) -> BTreeSet<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match category {
            BadDataCategory::Future => state.future.clone(),
            BadDataCategory::Duplicate => state.duplicate.clone(),
            BadDataCategory::BadTiming => state.bad_timing.clone(),
            BadDataCategory::Expired => state.expired.clone(),
            BadDataCategory::Empty => state.empty.clone(),
        }
    }

    /// Forget every channel history and accumulated report set.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = SanitizerState::default();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_US: i64 = 1_700_000_000_000_000;

    fn make_sanitizer() -> PacketSanitizer {
        PacketSanitizer::new(SanitizerOptions::default()).unwrap()
    }

    fn make_packet(rate: f64, start_time_us: i64, n_samples: usize) -> Packet {
        Packet {
            network: "UU".into(),
            station: "FORK".into(),
            channel: "HHZ".into(),
            location_code: "01".into(),
            sampling_rate: rate,
            start_time_us,
            data: vec![1.0; n_samples],
        }
    }

    #[test]
    fn options_validate_bounds() {
        let mut options = SanitizerOptions::default();
        options.max_latency_s = 0;
        assert!(PacketSanitizer::new(options).is_err());
        let mut options = SanitizerOptions::default();
        options.max_future_time_s = -1;
        assert!(PacketSanitizer::new(options).is_err());
    }

    #[test]
    fn empty_packet_rejected() {
        let sanitizer = make_sanitizer();
        let packet = make_packet(100.0, NOW_US, 0);
        assert!(!sanitizer.admit_at(&packet, NOW_US).unwrap());
        assert!(sanitizer
            .bad_channels(BadDataCategory::Empty)
            .contains("UU.FORK.HHZ.01"));
    }

    #[test]
    fn expired_packet_rejected() {
        let sanitizer = make_sanitizer();
        // Ends 501 s before now; the horizon is 500 s.
        let packet = make_packet(100.0, NOW_US - 502_000_000, 100);
        assert!(!sanitizer.admit_at(&packet, NOW_US).unwrap());
        assert!(sanitizer
            .bad_channels(BadDataCategory::Expired)
            .contains("UU.FORK.HHZ.01"));
    }

    #[test]
    fn future_packet_rejected() {
        let sanitizer = make_sanitizer();
        let packet = make_packet(100.0, NOW_US + 1_000_000, 100);
        assert!(!sanitizer.admit_at(&packet, NOW_US).unwrap());
        assert!(sanitizer
            .bad_channels(BadDataCategory::Future)
            .contains("UU.FORK.HHZ.01"));
    }

    #[test]
    fn future_allowance_admits_slightly_ahead_data() {
        let options = SanitizerOptions {
            max_future_time_s: 10,
            ..Default::default()
        };
        let sanitizer = PacketSanitizer::new(options).unwrap();
        let packet = make_packet(100.0, NOW_US + 1_000_000, 100);
        assert!(sanitizer.admit_at(&packet, NOW_US).unwrap());
    }

    #[test]
    fn first_packet_for_channel_is_admitted() {
        let sanitizer = make_sanitizer();
        let packet = make_packet(100.0, NOW_US, 100);
        assert!(sanitizer.admit_at(&packet, NOW_US).unwrap());
    }

    #[test]
    fn duplicate_within_tolerance_rejected() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 5_000_000;
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base, 100), NOW_US)
            .unwrap());
        // 10 ms later: inside the 15 ms tolerance at 100 Hz.
        assert!(!sanitizer
            .admit_at(&make_packet(100.0, base + 10_000, 100), NOW_US)
            .unwrap());
        assert!(sanitizer
            .bad_channels(BadDataCategory::Duplicate)
            .contains("UU.FORK.HHZ.01"));
        // 20 ms later: outside the tolerance, admitted.
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base + 20_000, 100), NOW_US)
            .unwrap());
    }

    #[test]
    fn duplicate_tolerance_tracks_sampling_rate() {
        assert_eq!(duplicate_tolerance_us(100).unwrap(), 15_000);
        assert_eq!(duplicate_tolerance_us(104).unwrap(), 15_000);
        assert_eq!(duplicate_tolerance_us(105).unwrap(), 4_500);
        assert_eq!(duplicate_tolerance_us(250).unwrap(), 4_500);
        assert_eq!(duplicate_tolerance_us(500).unwrap(), 2_500);
        assert_eq!(duplicate_tolerance_us(1000).unwrap(), 1_500);
        assert!(matches!(
            duplicate_tolerance_us(1005),
            Err(Error::UnknownRate(1005))
        ));
    }

    #[test]
    fn unclassifiable_rate_raises_to_caller() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 1_000_000;
        // First observation never needs classification.
        assert!(sanitizer
            .admit_at(&make_packet(2000.0, base, 100), NOW_US)
            .unwrap());
        // The second does.
        assert!(matches!(
            sanitizer.admit_at(&make_packet(2000.0, base + 100_000, 100), NOW_US),
            Err(Error::UnknownRate(2000))
        ));
    }

    #[test]
    fn in_order_stream_is_admitted() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 10_000_000;
        for i in 0..10 {
            let packet = make_packet(100.0, base + i * 1_000_000, 100);
            assert!(sanitizer.admit_at(&packet, NOW_US).unwrap());
        }
    }

    #[test]
    fn back_fill_into_hole_is_admitted() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 10_000_000;
        // Packets span 990 ms each; leave a hole at base + 1 s.
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base, 100), NOW_US)
            .unwrap());
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base + 2_000_000, 100), NOW_US)
            .unwrap());
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base + 1_000_000, 100), NOW_US)
            .unwrap());
    }

    #[test]
    fn overlapping_back_fill_is_a_timing_slip() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 10_000_000;
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base, 100), NOW_US)
            .unwrap());
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base + 2_000_000, 100), NOW_US)
            .unwrap());
        // Starts in the hole but runs into the second packet.
        assert!(!sanitizer
            .admit_at(&make_packet(100.0, base + 1_500_000, 100), NOW_US)
            .unwrap());
        assert!(sanitizer
            .bad_channels(BadDataCategory::BadTiming)
            .contains("UU.FORK.HHZ.01"));
    }

    #[test]
    fn missing_sampling_rate_rejected_without_error() {
        let sanitizer = make_sanitizer();
        let packet = make_packet(0.0, NOW_US, 100);
        assert!(!sanitizer.admit_at(&packet, NOW_US).unwrap());
    }

    #[test]
    fn channels_are_independent() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 1_000_000;
        let z = make_packet(100.0, base, 100);
        let mut n = make_packet(100.0, base, 100);
        n.channel = "HHN".into();
        assert!(sanitizer.admit_at(&z, NOW_US).unwrap());
        // Same start time on another channel is not a duplicate.
        assert!(sanitizer.admit_at(&n, NOW_US).unwrap());
    }

    #[test]
    fn capacity_formula_preserved() {
        let header = PacketHeader {
            name: "UU.FORK.HHZ.01".into(),
            start_time_us: 0,
            end_time_us: 990_000,
            nominal_rate: 100,
            sample_count: 100,
        };
        // 100 samples at 100 Hz -> 1 s packets; 1500 s memory window.
        assert_eq!(estimate_capacity(&header, Duration::from_secs(1500)), 1501);
        // Long packets floor at 1000 + 1.
        let header = PacketHeader {
            sample_count: 100_000,
            end_time_us: 999_990_000,
            ..header
        };
        assert_eq!(estimate_capacity(&header, Duration::from_secs(1500)), 1001);
        // One-sample packets have no duration; the ring is unbounded.
        let header = PacketHeader {
            sample_count: 1,
            end_time_us: 0,
            ..header
        };
        assert_eq!(
            estimate_capacity(&header, Duration::from_secs(1500)),
            usize::MAX
        );
    }

    #[test]
    fn report_pass_clears_accumulated_sets() {
        let options = SanitizerOptions {
            bad_data_logging_interval_s: 60,
            ..Default::default()
        };
        let sanitizer = PacketSanitizer::new(options).unwrap();
        let packet = make_packet(100.0, NOW_US - 502_000_000, 100);
        assert!(!sanitizer.admit_at(&packet, NOW_US).unwrap());
        assert_eq!(sanitizer.bad_channels(BadDataCategory::Expired).len(), 1);
        // The next call past the interval reports and clears.
        let good = make_packet(100.0, NOW_US + 61_000_000 - 1_000_000, 100);
        assert!(sanitizer.admit_at(&good, NOW_US + 61_000_000).unwrap());
        assert!(sanitizer.bad_channels(BadDataCategory::Expired).is_empty());
    }

    #[test]
    fn disabled_interval_never_clears() {
        let options = SanitizerOptions {
            bad_data_logging_interval_s: 0,
            ..Default::default()
        };
        let sanitizer = PacketSanitizer::new(options).unwrap();
        let packet = make_packet(100.0, NOW_US - 502_000_000, 100);
        assert!(!sanitizer.admit_at(&packet, NOW_US).unwrap());
        let good = make_packet(100.0, NOW_US + 3600_000_000 * 3, 100);
        let _ = sanitizer.admit_at(&good, NOW_US + 3600_000_000 * 3);
        assert_eq!(sanitizer.bad_channels(BadDataCategory::Expired).len(), 1);
    }

    #[test]
    fn clear_behaves_like_fresh_sanitizer() {
        let sanitizer = make_sanitizer();
        let base = NOW_US - 1_000_000;
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base, 100), NOW_US)
            .unwrap());
        sanitizer.clear();
        // The same packet is a first observation again.
        assert!(sanitizer
            .admit_at(&make_packet(100.0, base, 100), NOW_US)
            .unwrap());
    }
}
