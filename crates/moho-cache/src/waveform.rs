//! # Waveform Assembly
//!
//! Turns packet-cache responses into continuous, regularly sampled waveforms.
//! The one-component assembler validates and clips a single channel's
//! response before handing it to the Wiggins interpolator; the
//! three-component assembler correlates the vertical, north, and east
//! channels of one station onto a shared grid with a shared gap mask.

use moho_wire::{DataResponse, Error, Packet, Result};

use crate::wiggins::WigginsInterpolator;

/// Upper-case a channel code component with blanks stripped.
fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|&c| c != ' ')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Validate that the packets form one channel's worth of data and return the
/// aggregate `[start, end]` extent.
fn check_packets(packets: &[Packet]) -> Result<(i64, i64)> {
    let first = packets
        .first()
        .ok_or_else(|| Error::AlgorithmicFailure("no packets to check".into()))?;
    let name = first.name();
    let mut t0 = i64::MAX;
    let mut t1 = i64::MIN;
    for packet in packets {
        if packet.sampling_rate <= 0.0 {
            return Err(Error::InvalidArgument(
                "sampling rate not set for packet".into(),
            ));
        }
        let packet_name = packet.name();
        if packet_name != name {
            return Err(Error::InconsistentPackets(format!(
                "{packet_name} does not match {name}"
            )));
        }
        t0 = t0.min(packet.start_time_us);
        t1 = t1.max(packet.end_time_us());
    }
    Ok((t0, t1))
}

// ─── One component ──────────────────────────────────────────────────────────

/// Reconstructs one channel's continuous waveform from a cache response.
#[derive(Debug, Clone)]
pub struct SingleComponentWaveform {
    interpolator: WigginsInterpolator,
    network: String,
    station: String,
    channel: String,
    location_code: String,
}

impl Default for SingleComponentWaveform {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleComponentWaveform {
    /// Assembler with the nominal 100 Hz rate and 50 ms gap tolerance.
    pub fn new() -> Self {
        SingleComponentWaveform {
            interpolator: WigginsInterpolator::new(),
            network: String::new(),
            station: String::new(),
            channel: String::new(),
            location_code: String::new(),
        }
    }

    /// Assembler with an explicit nominal rate and gap tolerance.
    pub fn with_options(sampling_rate: f64, gap_tolerance_us: i64) -> Result<Self> {
        let mut waveform = Self::new();
        waveform.set_nominal_sampling_rate(sampling_rate)?;
        waveform.set_gap_tolerance_us(gap_tolerance_us);
        Ok(waveform)
    }

    /// Set the nominal sampling rate in Hz; must be positive. This is the
    /// station's metadata rate, which may differ slightly from any packet's.
    pub fn set_nominal_sampling_rate(&mut self, sampling_rate: f64) -> Result<()> {
        self.interpolator.set_target_sampling_rate(sampling_rate)
    }

    /// Nominal sampling rate in Hz.
    pub fn nominal_sampling_rate(&self) -> f64 {
        self.interpolator.target_sampling_rate()
    }

    /// Nominal sampling period in microseconds.
    pub fn nominal_sampling_period_us(&self) -> i64 {
        (1.0e6 / self.interpolator.target_sampling_rate()).round() as i64
    }

    /// Set the gap tolerance in microseconds.
    pub fn set_gap_tolerance_us(&mut self, gap_tolerance_us: i64) {
        self.interpolator.set_gap_tolerance_us(gap_tolerance_us);
    }

    /// Gap tolerance in microseconds.
    pub fn gap_tolerance_us(&self) -> i64 {
        self.interpolator.gap_tolerance_us()
    }

    /// Interpolate the full span of a response.
    pub fn set(&mut self, response: &DataResponse) -> Result<()> {
        self.set_window(response, i64::MIN, i64::MAX)
    }

    /// Interpolate a response over a caller-chosen window.
    ///
    /// The window is clipped to the packets' aggregate extent. Fails with
    /// [`Error::OutOfRange`] when the requested start postdates the data and
    /// with [`Error::InconsistentPackets`] when the response mixes channels.
    /// A response with zero packets produces an empty signal.
    pub fn set_window(
        &mut self,
        response: &DataResponse,
        start_time_us: i64,
        end_time_us: i64,
    ) -> Result<()> {
        self.interpolator.clear_signal();
        if end_time_us < start_time_us {
            return Err(Error::InvalidArgument(
                "start time cannot exceed end time".into(),
            ));
        }
        let packets = response.packets();
        if packets.is_empty() {
            return Ok(());
        }
        let (t0_packets, t1_packets) = check_packets(packets)?;
        if start_time_us > t1_packets {
            return Err(Error::OutOfRange(format!(
                "interpolation start {start_time_us} exceeds last sample {t1_packets}"
            )));
        }
        let t0 = start_time_us.max(t0_packets);
        let t1 = end_time_us.min(t1_packets);
        self.network = normalize_code(&packets[0].network);
        self.station = normalize_code(&packets[0].station);
        self.channel = normalize_code(&packets[0].channel);
        self.location_code = normalize_code(&packets[0].location_code);
        self.interpolator.interpolate(packets, t0, t1)
    }

    /// The continuous signal.
    pub fn signal(&self) -> &[f64] {
        self.interpolator.signal()
    }

    /// One byte per sample; 1 marks extrapolation through a gap.
    pub fn gap_indicator(&self) -> &[u8] {
        self.interpolator.gap_indicator()
    }

    /// True when the signal crosses any gap.
    pub fn have_gaps(&self) -> bool {
        self.interpolator.have_gaps()
    }

    /// Number of samples in the signal.
    pub fn sample_count(&self) -> usize {
        self.interpolator.sample_count()
    }

    /// Time of the first sample, microseconds since the epoch.
    pub fn start_time_us(&self) -> i64 {
        self.interpolator.start_time_us()
    }

    /// Time of the last sample, microseconds since the epoch.
    pub fn end_time_us(&self) -> i64 {
        self.interpolator.end_time_us()
    }

    /// Network code recorded from the response.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Station name recorded from the response.
    pub fn station(&self) -> &str {
        &self.station
    }

    /// Channel code recorded from the response.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Location code recorded from the response.
    pub fn location_code(&self) -> &str {
        &self.location_code
    }

    /// Drop the signal but keep configuration and naming.
    pub fn clear_signal(&mut self) {
        self.interpolator.clear_signal();
    }
}

// ─── Three components ───────────────────────────────────────────────────────

/// Correlates the vertical, north, and east responses of one station into
/// three continuous waveforms with one start time, one length, and one
/// shared gap mask.
#[derive(Debug, Clone)]
pub struct ThreeComponentWaveform {
    vertical: SingleComponentWaveform,
    north: SingleComponentWaveform,
    east: SingleComponentWaveform,
    gap_indicator: Vec<u8>,
    have_gaps: bool,
}

impl Default for ThreeComponentWaveform {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreeComponentWaveform {
    /// Assembler with the nominal 100 Hz rate and 50 ms gap tolerance.
    pub fn new() -> Self {
        ThreeComponentWaveform {
            vertical: SingleComponentWaveform::new(),
            north: SingleComponentWaveform::new(),
            east: SingleComponentWaveform::new(),
            gap_indicator: Vec::new(),
            have_gaps: false,
        }
    }

    /// Assembler with an explicit nominal rate and gap tolerance.
    pub fn with_options(sampling_rate: f64, gap_tolerance_us: i64) -> Result<Self> {
        let mut waveform = Self::new();
        waveform.set_nominal_sampling_rate(sampling_rate)?;
        waveform.set_gap_tolerance_us(gap_tolerance_us);
        Ok(waveform)
    }

    /// Set the nominal sampling rate in Hz on all three components.
    pub fn set_nominal_sampling_rate(&mut self, sampling_rate: f64) -> Result<()> {
        self.vertical.set_nominal_sampling_rate(sampling_rate)?;
        self.north.set_nominal_sampling_rate(sampling_rate)?;
        self.east.set_nominal_sampling_rate(sampling_rate)
    }

    /// Nominal sampling rate in Hz.
    pub fn nominal_sampling_rate(&self) -> f64 {
        self.vertical.nominal_sampling_rate()
    }

    /// Nominal sampling period in microseconds.
    pub fn nominal_sampling_period_us(&self) -> i64 {
        self.vertical.nominal_sampling_period_us()
    }

    /// Set the gap tolerance in microseconds on all three components.
    pub fn set_gap_tolerance_us(&mut self, gap_tolerance_us: i64) {
        self.vertical.set_gap_tolerance_us(gap_tolerance_us);
        self.north.set_gap_tolerance_us(gap_tolerance_us);
        self.east.set_gap_tolerance_us(gap_tolerance_us);
    }

    /// Gap tolerance in microseconds.
    pub fn gap_tolerance_us(&self) -> i64 {
        self.vertical.gap_tolerance_us()
    }

    /// Interpolate the three responses onto a common grid.
    ///
    /// Each response is validated independently; the three must share the
    /// network, station, and location code and expose coherent nominal
    /// sampling rates. The common window is the overlap of the three
    /// aggregate extents — max of the starts, min of the ends — so the three
    /// signals come out with one start time and one sample count. The gap
    /// mask is the logical OR of the three component masks.
    pub fn set(
        &mut self,
        vertical: &DataResponse,
        north: &DataResponse,
        east: &DataResponse,
    ) -> Result<()> {
        self.clear_signal();
        let components = [
            ("vertical", vertical),
            ("north", north),
            ("east", east),
        ];
        let mut extents = Vec::with_capacity(3);
        for (label, response) in &components {
            let packets = response.packets();
            if packets.is_empty() {
                return Err(Error::InvalidArgument(format!(
                    "no packets for the {label} component"
                )));
            }
            extents.push(check_packets(packets)?);
        }
        let z = &vertical.packets()[0];
        let n = &north.packets()[0];
        let e = &east.packets()[0];
        for (label, value, reference) in [
            ("network codes", &n.network, &z.network),
            ("network codes", &e.network, &z.network),
            ("station names", &n.station, &z.station),
            ("station names", &e.station, &z.station),
            ("location codes", &n.location_code, &z.location_code),
            ("location codes", &e.location_code, &z.location_code),
        ] {
            if normalize_code(value) != normalize_code(reference) {
                return Err(Error::InconsistentPackets(format!(
                    "inconsistent {label} across components"
                )));
            }
        }
        let nominal_rate = z.sampling_rate.round() as i64;
        if n.sampling_rate.round() as i64 != nominal_rate
            || e.sampling_rate.round() as i64 != nominal_rate
        {
            return Err(Error::InconsistentPackets(
                "inconsistent nominal sampling rates across components".into(),
            ));
        }
        let t0 = extents.iter().map(|&(t0, _)| t0).max().unwrap();
        let t1 = extents.iter().map(|&(_, t1)| t1).min().unwrap();
        if t1 < t0 {
            return Err(Error::InvalidArgument(
                "components do not overlap in time".into(),
            ));
        }
        self.vertical.set_window(vertical, t0, t1)?;
        self.north.set_window(north, t0, t1)?;
        self.east.set_window(east, t0, t1)?;
        let count = self.vertical.sample_count();
        if self.north.sample_count() != count || self.east.sample_count() != count {
            return Err(Error::AlgorithmicFailure(format!(
                "component sample counts disagree: {} {} {}",
                count,
                self.north.sample_count(),
                self.east.sample_count()
            )));
        }
        let mut mask = vec![0u8; count];
        {
            let z_mask = self.vertical.gap_indicator();
            let n_mask = self.north.gap_indicator();
            let e_mask = self.east.gap_indicator();
            for i in 0..count {
                mask[i] = ((z_mask[i] | n_mask[i] | e_mask[i]) != 0) as u8;
            }
        }
        self.have_gaps = mask.iter().any(|&g| g != 0);
        self.gap_indicator = mask;
        Ok(())
    }

    /// Number of samples in each component.
    pub fn sample_count(&self) -> usize {
        self.vertical.sample_count()
    }

    /// Time of the first sample, microseconds since the epoch.
    pub fn start_time_us(&self) -> i64 {
        self.vertical.start_time_us()
    }

    /// Time of the last sample, microseconds since the epoch.
    pub fn end_time_us(&self) -> i64 {
        self.vertical.end_time_us()
    }

    /// The vertical component's signal.
    pub fn vertical_signal(&self) -> &[f64] {
        self.vertical.signal()
    }

    /// The north (or 1) component's signal.
    pub fn north_signal(&self) -> &[f64] {
        self.north.signal()
    }

    /// The east (or 2) component's signal.
    pub fn east_signal(&self) -> &[f64] {
        self.east.signal()
    }

    /// Shared gap mask — 1 where any component crossed a gap.
    pub fn gap_indicator(&self) -> &[u8] {
        &self.gap_indicator
    }

    /// True when the shared mask carries any gap.
    pub fn have_gaps(&self) -> bool {
        self.have_gaps
    }

    /// Network code recorded from the responses.
    pub fn network(&self) -> &str {
        self.vertical.network()
    }

    /// Station name recorded from the responses.
    pub fn station(&self) -> &str {
        self.vertical.station()
    }

    /// Location code recorded from the responses.
    pub fn location_code(&self) -> &str {
        self.vertical.location_code()
    }

    /// Vertical channel code, e.g. `HHZ`.
    pub fn vertical_channel(&self) -> &str {
        self.vertical.channel()
    }

    /// North channel code, e.g. `HHN` or `HH1`.
    pub fn north_channel(&self) -> &str {
        self.north.channel()
    }

    /// East channel code, e.g. `HHE` or `HH2`.
    pub fn east_channel(&self) -> &str {
        self.east.channel()
    }

    /// Drop the signals but keep configuration and naming.
    pub fn clear_signal(&mut self) {
        self.vertical.clear_signal();
        self.north.clear_signal();
        self.east.clear_signal();
        self.gap_indicator.clear();
        self.have_gaps = false;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const T0_US: i64 = 1_644_516_968_000_000;

    fn packetize(channel: &str, signal: &[f64], rate: f64, packet_size: usize) -> Vec<Packet> {
        let period_us = 1.0e6 / rate;
        signal
            .chunks(packet_size)
            .enumerate()
            .map(|(i, chunk)| Packet {
                network: "UU".into(),
                station: "KHUT".into(),
                channel: channel.into(),
                location_code: "01".into(),
                sampling_rate: rate,
                start_time_us: T0_US + ((i * packet_size) as f64 * period_us).round() as i64,
                data: chunk.to_vec(),
            })
            .collect()
    }

    fn response_for(channel: &str, signal: &[f64]) -> DataResponse {
        let mut response = DataResponse::default();
        response
            .set_packets(packetize(channel, signal, 200.0, 100))
            .unwrap();
        response
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn single_component_resamples_a_response() {
        let signal = ramp(1200);
        let response = response_for("ENZ", &signal);
        let mut waveform = SingleComponentWaveform::with_options(250.0, 55_000).unwrap();
        assert_eq!(waveform.nominal_sampling_rate(), 250.0);
        assert_eq!(waveform.gap_tolerance_us(), 55_000);
        assert_eq!(waveform.nominal_sampling_period_us(), 4_000);

        waveform.set(&response).unwrap();
        assert_eq!(waveform.network(), "UU");
        assert_eq!(waveform.station(), "KHUT");
        assert_eq!(waveform.channel(), "ENZ");
        assert_eq!(waveform.location_code(), "01");
        // 1200 samples at 200 Hz span 5.995 s -> 1499 samples at 250 Hz.
        assert_eq!(waveform.sample_count(), 1499);
        assert_eq!(waveform.start_time_us(), T0_US);
        assert_eq!(waveform.end_time_us(), T0_US + 5_992_000);
        assert!(!waveform.have_gaps());
        // The ramp comes through linearly.
        for (k, value) in waveform.signal().iter().enumerate() {
            let reference = k as f64 * 0.8;
            assert!((value - reference).abs() < 1.0e-8);
        }
    }

    #[test]
    fn single_component_normalizes_naming() {
        let signal = ramp(300);
        let mut packets = packetize("enz ", &signal, 200.0, 100);
        for packet in &mut packets {
            packet.network = "uu".into();
        }
        let mut response = DataResponse::default();
        response.set_packets(packets).unwrap();
        let mut waveform = SingleComponentWaveform::new();
        waveform.set(&response).unwrap();
        assert_eq!(waveform.network(), "UU");
        assert_eq!(waveform.channel(), "ENZ");
    }

    #[test]
    fn single_component_empty_response_is_an_empty_signal() {
        let mut waveform = SingleComponentWaveform::new();
        waveform.set(&DataResponse::default()).unwrap();
        assert_eq!(waveform.sample_count(), 0);
        assert!(!waveform.have_gaps());
    }

    #[test]
    fn single_component_rejects_window_past_the_data() {
        let signal = ramp(300);
        let response = response_for("ENZ", &signal);
        let t_end = T0_US + 299 * 5_000;
        let mut waveform = SingleComponentWaveform::new();
        assert!(matches!(
            waveform.set_window(&response, t_end + 1_000_000, i64::MAX),
            Err(Error::OutOfRange(_))
        ));
    }

    #[test]
    fn single_component_rejects_inverted_window() {
        let response = response_for("ENZ", &ramp(300));
        let mut waveform = SingleComponentWaveform::new();
        assert!(waveform.set_window(&response, 100, 0).is_err());
    }

    #[test]
    fn single_component_clips_to_the_window() {
        let response = response_for("ENZ", &ramp(1200));
        let mut waveform = SingleComponentWaveform::with_options(200.0, 55_000).unwrap();
        waveform
            .set_window(&response, T0_US + 1_000_000, T0_US + 2_000_000)
            .unwrap();
        assert_eq!(waveform.start_time_us(), T0_US + 1_000_000);
        assert_eq!(waveform.end_time_us(), T0_US + 2_000_000);
        assert_eq!(waveform.sample_count(), 201);
    }

    fn three_component_responses() -> (DataResponse, DataResponse, DataResponse) {
        (
            response_for("HHZ", &ramp(1200)),
            response_for("HHN", &ramp(1200)),
            response_for("HHE", &ramp(1200)),
        )
    }

    #[test]
    fn three_component_alignment() {
        let (z, n, e) = three_component_responses();
        let mut waveform = ThreeComponentWaveform::with_options(250.0, 55_000).unwrap();
        waveform.set(&z, &n, &e).unwrap();
        assert_eq!(waveform.sample_count(), 1499);
        assert_eq!(waveform.vertical_signal().len(), 1499);
        assert_eq!(waveform.north_signal().len(), 1499);
        assert_eq!(waveform.east_signal().len(), 1499);
        assert_eq!(waveform.start_time_us(), T0_US);
        assert_eq!(waveform.network(), "UU");
        assert_eq!(waveform.station(), "KHUT");
        assert_eq!(waveform.vertical_channel(), "HHZ");
        assert_eq!(waveform.north_channel(), "HHN");
        assert_eq!(waveform.east_channel(), "HHE");
        assert!(!waveform.have_gaps());
        assert_eq!(waveform.gap_indicator().len(), 1499);
    }

    #[test]
    fn three_component_clips_to_common_overlap() {
        let z = response_for("HHZ", &ramp(1200));
        // North starts one second late: drop its first two packets.
        let mut north_packets = packetize("HHN", &ramp(1200), 200.0, 100);
        north_packets.drain(0..2);
        let mut n = DataResponse::default();
        n.set_packets(north_packets).unwrap();
        let e = response_for("HHE", &ramp(1200));

        let mut waveform = ThreeComponentWaveform::with_options(250.0, 55_000).unwrap();
        waveform.set(&z, &n, &e).unwrap();
        // Common window starts where the north data starts.
        assert_eq!(waveform.start_time_us(), T0_US + 1_000_000);
        let count = waveform.sample_count();
        assert_eq!(waveform.north_signal().len(), count);
        assert_eq!(waveform.east_signal().len(), count);
    }

    #[test]
    fn three_component_mask_is_the_or_of_components() {
        let z = response_for("HHZ", &ramp(1200));
        // Knock a hole in the north component only.
        let mut north_packets = packetize("HHN", &ramp(1200), 200.0, 100);
        north_packets.remove(5);
        let mut n = DataResponse::default();
        n.set_packets(north_packets).unwrap();
        let e = response_for("HHE", &ramp(1200));

        let mut waveform = ThreeComponentWaveform::with_options(250.0, 55_000).unwrap();
        waveform.set(&z, &n, &e).unwrap();
        assert!(waveform.have_gaps());
        // The shared mask mirrors the north component's gaps.
        assert_eq!(waveform.gap_indicator(), waveform.north.gap_indicator());
        assert!(waveform.vertical.gap_indicator().iter().all(|&g| g == 0));
    }

    #[test]
    fn three_component_rejects_station_mismatch() {
        let (z, n, mut e) = three_component_responses();
        let mut packets = e.packets().to_vec();
        for packet in &mut packets {
            packet.station = "OTHER".into();
        }
        e.set_packets(packets).unwrap();
        let mut waveform = ThreeComponentWaveform::new();
        assert!(matches!(
            waveform.set(&z, &n, &e),
            Err(Error::InconsistentPackets(_))
        ));
    }

    #[test]
    fn three_component_rejects_rate_mismatch() {
        let (z, n, mut e) = three_component_responses();
        let mut packets = e.packets().to_vec();
        for packet in &mut packets {
            packet.sampling_rate = 40.0;
        }
        e.set_packets(packets).unwrap();
        let mut waveform = ThreeComponentWaveform::new();
        assert!(matches!(
            waveform.set(&z, &n, &e),
            Err(Error::InconsistentPackets(_))
        ));
    }

    #[test]
    fn three_component_rejects_empty_component() {
        let (z, n, _) = three_component_responses();
        let mut waveform = ThreeComponentWaveform::new();
        assert!(waveform.set(&z, &n, &DataResponse::default()).is_err());
    }

    #[test]
    fn three_component_rejects_disjoint_components() {
        let z = response_for("HHZ", &ramp(200));
        let n = response_for("HHN", &ramp(200));
        // East sits a minute in the future.
        let mut east_packets = packetize("HHE", &ramp(200), 200.0, 100);
        for packet in &mut east_packets {
            packet.start_time_us += 60_000_000;
        }
        let mut e = DataResponse::default();
        e.set_packets(east_packets).unwrap();
        let mut waveform = ThreeComponentWaveform::new();
        assert!(waveform.set(&z, &n, &e).is_err());
    }
}
