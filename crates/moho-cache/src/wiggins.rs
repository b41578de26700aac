//! # Wiggins Interpolation
//!
//! Weighted-average-slopes resampling (Wiggins, 1976) of an unordered,
//! possibly gappy, variable-rate packet set for one channel onto a regular
//! grid, together with a per-output-sample gap indicator.
//!
//! The method fits a cubic Hermite segment between consecutive samples with
//! node derivatives formed as slope averages weighted by inverse slope
//! magnitude, and forces an extremum at any sample where the slope changes
//! sign. The curve passes exactly through every sample.

use moho_wire::{Error, Packet, Result};

const MICROSECONDS_PER_SECOND: f64 = 1.0e6;

// ─── Weighted-average slopes kernel ─────────────────────────────────────────

/// Evaluate the Wiggins interpolant of `(times_us, values)` at `eval_us`.
///
/// `eval_us` must be ascending and lie within the data extent. With
/// `check_sorting` set, the samples are sorted by time and duplicate
/// abscissas collapsed before fitting.
fn weighted_average_slopes(
    times_us: &[i64],
    values: &[f64],
    eval_us: &[i64],
    check_sorting: bool,
) -> Result<Vec<f64>> {
    debug_assert_eq!(times_us.len(), values.len());
    let mut sorted_times = Vec::new();
    let mut sorted_values = Vec::new();
    let (times, values) = if check_sorting {
        let mut order: Vec<usize> = (0..times_us.len()).collect();
        order.sort_by_key(|&i| times_us[i]);
        sorted_times.reserve(order.len());
        sorted_values.reserve(order.len());
        for &i in &order {
            if sorted_times.last() == Some(&times_us[i]) {
                continue;
            }
            sorted_times.push(times_us[i]);
            sorted_values.push(values[i]);
        }
        (&sorted_times[..], &sorted_values[..])
    } else {
        (times_us, values)
    };
    let n = times.len();
    if n < 2 {
        return Err(Error::InvalidArgument(
            "at least two distinct sample times are required".into(),
        ));
    }

    // Work in seconds relative to the first sample so the arithmetic stays
    // well conditioned for epoch timestamps.
    let t_ref = times[0];
    let x: Vec<f64> = times
        .iter()
        .map(|&t| (t - t_ref) as f64 / MICROSECONDS_PER_SECOND)
        .collect();

    let mut slopes = Vec::with_capacity(n - 1);
    for i in 0..n - 1 {
        slopes.push((values[i + 1] - values[i]) / (x[i + 1] - x[i]));
    }

    // Node derivatives: steep segments get little say.
    let sign = |v: f64| {
        if v > 0.0 {
            1
        } else if v < 0.0 {
            -1
        } else {
            0
        }
    };
    let weight = |m: f64| 1.0 / m.abs().max(f64::EPSILON);
    let mut derivatives = vec![0.0; n];
    derivatives[0] = slopes[0];
    derivatives[n - 1] = slopes[n - 2];
    for i in 1..n - 1 {
        let (m0, m1) = (slopes[i - 1], slopes[i]);
        derivatives[i] = if sign(m0) != sign(m1) {
            // Extremum at the sample itself, not in between.
            0.0
        } else {
            let (w0, w1) = (weight(m0), weight(m1));
            (w0 * m0 + w1 * m1) / (w0 + w1)
        };
    }

    // Piecewise cubic Hermite evaluation; the targets are ascending so one
    // forward walk over the segments suffices.
    let mut result = Vec::with_capacity(eval_us.len());
    let mut segment = 0usize;
    for &t_us in eval_us {
        while segment < n - 2 && t_us >= times[segment + 1] {
            segment += 1;
        }
        let h = x[segment + 1] - x[segment];
        let t = (t_us - t_ref) as f64 / MICROSECONDS_PER_SECOND;
        let u = ((t - x[segment]) / h).clamp(0.0, 1.0);
        let u2 = u * u;
        let u3 = u2 * u;
        let h00 = 2.0 * u3 - 3.0 * u2 + 1.0;
        let h10 = u3 - 2.0 * u2 + u;
        let h01 = -2.0 * u3 + 3.0 * u2;
        let h11 = u3 - u2;
        result.push(
            h00 * values[segment]
                + h10 * h * derivatives[segment]
                + h01 * values[segment + 1]
                + h11 * h * derivatives[segment + 1],
        );
    }
    Ok(result)
}

// ─── Gap detection ──────────────────────────────────────────────────────────

/// Intervals between adjacent packet extents wider than the tolerance.
///
/// Sorted input pairs neighbours in O(N); unsorted input hunts each packet's
/// nearest successor in O(N²).
fn gap_intervals(tolerance_us: i64, segments: &[(i64, i64)], sorted: bool) -> Vec<(i64, i64)> {
    let mut gaps = Vec::with_capacity(segments.len());
    if sorted {
        for pair in segments.windows(2) {
            let (end, next_start) = (pair[0].1, pair[1].0);
            if next_start - end > tolerance_us {
                gaps.push((end, next_start));
            }
        }
    } else {
        for (i, &(_, end)) in segments.iter().enumerate() {
            let mut nearest: Option<i64> = None;
            for (j, &(start, _)) in segments.iter().enumerate() {
                if i == j || start < end {
                    continue;
                }
                if nearest.map_or(true, |best| start < best) {
                    nearest = Some(start);
                }
            }
            if let Some(start) = nearest {
                if start - end > tolerance_us {
                    gaps.push((end, start));
                }
            }
        }
    }
    gaps
}

// ─── Interpolator ───────────────────────────────────────────────────────────

/// Gap-aware resampler producing a regularly sampled signal plus a gap mask
/// over a caller-chosen window.
///
/// The outputs are owned buffers rebuilt on every [`interpolate`] call; the
/// source packets are never retained.
///
/// [`interpolate`]: WigginsInterpolator::interpolate
#[derive(Debug, Clone)]
pub struct WigginsInterpolator {
    target_sampling_rate: f64,
    gap_tolerance_us: i64,
    signal: Vec<f64>,
    gap_indicator: Vec<u8>,
    start_time_us: i64,
    end_time_us: i64,
    have_gaps: bool,
}

impl Default for WigginsInterpolator {
    fn default() -> Self {
        WigginsInterpolator {
            target_sampling_rate: 100.0,
            gap_tolerance_us: 50_000,
            signal: Vec::new(),
            gap_indicator: Vec::new(),
            start_time_us: 0,
            end_time_us: 0,
            have_gaps: false,
        }
    }
}

impl WigginsInterpolator {
    /// Interpolator with the default 100 Hz target rate and 50 ms gap
    /// tolerance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output sampling rate in Hz; must be positive.
    pub fn set_target_sampling_rate(&mut self, rate: f64) -> Result<()> {
        if rate <= 0.0 {
            return Err(Error::InvalidArgument(
                "sampling rate must be positive".into(),
            ));
        }
        self.target_sampling_rate = rate;
        Ok(())
    }

    /// Output sampling rate in Hz.
    pub fn target_sampling_rate(&self) -> f64 {
        self.target_sampling_rate
    }

    /// Set the inter-packet interval, in microseconds, beyond which
    /// interpolated samples are flagged as gaps. Zero or negative flags
    /// every sample interpolated between packets.
    pub fn set_gap_tolerance_us(&mut self, tolerance_us: i64) {
        self.gap_tolerance_us = tolerance_us;
    }

    /// Gap tolerance in microseconds.
    pub fn gap_tolerance_us(&self) -> i64 {
        self.gap_tolerance_us
    }

    /// The resampled signal from the last [`interpolate`] call.
    ///
    /// [`interpolate`]: WigginsInterpolator::interpolate
    pub fn signal(&self) -> &[f64] {
        &self.signal
    }

    /// One byte per output sample: 0 inside a source packet's extent, 1
    /// between packets and beyond tolerance.
    pub fn gap_indicator(&self) -> &[u8] {
        &self.gap_indicator
    }

    /// True when any output sample is flagged as a gap.
    pub fn have_gaps(&self) -> bool {
        self.have_gaps
    }

    /// Number of output samples.
    pub fn sample_count(&self) -> usize {
        self.signal.len()
    }

    /// Time of the first output sample, microseconds since the epoch.
    pub fn start_time_us(&self) -> i64 {
        self.start_time_us
    }

    /// Time of the last output sample, microseconds since the epoch.
    pub fn end_time_us(&self) -> i64 {
        self.end_time_us
    }

    /// Drop the interpolated signal but keep the configuration.
    pub fn clear_signal(&mut self) {
        self.signal.clear();
        self.gap_indicator.clear();
        self.start_time_us = 0;
        self.end_time_us = 0;
        self.have_gaps = false;
    }

    /// Resample `packets` onto a regular grid covering the intersection of
    /// the requested window and the data extent.
    ///
    /// The packets may arrive in any order and may overlap or duplicate one
    /// another; they must all carry sampling rates. An empty packet set, or
    /// a window falling entirely outside the data, produces an empty signal
    /// without error.
    pub fn interpolate(
        &mut self,
        packets: &[Packet],
        t0_req_us: i64,
        t1_req_us: i64,
    ) -> Result<()> {
        self.clear_signal();
        if packets.is_empty() {
            return Ok(());
        }
        if t0_req_us > t1_req_us {
            return Err(Error::InvalidArgument(
                "interpolation start time exceeds end time".into(),
            ));
        }
        if packets.iter().any(|p| p.sampling_rate <= 0.0) {
            return Err(Error::InvalidArgument(
                "sampling rate must be set for all packets".into(),
            ));
        }
        let total: usize = packets.iter().map(Packet::sample_count).sum();
        if total < 2 {
            return Err(Error::InvalidArgument(
                "at least two samples are required".into(),
            ));
        }
        // Already ordered end-to-start? The back-fill path is rare, so the
        // sorted fast path is the one that matters.
        let sorted = packets
            .windows(2)
            .all(|w| w[0].end_time_us() < w[1].start_time_us);
        // Flatten samples and absolute times. Times are rounded against the
        // packet start, not accumulated, so long packets do not drift.
        let mut times = Vec::with_capacity(total);
        let mut data = Vec::with_capacity(total);
        let mut segments = Vec::with_capacity(packets.len());
        for packet in packets {
            if packet.data.is_empty() {
                continue;
            }
            let period_us = MICROSECONDS_PER_SECOND / packet.sampling_rate;
            for (i, &value) in packet.data.iter().enumerate() {
                times.push(packet.start_time_us + (i as f64 * period_us).round() as i64);
                data.push(value);
            }
            segments.push((packet.start_time_us, packet.end_time_us()));
        }
        let (t_min, t_max) = if sorted {
            (times[0], *times.last().unwrap())
        } else {
            (
                *times.iter().min().unwrap(),
                *times.iter().max().unwrap(),
            )
        };
        // A request beginning after the data ends, or ending before it
        // starts, is abandoned.
        if t0_req_us >= t_max || t1_req_us < t_min {
            return Ok(());
        }
        let t0 = t_min.max(t0_req_us);
        let t1 = t_max.min(t1_req_us);
        let period_us = (MICROSECONDS_PER_SECOND / self.target_sampling_rate).round() as i64;
        let n_out = (t1 - t0) / period_us + 1;
        let eval: Vec<i64> = (0..n_out).map(|k| t0 + k * period_us).collect();

        self.signal = weighted_average_slopes(&times, &data, &eval, !sorted)?;
        self.start_time_us = t0;
        self.end_time_us = *eval.last().unwrap();
        let gaps = gap_intervals(self.gap_tolerance_us, &segments, sorted);
        self.fill_gap_indicator(period_us, &eval, &gaps);
        Ok(())
    }

    fn fill_gap_indicator(&mut self, period_us: i64, eval: &[i64], gaps: &[(i64, i64)]) {
        self.gap_indicator = vec![0; eval.len()];
        self.have_gaps = false;
        if gaps.is_empty() {
            return;
        }
        // Half a sample of guard on each side keeps samples landing on
        // packet boundaries out of the gap.
        let guard_us = period_us / 2;
        for &(gap_start, gap_end) in gaps {
            let i0 = eval.partition_point(|&t| t <= gap_start);
            for i in i0..eval.len() {
                let t = eval[i];
                if t >= gap_end {
                    break;
                }
                if gap_start + guard_us < t && t < gap_end - guard_us {
                    self.gap_indicator[i] = 1;
                    self.have_gaps = true;
                }
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
