//! # Pitch Detection Module
//!
//! This module implements the YIN pitch detection algorithm for a single
//! analysis frame. It reports a fundamental frequency together with a
//! confidence value and never fails: frames without a usable period come
//! back as [`PitchEstimate::UNVOICED`].
//!
//! ## Features
//! - Amplitude gating to filter out silence
//! - Cumulative mean normalized difference with an absolute threshold
//! - Fallback to the global minimum for breathy or noisy tones
//! - Parabolic interpolation for sub-sample accuracy

use crate::PitchEstimate;

/// Frames with an RMS level below this are reported as silence.
pub const SILENCE_RMS: f32 = 0.005;
/// Lowest detectable fundamental in Hz.
pub const MIN_FREQUENCY_HZ: u32 = 80;
/// Highest detectable fundamental in Hz.
pub const MAX_FREQUENCY_HZ: u32 = 2000;
/// Absolute threshold on the normalized difference for the first dip.
pub const YIN_THRESHOLD: f32 = 0.15;
/// The global minimum is only accepted below this value.
pub const FALLBACK_THRESHOLD: f32 = 0.8;

/// Period search range `[min_period, max_period)` in samples.
pub fn period_bounds(sample_rate: u32) -> (usize, usize) {
    let min_period = (sample_rate / MAX_FREQUENCY_HZ).max(1) as usize;
    let max_period = (sample_rate / MIN_FREQUENCY_HZ) as usize;
    (min_period, max_period)
}

/// Smallest frame that covers two periods of the lowest detectable pitch.
pub fn min_frame_size(sample_rate: u32) -> usize {
    let (_, max_period) = period_bounds(sample_rate);
    2 * max_period + 1
}

/// Estimates the fundamental frequency of one frame with the YIN algorithm.
///
/// # Arguments
/// * `frame` - Audio samples of one frame
/// * `sample_rate` - Sample rate in Hz
///
/// # Precondition
/// `frame.len()` should be at least [`min_frame_size`]. Shorter frames only
/// search the lags that fit in half the frame, so low pitches are missed.
///
/// # Returns
/// The frequency in Hz and `1 - d'(tau)` as confidence, or
/// [`PitchEstimate::UNVOICED`] for silence and aperiodic frames.
pub fn estimate(frame: &[f32], sample_rate: u32) -> PitchEstimate {
    let frame_size = frame.len();
    if frame_size == 0 || sample_rate == 0 {
        return PitchEstimate::UNVOICED;
    }

    // --- Noise Gate: Calculate RMS to filter out silence ---
    let rms = (frame.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if rms < SILENCE_RMS {
        return PitchEstimate::UNVOICED;
    }

    let half = frame_size / 2;
    let (min_period, max_period) = period_bounds(sample_rate);
    let search_end = max_period.min(half.saturating_sub(1));
    if min_period >= search_end {
        return PitchEstimate::UNVOICED;
    }

    // One lag past the search range so the last candidate keeps a right neighbour.
    let mut yin_buffer = vec![0.0; search_end + 1];
    difference(frame, half, &mut yin_buffer);
    cumulative_mean_normalize(&mut yin_buffer);

    let tau = match absolute_threshold(&yin_buffer, min_period, search_end) {
        Some(tau) => tau,
        None => match global_minimum(&yin_buffer, min_period, search_end) {
            Some(tau) if yin_buffer[tau] < FALLBACK_THRESHOLD => tau,
            _ => return PitchEstimate::UNVOICED,
        },
    };

    let period = parabolic_interpolation(&yin_buffer, tau);
    let frequency = sample_rate as f32 / period;
    if !frequency.is_finite() || frequency <= 0.0 {
        return PitchEstimate::UNVOICED;
    }

    PitchEstimate {
        frequency,
        confidence: (1.0 - yin_buffer[tau]).clamp(0.0, 1.0),
    }
}

/// Squared difference `d(tau)` over the first `window` samples.
fn difference(signal: &[f32], window: usize, yin_buffer: &mut [f32]) {
    yin_buffer[0] = 0.0;
    for tau in 1..yin_buffer.len() {
        let mut diff = 0.0;
        for i in 0..window {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }
}

/// Turns `d(tau)` into `d'(tau) = d(tau) * tau / sum(d(1..=tau))`, with `d'(0) = 1`.
fn cumulative_mean_normalize(yin_buffer: &mut [f32]) {
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..yin_buffer.len() {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }
}

/// First lag in `[start, end)` under [`YIN_THRESHOLD`], followed down to the
/// bottom of its dip.
fn absolute_threshold(yin_buffer: &[f32], start: usize, end: usize) -> Option<usize> {
    let mut tau = (start..end).find(|&tau| yin_buffer[tau] < YIN_THRESHOLD)?;
    while tau + 1 < end && yin_buffer[tau + 1] < yin_buffer[tau] {
        tau += 1;
    }
    Some(tau)
}

fn global_minimum(yin_buffer: &[f32], start: usize, end: usize) -> Option<usize> {
    (start..end).min_by(|&a, &b| yin_buffer[a].total_cmp(&yin_buffer[b]))
}

/// Refines an integer lag with a parabola through its two neighbours.
fn parabolic_interpolation(yin_buffer: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= yin_buffer.len() {
        return tau as f32;
    }

    let y1 = yin_buffer[tau - 1];
    let y2 = yin_buffer[tau];
    let y3 = yin_buffer[tau + 1];

    let denominator = y1 - 2.0 * y2 + y3;
    if denominator == 0.0 {
        return tau as f32;
    }
    let shift = (y1 - y3) / (2.0 * denominator);
    if shift.abs() < 1.0 {
        tau as f32 + shift
    } else {
        tau as f32
    }
}
