/* PORTED LIBROSA FUNCTIONS */

use ndarray::Array2;

use super::numpy::global_max;

/// Converts a MIDI pitch to the corresponding frequency in Hz.
///
/// # Arguments
///
/// * `midi` - A MIDI pitch.
///
/// # Returns
///
/// * The corresponding frequency in Hz.
pub fn midi_to_hz(midi: f32) -> f32 {
    440.0 * 2.0f32.powf((midi - 69.0) / 12.0)
}

/// Center frequencies of a constant-Q filter bank.
///
/// # Arguments
///
/// * `n_bins` - Number of bins.
/// * `fmin` - Frequency of the lowest bin in Hz.
/// * `bins_per_octave` - Bins per octave.
/// * `tuning` - Tuning offset in fractions of a bin.
pub fn cqt_frequencies(n_bins: usize, fmin: f32, bins_per_octave: usize, tuning: f32) -> Vec<f32> {
    let fmin = fmin * 2.0f32.powf(tuning / bins_per_octave as f32);
    (0..n_bins)
        .map(|k| fmin * 2.0f32.powf(k as f32 / bins_per_octave as f32))
        .collect()
}

/// Converts the start of a frame to seconds.
pub fn frames_to_time(frame: usize, sample_rate: u32, hop_length: usize) -> f32 {
    (frame * hop_length) as f32 / sample_rate as f32
}

/// Convert a power spectrogram to decibel units, relative to its own maximum.
///
/// # Arguments
///
/// * `power` - Input power.
/// * `amin` - Minimum threshold for `power` and the reference value.
/// * `top_db` - Threshold the output at `top_db` below the peak.
pub fn power_to_db(power: &Array2<f32>, amin: f32, top_db: Option<f32>) -> Array2<f32> {
    let reference = 10.0 * global_max(power).max(amin).log10();
    let mut log_spec = power.mapv(|p| 10.0 * p.max(amin).log10() - reference);

    if let Some(top_db) = top_db {
        let floor = global_max(&log_spec) - top_db;
        log_spec.mapv_inplace(|v| v.max(floor));
    }

    log_spec
}

/// Convert an amplitude spectrogram to decibel units, relative to its own maximum.
///
/// Equivalent to `20 * log10(magnitude / max(magnitude))` with both sides floored at `amin`.
pub fn amplitude_to_db(magnitude: &Array2<f32>, amin: f32, top_db: Option<f32>) -> Array2<f32> {
    let power = magnitude.mapv(|m| m.abs().powi(2));
    power_to_db(&power, amin * amin, top_db)
}
