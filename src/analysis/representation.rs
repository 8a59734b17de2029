use std::f32::consts::PI;

use log::info;
use ndarray::{s, Array2};
use rustfft::num_complex::Complex32;

use crate::constants::{frame_count, AMPLITUDE_DB_AMIN, POWER_DB_AMIN, TOP_DB};
use crate::error::{Error, Result};
use crate::preprocessing::load_audio::Waveform;

use super::cqt::{CqtParams, SpectralTransform};
use super::ported::librosa::{amplitude_to_db, frames_to_time, power_to_db};
use super::ported::numpy::unwrap_axis1;

/// Magnitude (and optionally phase) of a constant-Q analysis, `[bin][frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralRepresentation {
    pub magnitude: Array2<f32>,
    pub phase: Option<Array2<f32>>,
    pub sample_rate: u32,
    pub params: CqtParams,
}

impl SpectralRepresentation {
    /// Splits complex coefficients into magnitude and phase angle.
    pub fn from_coefficients(
        coefficients: &Array2<Complex32>,
        sample_rate: u32,
        params: CqtParams,
        keep_phase: bool,
    ) -> Self {
        Self {
            magnitude: coefficients.mapv(|c| c.norm()),
            phase: keep_phase.then(|| coefficients.mapv(|c| c.arg())),
            sample_rate,
            params,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.magnitude.dim()
    }

    pub fn hop_duration_seconds(&self) -> f32 {
        frames_to_time(1, self.sample_rate, self.params.hop_length)
    }

    /// Magnitude in dB relative to its own maximum, floored 80 dB below it.
    pub fn to_db(&self) -> Array2<f32> {
        amplitude_to_db(&self.magnitude, AMPLITUDE_DB_AMIN, Some(TOP_DB))
    }

    /// Power (squared magnitude) in dB relative to its maximum, without a floor.
    pub fn power_db(&self) -> Array2<f32> {
        power_to_db(&self.magnitude.mapv(|m| m * m), POWER_DB_AMIN, None)
    }

    /// Phase advance between consecutive frames, in units of pi. The first frame is zero.
    pub fn instantaneous_frequency(&self) -> Option<Array2<f32>> {
        let unwrapped = unwrap_axis1(self.phase.as_ref()?);
        let mut dphase = Array2::<f32>::zeros(unwrapped.dim());
        if unwrapped.ncols() > 1 {
            let diff = &unwrapped.slice(s![.., 1..]) - &unwrapped.slice(s![.., ..-1]);
            dphase.slice_mut(s![.., 1..]).assign(&(diff / PI));
        }
        Some(dphase)
    }
}

/// Runs `transform` on `waveform` and decomposes the result.
///
/// Fails with [`Error::ShapeMismatch`] if the transform does not deliver one column per
/// `hop_length` samples, since the ground truth is laid out on exactly that grid.
pub fn represent(
    transform: &dyn SpectralTransform,
    waveform: &Waveform,
    params: &CqtParams,
    keep_phase: bool,
) -> Result<SpectralRepresentation> {
    let coefficients = transform.transform(waveform, params)?;

    let expected = (params.n_bins, frame_count(waveform.len(), params.hop_length));
    if coefficients.dim() != expected {
        return Err(Error::ShapeMismatch {
            expected,
            actual: coefficients.dim(),
        });
    }

    let representation = SpectralRepresentation::from_coefficients(&coefficients, waveform.sample_rate, *params, keep_phase);

    info!("Sample rate: {}", waveform.sample_rate);
    info!("Hop duration: {:.1} ms", representation.hop_duration_seconds() * 1000.0);
    info!("Length audio: {:.1} sec", waveform.duration_seconds());
    info!(
        "Shape transformed: {:?} [{:.1} MB]",
        representation.shape(),
        (representation.magnitude.len() * std::mem::size_of::<f32>()) as f32 / 1e6
    );

    Ok(representation)
}
