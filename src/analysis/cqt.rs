use std::f32::consts::PI;

use log::debug;
use ndarray::Array2;
use rustfft::num_complex::Complex32;
use rustfft::FftPlanner;

use crate::constants::{frame_count, CQT_DECIMATION_LIMIT, CQT_SPARSITY};
use crate::error::{Error, Result};
use crate::preprocessing::load_audio::{halve, Waveform};

use super::ported::librosa::cqt_frequencies;

/// Layout of a constant-Q filter bank and its frame grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CqtParams {
    pub min_frequency_hz: f32,
    pub bins_per_octave: usize,
    pub n_bins: usize,
    pub hop_length: usize,
    pub filter_scale: f32,
    /// Offset of every bin in fractions of a bin.
    pub tuning: f32,
}

impl CqtParams {
    pub fn frequencies(&self) -> Vec<f32> {
        cqt_frequencies(self.n_bins, self.min_frequency_hz, self.bins_per_octave, self.tuning)
    }

    /// Quality factor: center frequency over bandwidth.
    pub fn q(&self) -> f32 {
        self.filter_scale / (2.0f32.powf(1.0 / self.bins_per_octave as f32) - 1.0)
    }

    pub fn validate(&self, sample_rate: u32) -> Result<()> {
        if self.bins_per_octave == 0 || self.n_bins == 0 || self.hop_length == 0 || sample_rate == 0 {
            return Err(Error::InvalidParameters(
                "bins per octave, bin count, hop length and sample rate must be non-zero".to_string(),
            ));
        }
        if !(self.min_frequency_hz > 0.0 && self.filter_scale > 0.0 && self.tuning.is_finite()) {
            return Err(Error::InvalidParameters(format!(
                "minimum frequency {} and filter scale {} must be positive",
                self.min_frequency_hz, self.filter_scale
            )));
        }

        let nyquist = sample_rate as f32 / 2.0;
        let highest = self.frequencies().last().copied().unwrap_or_default();
        if highest >= nyquist {
            return Err(Error::InvalidParameters(format!(
                "highest bin at {highest:.1} Hz is above the Nyquist frequency {nyquist:.1} Hz"
            )));
        }
        Ok(())
    }
}

/// Anything that turns audio into complex constant-Q coefficients.
///
/// Implementations return `[n_bins][frames]` with `frames = ceil(len / hop_length)`,
/// frame `t` centered on sample `t * hop_length`.
pub trait SpectralTransform {
    fn transform(&self, waveform: &Waveform, params: &CqtParams) -> Result<Array2<Complex32>>;
}

/// Frequency domain kernel of one bin, only the significant coefficients.
#[derive(Debug)]
struct SparseKernel {
    bin: usize,
    coefficients: Vec<(usize, Complex32)>,
}

/// All bins of one octave share an FFT size and a decimated copy of the signal.
#[derive(Debug)]
struct OctaveKernels {
    /// Power of two; the octave is evaluated at `sample_rate / decimation`.
    decimation: usize,
    fft_len: usize,
    kernels: Vec<SparseKernel>,
}

/// Largest power of two dividing `hop_length` at which `top_frequency` stays below
/// `CQT_DECIMATION_LIMIT` times the decimated sample rate.
fn decimation_for(top_frequency: f32, sample_rate: u32, hop_length: usize) -> usize {
    let mut factor = 1;
    while hop_length % (factor * 2) == 0
        && top_frequency < CQT_DECIMATION_LIMIT * sample_rate as f32 / (factor * 2) as f32
    {
        factor *= 2;
    }
    factor
}

/// Constant-Q transform after Brown and Puckette: every frame is correlated with
/// Hann windowed complex exponentials in the frequency domain, one FFT size per octave.
/// Low octaves run on the signal halved as often as their frequencies and the hop allow.
///
/// Filters are normalized to unit L1 norm, so a full-scale sinusoid on a bin center
/// reads about 0.5.
#[derive(Debug, Clone, Copy)]
pub struct ConstantQ {
    /// Kernel coefficients below this fraction of a kernel's peak are dropped.
    pub sparsity: f32,
}

impl Default for ConstantQ {
    fn default() -> Self {
        Self { sparsity: CQT_SPARSITY }
    }
}

impl ConstantQ {
    fn octave_kernels(
        &self,
        planner: &mut FftPlanner<f32>,
        params: &CqtParams,
        sample_rate: u32,
    ) -> Vec<OctaveKernels> {
        let frequencies = params.frequencies();
        let q = params.q();
        let bins: Vec<usize> = (0..params.n_bins).collect();

        bins.chunks(params.bins_per_octave)
            .map(|octave| {
                let top_frequency = octave.last().map_or(0.0, |&bin| frequencies[bin]);
                let decimation = decimation_for(top_frequency, sample_rate, params.hop_length);
                let sample_rate = sample_rate as f32 / decimation as f32;

                let lengths: Vec<usize> = octave
                    .iter()
                    .map(|&bin| (q * sample_rate / frequencies[bin]).ceil().max(1.0) as usize)
                    .collect();
                let fft_len = lengths.iter().copied().max().unwrap_or(1).next_power_of_two();
                let fft = planner.plan_fft_forward(fft_len);

                let kernels = octave
                    .iter()
                    .zip(lengths)
                    .map(|(&bin, length)| {
                        let mut buffer = vec![Complex32::new(0.0, 0.0); fft_len];
                        let offset = (fft_len - length) / 2;
                        let window: Vec<f32> = (0..length)
                            .map(|n| 0.5 - 0.5 * (2.0 * PI * n as f32 / length as f32).cos())
                            .collect();
                        let norm: f32 = window.iter().sum();
                        let omega = 2.0 * PI * frequencies[bin] / sample_rate;

                        for (n, w) in window.iter().enumerate() {
                            // Phase is relative to the frame center.
                            let t = (offset + n) as f32 - (fft_len / 2) as f32;
                            buffer[offset + n] = Complex32::from_polar(w / norm, omega * t);
                        }
                        fft.process(&mut buffer);

                        let peak = buffer.iter().map(|c| c.norm()).fold(0.0, f32::max);
                        let threshold = peak * self.sparsity;
                        let coefficients = buffer
                            .iter()
                            .enumerate()
                            .filter(|(_, c)| c.norm() >= threshold)
                            .map(|(j, c)| (j, c.conj() / fft_len as f32))
                            .collect();

                        SparseKernel { bin, coefficients }
                    })
                    .collect();

                OctaveKernels {
                    decimation,
                    fft_len,
                    kernels,
                }
            })
            .collect()
    }
}

impl SpectralTransform for ConstantQ {
    fn transform(&self, waveform: &Waveform, params: &CqtParams) -> Result<Array2<Complex32>> {
        params.validate(waveform.sample_rate)?;

        let n_frames = frame_count(waveform.len(), params.hop_length);
        let mut coefficients = Array2::<Complex32>::zeros((params.n_bins, n_frames));

        let mut planner = FftPlanner::new();
        let octaves = self.octave_kernels(&mut planner, params, waveform.sample_rate);

        // levels[i] is the signal halved i times.
        let mut levels: Vec<Vec<f32>> = vec![waveform.samples.to_vec()];

        for octave in &octaves {
            let level = octave.decimation.trailing_zeros() as usize;
            while levels.len() <= level {
                let next = halve(&levels[levels.len() - 1])?;
                levels.push(next);
            }
            let samples = &levels[level];
            let hop_length = params.hop_length / octave.decimation;

            debug!(
                "CQT octave of {} bins with FFT size {}, decimated by {}",
                octave.kernels.len(),
                octave.fft_len,
                octave.decimation
            );
            let fft = planner.plan_fft_forward(octave.fft_len);
            let mut buffer = vec![Complex32::new(0.0, 0.0); octave.fft_len];
            let half = (octave.fft_len / 2) as isize;

            for frame in 0..n_frames {
                let start = (frame * hop_length) as isize - half;
                for (m, value) in buffer.iter_mut().enumerate() {
                    let index = start + m as isize;
                    *value = if index >= 0 && (index as usize) < samples.len() {
                        Complex32::new(samples[index as usize], 0.0)
                    } else {
                        Complex32::new(0.0, 0.0)
                    };
                }
                fft.process(&mut buffer);

                for kernel in &octave.kernels {
                    coefficients[[kernel.bin, frame]] = kernel
                        .coefficients
                        .iter()
                        .map(|&(j, k)| buffer[j] * k)
                        .sum();
                }
            }
        }

        Ok(coefficients)
    }
}
