use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use ndarray::Array1;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::constants::{PCM16_OFFSET, PCM16_SCALE};
use crate::error::{Error, Result};

/// Mono audio with its sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub sample_rate: u32,
    pub samples: Array1<f32>,
}

impl Waveform {
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            samples: Array1::from(samples),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }
}

/// Maps a signed integer sample to [-1, 1] with the same half-step bias as
/// `(s + 0.5) / 32767.5` for 16-bit audio.
fn normalize_int_sample(sample: i32, bits_per_sample: u16) -> f32 {
    if bits_per_sample == 16 {
        return (sample as f32 + PCM16_OFFSET) / PCM16_SCALE;
    }
    let scale = 2.0_f64.powi(i32::from(bits_per_sample) - 1) - 0.5;
    ((f64::from(sample) + 0.5) / scale) as f32
}

fn read_interleaved<R: std::io::Read>(reader: WavReader<R>) -> Result<Vec<f32>> {
    let spec = reader.spec();
    let samples = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => reader
            .into_samples::<i32>()
            .map(|s| s.map(|s| normalize_int_sample(s, spec.bits_per_sample)))
            .collect::<std::result::Result<Vec<_>, _>>()?,
    };
    Ok(samples)
}

/// Reads a mono WAV file.
///
/// 16-bit samples are normalized as `(s + 0.5) / 32767.5`, float samples are taken as they are.
pub fn read_wave<P: AsRef<Path>>(path: P) -> Result<Waveform> {
    let reader = WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(Error::InvalidParameters(format!(
            "{} has {} channels, expected mono",
            path.as_ref().display(),
            spec.channels
        )));
    }

    let samples = read_interleaved(reader)?;
    debug!("Read {} samples at {} Hz from {}", samples.len(), spec.sample_rate, path.as_ref().display());

    Ok(Waveform::new(spec.sample_rate, samples))
}

/// Writes a mono 16-bit WAV file, the inverse of the normalization applied by [`read_wave`].
pub fn write_wave<P: AsRef<Path>>(path: P, waveform: &Waveform) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for &sample in waveform.samples.iter() {
        let value = (sample * PCM16_SCALE - PCM16_OFFSET).round();
        writer.write_sample(value.clamp(i16::MIN as f32, i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;

    Ok(())
}

fn resample(samples: Vec<f32>, source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate {
        return Ok(samples);
    }
    resample_by_ratio(samples, f64::from(target_rate) / f64::from(source_rate))
}

/// Low-pass filters and drops every other sample, keeping the signal aligned in time.
pub fn halve(samples: &[f32]) -> Result<Vec<f32>> {
    resample_by_ratio(samples.to_vec(), 0.5)
}

fn resample_by_ratio(samples: Vec<f32>, resample_ratio: f64) -> Result<Vec<f32>> {
    let expected_len = (samples.len() as f64 * resample_ratio).round() as usize;
    if expected_len == 0 {
        return Ok(vec![]);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f64>::new(resample_ratio, 2.0, params, samples.len(), 1)?;
    let channel_data = vec![samples.iter().map(|&s| f64::from(s)).collect::<Vec<_>>()];

    let mut output = resampler.process(&channel_data, None)?.remove(0);
    // Flush the filter tail so the delay can be cut from the front.
    while output.len() < expected_len + resampler.output_delay() {
        let tail = resampler.process_partial::<Vec<f64>>(None, None)?.remove(0);
        if tail.is_empty() {
            break;
        }
        output.extend(tail);
    }

    Ok(output
        .into_iter()
        .skip(resampler.output_delay())
        .take(expected_len)
        .map(|s| s as f32)
        .collect())
}

/// Mixes a WAV file of any channel count down to mono and resamples it to `target_sample_rate`.
pub fn mix_down_and_resample(input: &Path, output: &Path, target_sample_rate: u32) -> Result<Waveform> {
    let reader = WavReader::open(input)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved = read_interleaved(reader)?;
    let mono: Vec<f32> = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    let samples = resample(mono, spec.sample_rate, target_sample_rate)?;
    let waveform = Waveform::new(target_sample_rate, samples);
    write_wave(output, &waveform)?;

    info!(
        "Mixed {} channels at {} Hz down to mono at {} Hz ({:.1} sec)",
        channels,
        spec.sample_rate,
        target_sample_rate,
        waveform.duration_seconds()
    );
    Ok(waveform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::temp_dir;

    #[test]
    fn pcm16_normalization_keeps_the_half_step_bias() {
        assert_eq!(normalize_int_sample(0, 16), 0.5 / 32767.5);
        assert_eq!(normalize_int_sample(32767, 16), 1.0);
        assert_eq!(normalize_int_sample(-32768, 16), -1.0);
    }

    #[test]
    fn written_waves_read_back_exactly() {
        let dir = temp_dir("wave_round_trip");
        let path = dir.join("mono.wav");

        let raw: Vec<i16> = vec![0, 1, -1, 1000, -32768, 32767];
        let samples: Vec<f32> = raw.iter().map(|&s| normalize_int_sample(i32::from(s), 16)).collect();
        write_wave(&path, &Waveform::new(8000, samples.clone())).unwrap();

        let waveform = read_wave(&path).unwrap();
        assert_eq!(waveform.sample_rate, 8000);
        assert_eq!(waveform.samples.to_vec(), samples);
    }

    #[test]
    fn stereo_files_are_not_accepted_as_waveforms() {
        let dir = temp_dir("stereo_rejected");
        let path = dir.join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        assert!(matches!(read_wave(&path), Err(Error::InvalidParameters(_))));
    }

    #[test]
    fn mix_down_averages_channels() {
        let dir = temp_dir("mix_down");
        let stereo = dir.join("stereo.wav");
        let mono = dir.join("mono.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&stereo, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(0.5f32).unwrap();
            writer.write_sample(-0.25f32).unwrap();
        }
        writer.finalize().unwrap();

        let waveform = mix_down_and_resample(&stereo, &mono, 8000).unwrap();
        assert_eq!(waveform.len(), 100);
        assert!(waveform.samples.iter().all(|&s| (s - 0.125).abs() < 1e-4));

        let reread = read_wave(&mono).unwrap();
        assert_eq!(reread.len(), 100);
    }

    #[test]
    fn resampling_scales_the_length() {
        let samples: Vec<f32> = (0..4410).map(|i| (i as f32 * 0.01).sin() * 0.5).collect();
        let resampled = resample(samples, 44100, 22050).unwrap();
        assert_eq!(resampled.len(), 2205);
    }

    #[test]
    fn halving_keeps_low_tones_in_place() {
        let tone = |n: usize, rate: f32| (2.0 * std::f32::consts::PI * 100.0 * n as f32 / rate).sin();
        let samples: Vec<f32> = (0..8000).map(|n| tone(n, 8000.0)).collect();

        let halved = halve(&samples).unwrap();
        assert_eq!(halved.len(), 4000);
        for n in 500..3500 {
            assert!((halved[n] - tone(n, 4000.0)).abs() < 0.02, "sample {}: {}", n, halved[n]);
        }
        assert!(halve(&[0.5]).unwrap().len() <= 1);
        assert!(halve(&[]).unwrap().is_empty());
    }
}
