use std::fs::read_to_string;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::analysis::cqt::CqtParams;
use crate::analysis::ported::librosa::midi_to_hz;
use crate::constants::{
    AUDIO_SAMPLE_RATE, BATCH_SIZE, BINS_PER_NOTE, FILTER_SCALE, HIGHEST_NOTE, HOP_LENGTH, LEARNING_RATE,
    LOWEST_NOTE, MAX_ITERATIONS, MIXER_PROGRAM, SOUNDFONT_PATH, STOP_LOSS, SYNTHESIZER_PROGRAM,
};
use crate::error::Result;
use crate::ground_truth::RasterParams;

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub tools: ToolsConfig,
    pub train: TrainConfig,
}

/// The analysis grid shared by the spectral representation and the ground truth.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub sample_rate: u32,
    pub hop_length: usize,
    pub lowest_note: u8,
    pub highest_note: u8,
    pub bins_per_note: usize,
    pub filter_scale: f32,
    pub tuning: f32,
    pub keep_phase: bool,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            sample_rate: AUDIO_SAMPLE_RATE,
            hop_length: HOP_LENGTH,
            lowest_note: LOWEST_NOTE,
            highest_note: HIGHEST_NOTE,
            bins_per_note: BINS_PER_NOTE,
            filter_scale: FILTER_SCALE,
            tuning: 0.0,
            keep_phase: false,
        }
    }
}

impl DatasetConfig {
    pub fn n_bins(&self) -> usize {
        (usize::from(self.highest_note.max(self.lowest_note)) - usize::from(self.lowest_note) + 1) * self.bins_per_note
    }

    /// Constant-Q layout whose rows line up with the ground truth rows:
    /// the lowest bin sits on `lowest_note` and every semitone has `bins_per_note` bins.
    pub fn cqt_params(&self) -> CqtParams {
        CqtParams {
            min_frequency_hz: midi_to_hz(f32::from(self.lowest_note)),
            bins_per_octave: 12 * self.bins_per_note,
            n_bins: self.n_bins(),
            hop_length: self.hop_length,
            filter_scale: self.filter_scale,
            tuning: self.tuning,
        }
    }

    /// Ground truth layout for `raw_length` samples of audio rendered at `tempo_bpm`.
    pub fn raster_params(&self, tempo_bpm: f64, raw_length: usize) -> RasterParams {
        RasterParams {
            tempo_bpm,
            sample_rate: self.sample_rate,
            raw_length,
            hop_length: self.hop_length,
            lowest_note: self.lowest_note,
            highest_note: self.highest_note,
            bins_per_note: self.bins_per_note,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MixerKind {
    /// An external program such as sox.
    External,
    /// In-process mix down and resampling.
    Builtin,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub synthesizer: String,
    pub soundfont: PathBuf,
    pub mixer: MixerKind,
    pub mixer_program: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            synthesizer: SYNTHESIZER_PROGRAM.to_string(),
            soundfont: PathBuf::from(SOUNDFONT_PATH),
            mixer: MixerKind::External,
            mixer_program: MIXER_PROGRAM.to_string(),
        }
    }
}

/// Optimisation settings of the regressor, passed explicitly into training.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub max_iterations: usize,
    pub stop_loss: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: LEARNING_RATE,
            batch_size: BATCH_SIZE,
            max_iterations: MAX_ITERATIONS,
            stop_loss: STOP_LOSS,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let config = Self::from_toml(&read_to_string(path)?)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}
