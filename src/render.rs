use std::ffi::OsString;
use std::fs::remove_file;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::constants::{MIXER_PROGRAM, SYNTHESIZER_PROGRAM};
use crate::error::{Error, Result};
use crate::preprocessing::load_audio::mix_down_and_resample;

/// Renders a MIDI file to a (usually stereo) WAV file.
pub trait Synthesizer {
    fn render(&self, midi_path: &Path, soundfont_path: &Path, output_path: &Path) -> Result<PathBuf>;
}

/// Turns a multi-channel WAV file into a mono one at a fixed sample rate.
pub trait ChannelMixer {
    fn mix_to_mono(&self, input_path: &Path, output_path: &Path, sample_rate: u32) -> Result<PathBuf>;
}

/// Runs an external program to completion.
///
/// A missing program or a non-zero exit status is an error carrying the program's stderr,
/// and so is a run that succeeds without producing `expected_output`. Any file already at
/// `expected_output` is removed first, so a previous run's output never counts.
pub fn run_tool(program: &str, args: &[OsString], expected_output: &Path) -> Result<PathBuf> {
    match remove_file(expected_output) {
        Ok(()) => debug!("Removed stale {}", expected_output.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    debug!("Running {} {:?}", program, args);

    let output = Command::new(program).args(args).output().map_err(|source| Error::ToolNotFound {
        program: program.to_string(),
        source,
    })?;

    if !output.status.success() {
        return Err(Error::ToolFailed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    if !expected_output.exists() {
        return Err(Error::MissingOutput(expected_output.to_path_buf()));
    }

    info!("{} wrote {}", program, expected_output.display());
    Ok(expected_output.to_path_buf())
}

/// `fluidsynth -F <output> [-r <rate>] <soundfont> <midi>`
#[derive(Debug, Clone)]
pub struct FluidSynth {
    pub program: String,
    pub sample_rate: Option<u32>,
}

impl Default for FluidSynth {
    fn default() -> Self {
        Self {
            program: SYNTHESIZER_PROGRAM.to_string(),
            sample_rate: None,
        }
    }
}

impl FluidSynth {
    pub fn args(&self, midi_path: &Path, soundfont_path: &Path, output_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-F".into(), output_path.into()];
        if let Some(sample_rate) = self.sample_rate {
            args.push("-r".into());
            args.push(sample_rate.to_string().into());
        }
        args.push(soundfont_path.into());
        args.push(midi_path.into());
        args
    }
}

impl Synthesizer for FluidSynth {
    fn render(&self, midi_path: &Path, soundfont_path: &Path, output_path: &Path) -> Result<PathBuf> {
        if !soundfont_path.exists() {
            return Err(Error::InvalidParameters(format!(
                "soundfont {} does not exist",
                soundfont_path.display()
            )));
        }
        run_tool(&self.program, &self.args(midi_path, soundfont_path, output_path), output_path)
    }
}

/// `sox <input> -r <rate> <output> channels 1`
#[derive(Debug, Clone)]
pub struct Sox {
    pub program: String,
}

impl Default for Sox {
    fn default() -> Self {
        Self {
            program: MIXER_PROGRAM.to_string(),
        }
    }
}

impl Sox {
    pub fn args(&self, input_path: &Path, output_path: &Path, sample_rate: u32) -> Vec<OsString> {
        vec![
            input_path.into(),
            "-r".into(),
            sample_rate.to_string().into(),
            output_path.into(),
            "channels".into(),
            "1".into(),
        ]
    }
}

impl ChannelMixer for Sox {
    fn mix_to_mono(&self, input_path: &Path, output_path: &Path, sample_rate: u32) -> Result<PathBuf> {
        run_tool(&self.program, &self.args(input_path, output_path, sample_rate), output_path)
    }
}

/// Mixes down and resamples in process instead of calling out to a program.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResamplingMixer;

impl ChannelMixer for ResamplingMixer {
    fn mix_to_mono(&self, input_path: &Path, output_path: &Path, sample_rate: u32) -> Result<PathBuf> {
        mix_down_and_resample(input_path, output_path, sample_rate)?;
        Ok(output_path.to_path_buf())
    }
}
