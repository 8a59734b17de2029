use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use log::info;
use ndarray_npy::write_npy;

use crate::analysis::cqt::{ConstantQ, SpectralTransform};
use crate::analysis::representation::{represent, SpectralRepresentation};
use crate::config::{Config, DatasetConfig, MixerKind};
use crate::error::{Error, Result};
use crate::ground_truth::{ground_truth, GroundTruthMatrix};
use crate::preprocessing::load_audio::{read_wave, Waveform};
use crate::render::{ChannelMixer, FluidSynth, ResamplingMixer, Sox, Synthesizer};
use crate::sequence::note_sequence::NoteSequence;

/// File names of one dataset unit, all derived from a shared base path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    base: PathBuf,
}

impl DatasetPaths {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.base.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        self.base.with_file_name(name)
    }

    pub fn midi(&self) -> PathBuf {
        self.with_suffix(".mid")
    }

    pub fn stereo_wave(&self) -> PathBuf {
        self.with_suffix("_stereo.wav")
    }

    pub fn wave(&self) -> PathBuf {
        self.with_suffix(".wav")
    }

    pub fn magnitude(&self) -> PathBuf {
        self.with_suffix("_cqt.npy")
    }

    pub fn db(&self) -> PathBuf {
        self.with_suffix("_db.npy")
    }

    pub fn phase(&self) -> PathBuf {
        self.with_suffix("_phase.npy")
    }

    pub fn power_db(&self) -> PathBuf {
        self.with_suffix("_power_db.npy")
    }

    pub fn instantaneous_frequency(&self) -> PathBuf {
        self.with_suffix("_if.npy")
    }

    pub fn ground_truth(&self) -> PathBuf {
        self.with_suffix("_gt.npy")
    }
}

/// An aligned (representation, ground truth) pair.
#[derive(Debug, Clone)]
pub struct DatasetUnit {
    pub representation: SpectralRepresentation,
    pub ground_truth: GroundTruthMatrix,
}

/// Drives one dataset generation run: notes, MIDI, audio, analysis and labels.
pub struct DatasetAssembler {
    config: DatasetConfig,
    soundfont: PathBuf,
    synthesizer: Box<dyn Synthesizer>,
    mixer: Box<dyn ChannelMixer>,
    transform: Box<dyn SpectralTransform>,
}

impl std::fmt::Debug for DatasetAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetAssembler")
            .field("config", &self.config)
            .field("soundfont", &self.soundfont)
            .finish_non_exhaustive()
    }
}

impl DatasetAssembler {
    pub fn new(
        config: DatasetConfig,
        soundfont: PathBuf,
        synthesizer: Box<dyn Synthesizer>,
        mixer: Box<dyn ChannelMixer>,
        transform: Box<dyn SpectralTransform>,
    ) -> Self {
        Self {
            config,
            soundfont,
            synthesizer,
            mixer,
            transform,
        }
    }

    /// FluidSynth, the configured mixer and the built-in constant-Q transform.
    pub fn from_config(config: &Config) -> Self {
        let synthesizer = FluidSynth {
            program: config.tools.synthesizer.clone(),
            sample_rate: Some(config.dataset.sample_rate),
        };
        let mixer: Box<dyn ChannelMixer> = match config.tools.mixer {
            MixerKind::External => Box::new(Sox {
                program: config.tools.mixer_program.clone(),
            }),
            MixerKind::Builtin => Box::new(ResamplingMixer),
        };

        Self::new(
            config.dataset,
            config.tools.soundfont.clone(),
            Box::new(synthesizer),
            mixer,
            Box::new(ConstantQ::default()),
        )
    }

    /// Writes the MIDI file of `sequence` and renders it to a mono waveform.
    ///
    /// Every step reads the file written by the previous one; the first failure aborts the run.
    pub fn render(&self, sequence: &NoteSequence, paths: &DatasetPaths) -> Result<Waveform> {
        if let Some(parent) = paths.midi().parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }

        sequence.write_midi(paths.midi())?;
        let stereo = self.synthesizer.render(&paths.midi(), &self.soundfont, &paths.stereo_wave())?;
        let mono = self.mixer.mix_to_mono(&stereo, &paths.wave(), self.config.sample_rate)?;

        read_wave(mono)
    }

    /// Computes the representation of `waveform` and the ground truth of `sequence` on the same grid.
    pub fn analyse(&self, sequence: &NoteSequence, waveform: &Waveform) -> Result<DatasetUnit> {
        if waveform.sample_rate != self.config.sample_rate {
            return Err(Error::InvalidParameters(format!(
                "audio is at {} Hz, the dataset is configured for {} Hz",
                waveform.sample_rate, self.config.sample_rate
            )));
        }

        let representation = represent(
            self.transform.as_ref(),
            waveform,
            &self.config.cqt_params(),
            self.config.keep_phase,
        )?;
        let ground_truth = ground_truth(
            sequence.notes(),
            &self.config.raster_params(sequence.tempo_bpm(), waveform.len()),
        )?;

        if representation.shape() != ground_truth.shape() {
            return Err(Error::ShapeMismatch {
                expected: representation.shape(),
                actual: ground_truth.shape(),
            });
        }

        Ok(DatasetUnit {
            representation,
            ground_truth,
        })
    }

    /// The whole pipeline for one unit, arrays written next to the audio.
    pub fn assemble(&self, sequence: &NoteSequence, base: &Path) -> Result<DatasetUnit> {
        let paths = DatasetPaths::new(base);
        let waveform = self.render(sequence, &paths)?;
        let unit = self.analyse(sequence, &waveform)?;
        persist(&unit, &paths)?;
        Ok(unit)
    }
}

/// Writes the arrays of a unit as `.npy` files.
///
/// Phase and instantaneous frequency are only written when the representation kept its phase.
pub fn persist(unit: &DatasetUnit, paths: &DatasetPaths) -> Result<()> {
    let representation = &unit.representation;
    write_npy(paths.magnitude(), &representation.magnitude)?;
    write_npy(paths.db(), &representation.to_db())?;
    write_npy(paths.power_db(), &representation.power_db())?;
    write_npy(paths.ground_truth(), &unit.ground_truth.activity)?;
    if let Some(phase) = &representation.phase {
        write_npy(paths.phase(), phase)?;
    }
    if let Some(dphase) = representation.instantaneous_frequency() {
        write_npy(paths.instantaneous_frequency(), &dphase)?;
    }

    info!(
        "Dataset unit {:?} written to {}",
        unit.ground_truth.shape(),
        paths.base.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use hound::{SampleFormat, WavSpec, WavWriter};
    use ndarray::Array2;
    use ndarray_npy::read_npy;

    use super::*;
    use crate::test_util::temp_dir;

    /// Renders one second of a 440 Hz tone, whatever the MIDI file says.
    struct ToneSynthesizer;

    impl Synthesizer for ToneSynthesizer {
        fn render(&self, midi_path: &Path, _soundfont_path: &Path, output_path: &Path) -> Result<PathBuf> {
            assert!(midi_path.exists());
            let spec = WavSpec {
                channels: 2,
                sample_rate: 8000,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            };
            let mut writer = WavWriter::create(output_path, spec)?;
            for n in 0..8000 {
                let value = ((2.0 * PI * 440.0 * n as f32 / 8000.0).sin() * 16000.0) as i16;
                writer.write_sample(value)?;
                writer.write_sample(value)?;
            }
            writer.finalize()?;
            Ok(output_path.to_path_buf())
        }
    }

    fn small_config() -> DatasetConfig {
        DatasetConfig {
            sample_rate: 8000,
            hop_length: 64,
            lowest_note: 57,
            highest_note: 69,
            bins_per_note: 1,
            filter_scale: 1.0,
            tuning: 0.0,
            keep_phase: false,
        }
    }

    fn assembler(synthesizer: Box<dyn Synthesizer>) -> DatasetAssembler {
        DatasetAssembler::new(
            small_config(),
            PathBuf::from("unused.sf2"),
            synthesizer,
            Box::new(ResamplingMixer),
            Box::new(ConstantQ::default()),
        )
    }

    fn a_note() -> NoteSequence {
        let mut sequence = NoteSequence::new(60.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();
        sequence.add_note(piano, 69, 0.0, 0.5, 100).unwrap();
        sequence
    }

    #[test]
    fn assembled_arrays_share_one_grid() {
        let dir = temp_dir("assemble");
        let base = dir.join("units").join("tone");

        let unit = assembler(Box::new(ToneSynthesizer)).assemble(&a_note(), &base).unwrap();
        assert_eq!(unit.representation.shape(), (13, 125));
        assert_eq!(unit.ground_truth.shape(), (13, 125));

        let row = unit.ground_truth.activity.row(12);
        assert!(row.iter().take(62).all(|&v| v == 1.0));
        assert_eq!(row[62], 0.5);
        assert!(row.iter().skip(63).all(|&v| v == 0.0));

        let magnitude = &unit.representation.magnitude;
        for frame in 20..100 {
            let loudest = (0..13).max_by(|&a, &b| magnitude[[a, frame]].total_cmp(&magnitude[[b, frame]]));
            assert_eq!(loudest, Some(12));
        }

        let paths = DatasetPaths::new(&base);
        for path in [paths.midi(), paths.stereo_wave(), paths.wave(), paths.magnitude(), paths.db()] {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(!paths.phase().exists());
        assert!(!paths.instantaneous_frequency().exists());
        let stored: Array2<f32> = read_npy(paths.ground_truth()).unwrap();
        assert_eq!(stored, unit.ground_truth.activity);

        let power_db: Array2<f32> = read_npy(paths.power_db()).unwrap();
        assert_eq!(power_db.dim(), (13, 125));
        let peak = power_db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(peak.abs() < 1e-4);
    }

    #[test]
    fn kept_phase_writes_phase_diagnostics() {
        let dir = temp_dir("assemble_phase");
        let base = dir.join("tone");
        let mut assembler = assembler(Box::new(ToneSynthesizer));
        assembler.config.keep_phase = true;

        let unit = assembler.assemble(&a_note(), &base).unwrap();
        let paths = DatasetPaths::new(&base);

        let phase: Array2<f32> = read_npy(paths.phase()).unwrap();
        assert_eq!(Some(&phase), unit.representation.phase.as_ref());
        let dphase: Array2<f32> = read_npy(paths.instantaneous_frequency()).unwrap();
        assert_eq!(dphase.dim(), (13, 125));
        assert!(dphase.column(0).iter().all(|&v| v == 0.0));
        assert!(dphase.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn failing_synthesizer_aborts_the_run() {
        let dir = temp_dir("assemble_failure");
        let soundfont = dir.join("gm.sf2");
        std::fs::write(&soundfont, b"").unwrap();
        let synthesizer = FluidSynth {
            program: "cqt-datagen-no-such-synth".to_string(),
            sample_rate: None,
        };
        let assembler = DatasetAssembler::new(
            small_config(),
            soundfont,
            Box::new(synthesizer),
            Box::new(ResamplingMixer),
            Box::new(ConstantQ::default()),
        );

        let base = dir.join("unit");
        let error = assembler.assemble(&a_note(), &base).unwrap_err();
        assert!(matches!(error, Error::ToolNotFound { .. }));

        let paths = DatasetPaths::new(&base);
        assert!(paths.midi().exists());
        assert!(!paths.wave().exists());
        assert!(!paths.ground_truth().exists());
    }

    #[test]
    fn notes_outside_the_grid_abort_the_analysis() {
        let mut sequence = NoteSequence::new(60.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();
        sequence.add_note(piano, 70, 0.0, 0.5, 100).unwrap();

        let waveform = Waveform::new(8000, vec![0.0; 800]);
        let error = assembler(Box::new(ToneSynthesizer)).analyse(&sequence, &waveform).unwrap_err();
        assert!(matches!(error, Error::PitchOutOfRange { pitch: 70, .. }));
    }

    #[test]
    fn audio_at_another_rate_is_rejected() {
        let waveform = Waveform::new(16000, vec![0.0; 800]);
        let error = assembler(Box::new(ToneSynthesizer)).analyse(&a_note(), &waveform).unwrap_err();
        assert!(matches!(error, Error::InvalidParameters(_)));
    }

    #[test]
    fn paths_share_the_base_name() {
        let paths = DatasetPaths::new("out/run1");
        assert_eq!(paths.midi(), PathBuf::from("out/run1.mid"));
        assert_eq!(paths.stereo_wave(), PathBuf::from("out/run1_stereo.wav"));
        assert_eq!(paths.ground_truth(), PathBuf::from("out/run1_gt.npy"));
        assert_eq!(paths.power_db(), PathBuf::from("out/run1_power_db.npy"));
        assert_eq!(paths.instantaneous_frequency(), PathBuf::from("out/run1_if.npy"));
    }
}
