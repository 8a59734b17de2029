use std::{io, path::PathBuf, process::ExitStatus};

/// Errors raised while generating, analysing or learning from a dataset.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid note: {0}")]
    InvalidNote(String),

    #[error("pitch {pitch} outside of the rasterized range [{lowest}, {highest}]")]
    PitchOutOfRange { pitch: u8, lowest: u8, highest: u8 },

    #[error("a MIDI file holds at most {max} tracks")]
    TooManyTracks { max: usize },

    #[error("instrument on track {track} is not part of this sequence")]
    UnknownInstrument { track: usize },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("external program `{program}` could not be started: {source}")]
    ToolNotFound {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("external program `{program}` failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("expected output file {0} is missing")]
    MissingOutput(PathBuf),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("midi error: {0}")]
    Midi(#[from] midly::Error),

    #[error("resampler construction error: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling error: {0}")]
    Resample(#[from] rubato::ResampleError),

    #[error("npy write error: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    #[error("npy read error: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
