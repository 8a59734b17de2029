// Audio
pub const AUDIO_SAMPLE_RATE: u32 = 44100;
pub const HOP_LENGTH: usize = 512;
pub const PCM16_OFFSET: f32 = 0.5;
pub const PCM16_SCALE: f32 = 32767.5;

// Constant-Q analysis
pub const LOWEST_NOTE: u8 = 24; // C1
pub const HIGHEST_NOTE: u8 = 131;
pub const BINS_PER_NOTE: usize = 4;
pub const FILTER_SCALE: f32 = 1.0;
pub const CQT_SPARSITY: f32 = 0.01;
pub const CQT_DECIMATION_LIMIT: f32 = 0.4; // highest bin of a decimated octave / decimated sample rate
pub const AMPLITUDE_DB_AMIN: f32 = 1e-5;
pub const POWER_DB_AMIN: f32 = 1e-13;
pub const TOP_DB: f32 = 80.0;

// MIDI Conversion
pub const TICKS_PER_BEAT: u16 = 960;
pub const MAX_MICROS_PER_BEAT: u32 = 0xFF_FFFF;
pub const MAX_TRACKS: usize = 16;
pub const PERCUSSION_CHANNEL: u8 = 9;
pub const DEFAULT_VELOCITY: u8 = 100;

// General MIDI programs
pub const PIANO: u8 = 0;
pub const EPIANO1: u8 = 4;
pub const NYLON_GUITAR: u8 = 24;
pub const CLEAN_GUITAR: u8 = 27;
pub const OVERDRIVEN_GUITAR: u8 = 29;
pub const DISTORTION_GUITAR: u8 = 30;
pub const DEFAULT_PROGRAMS: [u8; 6] = [
    PIANO,
    EPIANO1,
    NYLON_GUITAR,
    CLEAN_GUITAR,
    OVERDRIVEN_GUITAR,
    DISTORTION_GUITAR,
];

// External tools
pub const SYNTHESIZER_PROGRAM: &str = "fluidsynth";
pub const MIXER_PROGRAM: &str = "sox";
pub const SOUNDFONT_PATH: &str = "/usr/share/sounds/sf2/FluidR3_GM.sf2";

// Training
pub const LEARNING_RATE: f32 = 0.1;
pub const BATCH_SIZE: usize = 32;
pub const MAX_ITERATIONS: usize = 10000;
pub const STOP_LOSS: f32 = 1e-3;

/// Number of analysis frames covering `raw_length` samples.
///
/// Both the ground truth and the spectral transform are laid out on this grid.
pub fn frame_count(raw_length: usize, hop_length: usize) -> usize {
    raw_length.div_ceil(hop_length)
}
