/// A voice of the sequence: one General MIDI program on its own track and channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instrument {
    pub program: u8,
    pub track: usize,
    pub channel: u8,
}

/// General MIDI percussion keys used on channel 9.
pub struct Percussion;

impl Percussion {
    pub const ACOUSTIC_BASS_DRUM: u8 = 35;
    pub const ACOUSTIC_SNARE: u8 = 38;
    pub const CLOSED_HI_HAT: u8 = 42;
}

/// A scheduled note. Times are in beats; the tempo of the owning sequence maps them to seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    pub instrument: Instrument,
    pub pitch: u8,
    pub start_beat: f64,
    pub duration_beat: f64,
    pub velocity: u8,
}

impl Note {
    pub fn end_beat(&self) -> f64 {
        self.start_beat + self.duration_beat
    }
}
