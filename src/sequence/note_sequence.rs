use log::debug;

use crate::constants::{MAX_MICROS_PER_BEAT, MAX_TRACKS, PERCUSSION_CHANNEL};
use crate::error::{Error, Result};

use super::note::{Instrument, Note};

/// An append-only list of notes together with the instruments playing them and the tempo.
///
/// The same list feeds both the MIDI file handed to the synthesizer and the ground truth,
/// so the rendered audio and its labels always describe the same notes.
#[derive(Debug, Clone)]
pub struct NoteSequence {
    tempo_bpm: f64,
    instruments: Vec<Instrument>,
    notes: Vec<Note>,
    next_channel: u8,
}

impl NoteSequence {
    /// Starts an empty sequence.
    ///
    /// The tempo must be positive and fast enough for a MIDI tempo event, which holds at
    /// most 2^24 - 1 microseconds per beat (about 3.6 bpm).
    pub fn new(tempo_bpm: f64) -> Result<Self> {
        if !(tempo_bpm.is_finite() && tempo_bpm > 0.0) {
            return Err(Error::InvalidParameters(format!("tempo must be positive, got {tempo_bpm}")));
        }
        if micros_per_beat(tempo_bpm) > f64::from(MAX_MICROS_PER_BEAT) {
            return Err(Error::InvalidParameters(format!(
                "tempo {tempo_bpm} bpm is too slow for a MIDI tempo event"
            )));
        }

        Ok(Self {
            tempo_bpm,
            instruments: vec![],
            notes: vec![],
            next_channel: 0,
        })
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Converts a beat position to seconds at this sequence's tempo.
    pub fn seconds_to_time(&self, beat: f64) -> f64 {
        seconds_to_time(beat, self.tempo_bpm)
    }

    /// Total length of the sequence in beats, i.e. the latest note end.
    pub fn duration_beats(&self) -> f64 {
        self.notes.iter().map(Note::end_beat).fold(0.0, f64::max)
    }

    /// Registers a melodic instrument on the next free track and channel.
    ///
    /// The percussion channel is never handed out here, use [`NoteSequence::add_percussion`].
    pub fn add_instrument(&mut self, program: u8) -> Result<Instrument> {
        if program > 127 {
            return Err(Error::InvalidParameters(format!("program {program} is not a MIDI program")));
        }

        if self.next_channel == PERCUSSION_CHANNEL {
            self.next_channel += 1;
        }
        if usize::from(self.next_channel) >= MAX_TRACKS {
            return Err(Error::TooManyTracks { max: MAX_TRACKS });
        }

        let instrument = Instrument {
            program,
            track: self.track_for_next_instrument()?,
            channel: self.next_channel,
        };
        self.next_channel += 1;
        self.instruments.push(instrument);

        debug!("Instrument {:?} added", instrument);
        Ok(instrument)
    }

    /// Registers a percussion voice on channel 9.
    pub fn add_percussion(&mut self) -> Result<Instrument> {
        let instrument = Instrument {
            program: 0,
            track: self.track_for_next_instrument()?,
            channel: PERCUSSION_CHANNEL,
        };
        self.instruments.push(instrument);
        Ok(instrument)
    }

    /// Registers one instrument per program, in order.
    pub fn setup_instruments(&mut self, programs: &[u8]) -> Result<Vec<Instrument>> {
        programs.iter().map(|&program| self.add_instrument(program)).collect()
    }

    /// Schedules a note.
    ///
    /// # Arguments
    ///
    /// * `instrument` - An instrument previously registered on this sequence.
    /// * `pitch` - MIDI note number, 0 to 127.
    /// * `start_beat` - Onset in beats, not negative.
    /// * `duration_beat` - Length in beats, strictly positive.
    /// * `volume` - MIDI velocity, 0 to 127.
    ///
    /// Overlapping notes, even on the same pitch, are accepted.
    pub fn add_note(
        &mut self,
        instrument: Instrument,
        pitch: u8,
        start_beat: f64,
        duration_beat: f64,
        volume: u8,
    ) -> Result<()> {
        if !self.instruments.contains(&instrument) {
            return Err(Error::UnknownInstrument { track: instrument.track });
        }
        if pitch > 127 {
            return Err(Error::InvalidNote(format!("pitch {pitch} is outside the MIDI range")));
        }
        if volume > 127 {
            return Err(Error::InvalidNote(format!("volume {volume} is outside the MIDI range")));
        }
        if !(start_beat.is_finite() && start_beat >= 0.0) {
            return Err(Error::InvalidNote(format!("start beat must be >= 0, got {start_beat}")));
        }
        if !(duration_beat.is_finite() && duration_beat > 0.0) {
            return Err(Error::InvalidNote(format!("duration must be > 0, got {duration_beat}")));
        }

        self.notes.push(Note {
            instrument,
            pitch,
            start_beat,
            duration_beat,
            velocity: volume,
        });
        Ok(())
    }

    fn track_for_next_instrument(&self) -> Result<usize> {
        // Track 0 is the conductor track carrying the tempo.
        let track = self.instruments.len() + 1;
        if track >= MAX_TRACKS {
            return Err(Error::TooManyTracks { max: MAX_TRACKS });
        }
        Ok(track)
    }
}

pub fn seconds_to_time(beat: f64, tempo_bpm: f64) -> f64 {
    beat * 60.0 / tempo_bpm
}

/// Length of one beat in microseconds, as written to a MIDI tempo event.
pub fn micros_per_beat(tempo_bpm: f64) -> f64 {
    (60_000_000.0 / tempo_bpm).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::note::Percussion;

    #[test]
    fn seconds_to_time_is_monotonic() {
        let sequence = NoteSequence::new(93.0).unwrap();
        for start in [0.0, 0.25, 3.0, 117.5] {
            for duration in [0.001, 0.075, 1.0, 16.0] {
                assert!(sequence.seconds_to_time(start + duration) > sequence.seconds_to_time(start));
            }
        }
        assert_eq!(sequence.seconds_to_time(0.0), 0.0);
        assert_eq!(seconds_to_time(2.0, 120.0), 1.0);
    }

    #[test]
    fn instruments_skip_the_percussion_channel() {
        let mut sequence = NoteSequence::new(120.0).unwrap();
        let instruments = sequence.setup_instruments(&[0; 11]).unwrap();

        let channels: Vec<u8> = instruments.iter().map(|i| i.channel).collect();
        assert_eq!(channels, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11]);
        let tracks: Vec<usize> = instruments.iter().map(|i| i.track).collect();
        assert_eq!(tracks, (1..=11).collect::<Vec<_>>());
    }

    #[test]
    fn track_limit_is_enforced() {
        let mut sequence = NoteSequence::new(120.0).unwrap();
        sequence.setup_instruments(&[0; 15]).unwrap();
        assert!(matches!(sequence.add_instrument(0), Err(Error::TooManyTracks { .. })));
        assert!(matches!(sequence.add_percussion(), Err(Error::TooManyTracks { .. })));
    }

    #[test]
    fn percussion_uses_channel_nine() {
        let mut sequence = NoteSequence::new(120.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();
        let drums = sequence.add_percussion().unwrap();
        assert_eq!(piano.channel, 0);
        assert_eq!(drums.channel, PERCUSSION_CHANNEL);
        assert_eq!(drums.track, 2);

        sequence.add_note(drums, Percussion::CLOSED_HI_HAT, 0.0, 0.25, 100).unwrap();
        assert_eq!(sequence.notes()[0].instrument.channel, PERCUSSION_CHANNEL);
    }

    #[test]
    fn add_note_validates_its_arguments() {
        let mut sequence = NoteSequence::new(60.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();

        assert!(matches!(sequence.add_note(piano, 60, 0.0, 0.0, 100), Err(Error::InvalidNote(_))));
        assert!(matches!(sequence.add_note(piano, 60, 0.0, -1.0, 100), Err(Error::InvalidNote(_))));
        assert!(matches!(sequence.add_note(piano, 128, 0.0, 1.0, 100), Err(Error::InvalidNote(_))));
        assert!(matches!(sequence.add_note(piano, 60, -0.5, 1.0, 100), Err(Error::InvalidNote(_))));
        assert!(matches!(sequence.add_note(piano, 60, 0.0, 1.0, 128), Err(Error::InvalidNote(_))));

        let stranger = Instrument { program: 0, track: 7, channel: 7 };
        assert!(matches!(
            sequence.add_note(stranger, 60, 0.0, 1.0, 100),
            Err(Error::UnknownInstrument { track: 7 })
        ));

        assert!(sequence.notes().is_empty());
    }

    #[test]
    fn overlapping_notes_are_kept() {
        let mut sequence = NoteSequence::new(60.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();
        sequence.add_note(piano, 60, 0.0, 2.0, 100).unwrap();
        sequence.add_note(piano, 60, 1.0, 2.0, 90).unwrap();

        assert_eq!(sequence.notes().len(), 2);
        assert_eq!(sequence.duration_beats(), 3.0);
    }

    #[test]
    fn tempo_must_be_positive() {
        assert!(NoteSequence::new(0.0).is_err());
        assert!(NoteSequence::new(f64::NAN).is_err());
    }

    #[test]
    fn tempo_must_fit_a_midi_tempo_event() {
        assert!(matches!(NoteSequence::new(3.5), Err(Error::InvalidParameters(_))));
        assert!(NoteSequence::new(3.6).is_ok());
        assert_eq!(micros_per_beat(120.0), 500_000.0);
    }
}
