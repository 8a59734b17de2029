use log::info;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::constants::{DEFAULT_PROGRAMS, DEFAULT_VELOCITY};
use crate::error::{Error, Result};

use super::note_sequence::NoteSequence;

const SWEEP_TEMPO_BPM: f64 = 120.0;
const SWEEP_BASE_PITCH: u8 = 60;

const RANDOM_TEMPO_BPM: f64 = 60.0;
const RANDOM_CENTER_PITCH: u8 = 60;
const RANDOM_PITCH_SPREAD: u8 = 24;
const RANDOM_MIN_DURATION: f64 = 0.075;
const RANDOM_MAX_DURATION: f64 = 0.5;
const RANDOM_MAX_GAP: f64 = 0.1;

/// Every default instrument plays one ascending chromatic octave from middle C,
/// one beat per note, the instruments following each other.
pub fn chromatic_sweep() -> Result<NoteSequence> {
    let mut sequence = NoteSequence::new(SWEEP_TEMPO_BPM)?;
    let instruments = sequence.setup_instruments(&DEFAULT_PROGRAMS)?;

    let duration = 1.0;
    let mut beat = 1.0;
    for instrument in instruments {
        for step in 0..12 {
            sequence.add_note(instrument, SWEEP_BASE_PITCH + step, beat, duration, DEFAULT_VELOCITY)?;
            beat += duration;
        }
    }

    info!("Chromatic sweep with {} notes", sequence.notes().len());
    Ok(sequence)
}

/// Non-overlapping single notes on random default instruments until `total_beats` is reached.
///
/// Durations are drawn from [0.075, 0.5) beats, pitches from two octaves around middle C
/// and the gap after every note from [0, 0.1) beats.
pub fn random_single_notes<R: Rng>(rng: &mut R, total_beats: f64) -> Result<NoteSequence> {
    let mut sequence = NoteSequence::new(RANDOM_TEMPO_BPM)?;
    let instruments = sequence.setup_instruments(&DEFAULT_PROGRAMS)?;

    let mut beat = 0.0;
    while beat < total_beats {
        let instrument = *instruments
            .choose(rng)
            .ok_or_else(|| Error::InvalidParameters("no instruments to choose from".to_string()))?;
        let duration = rng.gen_range(RANDOM_MIN_DURATION..RANDOM_MAX_DURATION);
        let pitch = rng.gen_range(RANDOM_CENTER_PITCH - RANDOM_PITCH_SPREAD..RANDOM_CENTER_PITCH + RANDOM_PITCH_SPREAD);
        sequence.add_note(instrument, pitch, beat, duration, DEFAULT_VELOCITY)?;
        beat += duration + rng.gen_range(0.0..RANDOM_MAX_GAP);
    }

    info!(
        "Random sequence with {} notes over {:.1} beats",
        sequence.notes().len(),
        sequence.duration_beats()
    );
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn sweep_covers_an_octave_per_instrument() {
        let sequence = chromatic_sweep().unwrap();
        assert_eq!(sequence.instruments().len(), DEFAULT_PROGRAMS.len());
        assert_eq!(sequence.notes().len(), 12 * DEFAULT_PROGRAMS.len());

        let first = sequence.notes()[0];
        assert_eq!((first.pitch, first.start_beat), (60, 1.0));
        let last = sequence.notes()[sequence.notes().len() - 1];
        assert_eq!(last.pitch, 71);
        assert_eq!(last.end_beat(), 1.0 + 72.0);
    }

    #[test]
    fn random_notes_stay_in_range_and_never_overlap() {
        let mut rng = StdRng::seed_from_u64(7);
        let sequence = random_single_notes(&mut rng, 60.0).unwrap();

        assert!(!sequence.notes().is_empty());
        for pair in sequence.notes().windows(2) {
            assert!(pair[1].start_beat >= pair[0].end_beat());
        }
        for note in sequence.notes() {
            assert!((36..84).contains(&note.pitch));
            assert!(note.duration_beat >= 0.075 && note.duration_beat < 0.5);
            assert!(note.start_beat < 60.0);
        }
    }

    #[test]
    fn random_notes_are_reproducible_from_a_seed() {
        let a = random_single_notes(&mut StdRng::seed_from_u64(3), 10.0).unwrap();
        let b = random_single_notes(&mut StdRng::seed_from_u64(3), 10.0).unwrap();
        assert_eq!(a.notes(), b.notes());
    }
}
