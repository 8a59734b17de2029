use midly::num::{u15, u24, u28, u4, u7};
use midly::Format;
use midly::Header;
use midly::MetaMessage;
use midly::MidiMessage;
use midly::Smf;
use midly::Timing;
use midly::Track;
use midly::TrackEvent;
use midly::TrackEventKind;

use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;

use log::info;

use crate::constants::TICKS_PER_BEAT;
use crate::error::Result;

use super::note::{Instrument, Note};
use super::note_sequence::{micros_per_beat, NoteSequence};

#[derive(Debug, Clone)]
struct TrackEventAbsolute<'a> {
    tick: u32,
    kind: TrackEventKind<'a>,
}

fn beat_to_tick(beat: f64) -> u32 {
    (beat * f64::from(TICKS_PER_BEAT)).round() as u32
}

fn is_note_off(kind: &TrackEventKind<'_>) -> bool {
    matches!(kind, TrackEventKind::Midi { message: MidiMessage::NoteOff { .. }, .. })
}

/// Turns the notes of one instrument into delta-timed track events.
///
/// At equal ticks note-offs come first so that back to back notes on the same key retrigger.
pub fn generate_ordered_midi_events(instrument: &Instrument, notes: &[Note]) -> Vec<TrackEvent<'static>> {
    let channel = u4::new(instrument.channel);

    let mut track_events_absolute: Vec<TrackEventAbsolute> = vec![TrackEventAbsolute {
        tick: 0,
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange {
                program: u7::new(instrument.program),
            },
        },
    }];

    for note in notes.iter().filter(|note| note.instrument == *instrument) {
        let start_tick = beat_to_tick(note.start_beat);
        let end_tick = beat_to_tick(note.end_beat()).max(start_tick);
        let key = u7::new(note.pitch);
        let vel = u7::new(note.velocity);

        track_events_absolute.push(TrackEventAbsolute {
            tick: start_tick,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            },
        });
        track_events_absolute.push(TrackEventAbsolute {
            tick: end_tick,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff { key, vel },
            },
        });
    }

    // Stable, so the program change stays in front of everything at tick 0.
    track_events_absolute.sort_by_key(|event| (event.tick, !is_note_off(&event.kind)));

    to_delta_events(&track_events_absolute)
}

fn to_delta_events(track_events_absolute: &[TrackEventAbsolute<'static>]) -> Vec<TrackEvent<'static>> {
    let mut track_events = vec![];
    let mut previous_tick = 0;

    for track_event_absolute in track_events_absolute {
        track_events.push(TrackEvent {
            delta: u28::new(track_event_absolute.tick - previous_tick),
            kind: track_event_absolute.kind,
        });
        previous_tick = track_event_absolute.tick;
    }

    track_events
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Builds the standard MIDI file for a sequence.
///
/// Track 0 only carries the tempo, every instrument gets its own track after it.
pub fn sequence_to_smf(sequence: &NoteSequence) -> Smf<'static> {
    let mut smf = Smf::new(Header {
        format: Format::Parallel,
        timing: Timing::Metrical(u15::new(TICKS_PER_BEAT)),
    });

    // Tempos too slow for 24 bits are rejected by `NoteSequence::new`.
    let micros_per_beat = micros_per_beat(sequence.tempo_bpm()) as u32;
    let mut conductor = Track::new();
    conductor.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(micros_per_beat))),
    });
    conductor.push(end_of_track());
    smf.tracks.push(conductor);

    for instrument in sequence.instruments() {
        let mut track: Track = generate_ordered_midi_events(instrument, sequence.notes());
        track.push(end_of_track());
        smf.tracks.push(track);
    }

    smf
}

/// Generate MIDI file data from a note sequence.
///
/// # Returns
///
/// * A vector of bytes representing the MIDI file.
pub fn generate_midi_file_data(sequence: &NoteSequence) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    sequence_to_smf(sequence).write_std(&mut Cursor::new(&mut buffer))?;
    Ok(buffer)
}

pub fn write_midi_file<P: AsRef<Path>>(sequence: &NoteSequence, path: P) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    sequence_to_smf(sequence).write_std(&mut writer)?;

    info!(
        "Wrote {} notes on {} instruments to {}",
        sequence.notes().len(),
        sequence.instruments().len(),
        path.display()
    );
    Ok(())
}

impl NoteSequence {
    pub fn to_midi_bytes(&self) -> Result<Vec<u8>> {
        generate_midi_file_data(self)
    }

    pub fn write_midi<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_midi_file(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_events(track: &[TrackEvent<'_>]) -> Vec<(u32, bool, u8)> {
        let mut tick = 0;
        let mut events = vec![];
        for event in track {
            tick += event.delta.as_int();
            match event.kind {
                TrackEventKind::Midi { message: MidiMessage::NoteOn { key, .. }, .. } => {
                    events.push((tick, true, key.as_int()))
                }
                TrackEventKind::Midi { message: MidiMessage::NoteOff { key, .. }, .. } => {
                    events.push((tick, false, key.as_int()))
                }
                _ => {}
            }
        }
        events
    }

    #[test]
    fn midi_file_matches_the_retained_notes() {
        let mut sequence = NoteSequence::new(120.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();
        let guitar = sequence.add_instrument(24).unwrap();
        sequence.add_note(piano, 60, 0.0, 1.0, 100).unwrap();
        sequence.add_note(guitar, 64, 0.5, 0.5, 80).unwrap();
        sequence.add_note(piano, 67, 1.0, 2.0, 100).unwrap();

        let bytes = sequence.to_midi_bytes().unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        assert_eq!(smf.header.format, Format::Parallel);
        assert_eq!(smf.tracks.len(), 3);
        assert!(smf.tracks[0]
            .iter()
            .any(|e| matches!(e.kind, TrackEventKind::Meta(MetaMessage::Tempo(t)) if t.as_int() == 500_000)));

        let tpb = u32::from(TICKS_PER_BEAT);
        assert_eq!(
            note_events(&smf.tracks[1]),
            vec![(0, true, 60), (tpb, false, 60), (tpb, true, 67), (3 * tpb, false, 67)]
        );
        assert_eq!(note_events(&smf.tracks[2]), vec![(tpb / 2, true, 64), (tpb, false, 64)]);
    }

    #[test]
    fn program_change_leads_each_track() {
        let mut sequence = NoteSequence::new(60.0).unwrap();
        let guitar = sequence.add_instrument(27).unwrap();
        sequence.add_note(guitar, 50, 0.0, 1.0, 100).unwrap();

        let smf = sequence_to_smf(&sequence);
        match smf.tracks[1][0].kind {
            TrackEventKind::Midi { channel, message: MidiMessage::ProgramChange { program } } => {
                assert_eq!(channel.as_int(), 0);
                assert_eq!(program.as_int(), 27);
            }
            ref other => panic!("unexpected first event {:?}", other),
        }
        assert!(matches!(
            smf.tracks[1].last().map(|e| e.kind),
            Some(TrackEventKind::Meta(MetaMessage::EndOfTrack))
        ));
    }

    #[test]
    fn note_off_precedes_note_on_at_the_same_tick() {
        let mut sequence = NoteSequence::new(60.0).unwrap();
        let piano = sequence.add_instrument(0).unwrap();
        sequence.add_note(piano, 60, 0.0, 1.0, 100).unwrap();
        sequence.add_note(piano, 60, 1.0, 1.0, 100).unwrap();

        let tpb = u32::from(TICKS_PER_BEAT);
        let track = generate_ordered_midi_events(&piano, sequence.notes());
        assert_eq!(
            note_events(&track),
            vec![(0, true, 60), (tpb, false, 60), (tpb, true, 60), (2 * tpb, false, 60)]
        );
    }
}
