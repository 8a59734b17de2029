use std::ops::Range;

use log::{debug, warn};
use ndarray::Array2;

use crate::constants::frame_count;
use crate::error::{Error, Result};
use crate::sequence::note::Note;
use crate::sequence::note_sequence::seconds_to_time;

/// Where and how finely the ground truth is laid out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterParams {
    pub tempo_bpm: f64,
    pub sample_rate: u32,
    pub raw_length: usize,
    pub hop_length: usize,
    pub lowest_note: u8,
    pub highest_note: u8,
    pub bins_per_note: usize,
}

impl RasterParams {
    pub fn n_rows(&self) -> usize {
        (usize::from(self.highest_note) - usize::from(self.lowest_note) + 1) * self.bins_per_note
    }

    pub fn n_frames(&self) -> usize {
        frame_count(self.raw_length, self.hop_length)
    }

    fn validate(&self) -> Result<()> {
        if !(self.tempo_bpm.is_finite() && self.tempo_bpm > 0.0) {
            return Err(Error::InvalidParameters(format!("tempo must be positive, got {}", self.tempo_bpm)));
        }
        if self.sample_rate == 0 || self.hop_length == 0 || self.bins_per_note == 0 {
            return Err(Error::InvalidParameters(
                "sample rate, hop length and bins per note must be non-zero".to_string(),
            ));
        }
        if self.lowest_note > self.highest_note {
            return Err(Error::InvalidParameters(format!(
                "lowest note {} above highest note {}",
                self.lowest_note, self.highest_note
            )));
        }
        Ok(())
    }

    /// Matrix row of a pitch. Only the first sub-bin of each semitone is used.
    pub fn row_for_pitch(&self, pitch: u8) -> Result<usize> {
        if pitch < self.lowest_note || pitch > self.highest_note {
            return Err(Error::PitchOutOfRange {
                pitch,
                lowest: self.lowest_note,
                highest: self.highest_note,
            });
        }
        Ok(usize::from(pitch - self.lowest_note) * self.bins_per_note)
    }

    /// Sample span `[start, end)` a note sounds for, before clipping to the audio length.
    pub fn sample_span(&self, note: &Note) -> Range<usize> {
        let sample_rate = f64::from(self.sample_rate);
        let start = (seconds_to_time(note.start_beat, self.tempo_bpm) * sample_rate).floor() as usize;
        let length = (seconds_to_time(note.duration_beat, self.tempo_bpm) * sample_rate).floor() as usize;
        // Far-away starts saturate the cast; the span is clipped to the audio later.
        start..start.saturating_add(length)
    }
}

/// Binary note occupancy at raw sample resolution.
///
/// Each row holds sorted, disjoint, non-adjacent half-open sample ranges, which is the same
/// information as a dense 0/1 row of `raw_length` cells with overlaps saturated at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOccupancy {
    raw_length: usize,
    rows: Vec<Vec<Range<usize>>>,
}

impl RawOccupancy {
    pub fn new(n_rows: usize, raw_length: usize) -> Self {
        Self {
            raw_length,
            rows: vec![vec![]; n_rows],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn raw_length(&self) -> usize {
        self.raw_length
    }

    pub fn row(&self, row: usize) -> &[Range<usize>] {
        &self.rows[row]
    }

    /// Sets cells `[span.start, span.end)` of `row` to 1. Cells past the audio are dropped.
    pub fn mark(&mut self, row: usize, span: Range<usize>) {
        let span = span.start.min(self.raw_length)..span.end.min(self.raw_length);
        if span.is_empty() {
            return;
        }

        let ranges = &mut self.rows[row];
        let first = ranges.partition_point(|r| r.end < span.start);
        let last = ranges.partition_point(|r| r.start <= span.end);

        let merged = if first < last {
            ranges[first].start.min(span.start)..ranges[last - 1].end.max(span.end)
        } else {
            span
        };
        ranges.splice(first..last, std::iter::once(merged));
    }

    pub fn is_occupied(&self, row: usize, sample: usize) -> bool {
        let ranges = &self.rows[row];
        let i = ranges.partition_point(|r| r.end <= sample);
        ranges.get(i).is_some_and(|r| r.contains(&sample))
    }

    /// Number of cells set to 1 in `row`.
    pub fn occupied_cells(&self, row: usize) -> usize {
        self.rows[row].iter().map(|r| r.len()).sum()
    }

    fn occupied_in(&self, row: usize, window: &Range<usize>) -> usize {
        let ranges = &self.rows[row];
        let first = ranges.partition_point(|r| r.end <= window.start);
        ranges[first..]
            .iter()
            .take_while(|r| r.start < window.end)
            .map(|r| r.end.min(window.end) - r.start.max(window.start))
            .sum()
    }

    /// Averages non-overlapping `hop_length` windows along time.
    ///
    /// The last window may be shorter than `hop_length`; it is averaged over the samples it has.
    pub fn downsample(&self, hop_length: usize) -> Result<GroundTruthMatrix> {
        if hop_length == 0 {
            return Err(Error::InvalidParameters("hop length must be non-zero".to_string()));
        }

        let n_frames = frame_count(self.raw_length, hop_length);
        let mut activity = Array2::<f32>::zeros((self.n_rows(), n_frames));

        for (row, ranges) in self.rows.iter().enumerate() {
            if ranges.is_empty() {
                continue;
            }
            for frame in 0..n_frames {
                let window = frame * hop_length..((frame + 1) * hop_length).min(self.raw_length);
                let occupied = self.occupied_in(row, &window);
                if occupied > 0 {
                    activity[[row, frame]] = occupied as f32 / window.len() as f32;
                }
            }
        }

        Ok(GroundTruthMatrix { activity })
    }
}

/// Fraction of every analysis frame during which a note sounds, `[row][frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthMatrix {
    pub activity: Array2<f32>,
}

impl GroundTruthMatrix {
    pub fn shape(&self) -> (usize, usize) {
        self.activity.dim()
    }
}

/// Marks every note on its pitch row at raw sample resolution.
pub fn rasterize_notes(notes: &[Note], params: &RasterParams) -> Result<RawOccupancy> {
    params.validate()?;

    let mut occupancy = RawOccupancy::new(params.n_rows(), params.raw_length);
    let mut truncated = 0;
    for note in notes {
        let row = params.row_for_pitch(note.pitch)?;
        let span = params.sample_span(note);
        if span.end > params.raw_length {
            truncated += 1;
        }
        occupancy.mark(row, span);
    }

    if truncated > 0 {
        warn!("{} notes run past the end of the audio and were cut", truncated);
    }

    Ok(occupancy)
}

/// Builds the ground truth of `notes` on the analysis grid described by `params`.
///
/// # Returns
///
/// * A matrix of `(highest_note - lowest_note + 1) * bins_per_note` rows and
///   `ceil(raw_length / hop_length)` columns, every value in [0, 1].
pub fn ground_truth(notes: &[Note], params: &RasterParams) -> Result<GroundTruthMatrix> {
    let occupancy = rasterize_notes(notes, params)?;
    let ground_truth = occupancy.downsample(params.hop_length)?;

    debug!(
        "Ground truth of {} notes rasterized to {:?}",
        notes.len(),
        ground_truth.shape()
    );
    Ok(ground_truth)
}
