//! Polling playback of parsed MIDI files.

use std::io::Read;
use std::path::Path;

use log::debug;

use crate::midi_format::{MidiFile, NoteData, TrackEvent};
use crate::FormatError;

/// Decodes every track up front and replays the merged, time-sorted note
/// stream against a caller-advanced playback clock.
#[derive(Debug, Default)]
pub struct MidiFilePlayer {
    notes: Vec<NoteData>,
    next: usize,
    playback_time: f64,
    playing: bool,
}

impl MidiFilePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode all tracks of a parsed file. Tracks run in parallel on the
    /// timeline but are stored sequentially, so the merged buffer is
    /// sorted by timestamp after collection.
    pub fn load(&mut self, file: &MidiFile) -> Result<(), FormatError> {
        self.notes.clear();
        self.next = 0;
        self.playback_time = 0.0;
        for chunk in &file.tracks {
            let mut chunk = chunk.clone();
            let mut track = TrackEvent::new(file.division);
            track.read_all(&mut chunk)?;
            while let Some(note) = track.pop_note() {
                self.notes.push(note);
            }
        }
        self.notes
            .sort_by(|a, b| a.time_seconds.total_cmp(&b.time_seconds));
        debug!("loaded {} note events", self.notes.len());
        Ok(())
    }

    pub fn read(&mut self, r: &mut impl Read) -> Result<(), FormatError> {
        let file = MidiFile::read(r)?;
        self.load(&file)
    }

    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let file = MidiFile::open(path)?;
        self.load(&file)
    }

    pub fn notes(&self) -> &[NoteData] {
        &self.notes
    }

    /// Total timeline length in seconds (time of the last note event).
    pub fn duration_seconds(&self) -> f64 {
        self.notes.last().map_or(0.0, |n| n.time_seconds)
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.notes.len()
    }

    pub fn playback_time(&self) -> f64 {
        self.playback_time
    }

    /// Rewind to the start of the timeline.
    pub fn rewind(&mut self) {
        self.next = 0;
        self.playback_time = 0.0;
    }

    /// Advance the playback clock. No-op while paused.
    pub fn update(&mut self, dt: f64) {
        if self.playing {
            self.playback_time += dt;
        }
    }

    /// Pop the next note whose timestamp has elapsed, if any. Call in a
    /// loop each frame to drain all due events.
    pub fn check_time(&mut self) -> Option<NoteData> {
        let note = self.notes.get(self.next)?;
        if note.time_seconds <= self.playback_time {
            self.next += 1;
            Some(*note)
        } else {
            None
        }
    }
}
