//! Real-time MIDI capture into a standard track chunk.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;

use log::debug;

use crate::midi_chunk::MidiChunk;
use crate::midi_format::{Division, MidiFile, MidiKey};
use crate::FormatError;

/// Captures `press`/`release` events against a logical MIDI clock and
/// serializes them as a single-track file.
///
/// Events are buffered for `minimum_duration` ticks before being emitted,
/// which gives `one_note_per_channel` a window to merge very short
/// same-note retriggers into one sustained note.
#[derive(Debug)]
pub struct MidiFileRecorder {
    division: Division,
    track: MidiChunk,
    pending: VecDeque<MidiKey>,
    held: Vec<(u8, u8)>,
    clock: f64,
    clock_multiplier: f64,
    minimum_duration: u32,
    one_note_per_channel: bool,
    last_emitted_tick: u32,
    finalized: bool,
}

impl MidiFileRecorder {
    pub fn new(division: Division) -> Self {
        Self {
            division,
            track: MidiChunk::new(*b"MTrk"),
            pending: VecDeque::new(),
            held: Vec::new(),
            clock: 0.0,
            clock_multiplier: 1.0,
            minimum_duration: 0,
            one_note_per_channel: false,
            last_emitted_tick: 0,
            finalized: false,
        }
    }

    /// Scale applied to the raw clock passed to `update_midi_clock`.
    pub fn set_clock_multiplier(&mut self, multiplier: f64) {
        self.clock_multiplier = multiplier;
    }

    /// Buffer window, in ticks, before events are committed to the track.
    pub fn set_minimum_duration(&mut self, ticks: u32) {
        self.minimum_duration = ticks;
    }

    /// Merge same-note retriggers shorter than the buffer window.
    pub fn set_one_note_per_channel(&mut self, enabled: bool) {
        self.one_note_per_channel = enabled;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Current logical clock position, in ticks.
    pub fn clock_ticks(&self) -> u32 {
        self.clock as u32
    }

    pub fn press(&mut self, channel: u8, note: u8, velocity: u8) {
        if self.finalized {
            return;
        }
        let timestamp = self.clock_ticks();
        if self.one_note_per_channel {
            // A release of the same note still sitting in the buffer means
            // this press is a quick retrigger: drop the pair and let the
            // original note sustain through.
            if let Some(i) = self.pending.iter().rposition(|k| {
                !k.pressed && k.channel == channel & 0x0F && k.note == note & 0x7F
            }) {
                if timestamp.saturating_sub(self.pending[i].timestamp) < self.minimum_duration {
                    debug!("merging retrigger of note {} on channel {}", note, channel);
                    self.pending.remove(i);
                    self.held.push((channel & 0x0F, note & 0x7F));
                    return;
                }
            }
        }
        self.pending
            .push_back(MidiKey::new(channel, note, velocity, timestamp, true));
        self.held.push((channel & 0x0F, note & 0x7F));
    }

    pub fn release(&mut self, channel: u8, note: u8, velocity: u8) {
        if self.finalized {
            return;
        }
        let timestamp = self.clock_ticks();
        self.pending
            .push_back(MidiKey::new(channel, note, velocity, timestamp, false));
        if let Some(i) = self
            .held
            .iter()
            .position(|&(c, n)| c == channel & 0x0F && n == note & 0x7F)
        {
            self.held.swap_remove(i);
        }
    }

    /// Advance the logical clock and flush buffered events older than the
    /// minimum-duration window. `clock` is in caller units; ticks are
    /// `clock × clock_multiplier`.
    pub fn update_midi_clock(&mut self, clock: f64) {
        if self.finalized {
            return;
        }
        let next = clock * self.clock_multiplier;
        if next > self.clock {
            self.clock = next;
        }
        let horizon = self.clock_ticks();
        while let Some(front) = self.pending.front() {
            if horizon.saturating_sub(front.timestamp) < self.minimum_duration {
                break;
            }
            let Some(key) = self.pending.pop_front() else {
                break;
            };
            self.emit(key);
        }
    }

    /// Flush everything, force-release held notes at the current clock,
    /// and append the end-of-track meta event.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        while let Some(key) = self.pending.pop_front() {
            self.emit(key);
        }
        let timestamp = self.clock_ticks();
        for (channel, note) in std::mem::take(&mut self.held) {
            self.emit(MidiKey::new(channel, note, 0, timestamp, false));
        }
        self.track.push_variable_size(0);
        self.track.push_bytes(&[0xFF, 0x2F, 0x00]);
        self.finalized = true;
    }

    fn emit(&mut self, key: MidiKey) {
        let delta = key.timestamp.saturating_sub(self.last_emitted_tick);
        self.track.push_variable_size(delta);
        let status = if key.pressed { 0x90 } else { 0x80 } | key.channel;
        self.track.push_bytes(&[status, key.note, key.velocity]);
        self.last_emitted_tick = key.timestamp;
    }

    /// Serialize as a format-0 file, finalizing first if needed.
    pub fn write_to(&mut self, w: &mut impl Write) -> Result<(), FormatError> {
        self.finalize();
        let mut file = MidiFile::new(0, self.division);
        file.tracks.push(self.track.clone());
        file.write(w)
    }

    pub fn write(&mut self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
        self.write_to(&mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi_format::TrackEvent;

    const TPQ: u16 = 24;

    fn recorder() -> MidiFileRecorder {
        MidiFileRecorder::new(Division::TicksPerQuarter(TPQ))
    }

    fn decode(recorder: &mut MidiFileRecorder) -> Vec<crate::NoteData> {
        let mut bytes = Vec::new();
        recorder.write_to(&mut bytes).unwrap();
        let file = MidiFile::read(&mut bytes.as_slice()).unwrap();
        let mut track = TrackEvent::new(file.division);
        let mut chunk = file.tracks[0].clone();
        track.read_all(&mut chunk).unwrap();
        let mut notes = Vec::new();
        while let Some(n) = track.pop_note() {
            notes.push(n);
        }
        notes
    }

    #[test]
    fn press_and_release_round_trip() {
        let mut rec = recorder();
        rec.press(0, 60, 100);
        rec.update_midi_clock(480.0);
        rec.release(0, 60, 0);

        let notes = decode(&mut rec);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].pressed);
        assert!(!notes[1].pressed);
        // 480 ticks at 24 tpq and 120 BPM: 20 quarters, 10 seconds
        assert!((notes[1].time_seconds - notes[0].time_seconds - 10.0).abs() < 1e-9);
    }

    #[test]
    fn clock_multiplier_scales_timestamps() {
        let mut rec = recorder();
        rec.set_clock_multiplier(2.0);
        rec.press(0, 60, 100);
        rec.update_midi_clock(50.0); // 100 ticks
        rec.release(0, 60, 0);

        let notes = decode(&mut rec);
        let ticks = (notes[1].time_seconds - notes[0].time_seconds)
            / Division::TicksPerQuarter(TPQ).default_seconds_per_tick();
        assert!((ticks - 100.0).abs() < 1e-6);
    }

    #[test]
    fn finalize_force_releases_held_notes() {
        let mut rec = recorder();
        rec.press(3, 64, 90);
        rec.update_midi_clock(100.0);
        rec.finalize();

        let notes = decode(&mut rec);
        assert_eq!(notes.len(), 2);
        assert!(!notes[1].pressed);
        assert_eq!(notes[1].channel, 3);
        assert_eq!(notes[1].note, 64);
    }

    #[test]
    fn short_retrigger_is_merged() {
        let mut rec = recorder();
        rec.set_minimum_duration(10);
        rec.set_one_note_per_channel(true);
        rec.press(0, 60, 100);
        rec.update_midi_clock(4.0);
        rec.release(0, 60, 0);
        rec.update_midi_clock(6.0);
        rec.press(0, 60, 100); // retrigger within the window
        rec.update_midi_clock(100.0);
        rec.release(0, 60, 0);

        let notes = decode(&mut rec);
        assert_eq!(notes.len(), 2, "retrigger should merge into one note");
        assert!(notes[0].pressed);
        assert!(!notes[1].pressed);
    }

    #[test]
    fn slow_retrigger_is_kept() {
        let mut rec = recorder();
        rec.set_minimum_duration(10);
        rec.set_one_note_per_channel(true);
        rec.press(0, 60, 100);
        rec.update_midi_clock(20.0);
        rec.release(0, 60, 0);
        rec.update_midi_clock(40.0);
        rec.press(0, 60, 100);
        rec.update_midi_clock(60.0);
        rec.release(0, 60, 0);

        let notes = decode(&mut rec);
        assert_eq!(notes.len(), 4);
    }

    #[test]
    fn events_after_finalize_are_ignored() {
        let mut rec = recorder();
        rec.press(0, 60, 100);
        rec.finalize();
        rec.press(0, 62, 100);
        rec.release(0, 62, 0);

        let notes = decode(&mut rec);
        assert_eq!(notes.len(), 2); // press + forced release only
        assert_eq!(notes[0].note, 60);
    }

    #[test]
    fn clock_never_runs_backwards() {
        let mut rec = recorder();
        rec.update_midi_clock(100.0);
        rec.update_midi_clock(50.0);
        assert_eq!(rec.clock_ticks(), 100);
    }
}
