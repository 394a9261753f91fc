//! Standard MIDI file entities and the track event state machine.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, warn};

use crate::midi_chunk::MidiChunk;
use crate::FormatError;

/// Default tempo when no tempo meta event has been seen (µs per quarter
/// note, 120 BPM).
pub const DEFAULT_TEMPO_MICROS: u32 = 500_000;

/// Channel voice message kinds, by status nibble.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MidiStatus {
    #[default]
    None,
    /// Note off (0x8n)
    Released,
    /// Note on (0x9n)
    Pressed,
    /// Polyphonic key pressure (0xAn)
    PolyPressure,
    /// Control change (0xBn)
    ControlChange,
    /// Program change (0xCn)
    ProgramChange,
    /// Channel pressure (0xDn)
    ChannelPressure,
    /// Pitch bend (0xEn)
    PitchChange,
}

impl MidiStatus {
    /// Decode the high nibble of a status byte.
    pub fn from_status_byte(status: u8) -> Self {
        match status >> 4 {
            0x8 => MidiStatus::Released,
            0x9 => MidiStatus::Pressed,
            0xA => MidiStatus::PolyPressure,
            0xB => MidiStatus::ControlChange,
            0xC => MidiStatus::ProgramChange,
            0xD => MidiStatus::ChannelPressure,
            0xE => MidiStatus::PitchChange,
            _ => MidiStatus::None,
        }
    }

    /// Data bytes following the status byte.
    pub fn payload_len(self) -> usize {
        match self {
            MidiStatus::ProgramChange | MidiStatus::ChannelPressure => 1,
            MidiStatus::None => 0,
            _ => 2,
        }
    }
}

/// A keyboard event: which note on which channel, how hard, and when.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MidiKey {
    /// Channel in `[0, 15]`.
    pub channel: u8,
    /// Note number in `[0, 127]`.
    pub note: u8,
    /// Velocity in `[0, 127]`.
    pub velocity: u8,
    /// Timestamp in MIDI clock ticks.
    pub timestamp: u32,
    pub pressed: bool,
}

impl MidiKey {
    pub fn new(channel: u8, note: u8, velocity: u8, timestamp: u32, pressed: bool) -> Self {
        Self {
            channel: channel & 0x0F,
            note: note & 0x7F,
            velocity: velocity & 0x7F,
            timestamp,
            pressed,
        }
    }
}

/// A decoded channel voice message: a key plus its delta-time and status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MidiMessage {
    pub key: MidiKey,
    pub delta: u32,
    pub status: MidiStatus,
}

/// A raw meta event (type byte + payload).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MidiMetaEvent {
    pub meta_type: u8,
    pub data: Vec<u8>,
}

/// A system-exclusive message. Payload is skipped during decoding; only
/// the declared length is retained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MidiSysExclusive {
    pub length: u32,
}

/// A note-on/note-off pair member with its absolute time in seconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NoteData {
    pub pressed: bool,
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub time_seconds: f64,
}

/// Header division field: musical or SMPTE time base.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Division {
    /// Bit 15 clear: ticks per quarter note.
    TicksPerQuarter(u16),
    /// Bit 15 set: SMPTE frames per second (stored negated in the file)
    /// and ticks per frame.
    Smpte {
        frames_per_second: u8,
        ticks_per_frame: u8,
    },
}

impl Division {
    fn from_raw(raw: u16) -> Self {
        if raw & 0x8000 != 0 {
            Division::Smpte {
                frames_per_second: ((raw >> 8) as u8).wrapping_neg(),
                ticks_per_frame: (raw & 0xFF) as u8,
            }
        } else {
            Division::TicksPerQuarter(raw & 0x7FFF)
        }
    }

    fn to_raw(self) -> u16 {
        match self {
            Division::TicksPerQuarter(tpq) => tpq & 0x7FFF,
            Division::Smpte {
                frames_per_second,
                ticks_per_frame,
            } => ((frames_per_second.wrapping_neg() as u16) << 8) | ticks_per_frame as u16,
        }
    }

    /// Seconds per MIDI tick at the default tempo. Tempo meta events only
    /// re-scale the musical time base; SMPTE time is absolute.
    pub fn default_seconds_per_tick(self) -> f64 {
        match self {
            Division::TicksPerQuarter(tpq) => {
                DEFAULT_TEMPO_MICROS as f64 * 1e-6 / tpq.max(1) as f64
            }
            Division::Smpte {
                frames_per_second,
                ticks_per_frame,
            } => 1.0 / (frames_per_second.max(1) as f64 * ticks_per_frame.max(1) as f64),
        }
    }
}

/// Streaming decoder for one track chunk.
///
/// `read_event` consumes one `(delta-time, event)` pair per call,
/// honoring running status, and queues decoded note events with absolute
/// timestamps in seconds.
#[derive(Clone, Debug)]
pub struct TrackEvent {
    /// Status byte reused by running-status events.
    running_status: Option<u8>,
    /// `Some` for musical (ticks-per-quarter) time, enabling tempo changes.
    ticks_per_quarter: Option<u16>,
    seconds_per_tick: f64,
    time_ticks: u64,
    time_seconds: f64,
    finished: bool,
    notes: VecDeque<NoteData>,
    last_message: Option<MidiMessage>,
    last_meta: Option<MidiMetaEvent>,
    last_sysex: Option<MidiSysExclusive>,
}

impl TrackEvent {
    pub fn new(division: Division) -> Self {
        let ticks_per_quarter = match division {
            Division::TicksPerQuarter(tpq) => Some(tpq.max(1)),
            Division::Smpte { .. } => None,
        };
        Self {
            running_status: None,
            ticks_per_quarter,
            seconds_per_tick: division.default_seconds_per_tick(),
            time_ticks: 0,
            time_seconds: 0.0,
            finished: false,
            notes: VecDeque::new(),
            last_message: None,
            last_meta: None,
            last_sysex: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Absolute position of the last decoded event, in seconds.
    pub fn time_seconds(&self) -> f64 {
        self.time_seconds
    }

    pub fn seconds_per_tick(&self) -> f64 {
        self.seconds_per_tick
    }

    /// Pop the oldest decoded note event.
    pub fn pop_note(&mut self) -> Option<NoteData> {
        self.notes.pop_front()
    }

    pub fn last_message(&self) -> Option<&MidiMessage> {
        self.last_message.as_ref()
    }

    pub fn last_meta(&self) -> Option<&MidiMetaEvent> {
        self.last_meta.as_ref()
    }

    pub fn last_sysex(&self) -> Option<&MidiSysExclusive> {
        self.last_sysex.as_ref()
    }

    /// Decode one event from the chunk. Returns `false` once the track is
    /// exhausted (end-of-track meta event or no bytes left).
    pub fn read_event(&mut self, chunk: &mut MidiChunk) -> Result<bool, FormatError> {
        if self.finished || chunk.remaining() == 0 {
            self.finished = true;
            return Ok(false);
        }

        let delta = chunk.read_variable_length()?;
        self.time_ticks += delta as u64;
        self.time_seconds += delta as f64 * self.seconds_per_tick;

        let first = chunk.read_u8()?;
        match first {
            0xFF => self.read_meta(chunk),
            0xF0 | 0xF7 => {
                let length = chunk.read_variable_length()?;
                chunk.skip(length as usize)?;
                self.last_sysex = Some(MidiSysExclusive { length });
                Ok(true)
            }
            byte if byte & 0x80 != 0 => {
                if byte >= 0xF0 {
                    // Unknown system message: no defined length, stop here
                    warn!("unrecognized system status {:#04x}, ending track", byte);
                    self.finished = true;
                    return Ok(false);
                }
                self.running_status = Some(byte);
                self.read_channel_message(chunk, byte, None, delta)
            }
            data => {
                // Running status: reuse the previous status byte
                let Some(status) = self.running_status else {
                    warn!("data byte {:#04x} with no running status, ending track", data);
                    self.finished = true;
                    return Ok(false);
                };
                self.read_channel_message(chunk, status, Some(data), delta)
            }
        }
    }

    /// Drive the decoder to the end of the chunk.
    pub fn read_all(&mut self, chunk: &mut MidiChunk) -> Result<(), FormatError> {
        while self.read_event(chunk)? {}
        Ok(())
    }

    fn read_meta(&mut self, chunk: &mut MidiChunk) -> Result<bool, FormatError> {
        let meta_type = chunk.read_u8()?;
        let length = chunk.read_variable_length()? as usize;
        let data = chunk.read_bytes(length)?.to_vec();

        match meta_type {
            0x2F => {
                self.finished = true;
                self.last_meta = Some(MidiMetaEvent { meta_type, data });
                return Ok(false);
            }
            0x51 if data.len() >= 3 => {
                let tempo = u32::from_be_bytes([0, data[0], data[1], data[2]]);
                if let Some(tpq) = self.ticks_per_quarter {
                    self.seconds_per_tick = tempo as f64 * 1e-6 / tpq as f64;
                }
            }
            0x01..=0x07 => {
                debug!(
                    "midi meta text {:#04x}: {}",
                    meta_type,
                    String::from_utf8_lossy(&data)
                );
            }
            0x58 if data.len() >= 4 => {
                debug!(
                    "midi time signature {}/{} ({} clocks/click, {} 32nds/quarter)",
                    data[0],
                    1u32 << data[1],
                    data[2],
                    data[3]
                );
            }
            0x59 if data.len() >= 2 => {
                debug!(
                    "midi key signature: {} accidentals, {}",
                    data[0] as i8,
                    if data[1] == 0 { "major" } else { "minor" }
                );
            }
            _ => {}
        }
        self.last_meta = Some(MidiMetaEvent { meta_type, data });
        Ok(true)
    }

    fn read_channel_message(
        &mut self,
        chunk: &mut MidiChunk,
        status: u8,
        first_data: Option<u8>,
        delta: u32,
    ) -> Result<bool, FormatError> {
        let kind = MidiStatus::from_status_byte(status);
        let channel = status & 0x0F;
        let data1 = match first_data {
            Some(byte) => byte,
            None => chunk.read_u8()?,
        };
        let data2 = if kind.payload_len() == 2 {
            chunk.read_u8()?
        } else {
            0
        };

        let mut key = MidiKey::new(channel, data1, data2, self.time_ticks as u32, false);
        match kind {
            MidiStatus::Pressed | MidiStatus::Released => {
                // Note-on with velocity zero is a release by convention
                key.pressed = kind == MidiStatus::Pressed && data2 > 0;
                self.notes.push_back(NoteData {
                    pressed: key.pressed,
                    channel,
                    note: data1,
                    velocity: data2,
                    time_seconds: self.time_seconds,
                });
            }
            _ => {}
        }
        self.last_message = Some(MidiMessage {
            key,
            delta,
            status: kind,
        });
        Ok(true)
    }
}

/// A standard MIDI file: header fields plus one chunk per track.
#[derive(Clone, Debug)]
pub struct MidiFile {
    pub format: u16,
    pub division: Division,
    pub tracks: Vec<MidiChunk>,
}

impl MidiFile {
    pub fn new(format: u16, division: Division) -> Self {
        Self {
            format,
            division,
            tracks: Vec::new(),
        }
    }

    /// Parse a complete file: `MThd` header then `numTracks` `MTrk`
    /// chunks. Unknown chunk tags are skipped.
    pub fn read(r: &mut impl Read) -> Result<Self, FormatError> {
        let mut header = MidiChunk::read_from(r)?;
        if header.tag() != *b"MThd" || header.len() < 6 {
            return Err(FormatError::InvalidHeader);
        }
        let format = header.read_u16()?;
        let num_tracks = header.read_u16()? as usize;
        let division = Division::from_raw(header.read_u16()?);

        let mut tracks = Vec::with_capacity(num_tracks);
        while tracks.len() < num_tracks {
            let chunk = MidiChunk::read_from(r)?;
            if chunk.tag() == *b"MTrk" {
                tracks.push(chunk);
            } else {
                debug!(
                    "skipping unknown chunk {:?} ({} bytes)",
                    chunk.tag(),
                    chunk.len()
                );
            }
        }
        Ok(Self {
            format,
            division,
            tracks,
        })
    }

    /// Serialize header + tracks in standard `MThd`/`MTrk` layout.
    pub fn write(&self, w: &mut impl Write) -> Result<(), FormatError> {
        let mut header = MidiChunk::new(*b"MThd");
        header.push_u16(self.format);
        header.push_u16(self.tracks.len() as u16);
        header.push_u16(self.division.to_raw());
        header.write_to(w)?;
        for track in &self.tracks {
            track.write_to(w)?;
        }
        Ok(())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TPQ: u16 = 480;

    fn division() -> Division {
        Division::TicksPerQuarter(TPQ)
    }

    fn decode_all(chunk: &mut MidiChunk) -> Vec<NoteData> {
        let mut track = TrackEvent::new(division());
        track.read_all(chunk).unwrap();
        let mut notes = Vec::new();
        while let Some(n) = track.pop_note() {
            notes.push(n);
        }
        notes
    }

    #[test]
    fn note_on_and_off_decode() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0x90, 60, 100]);
        chunk.push_variable_size(480);
        chunk.push_bytes(&[0x80, 60, 0]);

        let notes = decode_all(&mut chunk);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].pressed);
        assert!(!notes[1].pressed);
        assert_eq!(notes[0].note, 60);
        // 480 ticks at 120 BPM, 480 tpq = one quarter note = 0.5 s
        assert!((notes[1].time_seconds - notes[0].time_seconds - 0.5).abs() < 1e-9);
    }

    #[test]
    fn running_status_reuses_previous_status() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0x90, 60, 64]);
        chunk.push_variable_size(120);
        chunk.push_bytes(&[60, 0]); // running status: note-on, velocity 0

        let notes = decode_all(&mut chunk);
        assert_eq!(notes.len(), 2);
        assert!(notes[0].pressed);
        assert!(!notes[1].pressed, "velocity-0 note-on is a release");
        assert_eq!(notes[1].channel, 0);
        assert_eq!(notes[1].note, 60);
    }

    #[test]
    fn tempo_meta_rescales_time() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        // Set tempo to 1,000,000 µs per quarter (60 BPM)
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0xFF, 0x51, 0x03, 0x0F, 0x42, 0x40]);
        chunk.push_variable_size(TPQ as u32);
        chunk.push_bytes(&[0x90, 64, 80]);

        let notes = decode_all(&mut chunk);
        assert_eq!(notes.len(), 1);
        assert!((notes[0].time_seconds - 1.0).abs() < 1e-9);
    }

    #[test]
    fn end_of_track_stops_decoding() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0xFF, 0x2F, 0x00]);
        // Trailing garbage that must never be decoded
        chunk.push_bytes(&[0x00, 0x90, 60, 100]);

        let mut track = TrackEvent::new(division());
        assert!(!track.read_event(&mut chunk).unwrap());
        assert!(track.is_finished());
        assert!(track.pop_note().is_none());
    }

    #[test]
    fn sysex_is_skipped() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(0);
        chunk.push_u8(0xF0);
        chunk.push_variable_size(3);
        chunk.push_bytes(&[0x7E, 0x7F, 0xF7]);
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0x90, 72, 90]);

        let mut track = TrackEvent::new(division());
        track.read_all(&mut chunk).unwrap();
        assert_eq!(track.last_sysex().unwrap().length, 3);
        assert_eq!(track.pop_note().unwrap().note, 72);
    }

    #[test]
    fn non_note_messages_produce_no_notes() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0xB0, 7, 100]); // control change
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0xC0, 5]); // program change, 1 data byte
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0x90, 60, 1]);

        let notes = decode_all(&mut chunk);
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn truncated_event_is_an_error() {
        let mut chunk = MidiChunk::new(*b"MTrk");
        chunk.push_variable_size(0);
        chunk.push_bytes(&[0x90, 60]); // missing velocity

        let mut track = TrackEvent::new(division());
        assert!(track.read_event(&mut chunk).is_err());
    }

    #[test]
    fn division_raw_round_trip() {
        for division in [
            Division::TicksPerQuarter(96),
            Division::TicksPerQuarter(480),
            Division::Smpte {
                frames_per_second: 25,
                ticks_per_frame: 40,
            },
        ] {
            assert_eq!(Division::from_raw(division.to_raw()), division);
        }
    }

    #[test]
    fn smpte_division_has_bit_15_set() {
        let raw = Division::Smpte {
            frames_per_second: 30,
            ticks_per_frame: 80,
        }
        .to_raw();
        assert_ne!(raw & 0x8000, 0);
    }

    #[test]
    fn smpte_seconds_per_tick() {
        let division = Division::Smpte {
            frames_per_second: 25,
            ticks_per_frame: 40,
        };
        // 25 fps × 40 ticks/frame = 1000 ticks per second
        assert!((division.default_seconds_per_tick() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn file_round_trip() {
        let mut file = MidiFile::new(0, division());
        let mut track = MidiChunk::new(*b"MTrk");
        track.push_variable_size(0);
        track.push_bytes(&[0x90, 60, 100]);
        track.push_variable_size(0);
        track.push_bytes(&[0xFF, 0x2F, 0x00]);
        file.tracks.push(track);

        let mut bytes = Vec::new();
        file.write(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        assert_eq!(&bytes[4..8], &6u32.to_be_bytes());

        let parsed = MidiFile::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.format, 0);
        assert_eq!(parsed.division, division());
        assert_eq!(parsed.tracks.len(), 1);
        assert_eq!(parsed.tracks[0], file.tracks[0]);
    }

    #[test]
    fn bad_header_tag_rejected() {
        let mut bytes = Vec::new();
        let mut chunk = MidiChunk::new(*b"XXXX");
        chunk.push_bytes(&[0; 6]);
        chunk.write_to(&mut bytes).unwrap();
        assert!(matches!(
            MidiFile::read(&mut bytes.as_slice()),
            Err(FormatError::InvalidHeader)
        ));
    }
}
