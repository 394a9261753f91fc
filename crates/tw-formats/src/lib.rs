//! Binary codecs for the tonewheel audio core.
//!
//! Implements the standard MIDI file chunk format (variable-length
//! quantities, running status, meta events, realtime recorder and polling
//! player) and RIFF/WAVE PCM reading and writing.

mod midi_chunk;
mod midi_format;
mod midi_player;
mod midi_recorder;
mod wav_format;

pub use midi_chunk::{MidiChunk, VLQ_MAX};
pub use midi_format::{
    Division, MidiFile, MidiKey, MidiMessage, MidiMetaEvent, MidiStatus, MidiSysExclusive,
    NoteData, TrackEvent, DEFAULT_TEMPO_MICROS,
};
pub use midi_player::MidiFilePlayer;
pub use midi_recorder::MidiFileRecorder;
pub use wav_format::{WavFilePlayer, WavFileRecorder, WavHeader};

use std::fmt;

/// Error type for codec parsing and serialization.
#[derive(Debug)]
pub enum FormatError {
    /// Invalid file header or magic bytes
    InvalidHeader,
    /// Unexpected end of chunk or file
    UnexpectedEof,
    /// Unsupported format variant (e.g. non-PCM WAV)
    UnsupportedVersion,
    /// Variable-length quantity with no terminator within 4 bytes
    BadVariableLength,
    /// I/O error
    Io(std::io::Error),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::InvalidHeader => write!(f, "invalid header"),
            FormatError::UnexpectedEof => write!(f, "unexpected end of data"),
            FormatError::UnsupportedVersion => write!(f, "unsupported format variant"),
            FormatError::BadVariableLength => {
                write!(f, "variable-length quantity missing terminator")
            }
            FormatError::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for FormatError {}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::Io(e)
    }
}
