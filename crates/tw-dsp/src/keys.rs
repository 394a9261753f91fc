//! 12-tone equal temperament piano key frequencies.

use libm::powf;

/// A4 reference pitch.
pub const CONCERT_A_HZ: f32 = 440.0;

/// Semitone ratio in 12-TET.
pub const TWELFTH_ROOT_OF_TWO: f32 = 1.059_463_1;

/// MIDI note number of A4.
const A4_NOTE: i32 = 69;

/// Natural note names within one octave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PianoKey {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl PianoKey {
    /// Semitone offset from C within the octave.
    fn semitone(self) -> i32 {
        match self {
            PianoKey::C => 0,
            PianoKey::D => 2,
            PianoKey::E => 4,
            PianoKey::F => 5,
            PianoKey::G => 7,
            PianoKey::A => 9,
            PianoKey::B => 11,
        }
    }
}

/// Accidental applied to a natural key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Modifier {
    #[default]
    Natural,
    Sharp,
    Flat,
}

impl Modifier {
    fn offset(self) -> i32 {
        match self {
            Modifier::Natural => 0,
            Modifier::Sharp => 1,
            Modifier::Flat => -1,
        }
    }
}

/// Frequency of a piano key in Hz (A4 = 440, octave 4 contains middle C).
pub fn key_frequency(key: PianoKey, modifier: Modifier, octave: i32) -> f32 {
    let note = (octave + 1) * 12 + key.semitone() + modifier.offset();
    note_frequency_i32(note)
}

/// Frequency of a raw MIDI note number (A4 = 69).
pub fn note_frequency(note: u8) -> f32 {
    note_frequency_i32(note as i32)
}

fn note_frequency_i32(note: i32) -> f32 {
    CONCERT_A_HZ * powf(TWELFTH_ROOT_OF_TWO, (note - A4_NOTE) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_reference() {
        let f = key_frequency(PianoKey::A, Modifier::Natural, 4);
        assert!((f - 440.0).abs() < 1e-3);
    }

    #[test]
    fn a5_is_double_a4() {
        let f = key_frequency(PianoKey::A, Modifier::Natural, 5);
        assert!((f - 880.0).abs() < 0.05);
    }

    #[test]
    fn middle_c_frequency() {
        let f = key_frequency(PianoKey::C, Modifier::Natural, 4);
        assert!((f - 261.63).abs() < 0.1, "C4 = {}", f);
    }

    #[test]
    fn sharp_and_flat_are_one_semitone() {
        let a = key_frequency(PianoKey::A, Modifier::Natural, 4);
        let a_sharp = key_frequency(PianoKey::A, Modifier::Sharp, 4);
        let a_flat = key_frequency(PianoKey::A, Modifier::Flat, 4);
        assert!((a_sharp / a - TWELFTH_ROOT_OF_TWO).abs() < 1e-4);
        assert!((a / a_flat - TWELFTH_ROOT_OF_TWO).abs() < 1e-4);
    }

    #[test]
    fn midi_note_69_is_a4() {
        assert!((note_frequency(69) - 440.0).abs() < 1e-3);
        assert!((note_frequency(60) - 261.63).abs() < 0.1);
    }

    #[test]
    fn c_sharp_equals_d_flat() {
        let cs = key_frequency(PianoKey::C, Modifier::Sharp, 3);
        let df = key_frequency(PianoKey::D, Modifier::Flat, 3);
        assert!((cs - df).abs() < 1e-3);
    }
}
