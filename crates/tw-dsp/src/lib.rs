//! Core DSP types for the tonewheel audio core.
//!
//! This crate defines the leaf building blocks used by the mixer and
//! the file codecs: a countdown timer, an ADSR-style decay envelope,
//! and the phase-accumulating sampler with its waveform family.
//!
//! Designed to be `no_std` compatible.

#![cfg_attr(not(feature = "std"), no_std)]

mod envelope;
mod keys;
mod sampler;
mod unit_timer;

pub use envelope::{Curve, DecayEnvelope};
pub use keys::{key_frequency, note_frequency, Modifier, PianoKey, CONCERT_A_HZ, TWELFTH_ROOT_OF_TWO};
pub use sampler::{Sampler, Waveform, DEFAULT_HARMONICS};
pub use unit_timer::UnitTimer;
