//! Mixing engine for the tonewheel audio core.
//!
//! `SoundBuffer` is the producer/consumer seam between the synthesis
//! thread and the realtime audio callback; `SoundMixer` routes N inputs
//! to M outputs and paces mixing with a `UnitTimer`.

mod mixer;
mod sound_buffer;

pub use mixer::SoundMixer;
pub use sound_buffer::SoundBuffer;
