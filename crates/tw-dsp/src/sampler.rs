//! Phase-accumulating sampler and its waveform family.

use core::f32::consts::{FRAC_2_PI, PI, TAU};

use libm::sinf;

use crate::envelope::{Curve, DecayEnvelope};
use crate::keys::{key_frequency, Modifier, PianoKey};

/// Default harmonic count for the band-limited square and sawtooth.
pub const DEFAULT_HARMONICS: u32 = 10;

/// Seed loaded into the noise register when it decays to zero.
const NOISE_RESEED: u32 = 0xACE1_ACE1;

/// Fourier coefficient 4/π for the odd-harmonic square series.
const FRAC_4_PI: f32 = 4.0 / PI;

/// The closed set of waveform generators.
///
/// Stateful variants (noise register, pulse toggle, trapezoid envelope)
/// advance only through `on_phase_rollover`, so their pitch follows the
/// sampler frequency like any oscillator.
#[derive(Clone, Debug)]
pub enum Waveform {
    /// Pure sine.
    Sine,
    /// Piecewise-linear triangle.
    Triangle,
    /// Band-limited square: sum of `harmonics` odd harmonics.
    Square { harmonics: u32 },
    /// Band-limited sawtooth: sum of `harmonics` integer harmonics.
    Sawtooth { harmonics: u32 },
    /// 32-bit LFSR noise, shifted once per phase rollover.
    Noise { lfsr: u32 },
    /// Binary toggle on phase rollover.
    SquarePulse { high: bool },
    /// One trapezoidal pulse per period from an internal linear envelope.
    Trapezoid {
        env: DecayEnvelope,
        width: f32,
        elapsed: f32,
    },
}

impl Waveform {
    /// Band-limited square with the default harmonic count.
    pub fn square() -> Self {
        Waveform::Square {
            harmonics: DEFAULT_HARMONICS,
        }
    }

    /// Band-limited sawtooth with the default harmonic count.
    pub fn sawtooth() -> Self {
        Waveform::Sawtooth {
            harmonics: DEFAULT_HARMONICS,
        }
    }

    /// LFSR noise seeded with the reseed constant.
    pub fn noise() -> Self {
        Waveform::Noise { lfsr: NOISE_RESEED }
    }

    /// Square pulse starting low.
    pub fn square_pulse() -> Self {
        Waveform::SquarePulse { high: false }
    }

    /// Trapezoid pulse with the given width (seconds between the rising
    /// trigger and the falling release; rise and fall take half the width
    /// each).
    pub fn trapezoid(width: f32) -> Self {
        let mut env = DecayEnvelope::new(width * 0.5, 0.0, 1.0, width * 0.5);
        env.set_curve(Curve::Linear);
        // Arm the first pulse; subsequent pulses re-trigger on rollover.
        env.trigger(1.0);
        Waveform::Trapezoid {
            env,
            width,
            elapsed: 0.0,
        }
    }

    /// Raw waveform value for the given phase position. `dt` feeds the
    /// trapezoid's internal envelope clock.
    fn sample(&mut self, phase: f32, period: f32, dt: f32) -> f32 {
        let x = phase / period;
        match self {
            Waveform::Sine => sinf(TAU * x),
            Waveform::Triangle => {
                if x < 0.5 {
                    4.0 * x - 1.0
                } else {
                    3.0 - 4.0 * x
                }
            }
            Waveform::Square { harmonics } => {
                let mut sum = 0.0;
                for n in 0..*harmonics {
                    let k = (2 * n + 1) as f32;
                    sum += sinf(TAU * k * x) / k;
                }
                FRAC_4_PI * sum
            }
            Waveform::Sawtooth { harmonics } => {
                let mut sum = 0.0;
                let mut sign = 1.0;
                for n in 1..=*harmonics {
                    sum += sign * sinf(TAU * n as f32 * x) / n as f32;
                    sign = -sign;
                }
                FRAC_2_PI * sum
            }
            Waveform::Noise { lfsr } => {
                if *lfsr & 1 == 1 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::SquarePulse { high } => {
                if *high {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Trapezoid {
                env,
                width,
                elapsed,
            } => {
                *elapsed += dt;
                if *elapsed >= *width && env.is_held() {
                    env.release();
                }
                env.update(dt);
                env.value()
            }
        }
    }

    /// Advance per-period state. Called exactly once per phase wrap.
    fn on_phase_rollover(&mut self) {
        match self {
            Waveform::Noise { lfsr } => {
                let bit = ((*lfsr >> 31) ^ (*lfsr >> 21) ^ (*lfsr >> 1) ^ *lfsr) & 1;
                *lfsr = (*lfsr << 1) | bit;
                if *lfsr == 0 {
                    *lfsr = NOISE_RESEED;
                }
            }
            Waveform::SquarePulse { high } => {
                *high = !*high;
            }
            Waveform::Trapezoid { env, elapsed, .. } => {
                *elapsed = 0.0;
                env.trigger(1.0);
            }
            _ => {}
        }
    }
}

/// A phase-continuous oscillator with amplitude scaling and an optional
/// volume envelope.
///
/// Sampling is the only thing that advances the envelope clock: callers
/// that stop sampling freeze the envelope along with the phase. A paused
/// sampler is fully inert — no phase advance, no envelope advance, zero
/// output — on both the scalar and vectorized paths.
#[derive(Clone, Debug)]
pub struct Sampler {
    waveform: Waveform,
    amplitude: f32,
    frequency: f32,
    period: f32,
    phase: f32,
    phase_step: f32,
    playing: bool,
    envelope: Option<DecayEnvelope>,
    use_volume_envelope: bool,
}

impl Sampler {
    /// Create a sampler at 440 Hz for the given output sample rate.
    pub fn new(waveform: Waveform, sample_rate: u32) -> Self {
        let frequency = 440.0;
        Self {
            waveform,
            amplitude: 1.0,
            frequency,
            period: 1.0 / frequency,
            phase: 0.0,
            phase_step: 1.0 / sample_rate.max(1) as f32,
            playing: false,
            envelope: None,
            use_volume_envelope: false,
        }
    }

    /// Produce one sample, advancing phase (and the envelope, when
    /// enabled) by `dt` seconds. Returns 0.0 with no side effects while
    /// paused.
    pub fn sample(&mut self, dt: f32) -> f32 {
        if !self.playing {
            return 0.0;
        }
        if self.use_volume_envelope {
            if let Some(env) = self.envelope.as_mut() {
                env.update(dt);
            }
        }
        self.phase += dt;
        if self.phase >= self.period {
            self.phase %= self.period;
            self.waveform.on_phase_rollover();
        }
        let raw = self
            .waveform
            .sample(self.phase, self.period, dt)
            .clamp(-1.0, 1.0);
        let mut out = self.amplitude * raw;
        if self.use_volume_envelope {
            if let Some(env) = self.envelope.as_ref() {
                out *= env.value();
            }
        }
        out
    }

    /// Fill `out` with consecutive samples, each advancing phase by `dt`.
    /// Zero-fills with no side effects while paused.
    pub fn sample_into(&mut self, dt: f32, out: &mut [f32]) {
        if !self.playing {
            out.fill(0.0);
            return;
        }
        for slot in out.iter_mut() {
            *slot = self.sample(dt);
        }
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

    /// Amplitude scale, clamped to `[0, 1]`.
    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude.clamp(0.0, 1.0);
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Set the oscillator frequency in Hz. Phase is re-wrapped so the
    /// `0 ≤ phase < period` invariant survives a period shrink.
    pub fn set_frequency(&mut self, hz: f32) {
        if hz > 0.0 {
            self.frequency = hz;
            self.period = 1.0 / hz;
            self.phase %= self.period;
        }
    }

    /// Set the frequency from a piano key (12-TET, A4 = 440 Hz).
    pub fn set_piano_key(&mut self, key: PianoKey, modifier: Modifier, octave: i32) {
        self.set_frequency(key_frequency(key, modifier, octave));
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Step size matching one output sample at the configured rate.
    pub fn phase_step(&self) -> f32 {
        self.phase_step
    }

    /// Attach a volume envelope and enable it.
    pub fn set_volume_envelope(&mut self, envelope: DecayEnvelope) {
        self.envelope = Some(envelope);
        self.use_volume_envelope = true;
    }

    /// Toggle envelope scaling without discarding the envelope.
    pub fn use_volume_envelope(&mut self, enabled: bool) {
        self.use_volume_envelope = enabled;
    }

    pub fn volume_envelope(&self) -> Option<&DecayEnvelope> {
        self.envelope.as_ref()
    }

    pub fn volume_envelope_mut(&mut self) -> Option<&mut DecayEnvelope> {
        self.envelope.as_mut()
    }

    pub fn waveform(&self) -> &Waveform {
        &self.waveform
    }

    pub fn waveform_mut(&mut self) -> &mut Waveform {
        &mut self.waveform
    }
}
