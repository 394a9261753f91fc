//! N-input/M-output routing mixer paced by a unit timer.

use std::sync::Arc;

use tw_dsp::UnitTimer;

use crate::sound_buffer::SoundBuffer;

/// A software mixer: per-channel input/output volumes, a boolean routing
/// matrix, master volume, DC offset and mono downmix.
///
/// Input samples are staged with `set_input_sample` and mixed lazily: the
/// composed `UnitTimer` decouples the master-clock rate (repeated `clock`
/// calls) from the mix rate (once per timer rollover), at which point the
/// freshly mixed frame lands in the shared `SoundBuffer`.
pub struct SoundMixer {
    timer: UnitTimer,
    buffer: Arc<SoundBuffer>,
    input_volumes: Vec<f32>,
    input_samples: Vec<f32>,
    output_volumes: Vec<f32>,
    output_samples: Vec<f32>,
    /// `send_input_to_output[out][in]`
    routing: Vec<Vec<bool>>,
    master_volume: f32,
    offset_dc: f32,
    mono_output: bool,
    muted: bool,
    /// Set when any input changed since the last mix.
    modified: bool,
}

impl SoundMixer {
    /// Create a mixer with all inputs routed to all outputs at full volume.
    pub fn new(inputs: usize, outputs: usize, timer_period: f32, samples_per_buffer: usize) -> Self {
        let inputs = inputs.max(1);
        let outputs = outputs.max(1);
        Self {
            timer: UnitTimer::new(timer_period),
            buffer: Arc::new(SoundBuffer::new(outputs, samples_per_buffer)),
            input_volumes: vec![1.0; inputs],
            input_samples: vec![0.0; inputs],
            output_volumes: vec![1.0; outputs],
            output_samples: vec![0.0; outputs],
            routing: vec![vec![true; inputs]; outputs],
            master_volume: 1.0,
            offset_dc: 0.0,
            mono_output: false,
            muted: false,
            modified: false,
        }
    }

    pub fn inputs(&self) -> usize {
        self.input_samples.len()
    }

    pub fn outputs(&self) -> usize {
        self.output_samples.len()
    }

    /// Handle to the shared output FIFO, for the audio backend.
    pub fn buffer(&self) -> Arc<SoundBuffer> {
        self.buffer.clone()
    }

    /// Stage an input sample, clamped to `[-1, 1]`. Mixing is deferred to
    /// the next timer rollover.
    pub fn set_input_sample(&mut self, channel: usize, value: f32) {
        if let Some(slot) = self.input_samples.get_mut(channel) {
            *slot = value.clamp(-1.0, 1.0);
            self.modified = true;
        }
    }

    /// Consume master-clock ticks. On timer rollover, remix if any input
    /// changed and push the current output frame into the buffer.
    ///
    /// Returns `true` when a frame was produced.
    pub fn clock(&mut self, ticks: u32) -> bool {
        if !self.timer.clock(ticks) {
            return false;
        }
        if self.modified {
            self.update();
        }
        self.buffer.push_sample(&self.output_samples);
        true
    }

    /// Recompute every output sample from the staged inputs.
    pub fn update(&mut self) -> bool {
        self.modified = false;
        if self.muted {
            self.output_samples.fill(0.0);
            return true;
        }

        let n_inputs = self.input_samples.len() as f32;
        for (i, out) in self.output_samples.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (j, &sample) in self.input_samples.iter().enumerate() {
                if self.routing[i][j] {
                    sum += self.input_volumes[j] * sample;
                }
            }
            sum /= n_inputs;
            // The (1 + dc)·x - dc mapping trades DC bias for loudness
            *out = (1.0 + self.offset_dc) * self.master_volume * self.output_volumes[i] * sum
                - self.offset_dc;
        }

        if self.mono_output {
            let avg = self.output_samples.iter().sum::<f32>() / self.output_samples.len() as f32;
            self.output_samples.fill(avg);
        }
        true
    }

    /// The output sample computed by the most recent `update`.
    pub fn output_sample(&self, channel: usize) -> f32 {
        if self.muted {
            return 0.0;
        }
        self.output_samples.get(channel).copied().unwrap_or(0.0)
    }

    /// Route (or unroute) an input channel into an output channel.
    pub fn route(&mut self, output: usize, input: usize, enabled: bool) {
        if let Some(row) = self.routing.get_mut(output) {
            if let Some(slot) = row.get_mut(input) {
                *slot = enabled;
                self.modified = true;
            }
        }
    }

    /// Per-input volume, clamped to `[0, 1]`.
    pub fn set_volume(&mut self, input: usize, volume: f32) {
        if let Some(slot) = self.input_volumes.get_mut(input) {
            *slot = volume.clamp(0.0, 1.0);
            self.modified = true;
        }
    }

    /// Per-output volume, clamped to `[0, 1]`.
    pub fn set_output_volume(&mut self, output: usize, volume: f32) {
        if let Some(slot) = self.output_volumes.get_mut(output) {
            *slot = volume.clamp(0.0, 1.0);
            self.modified = true;
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
        self.modified = true;
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// DC offset in `[0, 1]`; maps the output range to `[-offset, 1]`.
    pub fn set_offset_dc(&mut self, offset: f32) {
        self.offset_dc = offset.clamp(0.0, 1.0);
        self.modified = true;
    }

    /// Balance between the two output channels. Only meaningful for
    /// exactly two outputs: `[-1, 0]` attenuates the right channel
    /// linearly, `[0, 1]` the left. Plain linear balance, no pan law.
    pub fn set_balance(&mut self, balance: f32) {
        if self.output_samples.len() != 2 {
            return;
        }
        let balance = balance.clamp(-1.0, 1.0);
        self.output_volumes[0] = if balance > 0.0 { 1.0 - balance } else { 1.0 };
        self.output_volumes[1] = if balance < 0.0 { 1.0 + balance } else { 1.0 };
        self.modified = true;
    }

    pub fn set_mono_output(&mut self, mono: bool) {
        self.mono_output = mono;
        self.modified = true;
    }

    pub fn mute(&mut self) {
        self.muted = true;
        self.modified = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
        self.modified = true;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Enable or disable the mix timer (a disabled mixer produces nothing).
    pub fn enable(&mut self) {
        self.timer.enable();
    }

    pub fn disable(&mut self) {
        self.timer.disable();
    }

    pub fn set_timer_period(&mut self, period: f32) {
        self.timer.set_period(period);
    }

    // Consumer-side pass-through to the shared buffer (the boundary API
    // used by the audio callback).

    pub fn get_sample(&self, out: &mut [f32]) -> bool {
        self.buffer.get_sample(out)
    }

    pub fn get_samples(&self, out: &mut [f32], n: usize) -> bool {
        self.buffer.get_samples(out, n)
    }
}
