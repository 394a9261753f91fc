//! Headless synthesis controller for the tonewheel audio core.
//!
//! Provides a unified API for voice control, realtime playback and
//! offline rendering that both a UI layer and the CLI can share.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, warn};
use tw_audio::{AudioOutput, CpalOutput};
use tw_engine::{SoundBuffer, SoundMixer};

// Re-export common types so callers don't need the lower crates directly.
// The re-exports double as this module's own imports.
pub use tw_dsp::{
    key_frequency, note_frequency, Curve, DecayEnvelope, Modifier, PianoKey, Sampler, Waveform,
};
pub use tw_formats::{
    FormatError, MidiFile, MidiFilePlayer, NoteData, WavFilePlayer, WavFileRecorder, WavHeader,
};

/// Voices and mixer behind the engine's shared mutex.
struct EngineState {
    voices: Vec<Sampler>,
    mixer: SoundMixer,
}

impl EngineState {
    /// Generate one frame: sample every voice into the mixer and advance
    /// the master clock by one tick.
    fn step(&mut self, dt: f32) {
        for (i, voice) in self.voices.iter_mut().enumerate() {
            self.mixer.set_input_sample(i, voice.sample(dt));
        }
        self.mixer.clock(1);
    }
}

struct PlaybackHandle {
    quit: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// The audio device handle: a bank of sampler voices feeding a stereo
/// mixer, with an optional realtime output stream.
///
/// Construct one explicitly and pass it where it is needed; there is no
/// global instance. All voice and mixer access goes through the shared
/// mutex, so control calls are safe while the producer thread runs.
pub struct AudioEngine {
    state: Arc<Mutex<EngineState>>,
    buffer: Arc<SoundBuffer>,
    sample_rate: u32,
    playback: Option<PlaybackHandle>,
}

impl AudioEngine {
    /// Create an engine with `voices` sine voices mixed to stereo.
    pub fn new(voices: usize, sample_rate: u32) -> Self {
        let voices = voices.max(1);
        // Mix one frame per master-clock tick; buffer ~100 ms of audio
        let samples_per_buffer = (sample_rate / 10).max(64) as usize;
        let mixer = SoundMixer::new(voices, 2, 1.0, samples_per_buffer);
        let buffer = mixer.buffer();
        let bank = (0..voices)
            .map(|_| Sampler::new(Waveform::Sine, sample_rate))
            .collect();
        Self {
            state: Arc::new(Mutex::new(EngineState {
                voices: bank,
                mixer,
            })),
            buffer,
            sample_rate,
            playback: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn voices(&self) -> usize {
        self.state.lock().unwrap().voices.len()
    }

    /// Handle to the mixer's output FIFO, for audio backends.
    pub fn buffer(&self) -> Arc<SoundBuffer> {
        self.buffer.clone()
    }

    // --- Voice and mixer control ---

    /// Run `f` against one voice. Returns `None` for an out-of-range index.
    pub fn with_voice<R>(&self, index: usize, f: impl FnOnce(&mut Sampler) -> R) -> Option<R> {
        let mut state = self.state.lock().unwrap();
        state.voices.get_mut(index).map(f)
    }

    /// Run `f` against the mixer.
    pub fn with_mixer<R>(&self, f: impl FnOnce(&mut SoundMixer) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state.mixer)
    }

    /// Point a voice at a piano key and start it. Retriggers the volume
    /// envelope when one is attached.
    pub fn note_on(&self, voice: usize, key: PianoKey, modifier: Modifier, octave: i32) {
        self.with_voice(voice, |v| {
            v.set_piano_key(key, modifier, octave);
            if let Some(env) = v.volume_envelope_mut() {
                env.trigger(1.0);
            }
            v.play();
        });
    }

    /// Release a voice: let the envelope ring out if present, otherwise
    /// pause immediately.
    pub fn note_off(&self, voice: usize) {
        self.with_voice(voice, |v| {
            if let Some(env) = v.volume_envelope_mut() {
                env.release();
            } else {
                v.pause();
            }
        });
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.with_mixer(|m| m.set_master_volume(volume));
    }

    pub fn set_balance(&self, balance: f32) {
        self.with_mixer(|m| m.set_balance(balance));
    }

    // --- Realtime playback ---

    /// Spawn the producer thread, which opens the default audio device.
    /// Device failures are logged from the thread; the engine simply
    /// reports not running afterwards.
    pub fn start(&mut self) {
        self.stop();

        let quit = Arc::new(AtomicBool::new(false));
        let state = self.state.clone();
        let buffer = self.buffer.clone();
        let sample_rate = self.sample_rate;
        let flag = quit.clone();
        // The cpal stream is not Send, so the device lives on the
        // producer thread for its whole lifetime.
        let thread = std::thread::spawn(move || {
            let mut output = match CpalOutput::new(buffer.clone()) {
                Ok(output) => output,
                Err(e) => {
                    error!("failed to open audio device: {}", e);
                    return;
                }
            };
            if let Err(e) = output.build_stream() {
                error!("failed to start audio stream: {}", e);
                return;
            }
            if let Err(e) = output.start() {
                error!("failed to start playback: {}", e);
                return;
            }
            debug!("audio device opened at {} Hz", output.sample_rate());

            producer_thread(state, buffer, flag, sample_rate);

            if let Err(e) = output.stop() {
                warn!("failed to stop audio stream: {}", e);
            }
        });

        self.playback = Some(PlaybackHandle {
            quit,
            thread: Some(thread),
        });
    }

    /// Signal the producer thread to quit and join it.
    pub fn stop(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.quit.store(true, Ordering::Relaxed);
            if let Some(handle) = playback.thread.take() {
                if handle.join().is_err() {
                    warn!("audio producer thread panicked");
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.playback.is_some()
    }

    // --- Offline rendering ---

    /// Render `frames` stereo frames through the normal mix path, without
    /// a device. Returns interleaved samples.
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let dt = 1.0 / self.sample_rate as f32;
        let mut out = Vec::with_capacity(frames * 2);
        let mut frame = [0.0f32; 2];
        let mut state = self.state.lock().unwrap();
        for _ in 0..frames {
            state.step(dt);
            self.buffer.get_sample(&mut frame);
            out.extend_from_slice(&frame);
        }
        out
    }

    /// Render up to `seconds` of audio straight to a 16-bit stereo WAV.
    pub fn render_to_wav(
        &self,
        path: impl AsRef<std::path::Path>,
        seconds: f32,
    ) -> Result<(), FormatError> {
        let frames = (self.sample_rate as f32 * seconds) as usize;
        let samples = self.render_frames(frames);
        let header = WavHeader::new(2, self.sample_rate, 16);
        let mut recorder = WavFileRecorder::create(path, header)?;
        recorder.write_samples(&samples)?;
        recorder.finalize()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keeps the shared buffer topped up at the master clock rate. Runs until
/// the quit flag is set; never blocks on the consumer.
fn producer_thread(
    state: Arc<Mutex<EngineState>>,
    buffer: Arc<SoundBuffer>,
    quit: Arc<AtomicBool>,
    sample_rate: u32,
) {
    let dt = 1.0 / sample_rate as f32;
    let chunk = (sample_rate / 100).max(1) as usize; // 10 ms of frames
    let target = (sample_rate / 10).max(64) as usize;
    let nap = Duration::from_millis(2);

    while !quit.load(Ordering::Relaxed) {
        if buffer.len() < target {
            let mut state = state.lock().unwrap();
            for _ in 0..chunk {
                state.step(dt);
            }
        } else {
            std::thread::sleep(nap);
        }
    }
    debug!("audio producer thread exiting");
}
