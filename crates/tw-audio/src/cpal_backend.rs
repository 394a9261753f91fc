//! CPAL-based audio output backend.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;
use tw_engine::SoundBuffer;

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output that drains a shared `SoundBuffer`.
///
/// The stream callback runs on the driver's realtime thread; `SoundBuffer`
/// never blocks there — underrun degrades to interpolation or silence.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    buffer: Arc<SoundBuffer>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Create a CPAL output on the default device, configured to match
    /// the buffer's channel count.
    pub fn new(buffer: Arc<SoundBuffer>) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // The callback assumes device interleaving matches the buffer
        config.channels = buffer.channels() as u16;

        Ok(Self {
            device,
            config,
            stream: None,
            buffer,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Build and start the audio stream.
    pub fn build_stream(&mut self) -> Result<(), AudioError> {
        let running = self.running.clone();
        let buffer = self.buffer.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    let frames = data.len() / channels;
                    // Underrun interpolates or zero-fills inside get_samples
                    buffer.get_samples(data, frames);
                },
                |err| error!("audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
