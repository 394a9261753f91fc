//! Thread-safe multichannel sample FIFO.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::trace;

/// A multichannel FIFO of `f32` samples shared between a producer (the
/// synthesis thread) and a consumer (the realtime audio callback).
///
/// Every method locks the same internal mutex for the duration of the
/// queue mutation only; nothing ever blocks waiting for data. Underrun on
/// the consumer side degrades to interpolation or zero-fill, overrun on
/// the producer side drops the oldest samples. All channel queues have
/// identical length at all times.
#[derive(Debug)]
pub struct SoundBuffer {
    inner: Mutex<Vec<VecDeque<f32>>>,
    channels: usize,
    /// Soft capacity; trimming starts above twice this many samples.
    samples_per_buffer: usize,
}

impl SoundBuffer {
    /// Create a buffer with `channels` parallel queues and a soft capacity
    /// of `samples_per_buffer` samples per channel.
    pub fn new(channels: usize, samples_per_buffer: usize) -> Self {
        let channels = channels.max(1);
        Self {
            inner: Mutex::new(vec![VecDeque::new(); channels]),
            channels,
            samples_per_buffer,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of buffered samples per channel.
    pub fn len(&self) -> usize {
        let queues = self.inner.lock().unwrap();
        queues[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Push one frame: `frame[ch]` goes to channel `ch`. Extra values are
    /// ignored; missing channels receive the last value.
    pub fn push_sample(&self, frame: &[f32]) {
        let mut queues = self.inner.lock().unwrap();
        for (ch, queue) in queues.iter_mut().enumerate() {
            let v = frame
                .get(ch)
                .or_else(|| frame.last())
                .copied()
                .unwrap_or(0.0);
            queue.push_back(v);
        }
        Self::trim(&mut queues, self.samples_per_buffer);
    }

    /// Push interleaved frames (`frames.len()` must be a multiple of the
    /// channel count; a trailing partial frame is ignored).
    pub fn push_samples(&self, frames: &[f32]) {
        let mut queues = self.inner.lock().unwrap();
        for frame in frames.chunks_exact(self.channels) {
            for (queue, &v) in queues.iter_mut().zip(frame) {
                queue.push_back(v);
            }
        }
        Self::trim(&mut queues, self.samples_per_buffer);
    }

    /// Push one mono value to every channel.
    pub fn copy_sample(&self, value: f32) {
        let mut queues = self.inner.lock().unwrap();
        for queue in queues.iter_mut() {
            queue.push_back(value);
        }
        Self::trim(&mut queues, self.samples_per_buffer);
    }

    /// Push a run of mono values, each duplicated across every channel.
    pub fn copy_samples(&self, values: &[f32]) {
        let mut queues = self.inner.lock().unwrap();
        for &value in values {
            for queue in queues.iter_mut() {
                queue.push_back(value);
            }
        }
        Self::trim(&mut queues, self.samples_per_buffer);
    }

    /// Drop oldest samples across all channels in lock-step while over
    /// twice the soft capacity. Explicit backpressure: bounded memory,
    /// graceful loss, no blocking.
    fn trim(queues: &mut [VecDeque<f32>], samples_per_buffer: usize) {
        let mut dropped = 0usize;
        while queues[0].len() > 2 * samples_per_buffer {
            for queue in queues.iter_mut() {
                queue.pop_front();
            }
            dropped += 1;
        }
        if dropped > 0 {
            trace!("sound buffer overrun: dropped {dropped} oldest samples");
        }
    }

    /// Pop one frame into `out[ch]`. Zero-fills and returns `false` when
    /// the buffer is empty.
    pub fn get_sample(&self, out: &mut [f32]) -> bool {
        let mut queues = self.inner.lock().unwrap();
        if queues[0].is_empty() {
            out.fill(0.0);
            return false;
        }
        for (ch, queue) in queues.iter_mut().enumerate() {
            let v = queue.pop_front().unwrap_or(0.0);
            if let Some(slot) = out.get_mut(ch) {
                *slot = v;
            }
        }
        true
    }

    /// Fill `out` with `n` interleaved frames.
    ///
    /// - buffered ≥ `n`: pops exactly `n` frames, returns `true`.
    /// - buffered ≤ 1: zero-fills, returns `false`.
    /// - otherwise: linearly interpolates the available samples up to `n`
    ///   output frames, consuming everything, and returns `false` so the
    ///   caller knows real data ran short. Continuity over accuracy.
    pub fn get_samples(&self, out: &mut [f32], n: usize) -> bool {
        let want = n * self.channels;
        debug_assert!(out.len() >= want);
        let mut queues = self.inner.lock().unwrap();
        let avail = queues[0].len();

        if avail <= 1 {
            out[..want].fill(0.0);
            return false;
        }

        if avail >= n {
            for i in 0..n {
                for (ch, queue) in queues.iter_mut().enumerate() {
                    out[i * self.channels + ch] = queue.pop_front().unwrap_or(0.0);
                }
            }
            return true;
        }

        // Underrun: stretch the available samples across n output frames.
        for (ch, queue) in queues.iter_mut().enumerate() {
            let samples: Vec<f32> = queue.drain(..).collect();
            for i in 0..n {
                let pos = i as f32 * (avail - 1) as f32 / (n - 1) as f32;
                let lo = pos as usize;
                let hi = (lo + 1).min(avail - 1);
                let frac = pos - lo as f32;
                out[i * self.channels + ch] = samples[lo] + (samples[hi] - samples[lo]) * frac;
            }
        }
        false
    }
}
