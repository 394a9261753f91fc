//! RIFF/WAVE PCM header computation, streaming playback and recording.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::debug;
use tw_dsp::DecayEnvelope;

use crate::FormatError;

/// PCM format tag in the `fmt ` subchunk.
const WAVE_FORMAT_PCM: u16 = 1;

/// Byte offsets patched by `WavFileRecorder::finalize` (fixed 44-byte
/// header: RIFF size at 4, data size at 40).
const RIFF_SIZE_OFFSET: u64 = 4;
const DATA_SIZE_OFFSET: u64 = 40;
const HEADER_LEN: u32 = 44;

/// WAV format parameters plus derived byte-rate fields.
///
/// Every setter recomputes the derived fields, so they are never stale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WavHeader {
    format: u16,
    channels: u16,
    sample_rate: u32,
    bits_per_channel: u16,
    bits_per_sample: u16,
    bytes_per_sample: u16,
    bytes_per_second: u32,
    sample_period: f64,
}

impl WavHeader {
    pub fn new(channels: u16, sample_rate: u32, bits_per_channel: u16) -> Self {
        let mut header = Self {
            format: WAVE_FORMAT_PCM,
            channels,
            sample_rate,
            bits_per_channel,
            bits_per_sample: 0,
            bytes_per_sample: 0,
            bytes_per_second: 0,
            sample_period: 0.0,
        };
        header.compute();
        header
    }

    fn compute(&mut self) {
        self.bits_per_sample = self.bits_per_channel * self.channels;
        self.bytes_per_sample = self.bits_per_sample / 8;
        self.bytes_per_second = self.sample_rate * self.bytes_per_sample as u32;
        self.sample_period = 1.0 / self.sample_rate.max(1) as f64;
    }

    pub fn set_channels(&mut self, channels: u16) {
        self.channels = channels;
        self.compute();
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.compute();
    }

    pub fn set_bits_per_channel(&mut self, bits: u16) {
        self.bits_per_channel = bits;
        self.compute();
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_channel(&self) -> u16 {
        self.bits_per_channel
    }

    /// Bits per interleaved frame (all channels).
    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    /// Bytes per interleaved frame; the RIFF block-align field.
    pub fn bytes_per_sample(&self) -> u16 {
        self.bytes_per_sample
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.bytes_per_second
    }

    /// Seconds between adjacent frames.
    pub fn sample_period(&self) -> f64 {
        self.sample_period
    }

    /// Write the fixed 44-byte RIFF/WAVE PCM header for a data chunk of
    /// `data_len` bytes.
    pub fn write_to(&self, w: &mut impl Write, data_len: u32) -> Result<(), FormatError> {
        w.write_all(b"RIFF")?;
        w.write_all(&(HEADER_LEN - 8 + data_len).to_le_bytes())?;
        w.write_all(b"WAVE")?;
        w.write_all(b"fmt ")?;
        w.write_all(&16u32.to_le_bytes())?;
        w.write_all(&self.format.to_le_bytes())?;
        w.write_all(&self.channels.to_le_bytes())?;
        w.write_all(&self.sample_rate.to_le_bytes())?;
        w.write_all(&self.bytes_per_second.to_le_bytes())?;
        w.write_all(&self.bytes_per_sample.to_le_bytes())?;
        w.write_all(&self.bits_per_channel.to_le_bytes())?;
        w.write_all(b"data")?;
        w.write_all(&data_len.to_le_bytes())?;
        Ok(())
    }

    /// Parse RIFF/WAVE header through the start of the `data` chunk.
    /// Returns the header and the declared data length. Unknown subchunks
    /// are skipped. Only uncompressed PCM at 8/16/24/32 bits is accepted.
    pub fn read_from(r: &mut impl Read) -> Result<(Self, u32), FormatError> {
        let mut magic = [0u8; 12];
        r.read_exact(&mut magic)
            .map_err(|_| FormatError::UnexpectedEof)?;
        if &magic[0..4] != b"RIFF" || &magic[8..12] != b"WAVE" {
            return Err(FormatError::InvalidHeader);
        }

        let mut header: Option<WavHeader> = None;
        loop {
            let mut tag = [0u8; 4];
            r.read_exact(&mut tag)
                .map_err(|_| FormatError::UnexpectedEof)?;
            let mut len_bytes = [0u8; 4];
            r.read_exact(&mut len_bytes)
                .map_err(|_| FormatError::UnexpectedEof)?;
            let len = u32::from_le_bytes(len_bytes);

            match &tag {
                b"fmt " => {
                    if len < 16 {
                        return Err(FormatError::InvalidHeader);
                    }
                    let mut fmt = [0u8; 16];
                    r.read_exact(&mut fmt)
                        .map_err(|_| FormatError::UnexpectedEof)?;
                    let format = u16::from_le_bytes([fmt[0], fmt[1]]);
                    if format != WAVE_FORMAT_PCM {
                        return Err(FormatError::UnsupportedVersion);
                    }
                    let channels = u16::from_le_bytes([fmt[2], fmt[3]]);
                    let sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
                    let bits = u16::from_le_bytes([fmt[14], fmt[15]]);
                    if !matches!(bits, 8 | 16 | 24 | 32) || channels == 0 {
                        return Err(FormatError::UnsupportedVersion);
                    }
                    header = Some(WavHeader::new(channels, sample_rate, bits));
                    skip_bytes(r, len as u64 - 16)?;
                }
                b"data" => {
                    let header = header.ok_or(FormatError::InvalidHeader)?;
                    return Ok((header, len));
                }
                _ => {
                    debug!("skipping wav subchunk {:?} ({} bytes)", tag, len);
                    skip_bytes(r, len as u64)?;
                }
            }
        }
    }
}

impl Default for WavHeader {
    fn default() -> Self {
        Self::new(2, 44_100, 16)
    }
}

fn skip_bytes(r: &mut impl Read, n: u64) -> Result<(), FormatError> {
    let copied = std::io::copy(&mut r.take(n), &mut std::io::sink())?;
    if copied < n {
        return Err(FormatError::UnexpectedEof);
    }
    Ok(())
}

fn decode_frame(bytes: &[u8], bits: u16, out: &mut Vec<f32>) {
    match bits {
        8 => {
            for &b in bytes {
                out.push((b as f32 - 128.0) / 128.0);
            }
        }
        16 => {
            for pair in bytes.chunks_exact(2) {
                out.push(i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32_768.0);
            }
        }
        24 => {
            for triple in bytes.chunks_exact(3) {
                let v = i32::from_le_bytes([0, triple[0], triple[1], triple[2]]) >> 8;
                out.push(v as f32 / 8_388_608.0);
            }
        }
        _ => {
            for quad in bytes.chunks_exact(4) {
                let v = i32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
                out.push(v as f32 / 2_147_483_648.0);
            }
        }
    }
}

fn encode_sample(v: f32, bits: u16, out: &mut Vec<u8>) {
    let v = v.clamp(-1.0, 1.0);
    match bits {
        8 => out.push((v * 127.0 + 128.0) as u8),
        16 => out.extend_from_slice(&((v * 32_767.0) as i16).to_le_bytes()),
        24 => {
            let full = (v * 8_388_607.0) as i32;
            out.extend_from_slice(&full.to_le_bytes()[0..3]);
        }
        _ => out.extend_from_slice(&((v as f64 * 2_147_483_647.0) as i32).to_le_bytes()),
    }
}

/// Plays decoded PCM as a waveform source.
///
/// Keeps the whole data chunk decoded and interpolates between the two
/// frames adjacent to the playback position, so the caller's `dt` need
/// not match the file's native rate.
#[derive(Clone, Debug)]
pub struct WavFilePlayer {
    header: WavHeader,
    /// Interleaved decoded frames.
    frames: Vec<f32>,
    time: f64,
    amplitude: f32,
    playing: bool,
    looping: bool,
    envelope: Option<DecayEnvelope>,
    use_volume_envelope: bool,
}

impl WavFilePlayer {
    pub fn read(r: &mut impl Read) -> Result<Self, FormatError> {
        let (header, data_len) = WavHeader::read_from(r)?;
        let mut data = vec![0u8; data_len as usize];
        r.read_exact(&mut data)
            .map_err(|_| FormatError::UnexpectedEof)?;
        let mut frames = Vec::with_capacity(data.len() / (header.bits_per_channel() as usize / 8));
        decode_frame(&data, header.bits_per_channel(), &mut frames);
        debug!(
            "decoded {} frames, {} channels at {} Hz",
            frames.len() / header.channels() as usize,
            header.channels(),
            header.sample_rate()
        );
        Ok(Self {
            header,
            frames,
            time: 0.0,
            amplitude: 1.0,
            playing: false,
            looping: false,
            envelope: None,
            use_volume_envelope: false,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let mut reader = BufReader::new(File::open(path)?);
        Self::read(&mut reader)
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }

    /// Frames in the decoded data chunk.
    pub fn frame_count(&self) -> usize {
        self.frames.len() / self.header.channels() as usize
    }

    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 * self.header.sample_period()
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

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_amplitude(&mut self, amplitude: f32) {
        self.amplitude = amplitude.clamp(0.0, 1.0);
    }

    pub fn rewind(&mut self) {
        self.time = 0.0;
    }

    pub fn set_volume_envelope(&mut self, envelope: DecayEnvelope) {
        self.envelope = Some(envelope);
        self.use_volume_envelope = true;
    }

    pub fn use_volume_envelope(&mut self, enabled: bool) {
        self.use_volume_envelope = enabled;
    }

    pub fn volume_envelope_mut(&mut self) -> Option<&mut DecayEnvelope> {
        self.envelope.as_mut()
    }

    /// Interpolated value of channel `channel` at playback position
    /// `time + offset` frames.
    fn channel_value(&self, channel: usize, pos: f64) -> f32 {
        let channels = self.header.channels() as usize;
        let frames = self.frames.len() / channels;
        if frames == 0 {
            return 0.0;
        }
        let i = pos as usize;
        if i + 1 >= frames {
            return self.frames[(frames - 1) * channels + channel];
        }
        let frac = (pos - i as f64) as f32;
        let a = self.frames[i * channels + channel];
        let b = self.frames[(i + 1) * channels + channel];
        a + (b - a) * frac
    }

    fn advance(&mut self, dt: f64) -> Option<f64> {
        if !self.playing {
            return None;
        }
        let end = self.duration_seconds();
        if self.time >= end {
            if self.looping && end > 0.0 {
                self.time %= end;
            } else {
                self.playing = false;
                return None;
            }
        }
        let pos = self.time / self.header.sample_period();
        self.time += dt;
        Some(pos)
    }

    fn gain(&mut self, dt: f32) -> f32 {
        let mut gain = self.amplitude;
        if self.use_volume_envelope {
            if let Some(env) = self.envelope.as_mut() {
                env.update(dt);
                gain *= env.value();
            }
        }
        gain
    }

    /// Next mono value (channels averaged), advancing by `dt` seconds.
    /// Returns 0.0 when paused or past the end.
    pub fn sample(&mut self, dt: f32) -> f32 {
        let Some(pos) = self.advance(dt as f64) else {
            return 0.0;
        };
        let gain = self.gain(dt);
        let channels = self.header.channels() as usize;
        let mut sum = 0.0;
        for c in 0..channels {
            sum += self.channel_value(c, pos);
        }
        gain * sum / channels as f32
    }

    /// Next value per channel into `out`, advancing by `dt` seconds.
    pub fn sample_frame(&mut self, dt: f32, out: &mut [f32]) {
        let Some(pos) = self.advance(dt as f64) else {
            out.fill(0.0);
            return;
        };
        let gain = self.gain(dt);
        for (c, slot) in out.iter_mut().enumerate() {
            *slot = gain * self.channel_value(c.min(self.header.channels() as usize - 1), pos);
        }
    }
}

/// Streams encoded PCM frames to a seekable writer.
///
/// A placeholder header goes out first; `finalize` seeks back and patches
/// the RIFF and data sizes once the frame count is known.
#[derive(Debug)]
pub struct WavFileRecorder<W: Write + Seek> {
    header: WavHeader,
    writer: W,
    data_bytes: u32,
    finalized: bool,
}

impl WavFileRecorder<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, header: WavHeader) -> Result<Self, FormatError> {
        Self::new(BufWriter::new(File::create(path)?), header)
    }
}

impl<W: Write + Seek> WavFileRecorder<W> {
    pub fn new(mut writer: W, header: WavHeader) -> Result<Self, FormatError> {
        header.write_to(&mut writer, 0)?;
        Ok(Self {
            header,
            writer,
            data_bytes: 0,
            finalized: false,
        })
    }

    pub fn header(&self) -> &WavHeader {
        &self.header
    }

    /// Frames written so far.
    pub fn frame_count(&self) -> u32 {
        self.data_bytes / self.header.bytes_per_sample().max(1) as u32
    }

    /// Encode and append one frame; `frame` holds one value per channel.
    /// Missing channels repeat the last value given.
    pub fn write_sample(&mut self, frame: &[f32]) -> Result<(), FormatError> {
        let bits = self.header.bits_per_channel();
        let mut bytes = Vec::with_capacity(self.header.bytes_per_sample() as usize);
        let mut last = 0.0;
        for c in 0..self.header.channels() as usize {
            last = frame.get(c).copied().unwrap_or(last);
            encode_sample(last, bits, &mut bytes);
        }
        self.writer.write_all(&bytes)?;
        self.data_bytes += bytes.len() as u32;
        Ok(())
    }

    /// Append interleaved frames.
    pub fn write_samples(&mut self, interleaved: &[f32]) -> Result<(), FormatError> {
        for frame in interleaved.chunks_exact(self.header.channels() as usize) {
            self.write_sample(frame)?;
        }
        Ok(())
    }

    /// Patch the RIFF and data chunk sizes. Idempotent.
    pub fn finalize(&mut self) -> Result<(), FormatError> {
        if self.finalized {
            return Ok(());
        }
        self.writer.seek(SeekFrom::Start(RIFF_SIZE_OFFSET))?;
        self.writer
            .write_all(&(HEADER_LEN - 8 + self.data_bytes).to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(DATA_SIZE_OFFSET))?;
        self.writer.write_all(&self.data_bytes.to_le_bytes())?;
        self.writer.seek(SeekFrom::End(0))?;
        self.writer.flush()?;
        self.finalized = true;
        Ok(())
    }

    /// Finalize and hand back the writer.
    pub fn into_inner(mut self) -> Result<W, FormatError> {
        self.finalize()?;
        Ok(self.writer)
    }
}
