//! Fixed-size PCM frame sources
//!
//! A frame source turns a continuous audio input (live microphone or WAV
//! file) into a lazy, forward-only sequence of fixed-duration frames. Every
//! frame a source produces has identical sample count; end-of-stream is
//! signalled with `Ok(None)`, never with a short frame.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream};

use crate::{Error, Result};

/// How long a live read may stall before the device is considered gone
const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// One fixed-duration slice of 16-bit PCM audio
///
/// Samples are interleaved when the source is multi-channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
}

impl AudioFrame {
    /// Wrap raw samples in a frame
    #[must_use]
    pub const fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    /// Interleaved samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Sample count (all channels)
    #[must_use]
    pub const fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Consume the frame, returning its samples
    #[must_use]
    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// A lazy, forward-only, non-restartable sequence of fixed-size frames
pub trait FrameSource {
    /// Read the next frame, blocking until one is available
    ///
    /// Returns `Ok(None)` at end-of-stream. Partial frames are never
    /// forwarded; every consumer may assume exact frame length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the underlying device disconnects or
    /// stalls.
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;

    /// Declared sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Declared channel count
    fn channels(&self) -> u16;

    /// Samples per frame (all channels interleaved)
    fn frame_len(&self) -> usize;
}

/// Samples per frame for a duration/rate/channel configuration
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn frame_samples(sample_rate: u32, channels: u16, frame_duration_ms: u32) -> usize {
    (sample_rate as usize * frame_duration_ms as usize / 1000) * usize::from(channels)
}

/// Live microphone frame source
///
/// The cpal callback thread feeds captured samples into an internal queue;
/// [`FrameSource::next_frame`] blocks on that queue until a full frame has
/// accumulated. Dropping the source drops the cpal stream, releasing the
/// device handle on every exit path.
pub struct MicFrameSource {
    _stream: Stream,
    rx: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    failed: Arc<Mutex<Option<String>>>,
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
}

impl MicFrameSource {
    /// Open the default input device at the requested rate and channel count
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if no input device is available or no
    /// supported configuration matches the request.
    pub fn open(sample_rate: u32, channels: u16, frame_duration_ms: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Device("no input device available".to_string()))?;

        let matching: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .filter(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .collect();

        let supported = matching
            .iter()
            .find(|c| c.sample_format() == SampleFormat::I16)
            .or_else(|| matching.iter().find(|c| c.sample_format() == SampleFormat::F32))
            .cloned()
            .ok_or_else(|| Error::Device("no suitable input config found".to_string()))?;

        let sample_format = supported.sample_format();
        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

        let (tx, rx) = mpsc::channel::<Vec<i16>>();
        let failed = Arc::new(Mutex::new(None));

        let err_failed = Arc::clone(&failed);
        let err_fn = move |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio capture error");
            if let Ok(mut slot) = err_failed.lock() {
                *slot = Some(err.to_string());
            }
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(data.to_vec());
                },
                err_fn,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let _ = tx.send(data.iter().map(|&s| f32_to_i16(s)).collect());
                },
                err_fn,
                None,
            ),
            other => {
                return Err(Error::Device(format!(
                    "unsupported input sample format: {other}"
                )));
            }
        }
        .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            channels,
            frame_duration_ms,
            "microphone frame source opened"
        );

        Ok(Self {
            _stream: stream,
            rx,
            pending: VecDeque::new(),
            failed,
            sample_rate,
            channels,
            frame_len: frame_samples(sample_rate, channels, frame_duration_ms),
        })
    }
}

impl FrameSource for MicFrameSource {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        loop {
            if let Some(msg) = self.failed.lock().ok().and_then(|mut slot| slot.take()) {
                return Err(Error::Device(msg));
            }

            if self.pending.len() >= self.frame_len {
                let samples: Vec<i16> = self.pending.drain(..self.frame_len).collect();
                return Ok(Some(AudioFrame::new(samples)));
            }

            match self.rx.recv_timeout(READ_TIMEOUT) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::Device("audio input stalled".to_string()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Device("audio input stream closed".to_string()));
                }
            }
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }
}

/// WAV file frame source
///
/// Reads a 16-bit PCM WAV file as a frame sequence at the file's declared
/// rate and channel count. A short final read ends the sequence without
/// forwarding the partial frame.
pub struct WavFrameSource {
    reader: hound::WavReader<std::io::BufReader<std::fs::File>>,
    sample_rate: u32,
    channels: u16,
    frame_len: usize,
    done: bool,
}

impl WavFrameSource {
    /// Open a WAV file as a frame source
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is not 16-bit integer PCM, or
    /// a [`hound`] error if the file is unreadable.
    pub fn open<P: AsRef<Path>>(path: P, frame_duration_ms: u32) -> Result<Self> {
        let reader = hound::WavReader::open(path.as_ref())?;
        let spec = reader.spec();

        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(Error::Config(format!(
                "expected 16-bit integer PCM wav, got {}-bit {:?}",
                spec.bits_per_sample, spec.sample_format
            )));
        }

        Ok(Self {
            reader,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            frame_len: frame_samples(spec.sample_rate, spec.channels, frame_duration_ms),
            done: false,
        })
    }
}

impl FrameSource for WavFrameSource {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        if self.done {
            return Ok(None);
        }

        let mut samples = Vec::with_capacity(self.frame_len);
        for sample in self.reader.samples::<i16>().take(self.frame_len) {
            samples.push(sample?);
        }

        if samples.len() < self.frame_len {
            self.done = true;
            return Ok(None);
        }

        Ok(Some(AudioFrame::new(samples)))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }
}

/// Convert a float sample in [-1.0, 1.0] to 16-bit PCM
#[allow(clippy::cast_possible_truncation)]
fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_samples_accounts_for_channels() {
        assert_eq!(frame_samples(16_000, 1, 30), 480);
        assert_eq!(frame_samples(16_000, 2, 30), 960);
        assert_eq!(frame_samples(24_000, 2, 10), 480);
    }

    #[test]
    fn f32_conversion_saturates() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(2.0), 32767);
        assert_eq!(f32_to_i16(-2.0), -32768);
    }

    #[test]
    fn wav_source_yields_fixed_frames_then_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        // 2.5 frames at 30ms: two full frames, one short terminal read
        for i in 0..1200_i16 {
            writer.write_sample(i).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavFrameSource::open(&path, 30).unwrap();
        assert_eq!(source.frame_len(), 480);

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.len(), 480);
        assert_eq!(first.samples()[0], 0);

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.len(), 480);
        assert_eq!(second.samples()[0], 480);

        // 240 trailing samples: short read ends the sequence
        assert!(source.next_frame().unwrap().is_none());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn wav_source_rejects_float_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.write_sample(0.5_f32).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            WavFrameSource::open(&path, 30),
            Err(Error::Config(_))
        ));
    }
}
