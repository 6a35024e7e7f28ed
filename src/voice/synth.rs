//! Streaming speech synthesis and playback
//!
//! Opens a streaming connection to the synthesis service requesting raw
//! 16-bit mono PCM at the service's native rate, then processes byte chunks
//! as they arrive: decode whole samples, apply gain with saturation,
//! resample for the playback device if its rate differs, route to the
//! persona's stereo channel, and write concurrently to the live output
//! device and to a durable stereo WAV kept at native fidelity.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream};
use futures::StreamExt;

use crate::audio::{LinearResampler, StereoChannel, StereoWavWriter, route_stereo};
use crate::persona::Persona;
use crate::{Error, Result};

/// Native sample rate of the synthesis service's PCM output
pub const NATIVE_RATE: u32 = 24_000;

/// Accumulates network byte chunks into whole 16-bit samples
///
/// Chunks arrive with arbitrary sizes; only whole 2-byte sample groups are
/// decoded, and at most one odd trailing byte is retained for the next
/// chunk.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: Vec<u8>,
}

impl ChunkAssembler {
    /// Create an empty assembler
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: Vec::new() }
    }

    /// Append a chunk, returning the samples it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<i16> {
        self.pending.extend_from_slice(chunk);

        let whole = self.pending.len() / 2 * 2;
        let samples = self.pending[..whole]
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        self.pending.drain(..whole);
        samples
    }

    /// Bytes currently held back (0 or 1)
    #[must_use]
    pub const fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Apply a gain multiplier in place, saturating to the 16-bit range
///
/// The scale runs in a wider domain than the sample width so intermediate
/// values never overflow before the clip.
#[allow(clippy::cast_possible_truncation)]
pub fn apply_gain(samples: &mut [i16], gain: f32) {
    if (gain - 1.0).abs() < f32::EPSILON {
        return;
    }
    for sample in samples {
        let scaled = (f64::from(*sample) * f64::from(gain)).round() as i64;
        *sample = scaled.clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16;
    }
}

/// Live audio output target for interleaved stereo frames
pub trait AudioSink {
    /// Write one batch of interleaved stereo samples
    ///
    /// Each call hands over whole stereo frames; a partial frame (one
    /// channel without the other) is never observable downstream.
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails
    fn write(&mut self, interleaved: &[i16]) -> Result<()>;

    /// Block until queued audio has been played out
    ///
    /// # Errors
    ///
    /// Returns error if the sink fails
    fn drain(&mut self) -> Result<()> {
        Ok(())
    }
}

/// cpal-backed stereo output sink
///
/// The output callback pops whole stereo frames from an internal queue,
/// substituting silence when the queue runs dry. Dropping the sink drops
/// the cpal stream, releasing the device handle.
pub struct CpalSink {
    _stream: Stream,
    queue: Arc<Mutex<VecDeque<i16>>>,
    sample_rate: u32,
}

impl CpalSink {
    /// Open the default output device as a stereo sink at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if no output device or matching stereo
    /// configuration is available.
    pub fn open(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("no output device available".to_string()))?;

        let matching: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::Device(e.to_string()))?
            .filter(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .collect();

        let supported = matching
            .iter()
            .find(|c| c.sample_format() == SampleFormat::I16)
            .or_else(|| matching.iter().find(|c| c.sample_format() == SampleFormat::F32))
            .cloned()
            .ok_or_else(|| Error::Device("no suitable stereo output config found".to_string()))?;

        let sample_format = supported.sample_format();
        let config = supported.with_sample_rate(SampleRate(sample_rate)).config();

        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));

        let err_fn = |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio playback error");
        };

        let stream = match sample_format {
            SampleFormat::I16 => {
                let cb_queue = Arc::clone(&queue);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        fill_from_queue(&cb_queue, data, |s| s);
                    },
                    err_fn,
                    None,
                )
            }
            SampleFormat::F32 => {
                let cb_queue = Arc::clone(&queue);
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        fill_from_queue(&cb_queue, data, |s| f32::from(s) / 32_768.0);
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(Error::Device(format!(
                    "unsupported output sample format: {other}"
                )));
            }
        }
        .map_err(|e| Error::Device(e.to_string()))?;

        stream.play().map_err(|e| Error::Device(e.to_string()))?;

        tracing::debug!(
            device = %device.name().unwrap_or_default(),
            sample_rate,
            "stereo output sink opened"
        );

        Ok(Self {
            _stream: stream,
            queue,
            sample_rate,
        })
    }
}

/// Pop whole stereo frames from the queue into an output buffer
///
/// Frames are consumed two samples at a time so one channel is never
/// played without its pair.
fn fill_from_queue<T: Copy + Default>(
    queue: &Arc<Mutex<VecDeque<i16>>>,
    data: &mut [T],
    convert: impl Fn(i16) -> T,
) {
    let Ok(mut queue) = queue.lock() else {
        data.fill(T::default());
        return;
    };

    for frame in data.chunks_mut(2) {
        if queue.len() >= 2 {
            for out in frame.iter_mut() {
                // len checked above
                if let Some(sample) = queue.pop_front() {
                    *out = convert(sample);
                }
            }
        } else {
            frame.fill(T::default());
        }
    }
}

impl AudioSink for CpalSink {
    fn write(&mut self, interleaved: &[i16]) -> Result<()> {
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(interleaved);
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        let queued = self.queue.lock().map(|q| q.len()).unwrap_or(0);
        let playout_ms = u64::try_from(queued).unwrap_or(u64::MAX).saturating_mul(1000)
            / (u64::from(self.sample_rate) * 2);
        let deadline = Instant::now() + Duration::from_millis(playout_ms + 500);

        while self.queue.lock().map(|q| !q.is_empty()).unwrap_or(false) {
            if Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device buffer itself play out
        std::thread::sleep(Duration::from_millis(100));
        Ok(())
    }
}

/// One outstanding streaming synthesis request
///
/// Owns the per-session chunk assembler, resampler, channel assignment, and
/// gain; the network stream and output targets are driven by the player.
pub struct SynthesisSession {
    assembler: ChunkAssembler,
    resampler: LinearResampler,
    channel: StereoChannel,
    gain: f32,
}

/// Frames produced from one network chunk
pub struct SessionOutput {
    /// Interleaved stereo at the playback rate, for the live device
    pub device_frames: Vec<i16>,
    /// Interleaved stereo at native fidelity, for the file sink
    pub file_frames: Vec<i16>,
}

impl SynthesisSession {
    /// Create a session routing to `channel` with the given gain and rates
    #[must_use]
    pub const fn new(channel: StereoChannel, gain: f32, native_rate: u32, playback_rate: u32) -> Self {
        Self {
            assembler: ChunkAssembler::new(),
            resampler: LinearResampler::new(native_rate, playback_rate),
            channel,
            gain,
        }
    }

    /// Process one network chunk: decode, gain, resample, route
    ///
    /// The file frames always carry native-rate samples; only the device
    /// frames are resampled. Routing happens after resampling, per channel,
    /// so interpolation never crosses channels.
    pub fn process_chunk(&mut self, chunk: &[u8]) -> SessionOutput {
        let mut samples = self.assembler.push(chunk);
        apply_gain(&mut samples, self.gain);

        let file_frames = route_stereo(&samples, self.channel);
        let device_frames = if self.resampler.is_identity() {
            file_frames.clone()
        } else {
            route_stereo(&self.resampler.process(&samples), self.channel)
        };

        SessionOutput {
            device_frames,
            file_frames,
        }
    }

    /// Bytes held back waiting for a sample boundary
    #[must_use]
    pub const fn pending_bytes(&self) -> usize {
        self.assembler.pending_len()
    }
}

/// Streaming synthesis player
///
/// `speak` suspends for the full duration of network streaming and
/// playback, then returns the path of the recorded reply.
pub struct SynthesisPlayer {
    client: reqwest::Client,
    api_key: String,
    model: String,
    native_rate: u32,
    playback_rate: u32,
    out_dir: PathBuf,
}

impl SynthesisPlayer {
    /// Create a player writing reply recordings under `out_dir`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is empty.
    pub fn new<P: AsRef<Path>>(api_key: String, model: String, out_dir: P) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for synthesis".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            native_rate: NATIVE_RATE,
            playback_rate: NATIVE_RATE,
            out_dir: out_dir.as_ref().to_path_buf(),
        })
    }

    /// Override the native and playback rates
    #[must_use]
    pub const fn with_rates(mut self, native_rate: u32, playback_rate: u32) -> Self {
        self.native_rate = native_rate;
        self.playback_rate = playback_rate;
        self
    }

    /// Synthesize `text` in the persona's voice and play it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if the output device cannot be opened,
    /// [`Error::Tts`] if the service rejects the request, and
    /// [`Error::Stream`] if the stream fails mid-flight. Partial audio
    /// already played or persisted is not retracted.
    pub async fn speak(&self, text: &str, persona: &Persona, gain: f32) -> Result<PathBuf> {
        let mut sink = CpalSink::open(self.playback_rate)?;
        self.speak_into(text, persona, gain, &mut sink).await
    }

    /// `speak` against a caller-supplied sink (used by tests)
    ///
    /// # Errors
    ///
    /// See [`Self::speak`].
    pub async fn speak_into(
        &self,
        text: &str,
        persona: &Persona,
        gain: f32,
        sink: &mut dyn AudioSink,
    ) -> Result<PathBuf> {
        tracing::info!(
            persona = %persona.name,
            channel = ?persona.channel,
            gain,
            "speaking"
        );

        #[derive(serde::Serialize)]
        struct SpeechRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            instructions: &'a str,
            response_format: &'a str,
        }

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &persona.voice,
            instructions: &persona.style,
            response_format: "pcm",
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis error {status}: {body}")));
        }

        // File sink opens before streaming begins
        let mut writer = StereoWavWriter::create(&self.out_dir, self.native_rate)?;
        let mut session =
            SynthesisSession::new(persona.channel, gain, self.native_rate, self.playback_rate);

        let mut stream = response.bytes_stream();
        let mut failure: Option<Error> = None;

        while let Some(next) = stream.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    failure = Some(Error::Stream(format!("synthesis stream failed: {e}")));
                    break;
                }
            };

            let out = session.process_chunk(&chunk);
            if let Err(e) = sink.write(&out.device_frames) {
                failure = Some(e);
                break;
            }
            if let Err(e) = writer.write_interleaved(&out.file_frames) {
                failure = Some(e);
                break;
            }
        }

        drain_blocking(sink);

        // The file is closed on every exit path; partial output stays
        let path = writer.finalize()?;

        match failure {
            Some(e) => {
                tracing::error!(error = %e, path = %path.display(), "synthesis aborted mid-stream");
                Err(e)
            }
            None => {
                tracing::debug!(path = %path.display(), "reply recorded");
                Ok(path)
            }
        }
    }
}

/// Drain a sink without stalling the async runtime
///
/// Playout of a long reply can hold the drain for tens of seconds, so the
/// wait runs as a blocking section; timers and other tasks on the runtime
/// keep making progress while the device empties its queue.
fn drain_blocking(sink: &mut dyn AudioSink) {
    if let Err(e) = tokio::task::block_in_place(|| sink.drain()) {
        tracing::warn!(error = %e, "output drain failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembler_holds_back_odd_byte() {
        let mut assembler = ChunkAssembler::new();

        // 3, 5, 2 byte chunks: one byte pending after the first,
        // floor(10 / 2) = 5 samples total
        let first = assembler.push(&[1, 0, 2]);
        assert_eq!(first.len(), 1);
        assert_eq!(assembler.pending_len(), 1);

        let second = assembler.push(&[0, 3, 0, 4, 0]);
        assert_eq!(second.len(), 3);
        assert_eq!(assembler.pending_len(), 0);

        let third = assembler.push(&[5, 0]);
        assert_eq!(third.len(), 1);
        assert_eq!(assembler.pending_len(), 0);

        let all: Vec<i16> = [first, second, third].concat();
        assert_eq!(all, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn assembler_decodes_little_endian() {
        let mut assembler = ChunkAssembler::new();
        let samples = assembler.push(&[0xFF, 0x7F, 0x00, 0x80]);
        assert_eq!(samples, vec![32_767, -32_768]);
    }

    #[test]
    fn gain_saturates_instead_of_wrapping() {
        let mut samples = vec![20_000, -20_000];
        apply_gain(&mut samples, 2.0);
        assert_eq!(samples, vec![32_767, -32_768]);
    }

    #[test]
    fn unit_gain_is_a_noop() {
        let mut samples = vec![0, 1, -1, 32_767, -32_768];
        let original = samples.clone();
        apply_gain(&mut samples, 1.0);
        assert_eq!(samples, original);
    }

    #[test]
    fn gain_commutes_with_routing() {
        let mono = vec![100, -200, 300];

        let mut gained = mono.clone();
        apply_gain(&mut gained, 2.0);
        let gain_then_route = route_stereo(&gained, StereoChannel::Left);

        let mut route_then_gain = route_stereo(&mono, StereoChannel::Left);
        apply_gain(&mut route_then_gain, 2.0);

        assert_eq!(gain_then_route, route_then_gain);
    }

    #[test]
    fn session_routes_to_one_channel_only() {
        let mut session = SynthesisSession::new(StereoChannel::Right, 1.0, 24_000, 24_000);

        let out = session.process_chunk(&[100, 0, 200, 0]);
        assert_eq!(out.file_frames, vec![0, 100, 0, 200]);
        assert_eq!(out.device_frames, out.file_frames);
        assert_eq!(out.device_frames.len() % 2, 0);
    }

    #[test]
    fn session_resamples_device_frames_only() {
        // 24kHz native to 12kHz playback: device gets half the frames,
        // the file keeps native fidelity
        let mut session = SynthesisSession::new(StereoChannel::Left, 1.0, 24_000, 12_000);

        let pcm: Vec<u8> = [0_i16, 10, 20, 30]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let out = session.process_chunk(&pcm);

        assert_eq!(out.file_frames, vec![0, 0, 10, 0, 20, 0, 30, 0]);
        assert_eq!(out.device_frames, vec![0, 0, 20, 0]);
    }

    #[test]
    fn session_carries_pending_byte_between_chunks() {
        let mut session = SynthesisSession::new(StereoChannel::Left, 1.0, 24_000, 24_000);

        let out = session.process_chunk(&[42]);
        assert!(out.file_frames.is_empty());
        assert_eq!(session.pending_bytes(), 1);

        let out = session.process_chunk(&[0]);
        assert_eq!(out.file_frames, vec![42, 0]);
        assert_eq!(session.pending_bytes(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn drain_does_not_starve_the_runtime() {
        use std::sync::atomic::{AtomicBool, Ordering};

        struct SlowDrainSink;

        impl AudioSink for SlowDrainSink {
            fn write(&mut self, _interleaved: &[i16]) -> Result<()> {
                Ok(())
            }

            fn drain(&mut self) -> Result<()> {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            }
        }

        // With a single worker, a drain held on the async context would
        // stall this timer until the sink finished.
        let ticked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ticked);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;

        let mut sink = SlowDrainSink;
        drain_blocking(&mut sink);

        assert!(ticked.load(Ordering::SeqCst));
    }

    #[test]
    fn empty_player_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SynthesisPlayer::new(String::new(), "gpt-4o-mini-tts".to_string(), dir.path()),
            Err(Error::Config(_))
        ));
    }
}
