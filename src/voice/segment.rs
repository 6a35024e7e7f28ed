//! Utterance segmentation
//!
//! A padding-window hysteresis state machine over per-frame voice
//! classifications. While idle it buffers recent frames; once the voiced
//! fraction of the window crosses the ratio threshold it replays the whole
//! window (recovering audio from before the detected onset) and streams
//! frames until the unvoiced fraction crosses the same threshold, at which
//! point it emits an end sentinel. One segmenter lives per capture session;
//! nothing carries across sessions.

use std::collections::VecDeque;

use chrono::{DateTime, Local};

use crate::audio::{AudioFrame, FrameSource, downmix_to_mono, rms};
use crate::{Error, Result};

/// Segmenter parameters
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Duration of one frame in milliseconds
    pub frame_duration_ms: u32,

    /// Trailing window used to evaluate state transitions, in milliseconds
    pub padding_duration_ms: u32,

    /// Voiced/unvoiced fraction that fires a transition (0 < ratio <= 1)
    pub ratio: f64,

    /// Capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            frame_duration_ms: 30,
            padding_duration_ms: 300,
            ratio: 0.75,
            sample_rate: 16_000,
        }
    }
}

impl SegmenterConfig {
    /// Frames held by the padding window
    #[must_use]
    pub const fn window_capacity(&self) -> usize {
        (self.padding_duration_ms / self.frame_duration_ms) as usize
    }

    /// Validate parameter ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a ratio outside (0, 1] or a padding
    /// window shorter than one frame.
    pub fn validate(&self) -> Result<()> {
        if self.ratio <= 0.0 || self.ratio > 1.0 {
            return Err(Error::Config(format!(
                "ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        if self.frame_duration_ms == 0 || self.window_capacity() == 0 {
            return Err(Error::Config(format!(
                "padding window must hold at least one frame ({}ms window, {}ms frames)",
                self.padding_duration_ms, self.frame_duration_ms
            )));
        }
        Ok(())
    }
}

/// External per-frame voice/non-voice classifier
pub trait VoiceClassifier {
    /// Classify one mono 16-bit PCM frame
    ///
    /// # Errors
    ///
    /// Returns error if the classifier fails
    fn is_voiced(&mut self, mono: &[i16], sample_rate: u32) -> Result<bool>;
}

/// Built-in RMS-energy voice classifier
#[derive(Debug)]
pub struct EnergyClassifier {
    threshold: f64,
}

impl EnergyClassifier {
    /// Default RMS threshold in 16-bit sample units
    pub const DEFAULT_THRESHOLD: f64 = 500.0;

    /// Create a classifier with the given RMS threshold
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_THRESHOLD)
    }
}

impl VoiceClassifier for EnergyClassifier {
    fn is_voiced(&mut self, mono: &[i16], _sample_rate: u32) -> Result<bool> {
        Ok(rms(mono) > self.threshold)
    }
}

/// Fixed-capacity FIFO of recent frames and their classifications
#[derive(Debug)]
pub struct PaddingWindow {
    frames: VecDeque<(Vec<i16>, bool)>,
    capacity: usize,
}

impl PaddingWindow {
    /// Create a window holding up to `capacity` frames
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a classified frame, evicting the oldest on overflow
    pub fn push(&mut self, mono: Vec<i16>, voiced: bool) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back((mono, voiced));
    }

    /// Frames currently classified as voiced
    #[must_use]
    pub fn voiced_count(&self) -> usize {
        self.frames.iter().filter(|(_, voiced)| *voiced).count()
    }

    /// Frames currently classified as unvoiced
    #[must_use]
    pub fn unvoiced_count(&self) -> usize {
        self.frames.len() - self.voiced_count()
    }

    /// Frames currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the window is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Nominal capacity
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drain all buffered frames in chronological order
    pub fn drain(&mut self) -> Vec<Vec<i16>> {
        self.frames.drain(..).map(|(frame, _)| frame).collect()
    }
}

/// Observable segmenter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Buffering, waiting for speech onset
    Idle,
    /// Streaming an utterance
    Triggered,
}

/// Tagged state with the padding window as state-local data
#[derive(Debug)]
enum State {
    Idle { window: PaddingWindow },
    Triggered { window: PaddingWindow },
}

/// One event produced by the segmenter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentEvent {
    /// One mono frame belonging to the current utterance
    Frame(Vec<i16>),
    /// Sentinel marking utterance end
    UtteranceEnd,
}

/// Hysteresis segmenter over classified frames
pub struct UtteranceSegmenter<C> {
    config: SegmenterConfig,
    classifier: C,
    channels: u16,
    state: State,
}

impl<C: VoiceClassifier> UtteranceSegmenter<C> {
    /// Create a segmenter for a source with the given channel count
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid parameters.
    pub fn new(config: SegmenterConfig, channels: u16, classifier: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            state: State::Idle {
                window: PaddingWindow::new(config.window_capacity()),
            },
            config,
            classifier,
            channels,
        })
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        match self.state {
            State::Idle { .. } => SegmenterState::Idle,
            State::Triggered { .. } => SegmenterState::Triggered,
        }
    }

    /// Threshold a voiced/unvoiced count must exceed to fire a transition
    ///
    /// Evaluated against the fixed window capacity, so a partially filled
    /// window cannot fire early.
    #[allow(clippy::cast_precision_loss)]
    fn transition_threshold(&self) -> f64 {
        self.config.ratio * self.config.window_capacity() as f64
    }

    /// Feed one frame (interleaved at the source's channel count), returning
    /// the events it produced
    ///
    /// # Errors
    ///
    /// Propagates classifier errors.
    #[allow(clippy::cast_precision_loss)]
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Result<Vec<SegmentEvent>> {
        let mono = downmix_to_mono(frame.samples(), self.channels);
        let voiced = self
            .classifier
            .is_voiced(&mono, self.config.sample_rate)?;

        let mut events = Vec::new();
        let capacity = self.config.window_capacity();
        let threshold = self.transition_threshold();

        match &mut self.state {
            State::Idle { window } => {
                window.push(mono, voiced);
                if window.voiced_count() as f64 > threshold {
                    // Replay the window so audio preceding the detected
                    // onset is not lost
                    events.extend(window.drain().into_iter().map(SegmentEvent::Frame));
                    tracing::debug!(frames = events.len(), "utterance started");
                    self.state = State::Triggered {
                        window: PaddingWindow::new(capacity),
                    };
                }
            }
            State::Triggered { window } => {
                events.push(SegmentEvent::Frame(mono.clone()));
                window.push(mono, voiced);
                if window.unvoiced_count() as f64 > threshold {
                    tracing::debug!("utterance ended");
                    events.push(SegmentEvent::UtteranceEnd);
                    self.state = State::Idle {
                        window: PaddingWindow::new(capacity),
                    };
                }
            }
        }

        Ok(events)
    }

    /// Signal end-of-stream
    ///
    /// A segmenter that is mid-utterance still emits exactly one end
    /// sentinel, so callers never block waiting for utterance end.
    pub fn finish(&mut self) -> Vec<SegmentEvent> {
        let capacity = self.config.window_capacity();
        match self.state {
            State::Idle { .. } => Vec::new(),
            State::Triggered { .. } => {
                self.state = State::Idle {
                    window: PaddingWindow::new(capacity),
                };
                vec![SegmentEvent::UtteranceEnd]
            }
        }
    }
}

/// One bounded span of captured speech
#[derive(Debug, Clone)]
pub struct Utterance {
    /// Mono PCM samples from detected onset to detected offset
    pub samples: Vec<i16>,

    /// When the segmenter triggered
    pub triggered_at: DateTime<Local>,
}

/// Drive a source through a segmenter until one utterance completes
///
/// Returns `Ok(None)` if the source ends before any speech is detected.
///
/// # Errors
///
/// Propagates source and classifier errors.
pub fn collect_utterance<C: VoiceClassifier>(
    source: &mut dyn FrameSource,
    segmenter: &mut UtteranceSegmenter<C>,
) -> Result<Option<Utterance>> {
    let mut samples: Vec<i16> = Vec::new();
    let mut triggered_at: Option<DateTime<Local>> = None;

    loop {
        let events = match source.next_frame()? {
            Some(frame) => segmenter.push_frame(&frame)?,
            None => {
                let events = segmenter.finish();
                if events.is_empty() {
                    return Ok(None);
                }
                events
            }
        };

        for event in events {
            match event {
                SegmentEvent::Frame(frame) => {
                    if triggered_at.is_none() {
                        triggered_at = Some(Local::now());
                    }
                    samples.extend(frame);
                }
                SegmentEvent::UtteranceEnd => {
                    return Ok(Some(Utterance {
                        samples,
                        triggered_at: triggered_at.unwrap_or_else(Local::now),
                    }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Classifier scripted by a fixed voiced/unvoiced sequence
    struct Scripted {
        decisions: Vec<bool>,
        next: usize,
    }

    impl Scripted {
        fn new(decisions: Vec<bool>) -> Self {
            Self { decisions, next: 0 }
        }
    }

    impl VoiceClassifier for Scripted {
        fn is_voiced(&mut self, _mono: &[i16], _rate: u32) -> Result<bool> {
            let voiced = self.decisions.get(self.next).copied().unwrap_or(false);
            self.next += 1;
            Ok(voiced)
        }
    }

    fn config() -> SegmenterConfig {
        SegmenterConfig::default()
    }

    fn frame(value: i16, len: usize) -> AudioFrame {
        AudioFrame::new(vec![value; len])
    }

    #[test]
    fn config_validation() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.ratio = 0.0;
        assert!(bad.validate().is_err());

        bad = config();
        bad.ratio = 1.5;
        assert!(bad.validate().is_err());

        bad = config();
        bad.padding_duration_ms = 10;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn trigger_fires_on_eighth_voiced_frame() {
        // 30ms frames, 300ms window (10 frames), ratio 0.75: the count must
        // exceed 7.5, so the 8th voiced frame fires the transition.
        let mut seg =
            UtteranceSegmenter::new(config(), 1, Scripted::new(vec![true; 20])).unwrap();

        for i in 0..7 {
            let events = seg.push_frame(&frame(i, 480)).unwrap();
            assert!(events.is_empty(), "fired early at frame {i}");
            assert_eq!(seg.state(), SegmenterState::Idle);
        }

        let events = seg.push_frame(&frame(7, 480)).unwrap();
        assert_eq!(seg.state(), SegmenterState::Triggered);
        assert_eq!(events.len(), 8);

        // Replay preserves chronological order
        for (i, event) in events.iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let expected = frame(i as i16, 480).into_samples();
            assert_eq!(*event, SegmentEvent::Frame(expected));
        }
    }

    #[test]
    fn triggered_frames_stream_one_by_one() {
        let mut decisions = vec![true; 8];
        decisions.extend([true, true]);
        let mut seg = UtteranceSegmenter::new(config(), 1, Scripted::new(decisions)).unwrap();

        for i in 0..8 {
            let _ = seg.push_frame(&frame(i, 480)).unwrap();
        }
        assert_eq!(seg.state(), SegmenterState::Triggered);

        let events = seg.push_frame(&frame(100, 480)).unwrap();
        assert_eq!(events, vec![SegmentEvent::Frame(vec![100; 480])]);
    }

    #[test]
    fn unvoiced_run_ends_utterance_with_sentinel() {
        let mut decisions = vec![true; 8];
        decisions.extend(vec![false; 8]);
        let mut seg = UtteranceSegmenter::new(config(), 1, Scripted::new(decisions)).unwrap();

        for i in 0..8 {
            let _ = seg.push_frame(&frame(i, 480)).unwrap();
        }

        // 7 unvoiced frames: still triggered (7 <= 7.5)
        for i in 0..7 {
            let events = seg.push_frame(&frame(50 + i, 480)).unwrap();
            assert_eq!(events.len(), 1);
            assert_eq!(seg.state(), SegmenterState::Triggered);
        }

        // 8th unvoiced frame ends the utterance
        let events = seg.push_frame(&frame(60, 480)).unwrap();
        assert_eq!(seg.state(), SegmenterState::Idle);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SegmentEvent::UtteranceEnd);
    }

    #[test]
    fn finish_while_triggered_emits_exactly_one_sentinel() {
        let mut seg =
            UtteranceSegmenter::new(config(), 1, Scripted::new(vec![true; 10])).unwrap();
        for i in 0..8 {
            let _ = seg.push_frame(&frame(i, 480)).unwrap();
        }
        assert_eq!(seg.state(), SegmenterState::Triggered);

        assert_eq!(seg.finish(), vec![SegmentEvent::UtteranceEnd]);
        // Idempotent once idle
        assert!(seg.finish().is_empty());
    }

    #[test]
    fn finish_while_idle_emits_nothing() {
        let mut seg =
            UtteranceSegmenter::new(config(), 1, Scripted::new(vec![false; 10])).unwrap();
        for i in 0..5 {
            let _ = seg.push_frame(&frame(i, 480)).unwrap();
        }
        assert!(seg.finish().is_empty());
    }

    #[test]
    fn stereo_frames_are_downmixed_before_classification() {
        let mut seg =
            UtteranceSegmenter::new(config(), 2, Scripted::new(vec![true; 10])).unwrap();

        // 960 interleaved samples -> 480 mono samples
        for _ in 0..8 {
            let _ = seg.push_frame(&frame(100, 960)).unwrap();
        }
        assert_eq!(seg.state(), SegmenterState::Triggered);

        let events = seg.push_frame(&frame(100, 960)).unwrap();
        let SegmentEvent::Frame(mono) = &events[0] else {
            panic!("expected frame event");
        };
        assert_eq!(mono.len(), 480);
        // L+R summed
        assert_eq!(mono[0], 200);
    }

    #[test]
    fn energy_classifier_threshold() {
        let mut classifier = EnergyClassifier::default();
        assert!(!classifier.is_voiced(&[0; 480], 16_000).unwrap());
        assert!(classifier.is_voiced(&[2000; 480], 16_000).unwrap());
    }
}
