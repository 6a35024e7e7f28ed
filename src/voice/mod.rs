//! Voice processing module
//!
//! Handles audio capture, wake word gating, utterance segmentation,
//! transcription, and streaming synthesis playback.

pub mod probe;

mod segment;
mod stt;
mod synth;
mod wake;

pub use segment::{
    EnergyClassifier, PaddingWindow, SegmentEvent, SegmenterConfig, SegmenterState, Utterance,
    UtteranceSegmenter, VoiceClassifier, collect_utterance,
};
pub use stt::SpeechToText;
pub use synth::{
    AudioSink, ChunkAssembler, CpalSink, NATIVE_RATE, SessionOutput, SynthesisPlayer,
    SynthesisSession, apply_gain,
};
pub use wake::{EnergySpotter, KeywordSpotter, WakeWordGate, WakeWordMatch, keyword_phrase};
