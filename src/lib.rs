//! Duet - two-voice wake word assistant
//!
//! This library provides the core functionality for the duet daemon:
//! - Frame-based audio capture from the default microphone
//! - Wake word gating and padding-window utterance segmentation
//! - Whisper transcription and chat reply generation
//! - Streaming speech synthesis with live stereo playback and WAV capture
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     Daemon                          │
//! │   wake gate → probe → segmenter → STT → chat → TTS  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Audio                            │
//! │   frames  │  downmix/route  │  resample  │  WAV     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Each persona owns a wake phrase, a synthesis voice, and an exclusive
//! stereo channel; the stock pair puts one voice on each speaker cone.

pub mod audio;
pub mod chat;
pub mod config;
pub mod daemon;
pub mod error;
pub mod persona;
pub mod voice;

pub use audio::{AudioFrame, FrameSource, StereoChannel};
pub use chat::ChatClient;
pub use config::Config;
pub use daemon::{Daemon, DeviceCues, NullCues, SpotterFactory};
pub use error::{Error, Result};
pub use persona::Persona;
pub use voice::{
    AudioSink, SegmenterConfig, SpeechToText, SynthesisPlayer, Utterance, UtteranceSegmenter,
    WakeWordGate, WakeWordMatch,
};
