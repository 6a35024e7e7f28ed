//! Voice personas
//!
//! A persona binds a wake phrase to a synthesis voice, delivery style, and
//! an exclusive stereo output channel. The stock pair mirrors the device's
//! two speakers: one voice on the left cone, one on the right.

use serde::Deserialize;

use crate::audio::StereoChannel;

/// Default delivery instructions sent with every synthesis request
pub const DEFAULT_STYLE: &str = "Tone: witty, dry sarcasm, cocky confidence.\n\
    Emotion: amused contempt.\n\
    Delivery: quick pace, short pauses, ends with a smug chuckle.";

/// A named voice identity
#[derive(Debug, Clone, Deserialize)]
pub struct Persona {
    /// Short identifier (e.g. "coral")
    pub name: String,

    /// Wake phrase that selects this persona (e.g. "hey-coral")
    pub wake_phrase: String,

    /// Synthesis voice identifier
    pub voice: String,

    /// Exclusive stereo output channel
    pub channel: StereoChannel,

    /// Style instructions for the synthesis service
    #[serde(default = "default_style")]
    pub style: String,

    /// Prefix prepended to transcripts before response generation, so the
    /// model knows which persona was addressed
    #[serde(default)]
    pub prompt_prefix: String,
}

fn default_style() -> String {
    DEFAULT_STYLE.to_string()
}

impl Persona {
    /// Left-channel female voice
    #[must_use]
    pub fn coral() -> Self {
        Self {
            name: "coral".to_string(),
            wake_phrase: "hey-coral".to_string(),
            voice: "coral".to_string(),
            channel: StereoChannel::Left,
            style: DEFAULT_STYLE.to_string(),
            prompt_prefix: "Hey Coral! ".to_string(),
        }
    }

    /// Right-channel male voice
    #[must_use]
    pub fn ash() -> Self {
        Self {
            name: "ash".to_string(),
            wake_phrase: "hey-ash".to_string(),
            voice: "ash".to_string(),
            channel: StereoChannel::Right,
            style: DEFAULT_STYLE.to_string(),
            prompt_prefix: "Hey Ash! ".to_string(),
        }
    }

    /// Stock persona pair
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![Self::coral(), Self::ash()]
    }
}
