//! Configuration management for the duet voice daemon

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use crate::voice::{keyword_phrase, probe, SegmenterConfig};
use crate::{Error, Persona, Result};

/// Default capture sample rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Default capture channel count
pub const DEFAULT_CHANNELS: u16 = 1;

/// Default gain applied to synthesized audio
pub const DEFAULT_GAIN: f32 = 2.0;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Audio capture configuration
    pub audio: AudioConfig,

    /// Wake word configuration
    pub wake: WakeConfig,

    /// Utterance segmentation configuration
    pub segmenter: SegmenterConfig,

    /// Voice synthesis configuration
    pub synthesis: SynthesisConfig,

    /// Chat and transcription model configuration
    pub llm: LlmConfig,

    /// `OpenAI` API key
    pub openai_api_key: Option<String>,

    /// Persona roster
    pub personas: Vec<Persona>,

    /// Connectivity probe configuration
    pub probe: ProbeConfig,

    /// Directory for captured utterance recordings
    pub capture_dir: PathBuf,
}

/// Audio capture configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Capture channel count
    pub channels: u16,

    /// Frame duration in milliseconds
    pub frame_duration_ms: u32,
}

/// Wake word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Keyword model identifiers, one per persona
    pub keywords: Vec<String>,

    /// Per-keyword sensitivities
    pub sensitivities: Vec<f32>,
}

/// Voice synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// TTS model identifier
    pub model: String,

    /// Gain multiplier for synthesized audio
    pub gain: f32,

    /// Playback device sample rate in Hz
    pub playback_rate: u32,

    /// Directory for reply recordings
    pub out_dir: PathBuf,
}

/// Chat and transcription model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Chat model identifier
    pub model: String,

    /// STT model identifier
    pub stt_model: String,
}

/// Connectivity probe configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Probe target as `host:port`
    pub target: String,

    /// Probe timeout
    pub timeout: Duration,
}

/// Default data directory: `~/.local/share/duet` on Linux
fn data_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map_or_else(|| PathBuf::from("."), |d| d.data_dir().join("duet"))
}

impl Config {
    /// Load configuration (env > toml > default) and validate it
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the merged configuration is inconsistent
    /// and [`Error::Toml`] if the config file exists but is malformed
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file()?;

        let personas = fc.personas.unwrap_or_else(Persona::defaults);

        let audio = AudioConfig {
            sample_rate: fc.audio.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
            channels: fc.audio.channels.unwrap_or(DEFAULT_CHANNELS),
            frame_duration_ms: fc.audio.frame_duration_ms.unwrap_or(30),
        };

        // Stock keywords follow the stock persona pair
        let keywords = fc.wake.keywords.unwrap_or_else(|| {
            personas
                .iter()
                .map(|p| format!("{}_en_raspberry-pi_v3_0_0.ppn", p.wake_phrase))
                .collect()
        });
        let sensitivities = fc
            .wake
            .sensitivities
            .unwrap_or_else(|| vec![0.5; keywords.len()]);
        let wake = WakeConfig {
            keywords,
            sensitivities,
        };

        let segmenter = SegmenterConfig {
            frame_duration_ms: audio.frame_duration_ms,
            padding_duration_ms: fc.segmenter.padding_duration_ms.unwrap_or(300),
            ratio: fc.segmenter.ratio.unwrap_or(0.75),
            sample_rate: audio.sample_rate,
        };

        let synthesis = SynthesisConfig {
            model: std::env::var("DUET_TTS_MODEL")
                .ok()
                .or(fc.synthesis.model)
                .unwrap_or_else(|| "gpt-4o-mini-tts".to_string()),
            gain: fc.synthesis.gain.unwrap_or(DEFAULT_GAIN),
            playback_rate: fc
                .synthesis
                .playback_rate
                .unwrap_or(crate::voice::NATIVE_RATE),
            out_dir: std::env::var("DUET_OUT_DIR").map_or_else(
                |_| {
                    fc.synthesis
                        .out_dir
                        .map_or_else(|| data_dir().join("replies"), PathBuf::from)
                },
                PathBuf::from,
            ),
        };

        let llm = LlmConfig {
            model: std::env::var("DUET_LLM_MODEL")
                .ok()
                .or(fc.llm.model)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            stt_model: std::env::var("DUET_STT_MODEL")
                .ok()
                .or(fc.llm.stt_model)
                .unwrap_or_else(|| "whisper-1".to_string()),
        };

        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().or(fc.api_keys.openai);

        let config = Self {
            audio,
            wake,
            segmenter,
            synthesis,
            llm,
            openai_api_key,
            personas,
            probe: ProbeConfig {
                target: probe::DEFAULT_TARGET.to_string(),
                timeout: probe::DEFAULT_TIMEOUT,
            },
            capture_dir: data_dir().join("captures"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field consistency
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] on empty keyword lists, count mismatches,
    /// out-of-range segmenter parameters, or keywords whose derived phrase
    /// matches no persona.
    pub fn validate(&self) -> Result<()> {
        if self.personas.is_empty() {
            return Err(Error::Config("at least one persona required".to_string()));
        }

        if self.wake.keywords.is_empty() {
            return Err(Error::Config(
                "at least one wake keyword required".to_string(),
            ));
        }
        if self.wake.sensitivities.len() != self.wake.keywords.len() {
            return Err(Error::Config(format!(
                "number of sensitivities ({}) must match number of keywords ({})",
                self.wake.sensitivities.len(),
                self.wake.keywords.len()
            )));
        }

        for keyword in &self.wake.keywords {
            let phrase = keyword_phrase(keyword);
            if self.persona_for_phrase(&phrase).is_none() {
                return Err(Error::Config(format!(
                    "wake keyword '{keyword}' (phrase '{phrase}') matches no persona"
                )));
            }
        }

        self.segmenter.validate()
    }

    /// Persona whose wake phrase equals `phrase`
    #[must_use]
    pub fn persona_for_phrase(&self, phrase: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.wake_phrase == phrase)
    }
}
