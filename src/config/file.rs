//! TOML configuration file loading
//!
//! Supports `~/.config/duet/config.toml` as a persistent config source.
//! All fields are optional — the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Persona, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DuetConfigFile {
    /// Audio capture configuration
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Wake word configuration
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Utterance segmentation configuration
    #[serde(default)]
    pub segmenter: SegmenterFileConfig,

    /// Voice synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// LLM configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Persona roster; replaces the stock pair when present
    #[serde(default)]
    pub personas: Option<Vec<Persona>>,
}

/// Audio capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Capture sample rate in Hz (e.g. 16000)
    pub sample_rate: Option<u32>,

    /// Capture channel count
    pub channels: Option<u16>,

    /// Frame duration in milliseconds
    pub frame_duration_ms: Option<u32>,
}

/// Wake word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Keyword model identifiers, one per persona
    pub keywords: Option<Vec<String>>,

    /// Per-keyword sensitivities (0.0 to 1.0)
    pub sensitivities: Option<Vec<f32>>,
}

/// Utterance segmentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct SegmenterFileConfig {
    /// Hysteresis padding window in milliseconds
    pub padding_duration_ms: Option<u32>,

    /// Window fill ratio that flips the segmenter state
    pub ratio: Option<f64>,
}

/// Voice synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// TTS model (e.g. "gpt-4o-mini-tts")
    pub model: Option<String>,

    /// Gain multiplier applied to synthesized audio
    pub gain: Option<f32>,

    /// Playback device sample rate in Hz
    pub playback_rate: Option<u32>,

    /// Directory for reply recordings
    pub out_dir: Option<String>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Chat model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// A missing file yields the default (empty) overlay; a file that exists
/// but cannot be read or parsed is an error, so typos never degrade
/// silently into stock settings.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the file cannot be read and
/// [`crate::Error::Toml`] if it is not valid TOML.
pub fn load_config_file() -> Result<DuetConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(DuetConfigFile::default());
    };

    if !path.exists() {
        return Ok(DuetConfigFile::default());
    }

    read_config_file(&path)
}

/// Read and parse one TOML config file
///
/// # Errors
///
/// See [`load_config_file`].
pub fn read_config_file(path: &Path) -> Result<DuetConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/duet/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("duet").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses_with_defaults() {
        let fc: DuetConfigFile = toml::from_str(
            r#"
            [wake]
            keywords = ["hey-coral_en_raspberry-pi_v3_0_0.ppn"]
            sensitivities = [0.5]

            [synthesis]
            gain = 1.5
            "#,
        )
        .unwrap();

        assert_eq!(fc.wake.keywords.unwrap().len(), 1);
        assert_eq!(fc.synthesis.gain, Some(1.5));
        assert!(fc.audio.sample_rate.is_none());
        assert!(fc.personas.is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[wake\nkeywords = oops").unwrap();

        assert!(matches!(
            read_config_file(&path),
            Err(crate::Error::Toml(_))
        ));
    }

    #[test]
    fn valid_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[synthesis]\ngain = 1.25\n").unwrap();

        let fc = read_config_file(&path).unwrap();
        assert_eq!(fc.synthesis.gain, Some(1.25));
    }
}
