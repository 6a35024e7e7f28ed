//! Daemon orchestration
//!
//! Runs the interaction loop: block on a wake word, capture the utterance
//! behind a hysteresis segmenter, transcribe it, generate the persona's
//! reply, and speak it through the stereo output. One session runs at a
//! time; a failed session is logged and retried after a fixed backoff,
//! while configuration errors abort the daemon.

use std::time::Duration;

use crate::audio::{FrameSource, MicFrameSource, mono_wav_bytes, write_mono_wav};
use crate::chat::ChatClient;
use crate::config::Config;
use crate::voice::{
    EnergyClassifier, EnergySpotter, KeywordSpotter, SpeechToText, SynthesisPlayer, Utterance,
    UtteranceSegmenter, WakeWordGate, WakeWordMatch, collect_utterance, probe,
};
use crate::{Error, Result};

/// Pause between failed sessions before listening resumes
const SESSION_BACKOFF: Duration = Duration::from_secs(1);

/// Builds a keyword-spotting engine for a given mono frame length
///
/// Invoked once per gate session, after the microphone reports its frame
/// geometry; the engine lives and dies with that session.
pub type SpotterFactory = Box<dyn Fn(usize) -> Box<dyn KeywordSpotter>>;

/// Default factory: an energy spotter with its threshold derived from the
/// first configured keyword sensitivity
fn energy_spotter_factory(sensitivity: f32) -> SpotterFactory {
    Box::new(move |frame_length| {
        Box::new(EnergySpotter::new(
            frame_length,
            EnergySpotter::threshold_for(sensitivity),
            EnergySpotter::DEFAULT_REQUIRED_FRAMES,
        ))
    })
}

/// Observable cues surfaced at session milestones
///
/// Hardware frontends (LEDs, chimes) implement this; every method defaults
/// to a no-op so headless deployments implement nothing.
pub trait DeviceCues {
    /// A wake word fired; capture is about to begin
    fn on_capture_start(&mut self, _matched: &WakeWordMatch) {}

    /// The utterance ended and its audio is in hand
    fn on_capture_end(&mut self) {}

    /// The reply is about to play
    fn on_synthesis_start(&mut self) {}

    /// The session finished, successfully or not
    fn on_session_end(&mut self) {}
}

/// Cues implementation that does nothing
pub struct NullCues;

impl DeviceCues for NullCues {}

/// The duet daemon - orchestrates wake, capture, and reply
pub struct Daemon {
    config: Config,
    stt: SpeechToText,
    chat: ChatClient,
    player: SynthesisPlayer,
    cues: Box<dyn DeviceCues>,
    spotter_factory: SpotterFactory,
}

impl Daemon {
    /// Create a daemon with no device cues
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing
    pub fn new(config: Config) -> Result<Self> {
        Self::with_cues(config, Box::new(NullCues))
    }

    /// Create a daemon with a cues frontend
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the API key is missing
    pub fn with_cues(config: Config, cues: Box<dyn DeviceCues>) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY required".to_string()))?;

        let stt = SpeechToText::new(api_key.clone(), config.llm.stt_model.clone())?;
        let chat = ChatClient::new(api_key.clone(), config.llm.model.clone())?;
        let player =
            SynthesisPlayer::new(api_key, config.synthesis.model.clone(), &config.synthesis.out_dir)?
                .with_rates(crate::voice::NATIVE_RATE, config.synthesis.playback_rate);

        let sensitivity = config.wake.sensitivities.first().copied().unwrap_or(0.5);

        Ok(Self {
            config,
            stt,
            chat,
            player,
            cues,
            spotter_factory: energy_spotter_factory(sensitivity),
        })
    }

    /// Replace the keyword-spotting engine
    ///
    /// The stock energy spotter distinguishes sound from silence, not one
    /// keyword from another, so it always reports keyword 0. A real
    /// multi-keyword engine plugs in here.
    #[must_use]
    pub fn with_spotter(mut self, factory: SpotterFactory) -> Self {
        self.spotter_factory = factory;
        self
    }

    /// Run sessions forever
    ///
    /// # Errors
    ///
    /// Returns only unrecoverable (configuration) errors; session failures
    /// are logged and followed by a backoff.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self) -> Result<()> {
        tracing::info!(
            personas = self.config.personas.len(),
            "daemon running"
        );

        loop {
            match self.run_session().await {
                Ok(()) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::error!(error = %e, "session failed");
                    self.cues.on_session_end();
                    tokio::time::sleep(SESSION_BACKOFF).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One interaction: wake, capture, transcribe, reply, speak
    #[allow(clippy::future_not_send)]
    async fn run_session(&mut self) -> Result<()> {
        let matched = self.wait_for_wake()?;
        self.cues.on_capture_start(&matched);

        let persona = self
            .config
            .persona_for_phrase(&matched.phrase)
            .cloned()
            .ok_or_else(|| {
                Error::WakeWord(format!("no persona for wake phrase '{}'", matched.phrase))
            })?;

        // Cheap reachability check before committing to a network round trip
        if !probe::is_reachable(&self.config.probe.target, self.config.probe.timeout).await {
            tracing::warn!(
                persona = %persona.name,
                "network unreachable, skipping this interaction"
            );
            self.cues.on_session_end();
            return Ok(());
        }

        let Some(utterance) = self.capture_utterance()? else {
            tracing::info!("capture ended without an utterance");
            self.cues.on_session_end();
            return Ok(());
        };
        self.cues.on_capture_end();

        let capture_path = self.persist_capture(&utterance)?;
        tracing::debug!(path = %capture_path.display(), "utterance recorded");

        let wav = mono_wav_bytes(&utterance.samples, self.config.audio.sample_rate)?;
        let transcript = self.stt.transcribe(&wav).await?;
        if transcript.trim().is_empty() {
            tracing::info!("empty transcript, skipping reply");
            self.cues.on_session_end();
            return Ok(());
        }

        let reply = self.chat.respond(&transcript, &persona).await?;

        self.cues.on_synthesis_start();
        self.player
            .speak(&reply, &persona, self.config.synthesis.gain)
            .await?;

        self.cues.on_session_end();
        Ok(())
    }

    /// Block until a wake word fires
    ///
    /// The microphone and spotting engine live only for this call; both are
    /// released on every exit path when the scope ends.
    fn wait_for_wake(&self) -> Result<WakeWordMatch> {
        let gate = WakeWordGate::new(&self.config.wake.keywords, &self.config.wake.sensitivities)?;
        let audio = self.config.audio;
        let factory = &self.spotter_factory;

        tokio::task::block_in_place(move || {
            let mut source =
                MicFrameSource::open(audio.sample_rate, audio.channels, audio.frame_duration_ms)?;
            let mono_frame_len = source.frame_len() / usize::from(source.channels());
            let mut spotter = factory(mono_frame_len);

            tracing::info!(phrases = ?gate.phrases(), "listening for wake word");
            gate.wait_for_wakeword(&mut source, spotter.as_mut())
        })
    }

    /// Capture one utterance from the microphone
    fn capture_utterance(&self) -> Result<Option<Utterance>> {
        let audio = self.config.audio;
        let segmenter_config = self.config.segmenter;

        tokio::task::block_in_place(move || {
            let mut source =
                MicFrameSource::open(audio.sample_rate, audio.channels, audio.frame_duration_ms)?;
            let mut segmenter = UtteranceSegmenter::new(
                segmenter_config,
                audio.channels,
                EnergyClassifier::default(),
            )?;

            tracing::info!("capturing utterance");
            collect_utterance(&mut source, &mut segmenter)
        })
    }

    /// Write the captured utterance to a timestamped mono WAV
    fn persist_capture(&self, utterance: &Utterance) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(&self.config.capture_dir)?;

        let stamp = utterance.triggered_at.format("%Y%m%d-%H%M%S");
        let path = self.config.capture_dir.join(format!("{stamp}.wav"));
        write_mono_wav(&path, &utterance.samples, self.config.audio.sample_rate)?;
        Ok(path)
    }
}
