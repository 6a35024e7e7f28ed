//! Wake word gate
//!
//! Consumes frames indefinitely, forwarding each to a keyword-spotting
//! engine, and resolves once a configured keyword fires. The gate holds no
//! state across invocations beyond its keyword table; device and engine
//! handles are owned by the caller-supplied source and spotter, so dropping
//! them releases the hardware on every exit path.

use crate::audio::{FrameSource, downmix_to_mono, rms};
use crate::{Error, Result};

/// Result of a single gate resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeWordMatch {
    /// Index into the configured keyword list
    pub index: usize,
    /// Human-readable phrase for the matched keyword
    pub phrase: String,
}

/// External keyword-spotting engine
///
/// Accepts mono frames of a fixed length and reports a keyword index when
/// one fires.
pub trait KeywordSpotter {
    /// Mono samples per frame the engine expects
    fn frame_length(&self) -> usize;

    /// Feed one mono frame; `Some(index)` on a match
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>>;
}

/// Derive a human-readable phrase from a keyword model identifier
///
/// Model files carry a locale/platform/version suffix, e.g.
/// `hey-coral_en_raspberry-pi_v3_0_0.ppn`. The phrase is whatever precedes
/// that six-part suffix; identifiers without one collapse to their first
/// `_`-separated segment.
#[must_use]
pub fn keyword_phrase(identifier: &str) -> String {
    let stem = identifier
        .rsplit('/')
        .next()
        .unwrap_or(identifier)
        .trim_end_matches(".ppn");

    let parts: Vec<&str> = stem.split('_').collect();
    if parts.len() > 6 {
        parts[..parts.len() - 6].join(" ")
    } else {
        parts[0].to_string()
    }
}

/// Gate that blocks until one of the configured keywords fires
#[derive(Debug)]
pub struct WakeWordGate {
    phrases: Vec<String>,
    sensitivities: Vec<f32>,
}

impl WakeWordGate {
    /// Build a gate over a keyword list
    ///
    /// Phrases are precomputed once from the identifiers. Sensitivity count
    /// must equal keyword count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the lists are empty or their lengths
    /// differ.
    pub fn new(keywords: &[String], sensitivities: &[f32]) -> Result<Self> {
        if keywords.is_empty() {
            return Err(Error::Config("at least one wake keyword required".to_string()));
        }
        if sensitivities.len() != keywords.len() {
            return Err(Error::Config(format!(
                "number of sensitivities ({}) must match number of keywords ({})",
                sensitivities.len(),
                keywords.len()
            )));
        }

        Ok(Self {
            phrases: keywords.iter().map(|k| keyword_phrase(k)).collect(),
            sensitivities: sensitivities.to_vec(),
        })
    }

    /// Precomputed keyword phrases, in configuration order
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Per-keyword match sensitivities
    #[must_use]
    pub fn sensitivities(&self) -> &[f32] {
        &self.sensitivities
    }

    /// Block until a keyword fires, then resolve with its match
    ///
    /// Loops forever: read one frame, downmix to mono, submit to the
    /// spotting engine. Frame length must equal the engine's expected
    /// length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WakeWord`] if the source ends before a keyword
    /// fires or the engine reports an out-of-range index, and propagates
    /// device and engine errors.
    pub fn wait_for_wakeword(
        &self,
        source: &mut dyn FrameSource,
        spotter: &mut dyn KeywordSpotter,
    ) -> Result<WakeWordMatch> {
        let channels = source.channels();

        loop {
            let Some(frame) = source.next_frame()? else {
                return Err(Error::WakeWord(
                    "audio source ended before a keyword fired".to_string(),
                ));
            };

            let mono = downmix_to_mono(frame.samples(), channels);
            if mono.len() != spotter.frame_length() {
                return Err(Error::Config(format!(
                    "frame length {} does not match engine frame length {}",
                    mono.len(),
                    spotter.frame_length()
                )));
            }

            if let Some(index) = spotter.process(&mono)? {
                let phrase = self.phrases.get(index).cloned().ok_or_else(|| {
                    Error::WakeWord(format!("engine reported unknown keyword index {index}"))
                })?;
                tracing::info!(index, phrase = %phrase, "wake word detected");
                return Ok(WakeWordMatch { index, phrase });
            }
        }
    }
}

/// Built-in energy-threshold spotter
///
/// Stands in for a neural keyword engine when none is wired: fires keyword 0
/// after a run of consecutive frames whose RMS exceeds the threshold.
#[derive(Debug)]
pub struct EnergySpotter {
    frame_length: usize,
    threshold: f64,
    required_frames: u32,
    hot_frames: u32,
}

impl EnergySpotter {
    /// Default RMS threshold in 16-bit sample units
    pub const DEFAULT_THRESHOLD: f64 = 500.0;

    /// Consecutive hot frames required to fire
    pub const DEFAULT_REQUIRED_FRAMES: u32 = 5;

    /// Map a 0.0–1.0 keyword sensitivity onto an RMS threshold
    ///
    /// Higher sensitivity lowers the bar; 0.5 lands on
    /// [`Self::DEFAULT_THRESHOLD`]. Out-of-range sensitivities are clamped.
    #[must_use]
    pub fn threshold_for(sensitivity: f32) -> f64 {
        Self::DEFAULT_THRESHOLD * 2.0 * f64::from(1.0 - sensitivity.clamp(0.0, 1.0))
    }

    /// Create a spotter for mono frames of `frame_length` samples
    #[must_use]
    pub const fn new(frame_length: usize, threshold: f64, required_frames: u32) -> Self {
        Self {
            frame_length,
            threshold,
            required_frames,
            hot_frames: 0,
        }
    }
}

impl KeywordSpotter for EnergySpotter {
    fn frame_length(&self) -> usize {
        self.frame_length
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        if rms(frame) > self.threshold {
            self.hot_frames += 1;
        } else {
            self.hot_frames = 0;
        }

        if self.hot_frames >= self.required_frames {
            self.hot_frames = 0;
            return Ok(Some(0));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioFrame;

    struct ScriptedSource {
        frames: Vec<Vec<i16>>,
        frame_len: usize,
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
            if self.frames.is_empty() {
                Ok(None)
            } else {
                Ok(Some(AudioFrame::new(self.frames.remove(0))))
            }
        }

        fn sample_rate(&self) -> u32 {
            16_000
        }

        fn channels(&self) -> u16 {
            1
        }

        fn frame_len(&self) -> usize {
            self.frame_len
        }
    }

    struct ScriptedSpotter {
        fire_on: usize,
        seen: usize,
        frame_length: usize,
    }

    impl KeywordSpotter for ScriptedSpotter {
        fn frame_length(&self) -> usize {
            self.frame_length
        }

        fn process(&mut self, _frame: &[i16]) -> Result<Option<usize>> {
            self.seen += 1;
            if self.seen > self.fire_on {
                Ok(Some(1))
            } else {
                Ok(None)
            }
        }
    }

    #[test]
    fn phrase_strips_model_suffix() {
        assert_eq!(
            keyword_phrase("hey-coral_en_raspberry-pi_v3_0_0.ppn"),
            "hey-coral"
        );
        assert_eq!(
            keyword_phrase("models/knight-rider_en_raspberry-pi_v3_0_0.ppn"),
            "knight-rider"
        );
        assert_eq!(keyword_phrase("porcupine"), "porcupine");
        assert_eq!(
            keyword_phrase("ok_duet_extra_en_linux_v3_0_0.ppn"),
            "ok duet"
        );
    }

    #[test]
    fn mismatched_sensitivities_fail_construction() {
        let keywords = vec!["hey-coral.ppn".to_string(), "hey-ash.ppn".to_string()];
        assert!(matches!(
            WakeWordGate::new(&keywords, &[0.5]),
            Err(Error::Config(_))
        ));
        assert!(matches!(WakeWordGate::new(&[], &[]), Err(Error::Config(_))));
        assert!(WakeWordGate::new(&keywords, &[0.5, 0.6]).is_ok());
    }

    #[test]
    fn gate_resolves_on_engine_match() {
        let keywords = vec![
            "hey-coral_en_raspberry-pi_v3_0_0.ppn".to_string(),
            "hey-ash_en_raspberry-pi_v3_0_0.ppn".to_string(),
        ];
        let gate = WakeWordGate::new(&keywords, &[0.5, 0.5]).unwrap();

        let mut source = ScriptedSource {
            frames: vec![vec![0; 512]; 10],
            frame_len: 512,
        };
        let mut spotter = ScriptedSpotter {
            fire_on: 3,
            seen: 0,
            frame_length: 512,
        };

        let m = gate.wait_for_wakeword(&mut source, &mut spotter).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.phrase, "hey-ash");
    }

    #[test]
    fn gate_errors_when_source_ends() {
        let gate = WakeWordGate::new(&["kw.ppn".to_string()], &[0.5]).unwrap();
        let mut source = ScriptedSource {
            frames: vec![],
            frame_len: 512,
        };
        let mut spotter = ScriptedSpotter {
            fire_on: usize::MAX,
            seen: 0,
            frame_length: 512,
        };

        assert!(matches!(
            gate.wait_for_wakeword(&mut source, &mut spotter),
            Err(Error::WakeWord(_))
        ));
    }

    #[test]
    fn sensitivity_maps_inversely_onto_threshold() {
        assert!((EnergySpotter::threshold_for(0.5) - EnergySpotter::DEFAULT_THRESHOLD).abs() < 1e-6);
        assert!(EnergySpotter::threshold_for(0.8) < EnergySpotter::threshold_for(0.2));
        assert!((EnergySpotter::threshold_for(1.0) - 0.0).abs() < 1e-6);
        // Clamped, not extrapolated
        assert!((EnergySpotter::threshold_for(2.0) - EnergySpotter::threshold_for(1.0)).abs() < 1e-6);
    }

    #[test]
    fn energy_spotter_needs_consecutive_hot_frames() {
        let mut spotter = EnergySpotter::new(480, 500.0, 3);
        let hot = vec![2000_i16; 480];
        let cold = vec![0_i16; 480];

        assert_eq!(spotter.process(&hot).unwrap(), None);
        assert_eq!(spotter.process(&hot).unwrap(), None);
        // Interruption resets the run
        assert_eq!(spotter.process(&cold).unwrap(), None);
        assert_eq!(spotter.process(&hot).unwrap(), None);
        assert_eq!(spotter.process(&hot).unwrap(), None);
        assert_eq!(spotter.process(&hot).unwrap(), Some(0));
    }
}
