//! Audio primitives: frame sources, channel mixing, WAV persistence, resampling

mod frame;
mod mix;
mod resample;
mod wav;

pub use frame::{AudioFrame, FrameSource, MicFrameSource, WavFrameSource};
pub use mix::{StereoChannel, downmix_to_mono, route_stereo};
pub use resample::LinearResampler;
pub use wav::{StereoWavWriter, mono_wav_bytes, write_mono_wav};

/// RMS level of 16-bit PCM samples
///
/// Used by the built-in energy spotter and voice classifier.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_squares / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        assert!(rms(&[0; 160]) < f64::EPSILON);
        assert!(rms(&[]) < f64::EPSILON);
    }

    #[test]
    fn rms_of_constant_signal() {
        let level = rms(&[1000; 160]);
        assert!((level - 1000.0).abs() < 1e-9);
    }
}
