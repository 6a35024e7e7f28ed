//! WAV persistence for captured utterances and synthesized replies

use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::Result;

/// Encode mono 16-bit PCM samples as WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn mono_wav_bytes(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Write mono 16-bit PCM samples to a WAV file
///
/// # Errors
///
/// Returns error if the file cannot be created or encoding fails
pub fn write_mono_wav<P: AsRef<Path>>(path: P, samples: &[i16], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Incremental stereo WAV file sink for synthesized replies
///
/// Created under a per-process output directory (made idempotently on first
/// use) with a timestamped file name. The writer must be finalized on every
/// exit path; a dropped-but-unfinalized writer still yields a readable file
/// thanks to hound's drop handling, but `finalize` surfaces IO errors.
pub struct StereoWavWriter {
    writer: hound::WavWriter<std::io::BufWriter<std::fs::File>>,
    path: PathBuf,
}

impl StereoWavWriter {
    /// Create a timestamped stereo WAV under `dir`
    ///
    /// # Errors
    ///
    /// Returns error if the directory or file cannot be created
    pub fn create<P: AsRef<Path>>(dir: P, sample_rate: u32) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;

        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let path = dir.as_ref().join(format!("{stamp}.wav"));

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let writer = hound::WavWriter::create(&path, spec)?;
        Ok(Self { writer, path })
    }

    /// Path of the file being written
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append interleaved stereo samples
    ///
    /// # Errors
    ///
    /// Returns error if encoding fails
    pub fn write_interleaved(&mut self, interleaved: &[i16]) -> Result<()> {
        for &sample in interleaved {
            self.writer.write_sample(sample)?;
        }
        Ok(())
    }

    /// Finish the file, returning its path
    ///
    /// # Errors
    ///
    /// Returns error if the header cannot be updated
    pub fn finalize(self) -> Result<PathBuf> {
        self.writer.finalize()?;
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_bytes_carry_wav_magic() {
        let wav = mono_wav_bytes(&[0, 100, -100], 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > 44);
    }

    #[test]
    fn mono_roundtrip_is_lossless() {
        let samples: Vec<i16> = vec![0, 1, -1, 32_767, -32_768, 12_345];
        let wav = mono_wav_bytes(&samples, 16_000).unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16_000);

        let back: Vec<i16> = reader.samples::<i16>().map(std::result::Result::unwrap).collect();
        assert_eq!(back, samples);
    }

    #[test]
    fn stereo_writer_creates_dir_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("responses");

        let mut writer = StereoWavWriter::create(&out, 24_000).unwrap();
        writer.write_interleaved(&[1, 0, 2, 0]).unwrap();
        let path = writer.finalize().unwrap();
        assert!(path.exists());

        // Second creation in the same directory is not an error
        let second = StereoWavWriter::create(&out, 24_000).unwrap();
        drop(second);
    }

    #[test]
    fn stereo_roundtrip_preserves_interleaving() {
        let dir = tempfile::tempdir().unwrap();

        let mut writer = StereoWavWriter::create(dir.path(), 24_000).unwrap();
        writer.write_interleaved(&[10, 0, 20, 0, 30, 0]).unwrap();
        let path = writer.finalize().unwrap();

        let mut reader = hound::WavReader::open(path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        let back: Vec<i16> = reader.samples::<i16>().map(std::result::Result::unwrap).collect();
        assert_eq!(back, vec![10, 0, 20, 0, 30, 0]);
    }
}
