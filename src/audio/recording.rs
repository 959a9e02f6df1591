use anyhow::{Context, Result};
use std::io::Cursor;

use super::backend::AudioFormat;

/// Immutable snapshot of one capture, handed out by `AudioCapture::stop`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    /// Raw PCM (i16 LE, interleaved)
    pub pcm: Vec<u8>,
    pub format: AudioFormat,
}

impl Recording {
    pub fn empty(format: AudioFormat) -> Self {
        Self {
            pcm: Vec::new(),
            format,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pcm.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pcm.len()
    }

    pub fn duration_secs(&self) -> f64 {
        self.format.duration_of(self.pcm.len()).as_secs_f64()
    }

    /// Decode the PCM bytes back into samples (a trailing odd byte is dropped)
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(AudioFormat::BYTES_PER_SAMPLE)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
    }

    /// Encode as an in-memory WAV file
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, wav_spec(self.format))
                .context("Failed to create in-memory WAV writer")?;
            for sample in self.samples() {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
            writer.finalize().context("Failed to finalize WAV")?;
        }
        Ok(cursor.into_inner())
    }
}

pub(crate) fn wav_spec(format: AudioFormat) -> hound::WavSpec {
    hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_16k() -> AudioFormat {
        AudioFormat {
            sample_rate: 16000,
            channels: 1,
        }
    }

    #[test]
    fn test_empty_recording() {
        let recording = Recording::empty(mono_16k());
        assert!(recording.is_empty());
        assert_eq!(recording.duration_secs(), 0.0);
    }

    #[test]
    fn test_wav_bytes_are_readable() {
        let samples: Vec<i16> = vec![100, -200, 300, -400];
        let recording = Recording {
            pcm: samples.iter().flat_map(|s| s.to_le_bytes()).collect(),
            format: mono_16k(),
        };

        let wav = recording.to_wav_bytes().unwrap();
        assert_eq!(&wav[..4], b"RIFF");

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, samples);
    }
}
