use hound::WavReader;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use super::backend::{AudioFormat, CaptureConfig, CaptureDevice, CaptureSource, ChunkRead};
use crate::error::{Error, Result};

/// Replays a 16-bit PCM WAV file as if it were a capture device
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file {}", path.display());
        Self { path, name }
    }
}

impl CaptureSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        info!("Opening audio file: {}", self.path.display());

        let reader = WavReader::open(&self.path).map_err(|e| {
            Error::DeviceUnavailable(format!("cannot open {}: {}", self.path.display(), e))
        })?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            return Err(Error::DeviceUnavailable(format!(
                "{} is not 16-bit PCM ({} bits, {:?})",
                self.path.display(),
                spec.bits_per_sample,
                spec.sample_format
            )));
        }

        let format = AudioFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        };

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels",
            reader.duration() as f64 / spec.sample_rate as f64,
            spec.sample_rate,
            spec.channels
        );

        Ok(Box::new(FileDevice {
            name: self.name.clone(),
            reader,
            format,
            chunk_samples: config.chunk_frames * spec.channels as usize,
        }))
    }
}

struct FileDevice {
    name: String,
    reader: WavReader<BufReader<File>>,
    format: AudioFormat,
    chunk_samples: usize,
}

impl CaptureDevice for FileDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_chunk(&mut self, _timeout: Duration) -> Result<ChunkRead> {
        let mut pcm = Vec::with_capacity(self.chunk_samples * AudioFormat::BYTES_PER_SAMPLE);

        for sample in self.reader.samples::<i16>().take(self.chunk_samples) {
            let sample = sample.map_err(|e| {
                Error::DeviceUnavailable(format!("failed to read {}: {}", self.name, e))
            })?;
            pcm.extend_from_slice(&sample.to_le_bytes());
        }

        if pcm.is_empty() {
            Ok(ChunkRead::EndOfStream)
        } else {
            Ok(ChunkRead::Data(pcm))
        }
    }
}
