use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::recording::{wav_spec, Recording};

/// Saves completed recordings to disk as WAV files
#[derive(Debug, Clone)]
pub struct RecordingArchive {
    output_dir: PathBuf,
}

impl RecordingArchive {
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();

        // Create output directory if it doesn't exist
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create recordings directory: {:?}", output_dir)
        })?;

        info!("Recording archive initialized: {}", output_dir.display());

        Ok(Self { output_dir })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write one recording; returns the file path
    pub fn save(&self, recording: &Recording) -> Result<PathBuf> {
        let file_name = format!(
            "recording-{}-{}.wav",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.output_dir.join(file_name);

        let mut writer = RecordingWriter::create(&path, recording)?;
        for sample in recording.samples() {
            writer.write_sample(sample)?;
        }
        writer.finish()?;

        info!(
            "Saved recording {} ({:.1}s, {} bytes PCM)",
            path.display(),
            recording.duration_secs(),
            recording.len()
        );

        Ok(path)
    }
}

/// WAV writer that finalizes the header even if dropped early
struct RecordingWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl RecordingWriter {
    fn create(path: &Path, recording: &Recording) -> Result<Self> {
        let writer = hound::WavWriter::create(path, wav_spec(recording.format))
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        Ok(Self {
            writer: Some(writer),
        })
    }

    fn write_sample(&mut self, sample: i16) -> Result<()> {
        if let Some(writer) = &mut self.writer {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        Ok(())
    }
}

impl Drop for RecordingWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
