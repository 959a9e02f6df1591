use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
#[cfg(not(feature = "audio-io"))]
use tracing::warn;

/// Layout of captured PCM: always 16-bit signed little-endian, interleaved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    /// Duration represented by `len` bytes of PCM in this format
    pub fn duration_of(&self, len: usize) -> Duration {
        let frames = len / self.bytes_per_frame().max(1);
        Duration::from_secs_f64(frames as f64 / self.sample_rate.max(1) as f64)
    }
}

/// Configuration for audio capture
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Requested sample rate (devices may report a different native rate)
    pub sample_rate: u32,
    /// Requested channel count
    pub channels: u16,
    /// Frames per chunk appended to the recording buffer
    pub chunk_frames: usize,
    /// How long one device read may block before the loop re-checks its stop flag
    pub poll_interval: Duration,
    /// How long `start()` waits for the device to open
    pub open_timeout: Duration,
    /// How long `stop()` waits for the accumulation loop before detaching it
    pub stop_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            chunk_frames: 1024,
            poll_interval: Duration::from_millis(100),
            open_timeout: Duration::from_secs(3),
            stop_timeout: Duration::from_secs(2),
        }
    }
}

/// Result of one device read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkRead {
    /// Captured PCM bytes
    Data(Vec<u8>),
    /// Nothing arrived within the poll timeout
    Pending,
    /// The device has no more data to give
    EndOfStream,
}

/// An open capture device
///
/// Lives on the accumulation thread for its whole life, so it does not need
/// to be `Send`. Dropping it releases the underlying handle.
pub trait CaptureDevice {
    fn name(&self) -> &str;

    fn format(&self) -> AudioFormat;

    /// Block for at most `timeout` waiting for the next chunk
    fn read_chunk(&mut self, timeout: Duration) -> Result<ChunkRead>;
}

/// Something that can open capture devices
///
/// Platform-specific implementations:
/// - cpal: system default input, preferring a loopback/monitor device (`audio-io` feature,
///   otherwise the default source is the synthetic tone)
/// - Synthetic: generated tone, for headless hosts and tests
/// - File: replays a WAV file
pub trait CaptureSource: Send + Sync {
    fn name(&self) -> &str;

    /// Open a device, or fail with `Error::DeviceUnavailable`
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>>;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// System default capture device
    Default,
    /// Generated test tone
    Synthetic,
    /// WAV file replay
    File(PathBuf),
}

impl AudioSource {
    /// Parse the `capture.source` setting
    pub fn from_setting(source: &str, file_path: Option<&str>) -> Result<Self> {
        match source.to_ascii_lowercase().as_str() {
            "default" | "device" => Ok(AudioSource::Default),
            "synthetic" => Ok(AudioSource::Synthetic),
            "file" => {
                let path = file_path.ok_or_else(|| {
                    Error::Config("capture.source = \"file\" requires capture.file_path".into())
                })?;
                Ok(AudioSource::File(PathBuf::from(
                    shellexpand::tilde(path).into_owned(),
                )))
            }
            other => Err(Error::Config(format!("Unknown capture source: {}", other))),
        }
    }
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create the capture source for the given selection
    pub fn create(source: AudioSource) -> Arc<dyn CaptureSource> {
        match source {
            AudioSource::Default => Self::default_device(),
            AudioSource::Synthetic => Arc::new(super::synthetic::SyntheticSource::default()),
            AudioSource::File(path) => Arc::new(super::file::FileSource::new(path)),
        }
    }

    #[cfg(feature = "audio-io")]
    fn default_device() -> Arc<dyn CaptureSource> {
        Arc::new(super::device::DefaultDeviceSource)
    }

    /// Without device support the default source downgrades to the test tone
    #[cfg(not(feature = "audio-io"))]
    fn default_device() -> Arc<dyn CaptureSource> {
        warn!("Built without the `audio-io` feature, capturing a synthetic tone instead");
        Arc::new(super::synthetic::SyntheticSource::default())
    }
}
