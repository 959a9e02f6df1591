// Synthetic capture source: a paced sine tone
//
// Stands in for a real device on headless hosts and in tests. Chunks are
// released at real-time pace so recordings have a believable length.

use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use super::backend::{AudioFormat, CaptureConfig, CaptureDevice, CaptureSource, ChunkRead};
use crate::error::Result;

/// Generates a sine tone at the configured format
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    /// Tone frequency in Hz
    pub frequency: f32,
    /// Peak amplitude (0.0 to 1.0)
    pub amplitude: f32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            frequency: 440.0,
            amplitude: 0.25,
        }
    }
}

impl CaptureSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic tone"
    }

    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        let format = AudioFormat {
            sample_rate: config.sample_rate,
            channels: config.channels,
        };
        let chunk_duration = format.duration_of(config.chunk_frames * format.bytes_per_frame());

        Ok(Box::new(ToneDevice {
            format,
            chunk_frames: config.chunk_frames,
            chunk_duration,
            next_due: Instant::now() + chunk_duration,
            phase: 0.0,
            frequency: self.frequency,
            amplitude: self.amplitude,
        }))
    }
}

struct ToneDevice {
    format: AudioFormat,
    chunk_frames: usize,
    chunk_duration: Duration,
    next_due: Instant,
    phase: f32,
    frequency: f32,
    amplitude: f32,
}

impl ToneDevice {
    fn render_chunk(&mut self) -> Vec<u8> {
        let step = TAU * self.frequency / self.format.sample_rate.max(1) as f32;
        let mut pcm = Vec::with_capacity(self.chunk_frames * self.format.bytes_per_frame());

        for _ in 0..self.chunk_frames {
            let sample = (self.phase.sin() * self.amplitude * i16::MAX as f32) as i16;
            for _ in 0..self.format.channels {
                pcm.extend_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + step) % TAU;
        }

        pcm
    }
}

impl CaptureDevice for ToneDevice {
    fn name(&self) -> &str {
        "synthetic tone"
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read_chunk(&mut self, timeout: Duration) -> Result<ChunkRead> {
        let wait = self.next_due.saturating_duration_since(Instant::now());
        if wait > timeout {
            thread::sleep(timeout);
            return Ok(ChunkRead::Pending);
        }

        thread::sleep(wait);
        self.next_due += self.chunk_duration;
        Ok(ChunkRead::Data(self.render_chunk()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_have_configured_size() {
        let config = CaptureConfig {
            sample_rate: 16000,
            channels: 2,
            chunk_frames: 160,
            ..CaptureConfig::default()
        };
        let mut device = SyntheticSource::default().open(&config).unwrap();

        match device.read_chunk(Duration::from_secs(1)).unwrap() {
            ChunkRead::Data(pcm) => assert_eq!(pcm.len(), 160 * 2 * 2),
            other => panic!("expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_short_poll_reports_pending() {
        let config = CaptureConfig {
            sample_rate: 8000,
            channels: 1,
            chunk_frames: 8000, // one second per chunk
            ..CaptureConfig::default()
        };
        let mut device = SyntheticSource::default().open(&config).unwrap();

        assert_eq!(
            device.read_chunk(Duration::from_millis(5)).unwrap(),
            ChunkRead::Pending
        );
    }

    #[test]
    fn test_tone_is_not_silent() {
        let config = CaptureConfig {
            sample_rate: 8000,
            channels: 1,
            chunk_frames: 80,
            ..CaptureConfig::default()
        };
        let mut device = SyntheticSource::default().open(&config).unwrap();

        if let ChunkRead::Data(pcm) = device.read_chunk(Duration::from_secs(1)).unwrap() {
            assert!(pcm.iter().any(|&b| b != 0));
        } else {
            panic!("expected data");
        }
    }
}
