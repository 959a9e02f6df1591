// System capture device via cpal
//
// Prefers a loopback/monitor input (what the speakers are playing), falling
// back to the default input device. Only available with the `audio-io` feature.

use super::backend::{CaptureConfig, CaptureDevice, CaptureSource};
use crate::error::{Error, Result};

/// The host's default capture device
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDeviceSource;

#[cfg(not(feature = "audio-io"))]
impl CaptureSource for DefaultDeviceSource {
    fn name(&self) -> &str {
        "default device (unavailable)"
    }

    fn open(&self, _config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        Err(Error::DeviceUnavailable(
            "built without the `audio-io` feature; use capture.source = \"synthetic\" or \"file\""
                .into(),
        ))
    }
}

#[cfg(feature = "audio-io")]
impl CaptureSource for DefaultDeviceSource {
    fn name(&self) -> &str {
        "default device"
    }

    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        cpal_backend::open(config)
    }
}

#[cfg(feature = "audio-io")]
mod cpal_backend {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{SampleFormat, Stream, StreamConfig};
    use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
    use std::time::Duration;
    use tracing::{error, info, warn};

    use super::super::backend::{AudioFormat, CaptureConfig, CaptureDevice, ChunkRead};
    use crate::error::{Error, Result};

    /// Name fragments that identify "what you hear" style inputs
    const LOOPBACK_HINTS: &[&str] = &["monitor", "loopback", "stereo mix", "what u hear"];

    /// Chunks buffered between the cpal callback and the accumulation loop
    const CHANNEL_DEPTH: usize = 256;

    fn pick_device(host: &cpal::Host) -> Option<cpal::Device> {
        let loopback = host.input_devices().ok().and_then(|mut devices| {
            devices.find(|d| {
                d.name()
                    .map(|n| {
                        let n = n.to_lowercase();
                        LOOPBACK_HINTS.iter().any(|hint| n.contains(hint))
                    })
                    .unwrap_or(false)
            })
        });

        loopback.or_else(|| host.default_input_device())
    }

    pub fn open(config: &CaptureConfig) -> Result<Box<dyn CaptureDevice>> {
        let host = cpal::default_host();
        let device = pick_device(&host)
            .ok_or_else(|| Error::DeviceUnavailable("No input device available".into()))?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using capture device: {}", name);

        let supported = device.default_input_config().map_err(|e| {
            Error::DeviceUnavailable(format!("Failed to get input config: {}", e))
        })?;
        let sample_format = supported.sample_format();
        let stream_config: StreamConfig = supported.into();

        let format = AudioFormat {
            sample_rate: stream_config.sample_rate.0,
            channels: stream_config.channels,
        };
        if format.sample_rate != config.sample_rate || format.channels != config.channels {
            info!(
                "Device native format {}Hz/{}ch differs from requested {}Hz/{}ch, keeping native",
                format.sample_rate, format.channels, config.sample_rate, config.channels
            );
        }

        let (tx, rx) = bounded::<Vec<u8>>(CHANNEL_DEPTH);
        let err_fn = |err| error!("Audio input stream error: {}", err);

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| forward(&tx, data.iter().copied()),
                err_fn,
                None,
            ),
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    forward(&tx, data.iter().map(|&s| (s as i32 - 32768) as i16))
                },
                err_fn,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    forward(
                        &tx,
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16),
                    )
                },
                err_fn,
                None,
            ),
            other => {
                return Err(Error::DeviceUnavailable(format!(
                    "Unsupported sample format: {:?}",
                    other
                )))
            }
        }
        .map_err(|e| Error::DeviceUnavailable(format!("Failed to build input stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| Error::DeviceUnavailable(format!("Failed to start input stream: {}", e)))?;

        Ok(Box::new(CpalDevice {
            name,
            format,
            rx,
            _stream: stream,
        }))
    }

    fn forward(tx: &Sender<Vec<u8>>, samples: impl Iterator<Item = i16>) {
        let pcm: Vec<u8> = samples.flat_map(|s| s.to_le_bytes()).collect();
        if let Err(e) = tx.try_send(pcm) {
            warn!("Dropping audio chunk: {}", e);
        }
    }

    struct CpalDevice {
        name: String,
        format: AudioFormat,
        rx: Receiver<Vec<u8>>,
        // Dropping the stream closes the device
        _stream: Stream,
    }

    impl CaptureDevice for CpalDevice {
        fn name(&self) -> &str {
            &self.name
        }

        fn format(&self) -> AudioFormat {
            self.format
        }

        fn read_chunk(&mut self, timeout: Duration) -> Result<ChunkRead> {
            match self.rx.recv_timeout(timeout) {
                Ok(pcm) => Ok(ChunkRead::Data(pcm)),
                Err(RecvTimeoutError::Timeout) => Ok(ChunkRead::Pending),
                Err(RecvTimeoutError::Disconnected) => Ok(ChunkRead::EndOfStream),
            }
        }
    }
}
