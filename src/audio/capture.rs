//! Start/stop audio capture with a background accumulation loop
//!
//! `start()` spawns an `audio-capture` thread that opens the device, then
//! appends chunks to a shared buffer until told to stop. `stop()` flips the
//! flag, waits (bounded) for the thread to finish and hands back the buffer.

use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::backend::{AudioFormat, CaptureConfig, CaptureDevice, CaptureSource, ChunkRead};
use super::recording::Recording;
use crate::error::{Error, Result};

/// State of one in-flight recording
struct ActiveCapture {
    running: Arc<AtomicBool>,
    buffer: Arc<Mutex<Vec<u8>>>,
    format: AudioFormat,
    device_name: String,
    finished_rx: crossbeam_channel::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Owns the capture device lifecycle and the recording buffer
pub struct AudioCapture {
    source: Arc<dyn CaptureSource>,
    config: CaptureConfig,
    active: Mutex<Option<ActiveCapture>>,
    shut_down: AtomicBool,
}

impl AudioCapture {
    pub fn new(source: Arc<dyn CaptureSource>, config: CaptureConfig) -> Self {
        info!(
            "Audio capture initialized: {} ({}Hz, {} channels requested)",
            source.name(),
            config.sample_rate,
            config.channels
        );

        Self {
            source,
            config,
            active: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn is_recording(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Idle → Recording. No-op if already recording.
    pub fn start(&self) -> Result<()> {
        let mut active = self.active.lock();

        if active.is_some() {
            debug!("Recording already active, ignoring start");
            return Ok(());
        }

        if self.is_shut_down() {
            return Err(Error::DeviceUnavailable(
                "audio capture has been shut down".into(),
            ));
        }

        let running = Arc::new(AtomicBool::new(true));
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (opened_tx, opened_rx) = bounded::<Result<(String, AudioFormat)>>(1);
        let (finished_tx, finished_rx) = bounded::<()>(1);

        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let thread_running = Arc::clone(&running);
        let thread_buffer = Arc::clone(&buffer);

        let handle = thread::Builder::new()
            .name("audio-capture".into())
            .spawn(move || {
                // Opened here: some device handles must stay on the thread that created them
                let mut device = match source.open(&config) {
                    Ok(device) => device,
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                let _ = opened_tx.send(Ok((device.name().to_string(), device.format())));

                accumulate(
                    device.as_mut(),
                    &thread_running,
                    &thread_buffer,
                    config.poll_interval,
                );

                // Release the device before reporting completion
                drop(device);
                let _ = finished_tx.send(());
            })
            .map_err(|e| Error::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        match opened_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok((device_name, format))) => {
                info!(
                    "Recording started on {} ({}Hz, {} channels)",
                    device_name, format.sample_rate, format.channels
                );
                *active = Some(ActiveCapture {
                    running,
                    buffer,
                    format,
                    device_name,
                    finished_rx,
                    handle,
                });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                warn!("Failed to open capture device: {}", e);
                Err(e)
            }
            Err(_) => {
                // The thread exits on its own once it sees the flag
                running.store(false, Ordering::SeqCst);
                warn!(
                    "Capture device did not open within {:?}",
                    self.config.open_timeout
                );
                Err(Error::DeviceUnavailable(format!(
                    "{} did not open within {:?}",
                    self.source.name(),
                    self.config.open_timeout
                )))
            }
        }
    }

    /// Recording → Idle, returning everything captured.
    ///
    /// Returns an empty recording when already idle. If the accumulation loop
    /// does not finish within `stop_timeout` it is detached and whatever is in
    /// the buffer at that point is returned.
    pub fn stop(&self) -> Recording {
        // Held for the whole stop so a concurrent start cannot interleave
        let mut active = self.active.lock();

        let Some(capture) = active.take() else {
            return Recording::empty(self.requested_format());
        };

        capture.running.store(false, Ordering::SeqCst);

        match capture.finished_rx.recv_timeout(self.config.stop_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if capture.handle.join().is_err() {
                    error!("Audio capture thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Capture loop on {} did not stop within {:?}, detaching it",
                    capture.device_name, self.config.stop_timeout
                );
            }
        }

        let pcm = std::mem::take(&mut *capture.buffer.lock());
        let recording = Recording {
            pcm,
            format: capture.format,
        };

        info!(
            "Recording stopped on {}: captured {} bytes ({:.1}s)",
            capture.device_name,
            recording.len(),
            recording.duration_secs()
        );

        recording
    }

    /// Stop (discarding audio) and refuse further starts. Safe to call repeatedly.
    pub fn shutdown(&self) {
        let first = !self.shut_down.swap(true, Ordering::SeqCst);

        let discarded = self.stop();
        if !discarded.is_empty() {
            debug!("Discarded {} bytes on shutdown", discarded.len());
        }

        if first {
            info!("Audio capture shut down");
        }
    }

    fn requested_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accumulate(
    device: &mut dyn CaptureDevice,
    running: &AtomicBool,
    buffer: &Mutex<Vec<u8>>,
    poll_interval: Duration,
) {
    let mut chunks = 0usize;

    while running.load(Ordering::SeqCst) {
        match device.read_chunk(poll_interval) {
            Ok(ChunkRead::Data(bytes)) => {
                buffer.lock().extend_from_slice(&bytes);
                chunks += 1;
            }
            Ok(ChunkRead::Pending) => continue,
            Ok(ChunkRead::EndOfStream) => {
                info!("{} reached end of stream", device.name());
                break;
            }
            Err(e) => {
                error!("Capture read failed on {}: {}", device.name(), e);
                break;
            }
        }
    }

    debug!("Accumulation loop finished after {} chunks", chunks);
}
