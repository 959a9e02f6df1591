use super::config::SessionConfig;
use super::stats::{SessionCounters, SessionStats};
use crate::audio::{AudioCapture, Recording, RecordingArchive};
use crate::error::{Error, Result};
use crate::protocol::{Command, CommandChannel, Response};
use crate::provider::AnswerProvider;
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Prompt used for GET_ANSWER before anything has been transcribed
pub const CURRENT_QUESTION_PROMPT: &str = "Current question";

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A backend session: one listener, at most one live connection at a time
pub struct Session {
    config: SessionConfig,
    listener: TcpListener,
    local_addr: SocketAddr,

    /// Shared with blocking tasks, since start/stop wait on the capture thread
    capture: Arc<AudioCapture>,
    provider: Arc<dyn AnswerProvider>,
    archive: Option<RecordingArchive>,

    started_at: DateTime<Utc>,
    counters: SessionCounters,
    cancel: CancellationToken,
}

/// Per-connection state; dropped (and so reset) when the connection ends
#[derive(Debug, Default)]
struct ConnectionState {
    last_transcript: Option<String>,
}

impl Session {
    /// Bind the listening socket. Failing to bind is the one fatal error.
    pub async fn bind(
        config: SessionConfig,
        capture: AudioCapture,
        provider: Arc<dyn AnswerProvider>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read listening address")?;

        let archive = config
            .recordings_dir
            .clone()
            .map(RecordingArchive::new)
            .transpose()?;

        info!(
            "Backend listening on {} (capture: {}, provider: {})",
            local_addr,
            capture.source_name(),
            provider.name()
        );
        if !config.password.is_empty() {
            debug!("Shared secret configured; it is not enforced on the wire");
        }

        Ok(Self {
            config,
            listener,
            local_addr,
            capture: Arc::new(capture),
            provider,
            archive,
            started_at: Utc::now(),
            counters: SessionCounters::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(self.started_at)
    }

    /// Ask `run` to return. The live connection (if any) is closed and capture shut down.
    pub fn shutdown(&self) {
        info!("Session shutdown requested");
        self.cancel.cancel();
    }

    /// Accept and serve connections one at a time until `shutdown` is called.
    ///
    /// The next connection is only accepted once the previous one has been
    /// torn down, so a second frontend waits in the listen backlog.
    pub async fn run(&self) -> anyhow::Result<()> {
        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.serve(stream, peer).await,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }

        let capture = Arc::clone(&self.capture);
        task::spawn_blocking(move || capture.shutdown())
            .await
            .context("Capture shutdown task failed")?;

        match serde_json::to_string(&self.stats()) {
            Ok(json) => info!("Session finished: {}", json),
            Err(e) => warn!("Failed to serialize session stats: {}", e),
        }

        Ok(())
    }

    async fn serve(&self, stream: TcpStream, peer: SocketAddr) {
        let span = info_span!("connection", id = %Uuid::new_v4(), %peer);

        async {
            let served = self.counters.connection_accepted();
            info!("Accepted connection #{}", served);

            match self.handle_connection(stream).await {
                Ok(()) => info!("Connection closed"),
                Err(e) if e.is_recoverable() => warn!("Connection ended: {}", e),
                Err(e) => error!("Connection failed: {}", e),
            }

            // Nothing carries over to the next connection
            if let Some(discarded) = self.stop_capture().await {
                if !discarded.is_empty() {
                    info!(
                        "Discarded in-progress recording ({} bytes)",
                        discarded.len()
                    );
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let mut channel = CommandChannel::new(stream)?;
        channel.send(&Response::BackendReady).await?;
        debug!("Sent readiness token");

        let mut state = ConnectionState::default();

        loop {
            let inbound = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                inbound = channel.receive::<Command>() => inbound?,
            };

            let Some(inbound) = inbound else {
                debug!("Peer closed the stream");
                return Ok(());
            };

            match inbound.into_message() {
                Err(violation) => {
                    self.counters.unrecognized_token();
                    debug!("Ignoring frame: {}", violation);
                }
                Ok(command) => {
                    self.counters.command_dispatched();
                    info!("Dispatching {}", command.as_token());

                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(()),
                        result = self.dispatch(command, &mut channel, &mut state) => result?,
                    }
                }
            }
        }
    }

    async fn dispatch(
        &self,
        command: Command,
        channel: &mut CommandChannel,
        state: &mut ConnectionState,
    ) -> Result<()> {
        match command {
            Command::Ping => channel.send(&Response::Pong).await,

            Command::StartRecording => {
                let reply = match self.start_capture().await {
                    Ok(()) => Response::RecordingStarted,
                    Err(e) => {
                        warn!("Failed to start recording: {}", e);
                        Response::RecordingError
                    }
                };
                channel.send(&reply).await
            }

            Command::StopRecording => {
                let was_recording = self.capture.is_recording();
                let recording = self.stop_capture().await;
                channel.send(&Response::RecordingStopped).await?;

                if !was_recording {
                    debug!("Stop while idle, no answer to produce");
                    return Ok(());
                }
                self.counters.recording_completed();

                let reply = match recording {
                    Some(recording) => {
                        self.archive(&recording).await;
                        self.answer_recording(&recording, state).await
                    }
                    None => Response::AiError,
                };
                channel.send(&reply).await
            }

            Command::GetAnswer => {
                let prompt = state
                    .last_transcript
                    .as_deref()
                    .unwrap_or(CURRENT_QUESTION_PROMPT);
                let deadline = Instant::now() + self.config.answer_timeout;
                let reply = self.answer(prompt, deadline).await;
                channel.send(&reply).await
            }
        }
    }

    async fn start_capture(&self) -> Result<()> {
        let capture = Arc::clone(&self.capture);
        task::spawn_blocking(move || capture.start())
            .await
            .map_err(|e| Error::DeviceUnavailable(format!("capture start task failed: {e}")))?
    }

    /// `None` only if the blocking stop task itself died
    async fn stop_capture(&self) -> Option<Recording> {
        let capture = Arc::clone(&self.capture);
        match task::spawn_blocking(move || capture.stop()).await {
            Ok(recording) => Some(recording),
            Err(e) => {
                error!("Capture stop task failed: {}", e);
                None
            }
        }
    }

    async fn archive(&self, recording: &Recording) {
        let Some(archive) = self.archive.clone() else {
            return;
        };
        if recording.is_empty() {
            return;
        }

        let recording = recording.clone();
        match task::spawn_blocking(move || archive.save(&recording)).await {
            Ok(Ok(path)) => debug!("Archived recording to {}", path.display()),
            Ok(Err(e)) => warn!("Failed to archive recording: {:#}", e),
            Err(e) => error!("Archive task failed: {}", e),
        }
    }

    async fn answer_recording(
        &self,
        recording: &Recording,
        state: &mut ConnectionState,
    ) -> Response {
        let deadline = Instant::now() + self.config.answer_timeout;

        let transcript =
            match tokio::time::timeout_at(deadline, self.provider.transcribe(recording)).await {
                Ok(Ok(transcript)) => transcript,
                Ok(Err(e)) => {
                    warn!("Transcription failed: {}", e);
                    return Response::AiError;
                }
                Err(_) => {
                    warn!(
                        "Transcription did not finish within {:?}",
                        self.config.answer_timeout
                    );
                    return Response::AiError;
                }
            };
        debug!("Transcript: {:?}", transcript);

        let reply = self.answer(&transcript, deadline).await;
        state.last_transcript = Some(transcript);
        reply
    }

    async fn answer(&self, prompt: &str, deadline: Instant) -> Response {
        match tokio::time::timeout_at(deadline, self.provider.produce_answer(prompt, None)).await {
            Ok(answer) if !answer.trim().is_empty() => {
                info!("Answer ready ({} chars)", answer.len());
                Response::AiResponse(answer)
            }
            Ok(_) => {
                warn!("Provider returned an empty answer");
                Response::AiError
            }
            Err(_) => {
                warn!("No answer within {:?}", self.config.answer_timeout);
                Response::AiError
            }
        }
    }
}
