// Integration tests for the backend session
//
// A real `Session` is bound to an ephemeral port and driven over TCP with
// the same framed channel the frontend uses. Capture goes through a scripted
// source that counts live device handles.

use anyhow::{bail, Result};
use async_trait::async_trait;
use socrates::audio::{AudioCapture, CaptureConfig, CaptureDevice, CaptureSource, ChunkRead};
use socrates::protocol::{Command, CommandChannel, Inbound, Response};
use socrates::provider::{AnswerProvider, SyntheticProvider};
use socrates::session::{Session, SessionConfig, CURRENT_QUESTION_PROMPT};
use socrates::Recording;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const STEP: Duration = Duration::from_secs(5);

/// Hands out devices that produce a small chunk every few milliseconds
struct ScriptedSource {
    live: Arc<AtomicUsize>,
    opened: AtomicUsize,
    available: bool,
    silent: bool,
}

impl ScriptedSource {
    fn new(available: bool) -> Arc<Self> {
        Arc::new(Self {
            live: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
            available,
            silent: false,
        })
    }

    /// Devices open fine but never deliver a sample
    fn silent() -> Arc<Self> {
        Arc::new(Self {
            live: Arc::new(AtomicUsize::new(0)),
            opened: AtomicUsize::new(0),
            available: true,
            silent: true,
        })
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl CaptureSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn open(&self, config: &CaptureConfig) -> socrates::Result<Box<dyn CaptureDevice>> {
        if !self.available {
            return Err(socrates::Error::DeviceUnavailable("no loopback device".into()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDevice {
            live: Arc::clone(&self.live),
            silent: self.silent,
            format: socrates::audio::AudioFormat {
                sample_rate: config.sample_rate,
                channels: config.channels,
            },
        }))
    }
}

struct ScriptedDevice {
    live: Arc<AtomicUsize>,
    silent: bool,
    format: socrates::audio::AudioFormat,
}

impl CaptureDevice for ScriptedDevice {
    fn name(&self) -> &str {
        "scripted device"
    }

    fn format(&self) -> socrates::audio::AudioFormat {
        self.format
    }

    fn read_chunk(&mut self, timeout: Duration) -> socrates::Result<ChunkRead> {
        thread::sleep(timeout.min(Duration::from_millis(5)));
        if self.silent {
            return Ok(ChunkRead::Pending);
        }
        Ok(ChunkRead::Data(vec![0u8; 64]))
    }
}

impl Drop for ScriptedDevice {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Answers with the prompt it was given
struct EchoProvider;

#[async_trait]
impl AnswerProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn produce_answer(&self, prompt: &str, _context: Option<&str>) -> String {
        format!("echo: {}", prompt)
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn transcribe(&self, recording: &Recording) -> socrates::Result<String> {
        Ok(format!("{} bytes of audio", recording.len()))
    }
}

/// Never answers in time, and cannot transcribe
struct StuckProvider;

#[async_trait]
impl AnswerProvider for StuckProvider {
    fn name(&self) -> &str {
        "stuck"
    }

    async fn produce_answer(&self, _prompt: &str, _context: Option<&str>) -> String {
        tokio::time::sleep(Duration::from_secs(60)).await;
        "too late".to_string()
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn transcribe(&self, _recording: &Recording) -> socrates::Result<String> {
        Err(socrates::Error::ProviderFailure("speech service down".into()))
    }
}

fn capture_config() -> CaptureConfig {
    CaptureConfig {
        poll_interval: Duration::from_millis(10),
        open_timeout: Duration::from_secs(2),
        stop_timeout: Duration::from_secs(2),
        ..CaptureConfig::default()
    }
}

async fn start_backend(
    source: Arc<ScriptedSource>,
    provider: Arc<dyn AnswerProvider>,
    answer_timeout: Duration,
) -> Result<(Arc<Session>, JoinHandle<Result<()>>)> {
    let config = SessionConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        password: "pw".to_string(),
        answer_timeout,
        recordings_dir: None,
    };
    let capture = AudioCapture::new(source, capture_config());
    let session = Arc::new(Session::bind(config, capture, provider).await?);

    let running = Arc::clone(&session);
    let handle = tokio::spawn(async move { running.run().await });
    Ok((session, handle))
}

async fn synthetic_backend(
    source: Arc<ScriptedSource>,
) -> Result<(Arc<Session>, JoinHandle<Result<()>>)> {
    start_backend(source, Arc::new(SyntheticProvider::new()), STEP).await
}

/// Dial and wait for the readiness token
async fn connect(session: &Session) -> Result<CommandChannel> {
    let stream = TcpStream::connect(session.local_addr()).await?;
    let mut channel = CommandChannel::new(stream)?;
    match expect(&mut channel).await? {
        Response::BackendReady => Ok(channel),
        other => bail!("expected BACKEND_READY, got {:?}", other),
    }
}

async fn expect(channel: &mut CommandChannel) -> Result<Response> {
    match timeout(STEP, channel.receive::<Response>()).await?? {
        Some(Inbound::Message(response)) => Ok(response),
        Some(Inbound::Unrecognized(raw)) => bail!("unexpected token {:?}", raw),
        None => bail!("backend closed the connection"),
    }
}

async fn request(channel: &mut CommandChannel, command: Command) -> Result<Response> {
    channel.send(&command).await?;
    expect(channel).await
}

#[tokio::test]
async fn test_start_stop_yields_answer() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source.clone()).await?;
    let mut channel = connect(&session).await?;

    assert_eq!(
        request(&mut channel, Command::StartRecording).await?,
        Response::RecordingStarted
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(
        request(&mut channel, Command::StopRecording).await?,
        Response::RecordingStopped
    );
    match expect(&mut channel).await? {
        Response::AiResponse(text) => assert!(!text.trim().is_empty()),
        other => bail!("expected AI_RESPONSE, got {:?}", other),
    }

    assert_eq!(source.live(), 0, "device released after stop");
    assert_eq!(session.stats().recordings_completed, 1);
    Ok(())
}

#[cfg(not(feature = "audio-io"))]
#[tokio::test]
async fn test_default_configuration_can_record() -> Result<()> {
    let cfg = socrates::Config::load(None)?;
    let source = socrates::AudioBackendFactory::create(cfg.capture.audio_source()?);
    let capture = AudioCapture::new(source, cfg.capture.capture_config());
    let config = SessionConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        ..SessionConfig::from_config(&cfg)
    };
    let session = Arc::new(
        Session::bind(config, capture, Arc::new(SyntheticProvider::new())).await?,
    );
    let running = Arc::clone(&session);
    let _handle = tokio::spawn(async move { running.run().await });

    let mut channel = connect(&session).await?;
    assert_eq!(
        request(&mut channel, Command::StartRecording).await?,
        Response::RecordingStarted
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        request(&mut channel, Command::StopRecording).await?,
        Response::RecordingStopped
    );
    assert!(matches!(expect(&mut channel).await?, Response::AiResponse(_)));

    session.shutdown();
    Ok(())
}

#[tokio::test]
async fn test_empty_recording_still_gets_an_answer() -> Result<()> {
    let (session, _handle) =
        start_backend(ScriptedSource::silent(), Arc::new(EchoProvider), STEP).await?;
    let mut channel = connect(&session).await?;

    assert_eq!(
        request(&mut channel, Command::StartRecording).await?,
        Response::RecordingStarted
    );
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(
        request(&mut channel, Command::StopRecording).await?,
        Response::RecordingStopped
    );
    assert_eq!(
        expect(&mut channel).await?,
        Response::AiResponse("echo: 0 bytes of audio".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_stop_while_idle_is_not_an_error() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source.clone()).await?;
    let mut channel = connect(&session).await?;

    assert_eq!(
        request(&mut channel, Command::StopRecording).await?,
        Response::RecordingStopped
    );
    // No answer is produced for an empty stop: the next frame is the PONG
    assert_eq!(request(&mut channel, Command::Ping).await?, Response::Pong);

    assert_eq!(source.opened(), 0);
    assert_eq!(session.stats().recordings_completed, 0);
    Ok(())
}

#[tokio::test]
async fn test_repeated_cycles_end_idle() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source.clone()).await?;
    let mut channel = connect(&session).await?;

    for _ in 0..3 {
        assert_eq!(
            request(&mut channel, Command::StartRecording).await?,
            Response::RecordingStarted
        );
        // Second start is a no-op that still acknowledges
        assert_eq!(
            request(&mut channel, Command::StartRecording).await?,
            Response::RecordingStarted
        );
        assert_eq!(
            request(&mut channel, Command::StopRecording).await?,
            Response::RecordingStopped
        );
        assert!(matches!(expect(&mut channel).await?, Response::AiResponse(_)));
    }

    assert_eq!(source.opened(), 3);
    assert_eq!(source.live(), 0);
    Ok(())
}

#[tokio::test]
async fn test_ping_yields_exactly_one_pong() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source.clone()).await?;
    let mut channel = connect(&session).await?;

    channel.send(&Command::Ping).await?;
    channel.send(&Command::StopRecording).await?;

    assert_eq!(expect(&mut channel).await?, Response::Pong);
    assert_eq!(expect(&mut channel).await?, Response::RecordingStopped);
    assert_eq!(source.opened(), 0, "ping never touches capture");
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_tokens_are_ignored() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source.clone()).await?;
    let channel = connect(&session).await?;
    let (mut receiver, mut sender) = channel.into_split();

    sender.send_raw("HELLO_BACKEND").await?;
    sender.send_raw("START_RECORDING:now").await?;
    sender.send_raw("").await?;
    sender.send(&Command::Ping).await?;

    match timeout(STEP, receiver.receive::<Response>()).await?? {
        Some(Inbound::Message(Response::Pong)) => {}
        other => bail!("expected PONG, got {:?}", other),
    }

    let stats = session.stats();
    assert_eq!(stats.unrecognized_tokens, 3);
    assert_eq!(stats.commands_dispatched, 1);
    assert_eq!(source.opened(), 0);
    Ok(())
}

#[tokio::test]
async fn test_start_without_device_reports_error() -> Result<()> {
    let source = ScriptedSource::new(false);
    let (session, _handle) = synthetic_backend(source.clone()).await?;
    let mut channel = connect(&session).await?;

    assert_eq!(
        request(&mut channel, Command::StartRecording).await?,
        Response::RecordingError
    );
    // The session keeps serving
    assert_eq!(
        request(&mut channel, Command::StopRecording).await?,
        Response::RecordingStopped
    );
    assert_eq!(request(&mut channel, Command::Ping).await?, Response::Pong);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_mid_recording_releases_device() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source.clone()).await?;

    let mut first = connect(&session).await?;
    assert_eq!(
        request(&mut first, Command::StartRecording).await?,
        Response::RecordingStarted
    );
    assert_eq!(source.live(), 1);
    drop(first);

    // The next connection is only greeted once the previous one is torn down
    let mut second = connect(&session).await?;
    assert_eq!(source.live(), 0, "device released before the next connection");

    assert_eq!(
        request(&mut second, Command::StartRecording).await?,
        Response::RecordingStarted
    );
    assert_eq!(source.live(), 1);
    assert_eq!(source.opened(), 2);
    assert_eq!(session.stats().connections_served, 2);
    Ok(())
}

#[tokio::test]
async fn test_second_frontend_waits_for_the_first() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source).await?;

    let mut first = connect(&session).await?;

    let stream = TcpStream::connect(session.local_addr()).await?;
    let mut queued = CommandChannel::new(stream)?;
    let early = timeout(Duration::from_millis(200), queued.receive::<Response>()).await;
    assert!(early.is_err(), "queued peer is not greeted while another is live");

    assert_eq!(request(&mut first, Command::Ping).await?, Response::Pong);
    drop(first);

    assert_eq!(expect(&mut queued).await?, Response::BackendReady);
    assert_eq!(request(&mut queued, Command::Ping).await?, Response::Pong);
    Ok(())
}

#[tokio::test]
async fn test_get_answer_returns_text() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = synthetic_backend(source).await?;
    let mut channel = connect(&session).await?;

    match request(&mut channel, Command::GetAnswer).await? {
        Response::AiResponse(text) => assert!(!text.is_empty()),
        other => bail!("expected AI_RESPONSE, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_get_answer_follows_last_transcript_per_connection() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) = start_backend(source, Arc::new(EchoProvider), STEP).await?;

    let mut channel = connect(&session).await?;
    assert_eq!(
        request(&mut channel, Command::GetAnswer).await?,
        Response::AiResponse(format!("echo: {}", CURRENT_QUESTION_PROMPT))
    );

    request(&mut channel, Command::StartRecording).await?;
    tokio::time::sleep(Duration::from_millis(30)).await;
    request(&mut channel, Command::StopRecording).await?;
    let after_stop = match expect(&mut channel).await? {
        Response::AiResponse(text) => text,
        other => bail!("expected AI_RESPONSE, got {:?}", other),
    };
    assert!(after_stop.starts_with("echo: ") && after_stop.ends_with("bytes of audio"));

    assert_eq!(
        request(&mut channel, Command::GetAnswer).await?,
        Response::AiResponse(after_stop)
    );
    drop(channel);

    // A new connection starts from scratch
    let mut fresh = connect(&session).await?;
    assert_eq!(
        request(&mut fresh, Command::GetAnswer).await?,
        Response::AiResponse(format!("echo: {}", CURRENT_QUESTION_PROMPT))
    );
    Ok(())
}

#[tokio::test]
async fn test_slow_or_failing_provider_reports_ai_error() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, _handle) =
        start_backend(source, Arc::new(StuckProvider), Duration::from_millis(100)).await?;
    let mut channel = connect(&session).await?;

    assert_eq!(
        request(&mut channel, Command::GetAnswer).await?,
        Response::AiError
    );

    request(&mut channel, Command::StartRecording).await?;
    assert_eq!(
        request(&mut channel, Command::StopRecording).await?,
        Response::RecordingStopped
    );
    assert_eq!(expect(&mut channel).await?, Response::AiError);

    assert_eq!(request(&mut channel, Command::Ping).await?, Response::Pong);
    Ok(())
}

#[tokio::test]
async fn test_shutdown_closes_connection_and_capture() -> Result<()> {
    let source = ScriptedSource::new(true);
    let (session, handle) = synthetic_backend(source.clone()).await?;
    let mut channel = connect(&session).await?;

    request(&mut channel, Command::StartRecording).await?;
    session.shutdown();

    let closed = timeout(STEP, channel.receive::<Response>()).await?;
    assert!(matches!(closed, Ok(None) | Err(_)), "connection is closed");

    timeout(STEP, handle).await???;
    assert_eq!(source.live(), 0);
    Ok(())
}
