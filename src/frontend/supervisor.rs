//! Frontend connection supervisor
//!
//! Dials the backend, waits for its readiness token, then runs a single loop
//! that routes inbound responses to the display and writes outbound commands.
//! Any failure drops back to `Disconnected` and a fresh dial follows after the
//! reconnect delay.

use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::display::{ConnectionStatus, Display, DisplayUpdate};
use crate::config::FrontendConfig;
use crate::error::{Error, Result};
use crate::protocol::{Command, CommandChannel, Inbound, Response};

/// Where the supervisor is in its dial/handshake/serve cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Dialing,
    Handshaking,
    Connected,
}

impl SupervisorState {
    fn status(&self) -> ConnectionStatus {
        match self {
            SupervisorState::Connected => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

/// Delay between dial attempts.
///
/// `initial == max` gives a fixed interval; otherwise the delay doubles per
/// consecutive failure up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    initial: Duration,
    max: Duration,
}

impl ReconnectPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial: interval,
            max: interval,
        }
    }

    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
        }
    }

    /// Delay before the next dial after `failures` consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial.saturating_mul(1 << exponent).min(self.max)
    }
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Backend address, "host:port"
    pub addr: String,
    /// Shared secret; never sent
    pub password: String,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub reconnect: ReconnectPolicy,
    pub keepalive_interval: Option<Duration>,
}

impl SupervisorConfig {
    pub fn from_config(config: &FrontendConfig) -> Self {
        let initial = Duration::from_millis(config.retry_interval_ms);
        let max = Duration::from_millis(config.max_retry_interval_ms);
        let reconnect = if max > initial {
            ReconnectPolicy::exponential(initial, max)
        } else {
            ReconnectPolicy::fixed(initial)
        };

        Self {
            addr: format!("{}:{}", config.host, config.port),
            password: config.password.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            reconnect,
            keepalive_interval: config
                .keepalive_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }
}

/// Text the display shows for a response, if any
pub fn display_text(response: &Response) -> Option<String> {
    match response {
        Response::AiResponse(text) => Some(text.clone()),
        Response::RecordingStarted => Some("Recording started...".to_string()),
        Response::RecordingStopped => Some("Recording stopped, processing...".to_string()),
        Response::RecordingError => Some("Error: Recording failed".to_string()),
        Response::AiError => Some("Error: AI processing failed".to_string()),
        Response::Pong | Response::BackendReady => None,
    }
}

pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    display: Arc<dyn Display>,
    state: watch::Sender<SupervisorState>,
    /// Present only while connected
    outbound: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    dial_attempts: AtomicU32,
    cancel: CancellationToken,
}

impl ConnectionSupervisor {
    pub fn new(config: SupervisorConfig, display: Arc<dyn Display>) -> Self {
        let (state, _) = watch::channel(SupervisorState::Disconnected);

        if !config.password.is_empty() {
            debug!("Shared secret configured; it is not sent to the backend");
        }

        Self {
            config,
            display,
            state,
            outbound: Mutex::new(None),
            dial_attempts: AtomicU32::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Total dials started so far, successful or not
    pub fn dial_attempts(&self) -> u32 {
        self.dial_attempts.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        info!("Supervisor shutdown requested");
        self.cancel.cancel();
    }

    /// Queue a command for the live connection.
    ///
    /// Returns `false`, and drops the command, when not connected.
    pub fn send(&self, command: Command) -> bool {
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(tx) if self.state() == SupervisorState::Connected => tx.send(command).is_ok(),
            _ => {
                debug!("Not connected, dropping {}", command.as_token());
                false
            }
        }
    }

    /// Dial, serve and redial until `shutdown` is called
    pub async fn run(&self) {
        let mut failures: u32 = 0;

        loop {
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                connected = self.connect() => connected,
            };

            match connected {
                Ok(channel) => {
                    failures = 0;
                    match self.serve(channel).await {
                        Ok(()) => info!("Disconnected from backend"),
                        Err(e) => warn!("Connection to backend lost: {}", e),
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!("Failed to connect to backend: {}", e);
                }
            }
            self.set_state(SupervisorState::Disconnected);

            if self.cancel.is_cancelled() {
                break;
            }

            let delay = self.config.reconnect.delay_for(failures.max(1));
            info!("Reconnecting in {:?}", delay);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = time::sleep(delay) => {}
            }
        }

        self.set_state(SupervisorState::Disconnected);
        info!("Supervisor stopped after {} dial attempts", self.dial_attempts());
    }

    fn set_state(&self, next: SupervisorState) {
        let previous = self.state.send_replace(next);
        if previous.status() != next.status() {
            self.display.show(DisplayUpdate::status(next.status()));
        }
    }

    async fn connect(&self) -> Result<CommandChannel> {
        let attempt = self.dial_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_state(SupervisorState::Dialing);
        info!("Dialing {} (attempt {})", self.config.addr, attempt);

        let stream = time::timeout(self.config.connect_timeout, TcpStream::connect(&self.config.addr))
            .await
            .map_err(|_| {
                Error::ConnectionLost(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.config.connect_timeout),
                ))
            })??;
        let mut channel = CommandChannel::new(stream)?;

        self.set_state(SupervisorState::Handshaking);
        let greeting = time::timeout(self.config.handshake_timeout, channel.receive::<Response>())
            .await
            .map_err(|_| {
                Error::HandshakeFailed(format!(
                    "no readiness token within {:?}",
                    self.config.handshake_timeout
                ))
            })??;

        match greeting {
            Some(Inbound::Message(Response::BackendReady)) => {
                info!("Connected to backend at {}", channel.peer_addr());
                Ok(channel)
            }
            Some(other) => Err(Error::HandshakeFailed(format!(
                "expected BACKEND_READY, got {:?}",
                other
            ))),
            None => Err(Error::HandshakeFailed(
                "connection closed before readiness token".into(),
            )),
        }
    }

    async fn serve(&self, channel: CommandChannel) -> Result<()> {
        let (mut receiver, mut sender) = channel.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        *self.outbound.lock() = Some(tx);
        self.set_state(SupervisorState::Connected);

        let mut keepalive = self.config.keepalive_interval.map(|period| {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),

                inbound = receiver.receive::<Response>() => match inbound {
                    Ok(Some(inbound)) => self.route(inbound),
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                },

                Some(command) = rx.recv() => {
                    if let Err(e) = sender.send(&command).await {
                        break Err(e);
                    }
                    debug!("Sent {}", command.as_token());
                }

                _ = tick(&mut keepalive) => {
                    if let Err(e) = sender.send(&Command::Ping).await {
                        break Err(e);
                    }
                    debug!("Sent keep-alive");
                }
            }
        };

        // Commands queued but not yet written are dropped with the channel
        self.outbound.lock().take();
        result
    }

    fn route(&self, inbound: Inbound<Response>) {
        let response = match inbound.into_message() {
            Ok(Response::BackendReady) => Err(Error::ProtocolViolation(
                "readiness token after handshake".into(),
            )),
            other => other,
        };

        match response {
            Ok(response) => {
                debug!("Received {:?}", response);
                if let Some(text) = display_text(&response) {
                    self.display
                        .show(DisplayUpdate::text(ConnectionStatus::Connected, text));
                }
            }
            Err(violation) => debug!("Ignoring frame: {}", violation),
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
