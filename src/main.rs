use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use socrates::frontend::ConsoleDisplay;
use socrates::{
    AnswerProvider, AudioBackendFactory, AudioCapture, Command, Config, ConnectionSupervisor,
    Provider, Session, SessionConfig, SupervisorConfig,
};
use std::io::BufRead;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "socrates")]
#[command(about = "Interview assistant: capture backend and remote control frontend")]
struct Cli {
    /// Configuration file; `SOCRATES_<SECTION>__<KEY>` variables override it
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Capture audio and answer questions for a connected frontend
    RunBackend { port: u16, password: String },

    /// Control a backend from this terminal
    RunFrontend {
        backend_host: String,
        backend_port: u16,
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = Config::load(cli.config.as_deref())?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Socrates v{}", env!("CARGO_PKG_VERSION"));

    match cli.mode {
        Mode::RunBackend { port, password } => {
            cfg.backend.port = port;
            cfg.backend.password = password;
            run_backend(cfg).await
        }
        Mode::RunFrontend {
            backend_host,
            backend_port,
            password,
        } => {
            cfg.frontend.host = backend_host;
            cfg.frontend.port = backend_port;
            cfg.frontend.password = password;
            run_frontend(cfg).await
        }
    }
}

async fn run_backend(cfg: Config) -> Result<()> {
    let source = AudioBackendFactory::create(cfg.capture.audio_source()?);
    let capture = AudioCapture::new(source, cfg.capture.capture_config());

    let provider = Provider::select(&cfg.provider);
    if !provider.is_available().await {
        warn!("Answer provider {} is not reachable right now", provider.name());
    }
    let provider: Arc<dyn AnswerProvider> = Arc::new(provider);

    let session = Arc::new(Session::bind(SessionConfig::from_config(&cfg), capture, provider).await?);

    let on_signal = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            on_signal.shutdown();
        }
    });

    session.run().await
}

async fn run_frontend(cfg: Config) -> Result<()> {
    let supervisor = Arc::new(ConnectionSupervisor::new(
        SupervisorConfig::from_config(&cfg.frontend),
        Arc::new(ConsoleDisplay),
    ));

    let on_signal = Arc::clone(&supervisor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            on_signal.shutdown();
        }
    });

    // Blocking stdin reads stay off the runtime
    let ui = Arc::clone(&supervisor);
    std::thread::Builder::new()
        .name("frontend-ui".into())
        .spawn(move || read_commands(&ui))
        .context("Failed to spawn UI thread")?;

    supervisor.run().await;
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(Command),
    Quit,
}

fn parse_input(line: &str) -> Option<Input> {
    match line.to_ascii_lowercase().as_str() {
        "start" | "r" => Some(Input::Send(Command::StartRecording)),
        "stop" | "s" => Some(Input::Send(Command::StopRecording)),
        "answer" | "g" => Some(Input::Send(Command::GetAnswer)),
        "ping" | "p" => Some(Input::Send(Command::Ping)),
        "quit" | "q" | "exit" => Some(Input::Quit),
        _ => None,
    }
}

fn read_commands(supervisor: &ConnectionSupervisor) {
    println!("Commands: start (r), stop (s), answer (g), ping (p), quit (q)");

    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();

        match parse_input(line) {
            Some(Input::Send(command)) => {
                if !supervisor.send(command) {
                    println!("Not connected to backend");
                }
            }
            Some(Input::Quit) => break,
            None if line.is_empty() => {}
            None => println!("Unknown command: {}", line),
        }
    }

    // Quit and end of input both stop the frontend
    supervisor.shutdown();
}
