pub mod audio;
pub mod config;
pub mod error;
pub mod frontend;
pub mod protocol;
pub mod provider;
pub mod session;

pub use audio::{AudioBackendFactory, AudioCapture, AudioSource, CaptureConfig, Recording};
pub use config::Config;
pub use error::{Error, Result};
pub use frontend::{ConnectionSupervisor, Display, DisplayUpdate, SupervisorConfig, SupervisorState};
pub use protocol::{Command, CommandChannel, Response};
pub use provider::{AnswerProvider, Provider};
pub use session::{Session, SessionConfig, SessionStats};
