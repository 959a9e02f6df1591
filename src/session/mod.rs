//! Backend session
//!
//! This module provides the `Session` that owns:
//! - The listening socket and the one-connection-at-a-time accept loop
//! - Command dispatch for the connected frontend
//! - The audio capture and answer provider handles
//! - Session statistics

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::{Session, CURRENT_QUESTION_PROMPT};
pub use stats::SessionStats;
