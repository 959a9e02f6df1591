use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics about a backend session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the session started listening
    pub started_at: DateTime<Utc>,

    /// Seconds since `started_at`
    pub uptime_secs: f64,

    /// Connections accepted (finished or current)
    pub connections_served: usize,

    /// Recognized commands handled across all connections
    pub commands_dispatched: usize,

    /// Frames that did not decode to a command and were ignored
    pub unrecognized_tokens: usize,

    /// STOP_RECORDING commands that ended an active recording
    pub recordings_completed: usize,
}

#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    connections: AtomicUsize,
    commands: AtomicUsize,
    unrecognized: AtomicUsize,
    recordings: AtomicUsize,
}

impl SessionCounters {
    pub fn connection_accepted(&self) -> usize {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn command_dispatched(&self) {
        self.commands.fetch_add(1, Ordering::SeqCst);
    }

    pub fn unrecognized_token(&self) {
        self.unrecognized.fetch_add(1, Ordering::SeqCst);
    }

    pub fn recording_completed(&self) {
        self.recordings.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self, started_at: DateTime<Utc>) -> SessionStats {
        let uptime = Utc::now().signed_duration_since(started_at);

        SessionStats {
            started_at,
            uptime_secs: uptime.num_milliseconds() as f64 / 1000.0,
            connections_served: self.connections.load(Ordering::SeqCst),
            commands_dispatched: self.commands.load(Ordering::SeqCst),
            unrecognized_tokens: self.unrecognized.load(Ordering::SeqCst),
            recordings_completed: self.recordings.load(Ordering::SeqCst),
        }
    }
}
