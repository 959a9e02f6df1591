use std::io::Write;

/// Connection indicator shown by the control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// One update pushed to the display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayUpdate {
    pub status: ConnectionStatus,
    /// Text to append to the answer area, if any
    pub text: Option<String>,
}

impl DisplayUpdate {
    pub fn status(status: ConnectionStatus) -> Self {
        Self { status, text: None }
    }

    pub fn text(status: ConnectionStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: Some(text.into()),
        }
    }
}

/// Whatever renders status and answers for the user
pub trait Display: Send + Sync {
    fn show(&self, update: DisplayUpdate);
}

/// Writes updates to stdout
#[derive(Debug, Default)]
pub struct ConsoleDisplay;

impl Display for ConsoleDisplay {
    fn show(&self, update: DisplayUpdate) {
        let mut out = std::io::stdout().lock();
        let result = match &update.text {
            Some(text) => writeln!(out, "{}\n", text),
            None => writeln!(out, "[{:?}]", update.status),
        };
        // Nothing sensible to do if stdout is gone
        let _ = result.and_then(|_| out.flush());
    }
}
