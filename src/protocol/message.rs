// Protocol tokens exchanged between frontend and backend
//
// A message is `KIND` or `KIND:payload`. The payload is everything after the
// first colon, so it may itself contain colons (or newlines, since framing is
// length-prefixed).

const PAYLOAD_SEPARATOR: char = ':';

/// A message type that can travel over a `CommandChannel`
pub trait WireMessage: Sized {
    /// Render the message as its wire text
    fn encode(&self) -> String;

    /// Parse wire text, returning `None` for anything unrecognized
    fn decode(raw: &str) -> Option<Self>;
}

/// Split raw wire text into its kind and optional payload
pub fn split_token(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(PAYLOAD_SEPARATOR) {
        Some((kind, payload)) => (kind, Some(payload)),
        None => (raw, None),
    }
}

/// Frontend → backend commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StartRecording,
    StopRecording,
    GetAnswer,
    Ping,
}

impl Command {
    pub fn as_token(&self) -> &'static str {
        match self {
            Command::StartRecording => "START_RECORDING",
            Command::StopRecording => "STOP_RECORDING",
            Command::GetAnswer => "GET_ANSWER",
            Command::Ping => "PING",
        }
    }
}

impl WireMessage for Command {
    fn encode(&self) -> String {
        self.as_token().to_string()
    }

    fn decode(raw: &str) -> Option<Self> {
        // Commands are bare tokens; anything with a payload is unknown
        match split_token(raw) {
            ("START_RECORDING", None) => Some(Command::StartRecording),
            ("STOP_RECORDING", None) => Some(Command::StopRecording),
            ("GET_ANSWER", None) => Some(Command::GetAnswer),
            ("PING", None) => Some(Command::Ping),
            _ => None,
        }
    }
}

/// Backend → frontend responses (including the unsolicited readiness token)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    BackendReady,
    RecordingStarted,
    RecordingError,
    RecordingStopped,
    AiResponse(String),
    AiError,
    Pong,
}

impl Response {
    fn kind(&self) -> &'static str {
        match self {
            Response::BackendReady => "BACKEND_READY",
            Response::RecordingStarted => "RECORDING_STARTED",
            Response::RecordingError => "RECORDING_ERROR",
            Response::RecordingStopped => "RECORDING_STOPPED",
            Response::AiResponse(_) => "AI_RESPONSE",
            Response::AiError => "AI_ERROR",
            Response::Pong => "PONG",
        }
    }
}

impl WireMessage for Response {
    fn encode(&self) -> String {
        match self {
            Response::AiResponse(text) => format!("{}{}{}", self.kind(), PAYLOAD_SEPARATOR, text),
            other => other.kind().to_string(),
        }
    }

    fn decode(raw: &str) -> Option<Self> {
        match split_token(raw) {
            ("AI_RESPONSE", Some(text)) => Some(Response::AiResponse(text.to_string())),
            ("BACKEND_READY", None) => Some(Response::BackendReady),
            ("RECORDING_STARTED", None) => Some(Response::RecordingStarted),
            ("RECORDING_ERROR", None) => Some(Response::RecordingError),
            ("RECORDING_STOPPED", None) => Some(Response::RecordingStopped),
            ("AI_ERROR", None) => Some(Response::AiError),
            ("PONG", None) => Some(Response::Pong),
            _ => None,
        }
    }
}
