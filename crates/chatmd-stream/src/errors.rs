use std::fmt;

use crate::frame::NamedEvent;

/// Body carried by a failed stream.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub enum ErrorPayload {
    /// The error event's data parsed as JSON.
    Json(serde_json::Value),
    /// The raw event, when its data was not valid JSON.
    Event(NamedEvent),
}

impl ErrorPayload {
    /// Parses the data of an error event, keeping the raw event on failure.
    pub fn from_event(event: &NamedEvent) -> Self {
        match serde_json::from_str(&event.data) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Event(event.clone()),
        }
    }

    /// Returns the best human-readable message for this payload.
    pub fn message(&self) -> String {
        match self {
            Self::Json(value) => value
                .get("error")
                .and_then(|e| e.get("message"))
                .or_else(|| value.get("message"))
                .and_then(|v| v.as_str())
                .map(ToOwned::to_owned)
                .unwrap_or_else(|| value.to_string()),
            Self::Event(event) if event.data.is_empty() => format!("{} event", event.name),
            Self::Event(event) => event.data.clone(),
        }
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Errors returned by a streaming session or transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StreamError {
    /// The server signalled an error, or the stream aborted without a cancel
    /// request (`payload` is `None` in that case).
    #[error("stream failed: {}", describe(.payload))]
    Transport { payload: Option<ErrorPayload> },
    /// Invalid client or session configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The HTTP request could not be sent.
    #[error("http error: {0}")]
    Http(String),
}

impl StreamError {
    pub(crate) fn transport(payload: Option<ErrorPayload>) -> Self {
        Self::Transport { payload }
    }

    /// Returns `true` for an abort that nobody asked for.
    pub fn is_unexpected_abort(&self) -> bool {
        matches!(self, Self::Transport { payload: None })
    }

    /// Returns the error payload, if the server sent one.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Transport { payload } => payload.as_ref(),
            _ => None,
        }
    }
}

fn describe(payload: &Option<ErrorPayload>) -> String {
    match payload {
        Some(payload) => payload.message(),
        None => "connection aborted unexpectedly".to_string(),
    }
}
